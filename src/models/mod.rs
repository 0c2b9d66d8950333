// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Domain layer: page references, sections and staged documents shared between UI and PDF logic.

pub mod page;
pub mod section;
pub mod staging;
