// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! PDF handling and workspace logic, independent of the UI.

pub mod analysis;
pub mod compose;
pub mod document;
pub mod export;
pub mod numbering;
pub mod thumbnails;
pub mod workspace;
