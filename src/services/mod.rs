// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Background services: folder watching, single-instance hand-off and extensions.

pub mod extensions;
pub mod single_instance;
pub mod watcher;
