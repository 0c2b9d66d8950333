// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Reusable egui components structured for MVU-style updates.

pub mod log_viewer;
pub mod page_grid;
pub mod save_dialog;
pub mod settings;
pub mod sidebar;
pub mod staging;
pub mod toggle;

pub use toggle::{toggle_row, toggle_switch};
