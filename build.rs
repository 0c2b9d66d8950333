// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Embed optional bundled resources only when they exist on disk.

use std::path::Path;

fn main() {
    println!("cargo::rustc-check-cfg=cfg(has_app_icon)");
    println!("cargo::rerun-if-changed=resources");

    let icon = Path::new("resources").join("icon.png");
    if icon.is_file() {
        println!("cargo::rustc-cfg=has_app_icon");
    }
}
