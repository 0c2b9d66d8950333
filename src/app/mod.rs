// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Application entry point wiring egui/eframe to launch the Podofilo UI.

use std::path::PathBuf;

use eframe::egui;
use egui_phosphor::Variant;

use crate::config::{ConfigManager, WindowGeometry};
use crate::mvu::AppModel;
use crate::services::extensions::load_extensions;
use crate::ui::PodofiloApp;

const MIN_SIZE: [f32; 2] = [800.0, 500.0];

#[cfg(has_app_icon)]
fn app_icon() -> Option<egui::IconData> {
    let bytes = include_bytes!("../../resources/icon.png");
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            Some(egui::IconData {
                width: rgba.width(),
                height: rgba.height(),
                rgba: rgba.into_raw(),
            })
        }
        Err(err) => {
            log::warn!("Bundled icon could not be decoded: {err}");
            None
        }
    }
}

#[cfg(not(has_app_icon))]
fn app_icon() -> Option<egui::IconData> {
    None
}

fn viewport(geometry: &WindowGeometry) -> egui::ViewportBuilder {
    let mut builder = egui::ViewportBuilder::default()
        .with_title("Podofilo")
        .with_app_id("podofilo")
        .with_inner_size([
            (geometry.width as f32).max(MIN_SIZE[0]),
            (geometry.height as f32).max(MIN_SIZE[1]),
        ])
        .with_min_inner_size(MIN_SIZE)
        .with_maximized(geometry.is_maximized)
        .with_drag_and_drop(true);
    if let (Some(x), Some(y)) = (geometry.x, geometry.y) {
        builder = builder.with_position([x as f32, y as f32]);
    }
    if let Some(icon) = app_icon() {
        builder = builder.with_icon(icon);
    }
    builder
}

/// Bootstrap the desktop application and run the main egui event loop.
pub fn run(initial_files: Vec<PathBuf>) -> anyhow::Result<()> {
    let config = ConfigManager::load()?;
    log::info!("Configuration loaded from {}", config.path().display());

    // Register Phosphor icon font.
    let mut fonts = egui::FontDefinitions::default();
    egui_phosphor::add_to_fonts(&mut fonts, Variant::Regular);

    let options = eframe::NativeOptions {
        viewport: viewport(&config.config().window_geometry),
        ..Default::default()
    };

    let model = AppModel::new(config, load_extensions());
    eframe::run_native(
        "Podofilo",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_fonts(fonts);
            Ok(Box::new(PodofiloApp::new(model, initial_files)))
        }),
    )
    .map_err(|err| anyhow::anyhow!("Failed to start the window: {err}"))
}
