// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Window showing the recent log lines.

use eframe::egui;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogViewerMsg {
    Close,
    Copy,
    Clear,
}

pub fn view(ctx: &egui::Context, open: bool, lines: &[String]) -> Vec<LogViewerMsg> {
    let mut msgs = Vec::new();
    if !open {
        return msgs;
    }

    let mut still_open = true;
    egui::Window::new("Registro")
        .open(&mut still_open)
        .default_size([640.0, 360.0])
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(format!("{} Copiar", egui_phosphor::regular::CLIPBOARD_TEXT))
                    .clicked()
                {
                    msgs.push(LogViewerMsg::Copy);
                }
                if ui
                    .button(format!("{} Limpiar", egui_phosphor::regular::BROOM))
                    .clicked()
                {
                    msgs.push(LogViewerMsg::Clear);
                }
                ui.label(
                    egui::RichText::new(format!("{} líneas", lines.len()))
                        .small()
                        .color(egui::Color32::from_gray(110)),
                );
            });
            ui.separator();
            egui::ScrollArea::both()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in lines {
                        let color = if line.contains(" ERROR ") {
                            ui.visuals().error_fg_color
                        } else if line.contains(" WARN ") {
                            ui.visuals().warn_fg_color
                        } else {
                            ui.visuals().text_color()
                        };
                        ui.label(egui::RichText::new(line).monospace().color(color));
                    }
                });
        });

    if !still_open {
        msgs.push(LogViewerMsg::Close);
    }
    msgs
}
