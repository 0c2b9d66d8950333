// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! On/off switch used in the settings dialog.

use eframe::egui;

const KNOB_RADIUS: f32 = 6.5;

fn mix(off: egui::Color32, on: egui::Color32, t: f32) -> egui::Color32 {
    let channel = |a: u8, b: u8| egui::lerp(a as f32..=b as f32, t).round() as u8;
    egui::Color32::from_rgba_unmultiplied(
        channel(off.r(), on.r()),
        channel(off.g(), on.g()),
        channel(off.b(), on.b()),
        channel(off.a(), on.a()),
    )
}

/// Draw a switch bound to `on`; the response is marked changed when it flips.
pub fn toggle_switch(ui: &mut egui::Ui, on: &mut bool) -> egui::Response {
    let height = ui.spacing().interact_size.y.max(18.0);
    let (rect, mut response) = ui.allocate_exact_size(egui::vec2(height * 1.9, height), egui::Sense::click());
    if response.clicked() {
        *on = !*on;
        response.mark_changed();
    }
    response.widget_info(|| egui::WidgetInfo::selected(egui::WidgetType::Checkbox, ui.is_enabled(), *on, ""));

    if ui.is_rect_visible(rect) {
        let t = ui.ctx().animate_bool_responsive(response.id, *on);
        let visuals = ui.style().interact_selectable(&response, *on);
        let fill = mix(ui.visuals().widgets.inactive.bg_fill, ui.visuals().selection.bg_fill, t);
        let painter = ui.painter();
        painter.rect_filled(rect.expand(visuals.expansion), rect.height() / 2.0, fill);

        let inset = rect.height() / 2.0;
        let x = egui::lerp((rect.left() + inset)..=(rect.right() - inset), t);
        painter.circle(egui::pos2(x, rect.center().y), KNOB_RADIUS, visuals.bg_fill, visuals.fg_stroke);
    }

    response
}

/// A switch followed by its label; clicking the label flips it too.
pub fn toggle_row(ui: &mut egui::Ui, on: &mut bool, label: &str) -> bool {
    ui.horizontal(|ui| {
        let switch = toggle_switch(ui, on);
        let text = ui.add(egui::Label::new(label).sense(egui::Sense::click()));
        if text.clicked() {
            *on = !*on;
            return true;
        }
        switch.changed()
    })
    .inner
}
