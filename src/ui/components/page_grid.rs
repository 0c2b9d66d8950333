// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Virtualised page grid: only the rows in view are laid out and painted.

use std::ops::Range;

use eframe::egui;

use crate::logic::thumbnails::{PageCache, PreviewKey};
use crate::logic::workspace::Workspace;

const CARD_PADDING: f32 = 8.0;
const HEADER_HEIGHT: f32 = 18.0;
const LABEL_HEIGHT: f32 = 18.0;

const SECTION_COLORS: [egui::Color32; 6] = [
    egui::Color32::from_rgb(66, 133, 244),
    egui::Color32::from_rgb(15, 157, 88),
    egui::Color32::from_rgb(244, 160, 0),
    egui::Color32::from_rgb(171, 71, 188),
    egui::Color32::from_rgb(0, 172, 193),
    egui::Color32::from_rgb(239, 108, 0),
];
const TRASH_COLOR: egui::Color32 = egui::Color32::from_rgb(198, 40, 40);

/// How a click changes the selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Replace,
    Toggle,
    Extend,
}

/// Edits offered in the toolbar and the page context menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageAction {
    RotateLeft,
    RotateRight,
    Rotate180,
    Duplicate,
    InsertBlank,
    Delete,
    MarkBlank,
    Unmark,
    DeleteMarked,
    Number,
    RemoveNumbering,
    SplitSection,
    Analyze,
    EmptyTrash,
    SelectAll,
    DeselectAll,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageGridModel {
    anchor: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageGridMsg {
    Click { index: usize, selection: Selection },
    Move { dragged: usize, target: usize },
    NeedPreview(usize),
    /// Context menu action on `index`; selects it first when it is not selected.
    Context { index: usize, action: PageAction },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageGridEvent {
    pub message: String,
    pub is_error: bool,
}

/// Apply selection and drag messages; the rest is handled by the caller.
pub fn update(model: &mut PageGridModel, workspace: &mut Workspace, msg: &PageGridMsg) -> Option<PageGridEvent> {
    match *msg {
        PageGridMsg::Click { index, selection } => {
            match selection {
                Selection::Replace => {
                    workspace.select(index);
                    model.anchor = Some(index);
                }
                Selection::Toggle => {
                    workspace.toggle(index);
                    model.anchor = Some(index);
                }
                Selection::Extend => workspace.select_range(model.anchor.unwrap_or(index), index),
            }
            None
        }
        PageGridMsg::Move { dragged, target } => {
            let indices: Vec<usize> = if workspace.is_selected(dragged) {
                workspace.selected().iter().copied().collect()
            } else {
                vec![dragged]
            };
            if workspace.move_pages(&indices, target) {
                model.anchor = workspace.selected().first().copied();
                Some(PageGridEvent {
                    message: format!("{} páginas movidas", indices.len()),
                    is_error: false,
                })
            } else {
                None
            }
        }
        PageGridMsg::Context { index, .. } => {
            if !workspace.is_selected(index) {
                workspace.select(index);
                model.anchor = Some(index);
            }
            None
        }
        PageGridMsg::NeedPreview(_) => None,
    }
}

/// Paint a preview texture fitted into `rect`, or a placeholder while it renders.
pub fn paint_thumbnail(painter: &egui::Painter, rect: egui::Rect, texture: Option<&egui::TextureHandle>, dimmed: bool) {
    let Some(texture) = texture else {
        painter.rect_filled(rect.shrink(rect.width() * 0.12), 2.0, egui::Color32::from_gray(200));
        return;
    };
    let size = texture.size_vec2();
    let scale = (rect.width() / size.x).min(rect.height() / size.y);
    let fitted = egui::Rect::from_center_size(rect.center(), size * scale);
    let tint = if dimmed {
        egui::Color32::from_white_alpha(110)
    } else {
        egui::Color32::WHITE
    };
    painter.image(
        texture.id(),
        fitted,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        tint,
    );
    painter.rect_stroke(
        fitted,
        0.0,
        egui::Stroke::new(1.0, egui::Color32::from_gray(150)),
        egui::StrokeKind::Outside,
    );
}

fn context_menu(ui: &mut egui::Ui, index: usize, msgs: &mut Vec<PageGridMsg>) {
    use egui_phosphor::regular as icons;
    let items = [
        (icons::ARROW_COUNTER_CLOCKWISE, "Girar a la izquierda", PageAction::RotateLeft),
        (icons::ARROW_CLOCKWISE, "Girar a la derecha", PageAction::RotateRight),
        (icons::ARROWS_CLOCKWISE, "Girar 180°", PageAction::Rotate180),
        (icons::COPY, "Duplicar", PageAction::Duplicate),
        (icons::FILE_PLUS, "Insertar en blanco", PageAction::InsertBlank),
        (icons::SCISSORS, "Nueva sección aquí", PageAction::SplitSection),
        (icons::MAGNIFYING_GLASS, "Analizar", PageAction::Analyze),
        (icons::TRASH, "Borrar", PageAction::Delete),
    ];
    for (icon, label, action) in items {
        if ui.button(format!("{icon} {label}")).clicked() {
            msgs.push(PageGridMsg::Context { index, action });
            ui.close();
        }
    }
}

/// Slots shown on each grid row: every page plus one trailing drop slot at `total`.
///
/// Outside continuous mode each section starts on a new row.
pub fn layout_rows(section_starts: &[usize], total: usize, columns: usize, continuous: bool) -> Vec<Range<usize>> {
    let columns = columns.max(1);
    let mut rows = Vec::new();
    let mut row_start = 0;
    for slot in 0..=total {
        let full = slot - row_start == columns;
        let new_section = !continuous && slot < total && slot > row_start && section_starts.contains(&slot);
        if full || new_section {
            rows.push(row_start..slot);
            row_start = slot;
        }
    }
    rows.push(row_start..total + 1);
    rows
}

fn drop_marker(ui: &egui::Ui, rect: egui::Rect) {
    ui.painter_at(rect).line_segment(
        [rect.left_top(), rect.left_bottom()],
        egui::Stroke::new(3.0, ui.visuals().selection.stroke.color),
    );
}

/// Empty slot after the last card; dropping here moves pages to the end.
fn end_drop_zone(ui: &mut egui::Ui, card: egui::Vec2, total: usize, msgs: &mut Vec<PageGridMsg>) {
    let (rect, response) = ui.allocate_exact_size(card, egui::Sense::hover());
    if response.dnd_hover_payload::<usize>().is_some() {
        drop_marker(ui, rect);
    }
    if let Some(dragged) = response.dnd_release_payload::<usize>() {
        msgs.push(PageGridMsg::Move {
            dragged: *dragged,
            target: total,
        });
    }
}

/// Render the grid of workspace pages at thumbnail height `level`.
pub fn view(
    ui: &mut egui::Ui,
    workspace: &Workspace,
    previews: &mut PageCache<egui::TextureHandle>,
    level: u32,
    continuous: bool,
) -> Vec<PageGridMsg> {
    let mut msgs = Vec::new();
    let total = workspace.page_count();
    if total == 0 {
        ui.centered_and_justified(|ui| {
            ui.label(egui::RichText::new("No hay páginas").color(egui::Color32::from_gray(120)));
        });
        return msgs;
    }

    let side = level as f32;
    let card = egui::vec2(side + 2.0 * CARD_PADDING, side + HEADER_HEIGHT + LABEL_HEIGHT + CARD_PADDING);
    let spacing = ui.spacing().item_spacing;
    let columns = (((ui.available_width() + spacing.x) / (card.x + spacing.x)).floor() as usize).max(1);
    let sections = workspace.sections();
    let starts: Vec<usize> = sections.sections().iter().map(|s| s.start_page).collect();
    let rows = layout_rows(&starts, total, columns, continuous);

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show_rows(ui, card.y, rows.len(), |ui, row_range| {
            for row in row_range {
                let slots = rows[row].clone();
                ui.horizontal(|ui| {
                    for index in slots {
                        if index == total {
                            end_drop_zone(ui, card, total, &mut msgs);
                            continue;
                        }
                        let (rect, response) = ui.allocate_exact_size(card, egui::Sense::click_and_drag());

                        if response.clicked() {
                            let modifiers = ui.input(|i| i.modifiers);
                            let selection = if modifiers.shift {
                                Selection::Extend
                            } else if modifiers.command {
                                Selection::Toggle
                            } else {
                                Selection::Replace
                            };
                            msgs.push(PageGridMsg::Click { index, selection });
                        }
                        response.dnd_set_drag_payload(index);
                        if let Some(dragged) = response.dnd_release_payload::<usize>() {
                            msgs.push(PageGridMsg::Move {
                                dragged: *dragged,
                                target: index,
                            });
                        }
                        response.context_menu(|ui| context_menu(ui, index, &mut msgs));

                        let Some(page) = workspace.pages().get(index) else {
                            continue;
                        };
                        let section_index = sections.section_index_at(index);
                        let section = section_index.and_then(|i| sections.get(i));
                        let in_trash = section.is_some_and(|s| s.is_deleted());
                        let color = match section_index {
                            _ if in_trash => TRASH_COLOR,
                            Some(i) => SECTION_COLORS[i % SECTION_COLORS.len()],
                            None => egui::Color32::GRAY,
                        };

                        let painter = ui.painter_at(rect);
                        let visuals = ui.visuals();
                        if workspace.is_selected(index) {
                            painter.rect_filled(rect, 6.0, visuals.selection.bg_fill.gamma_multiply(0.35));
                        }
                        painter.rect_filled(
                            egui::Rect::from_min_size(rect.min, egui::vec2(rect.width(), 3.0)),
                            0.0,
                            color,
                        );
                        if let Some(section) = section.filter(|s| s.start_page == index) {
                            painter.text(
                                rect.min + egui::vec2(CARD_PADDING, 4.0),
                                egui::Align2::LEFT_TOP,
                                &section.title,
                                egui::FontId::proportional(11.0),
                                color,
                            );
                        }
                        if response.dnd_hover_payload::<usize>().is_some() {
                            drop_marker(ui, rect);
                        }

                        let thumb = egui::Rect::from_min_size(
                            rect.min + egui::vec2(CARD_PADDING, HEADER_HEIGHT),
                            egui::vec2(side, side),
                        );
                        let texture = previews.get_or_fallback(PreviewKey::from(page), level);
                        if texture.as_ref().is_none_or(|(_, l)| *l != level) {
                            msgs.push(PageGridMsg::NeedPreview(index));
                        }
                        paint_thumbnail(&painter, thumb, texture.as_ref().map(|(t, _)| t), in_trash);

                        if workspace.is_marked(index) {
                            let stroke = egui::Stroke::new(3.0, TRASH_COLOR);
                            painter.line_segment([thumb.left_top(), thumb.right_bottom()], stroke);
                            painter.line_segment([thumb.right_top(), thumb.left_bottom()], stroke);
                        }
                        if workspace.is_numbered(index) {
                            painter.text(
                                thumb.right_top() + egui::vec2(-4.0, 4.0),
                                egui::Align2::RIGHT_TOP,
                                egui_phosphor::regular::HASH,
                                egui::FontId::proportional(14.0),
                                visuals.selection.stroke.color,
                            );
                        }
                        painter.text(
                            egui::pos2(rect.center().x, thumb.bottom() + 3.0),
                            egui::Align2::CENTER_TOP,
                            format!("{}", index + 1),
                            egui::FontId::proportional(12.0),
                            visuals.text_color(),
                        );
                    }
                });
            }
        });

    msgs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::{PdfDocument, fixtures};
    use crate::models::staging::{DocumentBox, StagingArea};
    use std::path::PathBuf;

    fn workspace(pages: usize) -> Workspace {
        let spec: Vec<(f32, f32, &str)> = (0..pages).map(|_| (595.0, 842.0, "x")).collect();
        let mut ws = Workspace::new("resultado");
        let id = ws.add_document(PdfDocument::from_document("a", fixtures::document(&spec)));
        let refs = ws.document(id).unwrap().page_refs(id);
        let mut b = DocumentBox::local(PathBuf::from("a.pdf"));
        b.set_loaded(refs);
        let mut staging = StagingArea::new();
        staging.add(b);
        ws.expand(&mut staging);
        ws
    }

    fn click(model: &mut PageGridModel, ws: &mut Workspace, index: usize, selection: Selection) {
        update(model, ws, &PageGridMsg::Click { index, selection });
    }

    #[test]
    fn shift_click_extends_from_the_anchor() {
        let mut ws = workspace(6);
        let mut model = PageGridModel::default();
        click(&mut model, &mut ws, 1, Selection::Replace);
        click(&mut model, &mut ws, 4, Selection::Extend);
        assert_eq!(ws.selected().iter().copied().collect::<Vec<_>>(), [1, 2, 3, 4]);
        click(&mut model, &mut ws, 5, Selection::Toggle);
        click(&mut model, &mut ws, 3, Selection::Extend);
        assert_eq!(ws.selected().iter().copied().collect::<Vec<_>>(), [3, 4, 5]);
    }

    #[test]
    fn dragging_a_selected_page_moves_the_whole_selection() {
        let mut ws = workspace(5);
        let mut model = PageGridModel::default();
        click(&mut model, &mut ws, 0, Selection::Replace);
        click(&mut model, &mut ws, 1, Selection::Toggle);
        let before = ws.pages().to_vec();
        let event = update(&mut model, &mut ws, &PageGridMsg::Move { dragged: 1, target: 4 }).unwrap();
        assert!(!event.is_error);
        assert_eq!(ws.pages()[2], before[0]);
        assert_eq!(ws.pages()[3], before[1]);
        assert_eq!(ws.selected().iter().copied().collect::<Vec<_>>(), [2, 3]);
    }

    #[test]
    fn dragging_an_unselected_page_moves_only_it() {
        let mut ws = workspace(3);
        let mut model = PageGridModel::default();
        click(&mut model, &mut ws, 0, Selection::Replace);
        let before = ws.pages().to_vec();
        update(&mut model, &mut ws, &PageGridMsg::Move { dragged: 2, target: 0 });
        assert_eq!(ws.pages()[0], before[2]);
        assert_eq!(ws.pages()[1], before[0]);
    }

    #[test]
    fn dropping_past_the_last_card_moves_to_the_end() {
        let mut ws = workspace(4);
        let mut model = PageGridModel::default();
        let before = ws.pages().to_vec();
        let target = ws.page_count();
        update(&mut model, &mut ws, &PageGridMsg::Move { dragged: 0, target });
        assert_eq!(ws.pages()[3], before[0]);
        assert_eq!(ws.pages()[0], before[1]);
        assert_eq!(ws.selected().iter().copied().collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn sections_start_new_rows_outside_continuous_mode() {
        assert_eq!(layout_rows(&[0, 3], 5, 4, false), [0..3, 3..6]);
        assert_eq!(layout_rows(&[0, 3], 5, 4, true), [0..4, 4..6]);
        assert_eq!(layout_rows(&[0, 2, 3], 5, 8, false), [0..2, 2..3, 3..6]);
    }

    #[test]
    fn trailing_drop_slot_wraps_when_the_last_row_is_full() {
        assert_eq!(layout_rows(&[0], 4, 2, false), [0..2, 2..4, 4..5]);
        assert_eq!(layout_rows(&[0], 3, 2, true), [0..2, 2..4]);
        assert_eq!(layout_rows(&[0, 4], 4, 9, false), [0..5]);
    }

    #[test]
    fn context_action_selects_an_unselected_page() {
        let mut ws = workspace(3);
        let mut model = PageGridModel::default();
        click(&mut model, &mut ws, 0, Selection::Replace);
        click(&mut model, &mut ws, 1, Selection::Toggle);
        update(
            &mut model,
            &mut ws,
            &PageGridMsg::Context {
                index: 1,
                action: PageAction::Delete,
            },
        );
        assert_eq!(ws.selected().len(), 2);
        update(
            &mut model,
            &mut ws,
            &PageGridMsg::Context {
                index: 2,
                action: PageAction::Delete,
            },
        );
        assert_eq!(ws.selected().iter().copied().collect::<Vec<_>>(), [2]);
    }
}
