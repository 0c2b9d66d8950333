// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Staging grid: one card per document box, shown before expanding to pages.

use std::collections::BTreeSet;
use std::path::PathBuf;

use eframe::egui;
use uuid::Uuid;

use crate::logic::thumbnails::{PageCache, PreviewKey};
use crate::models::page::PageRef;
use crate::models::staging::{BoxSource, BoxState, DocumentBox, StagingArea};
use crate::ui::components::page_grid::paint_thumbnail;

/// Selection state of the staging grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagingViewModel {
    selected: BTreeSet<usize>,
}

impl StagingViewModel {
    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StagingMsg {
    Click { index: usize, toggle: bool },
    SelectAll,
    ClearSelection,
    RemoveSelected,
    MergeSelected,
    MarkIgnored,
    Unmark,
    CancelSelected,
    RetrySelected,
    MoveBox { from: usize, to: usize },
    /// Open the box's file in the system viewer.
    OpenFile(usize),
    NeedPreview(PageRef),
}

#[derive(Clone, Debug, PartialEq)]
pub enum StagingCommand {
    LoadDocument { box_id: Uuid, path: PathBuf },
    OpenFile(PathBuf),
    RenderPreview(PageRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingEvent {
    pub message: String,
    pub is_error: bool,
}

fn info(message: String) -> Option<StagingEvent> {
    Some(StagingEvent {
        message,
        is_error: false,
    })
}

/// Apply `f` to every selected box; returns how many calls returned true.
fn for_selected(area: &mut StagingArea, model: &StagingViewModel, mut f: impl FnMut(&mut DocumentBox) -> bool) -> usize {
    model
        .selected
        .iter()
        .filter_map(|&i| area.get_mut_at(i).map(&mut f))
        .filter(|&hit| hit)
        .count()
}

pub fn update(
    area: &mut StagingArea,
    model: &mut StagingViewModel,
    msg: StagingMsg,
    cmds: &mut Vec<StagingCommand>,
) -> Option<StagingEvent> {
    model.selected.retain(|&i| i < area.len());
    match msg {
        StagingMsg::Click { index, toggle } => {
            if index >= area.len() {
                return None;
            }
            if toggle {
                if !model.selected.remove(&index) {
                    model.selected.insert(index);
                }
            } else {
                model.selected = BTreeSet::from([index]);
            }
            None
        }
        StagingMsg::SelectAll => {
            model.selected = (0..area.len()).collect();
            None
        }
        StagingMsg::ClearSelection => {
            model.selected.clear();
            None
        }
        StagingMsg::RemoveSelected => {
            let indices: Vec<usize> = model.selected.iter().copied().collect();
            let removed = area.remove(&indices);
            model.selected.clear();
            if removed.is_empty() {
                None
            } else {
                info(format!("{} documentos quitados de la bandeja", removed.len()))
            }
        }
        StagingMsg::MergeSelected => {
            let indices: Vec<usize> = model.selected.iter().copied().collect();
            match area.merge(&indices) {
                Ok(at) => {
                    model.selected = BTreeSet::from([at]);
                    info(format!("{} documentos fusionados", indices.len()))
                }
                Err(err) => Some(StagingEvent {
                    message: err.to_string(),
                    is_error: true,
                }),
            }
        }
        StagingMsg::MarkIgnored => {
            let count = for_selected(area, model, |b| {
                b.mark_ignored();
                true
            });
            (count > 0).then(|| StagingEvent {
                message: format!("{count} documentos ignorados"),
                is_error: false,
            })
        }
        StagingMsg::Unmark => {
            for_selected(area, model, |b| {
                b.unmark();
                true
            });
            None
        }
        StagingMsg::CancelSelected => {
            let count = for_selected(area, model, |b| {
                let pending = matches!(b.state, BoxState::Loading | BoxState::Queued);
                if pending {
                    b.cancel();
                }
                pending
            });
            (count > 0).then(|| StagingEvent {
                message: format!("{count} cargas canceladas"),
                is_error: false,
            })
        }
        StagingMsg::RetrySelected => {
            let count = for_selected(area, model, |b| {
                if !matches!(b.state, BoxState::Failed | BoxState::Cancelled) {
                    return false;
                }
                if let BoxSource::Local { path } = &b.source {
                    let path = path.clone();
                    b.state = BoxState::Loading;
                    b.progress = 0.0;
                    b.error_message.clear();
                    cmds.push(StagingCommand::LoadDocument { box_id: b.id, path });
                    true
                } else {
                    b.retry()
                }
            });
            (count > 0).then(|| StagingEvent {
                message: format!("Reintentando {count} documentos"),
                is_error: false,
            })
        }
        StagingMsg::MoveBox { from, to } => {
            if area.move_box(from, to) {
                model.selected = BTreeSet::from([to]);
            }
            None
        }
        StagingMsg::OpenFile(index) => {
            let path = match area.boxes().get(index).map(|b| &b.source) {
                Some(BoxSource::Local { path }) => path.clone(),
                Some(_) => {
                    return Some(StagingEvent {
                        message: "El documento no tiene un archivo descargado todavía.".into(),
                        is_error: true,
                    });
                }
                None => return None,
            };
            if !path.exists() {
                return Some(StagingEvent {
                    message: format!("No se encontró el archivo:\n{}", path.display()),
                    is_error: true,
                });
            }
            cmds.push(StagingCommand::OpenFile(path));
            None
        }
        StagingMsg::NeedPreview(page) => {
            cmds.push(StagingCommand::RenderPreview(page));
            None
        }
    }
}

fn state_label(b: &DocumentBox) -> String {
    match b.state {
        BoxState::Loading => "Cargando…".into(),
        BoxState::Queued => "En cola".into(),
        BoxState::Loaded => format!("{} pág.", b.pages.len()),
        BoxState::Failed => format!("Error: {}", b.error_message),
        BoxState::Cancelled => "Cancelado".into(),
        BoxState::Marked => "Ignorado".into(),
    }
}

/// Render the toolbar and the box cards.
pub fn view(
    ui: &mut egui::Ui,
    area: &StagingArea,
    model: &StagingViewModel,
    previews: &mut PageCache<egui::TextureHandle>,
    level: u32,
) -> Vec<StagingMsg> {
    let mut msgs = Vec::new();

    ui.horizontal(|ui| {
        let any = !model.selected.is_empty();
        if ui
            .add_enabled(model.selected.len() >= 2, egui::Button::new(format!("{} Fusionar", egui_phosphor::regular::STACK)))
            .clicked()
        {
            msgs.push(StagingMsg::MergeSelected);
        }
        if ui
            .add_enabled(any, egui::Button::new(format!("{} Quitar", egui_phosphor::regular::TRASH)))
            .clicked()
        {
            msgs.push(StagingMsg::RemoveSelected);
        }
        if ui
            .add_enabled(any, egui::Button::new(format!("{} Ignorar", egui_phosphor::regular::EYE_SLASH)))
            .clicked()
        {
            msgs.push(StagingMsg::MarkIgnored);
        }
        if ui.add_enabled(any, egui::Button::new("Restaurar")).clicked() {
            msgs.push(StagingMsg::Unmark);
        }
        if ui.add_enabled(any, egui::Button::new("Cancelar carga")).clicked() {
            msgs.push(StagingMsg::CancelSelected);
        }
        if ui
            .add_enabled(any, egui::Button::new(format!("{} Reintentar", egui_phosphor::regular::ARROW_CLOCKWISE)))
            .clicked()
        {
            msgs.push(StagingMsg::RetrySelected);
        }
    });
    ui.separator();

    if area.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.label(
                egui::RichText::new("Arrastra aquí archivos PDF o usa Abrir")
                    .color(egui::Color32::from_gray(120)),
            );
        });
        return msgs;
    }

    let side = level as f32;
    let card = egui::vec2(side + 16.0, side + 48.0);
    egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
        ui.horizontal_wrapped(|ui| {
            for (index, b) in area.boxes().iter().enumerate() {
                let (rect, response) = ui.allocate_exact_size(card, egui::Sense::click_and_drag());
                if response.clicked() {
                    let toggle = ui.input(|i| i.modifiers.command || i.modifiers.shift);
                    msgs.push(StagingMsg::Click { index, toggle });
                }
                response.dnd_set_drag_payload(index);
                if let Some(from) = response.dnd_release_payload::<usize>() {
                    msgs.push(StagingMsg::MoveBox { from: *from, to: index });
                }
                if response.double_clicked() {
                    msgs.push(StagingMsg::OpenFile(index));
                }
                if !ui.is_rect_visible(rect) {
                    continue;
                }

                let painter = ui.painter_at(rect);
                let selected = model.is_selected(index);
                let visuals = ui.visuals();
                let fill = if selected {
                    visuals.selection.bg_fill.gamma_multiply(0.35)
                } else {
                    visuals.faint_bg_color
                };
                painter.rect_filled(rect, 6.0, fill);
                if response.dnd_hover_payload::<usize>().is_some() {
                    painter.rect_stroke(rect, 6.0, visuals.selection.stroke, egui::StrokeKind::Inside);
                }

                let thumb = egui::Rect::from_min_size(rect.min + egui::vec2(8.0, 8.0), egui::vec2(side, side));
                match b.pages.first() {
                    Some(first) => {
                        let texture = previews.get_or_fallback(PreviewKey::from(first), level);
                        if texture.as_ref().is_none_or(|(_, l)| *l != level) {
                            msgs.push(StagingMsg::NeedPreview(*first));
                        }
                        paint_thumbnail(&painter, thumb, texture.as_ref().map(|(t, _)| t), b.state == BoxState::Marked);
                    }
                    None => {
                        painter.rect_filled(thumb.shrink(side * 0.15), 2.0, egui::Color32::from_gray(90));
                    }
                }

                let text_color = visuals.text_color();
                let name = match b.split {
                    Some(split) => format!("{}{}", b.name, split.suffix()),
                    None => b.name.clone(),
                };
                painter.text(
                    egui::pos2(rect.center().x, thumb.bottom() + 6.0),
                    egui::Align2::CENTER_TOP,
                    name,
                    egui::FontId::proportional(13.0),
                    text_color,
                );
                let state_color = if b.state == BoxState::Failed {
                    visuals.error_fg_color
                } else {
                    egui::Color32::from_gray(120)
                };
                painter.text(
                    egui::pos2(rect.center().x, thumb.bottom() + 24.0),
                    egui::Align2::CENTER_TOP,
                    state_label(b),
                    egui::FontId::proportional(11.0),
                    state_color,
                );
                if b.state == BoxState::Loading {
                    ui.ctx().request_repaint();
                }
            }
        });
    });

    msgs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::DocId;

    fn loaded(name: &str, pages: u32) -> DocumentBox {
        let mut b = DocumentBox::local(PathBuf::from(format!("{name}.pdf")));
        b.set_loaded((1..=pages).map(|p| PageRef::source(DocId(0), p)).collect());
        b
    }

    fn area() -> StagingArea {
        let mut area = StagingArea::new();
        area.add(loaded("a", 1));
        area.add(loaded("b", 2));
        let mut failed = DocumentBox::local(PathBuf::from("c.pdf"));
        failed.set_failed("dañado");
        area.add(failed);
        area
    }

    fn click(area: &mut StagingArea, model: &mut StagingViewModel, index: usize, toggle: bool) {
        update(area, model, StagingMsg::Click { index, toggle }, &mut Vec::new());
    }

    #[test]
    fn click_replaces_and_toggle_extends() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        click(&mut area, &mut model, 0, false);
        click(&mut area, &mut model, 1, true);
        assert_eq!(model.selected().iter().copied().collect::<Vec<_>>(), [0, 1]);
        click(&mut area, &mut model, 2, false);
        assert_eq!(model.selected().iter().copied().collect::<Vec<_>>(), [2]);
        click(&mut area, &mut model, 9, false);
        assert_eq!(model.selected().len(), 1);
    }

    #[test]
    fn merge_selects_the_new_box() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        click(&mut area, &mut model, 0, false);
        click(&mut area, &mut model, 1, true);
        let event = update(&mut area, &mut model, StagingMsg::MergeSelected, &mut Vec::new()).unwrap();
        assert!(!event.is_error);
        assert_eq!(area.len(), 2);
        assert_eq!(area.boxes()[0].pages.len(), 3);
        assert!(model.is_selected(0));
    }

    #[test]
    fn merging_a_failed_box_reports_an_error() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        update(&mut area, &mut model, StagingMsg::SelectAll, &mut Vec::new());
        let event = update(&mut area, &mut model, StagingMsg::MergeSelected, &mut Vec::new()).unwrap();
        assert!(event.is_error);
        assert_eq!(area.len(), 3);
    }

    #[test]
    fn retry_reloads_failed_local_boxes() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        update(&mut area, &mut model, StagingMsg::SelectAll, &mut Vec::new());
        let mut cmds = Vec::new();
        update(&mut area, &mut model, StagingMsg::RetrySelected, &mut cmds);
        let id = area.boxes()[2].id;
        assert_eq!(
            cmds,
            [StagingCommand::LoadDocument {
                box_id: id,
                path: PathBuf::from("c.pdf")
            }]
        );
        assert_eq!(area.boxes()[2].state, BoxState::Loading);
    }

    #[test]
    fn ignore_and_remove_follow_selection() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        click(&mut area, &mut model, 1, false);
        update(&mut area, &mut model, StagingMsg::MarkIgnored, &mut Vec::new());
        assert_eq!(area.boxes()[1].state, BoxState::Marked);
        assert_eq!(area.expandable().count(), 1);

        update(&mut area, &mut model, StagingMsg::RemoveSelected, &mut Vec::new());
        assert_eq!(area.len(), 2);
        assert!(model.selected().is_empty());
    }

    #[test]
    fn moving_a_box_moves_the_selection() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        update(&mut area, &mut model, StagingMsg::MoveBox { from: 0, to: 2 }, &mut Vec::new());
        assert_eq!(area.boxes()[2].name, "a.pdf");
        assert!(model.is_selected(2));
    }

    #[test]
    fn open_file_needs_the_file_on_disk() {
        let mut area = area();
        let mut model = StagingViewModel::default();
        let mut cmds = Vec::new();
        let event = update(&mut area, &mut model, StagingMsg::OpenFile(0), &mut cmds).unwrap();
        assert!(event.is_error);
        assert!(cmds.is_empty());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        area.add(DocumentBox::local(path.clone()));
        assert!(update(&mut area, &mut model, StagingMsg::OpenFile(3), &mut cmds).is_none());
        assert_eq!(cmds, [StagingCommand::OpenFile(path)]);
    }
}
