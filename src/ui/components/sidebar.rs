// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Section list: select, rename, merge and set how a section is split on save.

use eframe::egui;

use crate::logic::workspace::Workspace;
use crate::models::section::{SplitConfig, strip_split_suffix};

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SidebarModel {
    editing: Option<(usize, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SidebarMsg {
    SelectSection(usize),
    StartRename(usize),
    RenameChanged(String),
    CommitRename,
    CancelRename,
    QuickName { index: usize, name: String },
    MergeUp(usize),
    SplitByPages { index: usize, pages: u32 },
    SplitBySize { index: usize, megabytes: u64 },
    EmptyTrash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidebarEvent {
    pub message: String,
    pub is_error: bool,
}

fn info(message: String) -> Option<SidebarEvent> {
    Some(SidebarEvent {
        message,
        is_error: false,
    })
}

pub fn update(model: &mut SidebarModel, workspace: &mut Workspace, msg: SidebarMsg) -> Option<SidebarEvent> {
    match msg {
        SidebarMsg::SelectSection(index) => {
            let section = workspace.sections().get(index)?.clone();
            if section.page_count > 0 {
                workspace.select_range(section.start_page, section.end_page() - 1);
            } else {
                workspace.deselect_all();
            }
            None
        }
        SidebarMsg::StartRename(index) => {
            let section = workspace.sections().get(index)?;
            if section.is_special {
                return None;
            }
            model.editing = Some((index, section.title.clone()));
            None
        }
        SidebarMsg::RenameChanged(text) => {
            if let Some((_, buffer)) = model.editing.as_mut() {
                *buffer = text;
            }
            None
        }
        SidebarMsg::CommitRename => {
            let (index, title) = model.editing.take()?;
            if title.trim().is_empty() {
                return Some(SidebarEvent {
                    message: "El nombre de la sección no puede estar vacío.".into(),
                    is_error: true,
                });
            }
            workspace.rename_section(index, &title);
            None
        }
        SidebarMsg::CancelRename => {
            model.editing = None;
            None
        }
        SidebarMsg::QuickName { index, name } => {
            let suffix = workspace
                .sections()
                .get(index)
                .and_then(|s| s.split)
                .map(|split| split.suffix())
                .unwrap_or_default();
            workspace.rename_section(index, &format!("{name}{suffix}"));
            None
        }
        SidebarMsg::MergeUp(index) => {
            if workspace.merge_section_up(index) {
                info("Sección fusionada con la anterior".into())
            } else {
                None
            }
        }
        SidebarMsg::SplitByPages { index, pages } => {
            workspace.set_split_config(index, SplitConfig::Pages(pages.max(1)));
            info(format!("Se dividirá cada {} páginas al guardar", pages.max(1)))
        }
        SidebarMsg::SplitBySize { index, megabytes } => {
            let megabytes = megabytes.max(1);
            workspace.set_split_config(index, SplitConfig::Bytes(megabytes * MIB));
            info(format!("Se dividirá cada {megabytes} MB al guardar"))
        }
        SidebarMsg::EmptyTrash => {
            let removed = workspace.empty_trash();
            (removed > 0).then(|| SidebarEvent {
                message: format!("{removed} páginas eliminadas definitivamente"),
                is_error: false,
            })
        }
    }
}

/// Render the section list; `names` are the predefined titles, `split` the last used split values.
pub fn view(
    ui: &mut egui::Ui,
    model: &SidebarModel,
    workspace: &Workspace,
    names: &[String],
    split: (u32, u64),
) -> Vec<SidebarMsg> {
    let mut msgs = Vec::new();
    ui.heading("Secciones");
    ui.separator();

    egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
        for (index, section) in workspace.sections().sections().iter().enumerate() {
            let editing = model.editing.as_ref().filter(|(i, _)| *i == index);
            ui.horizontal(|ui| {
                if let Some((_, buffer)) = editing {
                    let mut text = buffer.clone();
                    let response = ui.text_edit_singleline(&mut text);
                    if response.changed() {
                        msgs.push(SidebarMsg::RenameChanged(text));
                    }
                    if response.lost_focus() {
                        if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                            msgs.push(SidebarMsg::CancelRename);
                        } else {
                            msgs.push(SidebarMsg::CommitRename);
                        }
                    }
                    response.request_focus();
                    return;
                }

                let label = format!("{} ({})", section.title, section.page_count);
                let text = if section.is_special {
                    egui::RichText::new(format!("{} {label}", egui_phosphor::regular::TRASH)).italics()
                } else {
                    egui::RichText::new(label)
                };
                let selected = section.page_count > 0
                    && (section.start_page..section.end_page()).all(|p| workspace.is_selected(p));
                let response = ui.selectable_label(selected, text);
                if response.clicked() {
                    msgs.push(SidebarMsg::SelectSection(index));
                }
                if response.double_clicked() {
                    msgs.push(SidebarMsg::StartRename(index));
                }
                response.context_menu(|ui| {
                    if section.is_special {
                        if ui.button("Vaciar papelera").clicked() {
                            msgs.push(SidebarMsg::EmptyTrash);
                            ui.close();
                        }
                        return;
                    }
                    if ui.button("Renombrar").clicked() {
                        msgs.push(SidebarMsg::StartRename(index));
                        ui.close();
                    }
                    ui.menu_button("Nombre predefinido", |ui| {
                        for name in names {
                            if ui.button(name).clicked() {
                                msgs.push(SidebarMsg::QuickName {
                                    index,
                                    name: name.clone(),
                                });
                                ui.close();
                            }
                        }
                    });
                    if ui
                        .add_enabled(index > 0, egui::Button::new("Fusionar con la anterior"))
                        .clicked()
                    {
                        msgs.push(SidebarMsg::MergeUp(index));
                        ui.close();
                    }
                    ui.separator();
                    if ui.button(format!("Dividir cada {} páginas", split.0)).clicked() {
                        msgs.push(SidebarMsg::SplitByPages { index, pages: split.0 });
                        ui.close();
                    }
                    if ui.button(format!("Dividir cada {} MB", split.1)).clicked() {
                        msgs.push(SidebarMsg::SplitBySize {
                            index,
                            megabytes: split.1,
                        });
                        ui.close();
                    }
                    if section.split.is_some() && ui.button("Sin división").clicked() {
                        let plain = strip_split_suffix(&section.title).to_string();
                        msgs.push(SidebarMsg::StartRename(index));
                        msgs.push(SidebarMsg::RenameChanged(plain));
                        msgs.push(SidebarMsg::CommitRename);
                        ui.close();
                    }
                });
            });
        }
    });

    msgs
}
