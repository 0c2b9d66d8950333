// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Settings dialog editing a draft of the persisted configuration.

use std::path::PathBuf;

use eframe::egui;

use crate::config::{AppConfig, AppearanceMode};
use crate::logic::numbering::{NumberingOptions, Position};
use crate::ui::components::{toggle_row, toggle_switch};

/// Editable copy of the settings shown in the dialog.
#[derive(Clone, Debug, PartialEq)]
pub struct SettingsDraft {
    pub section_names: Vec<String>,
    pub default_base_name: String,
    pub watched_folders: Vec<String>,
    pub watch_patterns: Vec<String>,
    pub watch_auto_delete: bool,
    pub watch_optimize_import: bool,
    pub appearance_mode: AppearanceMode,
    pub numbering: NumberingOptions,
}

impl SettingsDraft {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            section_names: config.section_names.clone(),
            default_base_name: config.default_base_name.clone(),
            watched_folders: config.watched_folders.clone(),
            watch_patterns: config.watch_patterns.clone(),
            watch_auto_delete: config.watch_auto_delete,
            watch_optimize_import: config.watch_optimize_import,
            appearance_mode: config.appearance_mode,
            numbering: config.numbering.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsModel {
    draft: Option<SettingsDraft>,
    names_text: String,
    patterns_text: String,
    new_folder: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingsMsg {
    Open(SettingsDraft),
    Close,
    NamesChanged(String),
    BaseNameChanged(String),
    PatternsChanged(String),
    NewFolderChanged(String),
    AddFolder,
    BrowseFolder,
    FolderPicked(Option<PathBuf>),
    RemoveFolder(usize),
    SetAutoDelete(bool),
    SetOptimize(bool),
    SetAppearance(AppearanceMode),
    NumberingFormatChanged(String),
    NumberingPositionChanged(Position),
    NumberingFontSizeChanged(f32),
    OpenConfigFolder,
    Apply,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingsCommand {
    PickFolder,
    OpenConfigFolder,
    Apply(SettingsDraft),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub message: String,
    pub is_error: bool,
}

impl SettingsModel {
    pub fn is_open(&self) -> bool {
        self.draft.is_some()
    }

    pub fn draft(&self) -> Option<&SettingsDraft> {
        self.draft.as_ref()
    }
}

fn split_lines(text: &str, separator: char) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn add_folder(draft: &mut SettingsDraft, folder: &str) -> bool {
    let folder = folder.trim();
    if folder.is_empty() || draft.watched_folders.iter().any(|f| f == folder) {
        return false;
    }
    draft.watched_folders.push(folder.to_string());
    true
}

pub fn update(model: &mut SettingsModel, msg: SettingsMsg, cmds: &mut Vec<SettingsCommand>) -> Option<SettingsEvent> {
    if let SettingsMsg::Open(draft) = msg {
        model.names_text = draft.section_names.join("\n");
        model.patterns_text = draft.watch_patterns.join(", ");
        model.new_folder.clear();
        model.draft = Some(draft);
        return None;
    }
    let draft = model.draft.as_mut()?;
    match msg {
        SettingsMsg::Open(_) => {}
        SettingsMsg::Close => model.draft = None,
        SettingsMsg::NamesChanged(text) => model.names_text = text,
        SettingsMsg::BaseNameChanged(name) => draft.default_base_name = name,
        SettingsMsg::PatternsChanged(text) => model.patterns_text = text,
        SettingsMsg::NewFolderChanged(text) => model.new_folder = text,
        SettingsMsg::AddFolder => {
            if add_folder(draft, &model.new_folder) {
                model.new_folder.clear();
            }
        }
        SettingsMsg::BrowseFolder => cmds.push(SettingsCommand::PickFolder),
        SettingsMsg::OpenConfigFolder => cmds.push(SettingsCommand::OpenConfigFolder),
        SettingsMsg::FolderPicked(Some(path)) => {
            add_folder(draft, &path.display().to_string());
        }
        SettingsMsg::FolderPicked(None) => {}
        SettingsMsg::RemoveFolder(index) => {
            if index < draft.watched_folders.len() {
                draft.watched_folders.remove(index);
            }
        }
        SettingsMsg::SetAutoDelete(on) => draft.watch_auto_delete = on,
        SettingsMsg::SetOptimize(on) => draft.watch_optimize_import = on,
        SettingsMsg::SetAppearance(mode) => draft.appearance_mode = mode,
        SettingsMsg::NumberingFormatChanged(format) => draft.numbering.format = format,
        SettingsMsg::NumberingPositionChanged(position) => draft.numbering.position = position,
        SettingsMsg::NumberingFontSizeChanged(size) => draft.numbering.font_size = size.clamp(6.0, 48.0),
        SettingsMsg::Apply => {
            if draft.default_base_name.trim().is_empty() {
                return Some(SettingsEvent {
                    message: "El nombre base no puede estar vacío.".into(),
                    is_error: true,
                });
            }
            if !draft.numbering.format.contains("%(n)") {
                return Some(SettingsEvent {
                    message: "El formato de numeración debe incluir %(n).".into(),
                    is_error: true,
                });
            }
            let mut applied = draft.clone();
            applied.default_base_name = applied.default_base_name.trim().to_string();
            applied.section_names = split_lines(&model.names_text, '\n');
            applied.watch_patterns = split_lines(&model.patterns_text, ',');
            if applied.watch_patterns.is_empty() {
                applied.watch_patterns = vec!["*.pdf".into()];
            }
            model.draft = None;
            cmds.push(SettingsCommand::Apply(applied));
            return Some(SettingsEvent {
                message: "Configuración guardada.".into(),
                is_error: false,
            });
        }
    }
    None
}

pub fn view(ctx: &egui::Context, model: &SettingsModel) -> Vec<SettingsMsg> {
    let mut msgs = Vec::new();
    let Some(draft) = &model.draft else {
        return msgs;
    };

    egui::Window::new("Configuración")
        .collapsible(false)
        .resizable(true)
        .default_width(480.0)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().max_height(520.0).show(ui, |ui| {
                egui::CollapsingHeader::new("Secciones")
                    .default_open(true)
                    .show(ui, |ui| {
                        ui.label("Nombre base de las secciones nuevas");
                        let mut base = draft.default_base_name.clone();
                        if ui.text_edit_singleline(&mut base).changed() {
                            msgs.push(SettingsMsg::BaseNameChanged(base));
                        }
                        ui.add_space(4.0);
                        ui.label("Nombres predefinidos (uno por línea)");
                        let mut names = model.names_text.clone();
                        if ui
                            .add(egui::TextEdit::multiline(&mut names).desired_rows(4))
                            .changed()
                        {
                            msgs.push(SettingsMsg::NamesChanged(names));
                        }
                    });

                egui::CollapsingHeader::new("Carpetas vigiladas")
                    .default_open(true)
                    .show(ui, |ui| {
                        for (i, folder) in draft.watched_folders.iter().enumerate() {
                            ui.horizontal(|ui| {
                                if ui
                                    .small_button(egui_phosphor::regular::TRASH)
                                    .on_hover_text("Dejar de vigilar")
                                    .clicked()
                                {
                                    msgs.push(SettingsMsg::RemoveFolder(i));
                                }
                                ui.label(egui::RichText::new(folder).monospace());
                            });
                        }
                        ui.horizontal(|ui| {
                            let mut folder = model.new_folder.clone();
                            if ui
                                .add(egui::TextEdit::singleline(&mut folder).hint_text("Ruta de carpeta"))
                                .changed()
                            {
                                msgs.push(SettingsMsg::NewFolderChanged(folder));
                            }
                            if ui.button(egui_phosphor::regular::PLUS).clicked() {
                                msgs.push(SettingsMsg::AddFolder);
                            }
                            if ui.button(egui_phosphor::regular::FOLDER_OPEN).clicked() {
                                msgs.push(SettingsMsg::BrowseFolder);
                            }
                        });
                        ui.horizontal(|ui| {
                            ui.label("Patrones");
                            let mut patterns = model.patterns_text.clone();
                            if ui.text_edit_singleline(&mut patterns).changed() {
                                msgs.push(SettingsMsg::PatternsChanged(patterns));
                            }
                        });
                        ui.horizontal(|ui| {
                            let mut on = draft.watch_auto_delete;
                            if toggle_switch(ui, &mut on).changed() {
                                msgs.push(SettingsMsg::SetAutoDelete(on));
                            }
                            ui.label("Mover los archivos importados fuera de la carpeta");
                        });
                        let mut optimize = draft.watch_optimize_import;
                        if toggle_row(ui, &mut optimize, "Optimizar al importar") {
                            msgs.push(SettingsMsg::SetOptimize(optimize));
                        }
                    });

                egui::CollapsingHeader::new("Numeración").show(ui, |ui| {
                    let mut format = draft.numbering.format.clone();
                    if ui.text_edit_singleline(&mut format).changed() {
                        msgs.push(SettingsMsg::NumberingFormatChanged(format));
                    }
                    let mut position = draft.numbering.position;
                    egui::ComboBox::from_label("Posición")
                        .selected_text(position.to_string())
                        .show_ui(ui, |ui| {
                            for option in Position::ALL {
                                ui.selectable_value(&mut position, option, option.to_string());
                            }
                        });
                    if position != draft.numbering.position {
                        msgs.push(SettingsMsg::NumberingPositionChanged(position));
                    }
                    let mut size = draft.numbering.font_size;
                    if ui
                        .add(egui::Slider::new(&mut size, 6.0..=48.0).text("Tamaño"))
                        .changed()
                    {
                        msgs.push(SettingsMsg::NumberingFontSizeChanged(size));
                    }
                });

                egui::CollapsingHeader::new("Apariencia").show(ui, |ui| {
                    ui.horizontal(|ui| {
                        for mode in AppearanceMode::ALL {
                            if ui
                                .selectable_label(draft.appearance_mode == mode, mode.label())
                                .clicked()
                            {
                                msgs.push(SettingsMsg::SetAppearance(mode));
                            }
                        }
                    });
                });
            });

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Guardar").clicked() {
                    msgs.push(SettingsMsg::Apply);
                }
                if ui.button("Cancelar").clicked() {
                    msgs.push(SettingsMsg::Close);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .button(format!("{} Carpeta de configuración", egui_phosphor::regular::FOLDER_OPEN))
                        .clicked()
                    {
                        msgs.push(SettingsMsg::OpenConfigFolder);
                    }
                });
            });
        });

    msgs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn opened() -> SettingsModel {
        let mut model = SettingsModel::default();
        let draft = SettingsDraft::from_config(&AppConfig::defaults_for(Path::new("/home/u")));
        update(&mut model, SettingsMsg::Open(draft), &mut Vec::new());
        model
    }

    #[test]
    fn messages_are_ignored_while_closed() {
        let mut model = SettingsModel::default();
        let mut cmds = Vec::new();
        assert!(update(&mut model, SettingsMsg::Apply, &mut cmds).is_none());
        assert!(cmds.is_empty());
    }

    #[test]
    fn folders_are_added_once() {
        let mut model = opened();
        let before = model.draft().unwrap().watched_folders.len();
        let mut cmds = Vec::new();
        update(&mut model, SettingsMsg::NewFolderChanged("  /scans ".into()), &mut cmds);
        update(&mut model, SettingsMsg::AddFolder, &mut cmds);
        update(&mut model, SettingsMsg::FolderPicked(Some(PathBuf::from("/scans"))), &mut cmds);
        let folders = &model.draft().unwrap().watched_folders;
        assert_eq!(folders.len(), before + 1);
        assert_eq!(folders.last().map(String::as_str), Some("/scans"));
    }

    #[test]
    fn apply_parses_text_fields() {
        let mut model = opened();
        let mut cmds = Vec::new();
        update(&mut model, SettingsMsg::NamesChanged("Uno\n\n Dos \n".into()), &mut cmds);
        update(&mut model, SettingsMsg::PatternsChanged("*.pdf, scan_*.PDF,".into()), &mut cmds);
        update(&mut model, SettingsMsg::SetAppearance(AppearanceMode::Light), &mut cmds);
        let event = update(&mut model, SettingsMsg::Apply, &mut cmds).unwrap();
        assert!(!event.is_error);
        assert!(!model.is_open());

        let [SettingsCommand::Apply(draft)] = cmds.as_slice() else {
            panic!("expected apply command, got {cmds:?}");
        };
        assert_eq!(draft.section_names, ["Uno", "Dos"]);
        assert_eq!(draft.watch_patterns, ["*.pdf", "scan_*.PDF"]);
        assert_eq!(draft.appearance_mode, AppearanceMode::Light);
    }

    #[test]
    fn apply_rejects_empty_base_name() {
        let mut model = opened();
        let mut cmds = Vec::new();
        update(&mut model, SettingsMsg::BaseNameChanged("  ".into()), &mut cmds);
        assert!(update(&mut model, SettingsMsg::Apply, &mut cmds).unwrap().is_error);
        assert!(cmds.is_empty());
        assert!(model.is_open());
    }
}
