// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Save dialog: pick sections, file names, output folder and combined file.

use std::path::PathBuf;

use eframe::egui;

/// One saveable section as listed in the dialog.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveRow {
    pub section_index: usize,
    pub include: bool,
    /// File name as typed, split suffix included.
    pub filename: String,
    pub page_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveDialogModel {
    open: bool,
    rows: Vec<SaveRow>,
    output_dir: Option<PathBuf>,
    combined: bool,
    combined_name: String,
}

/// What the user confirmed.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveSelection {
    pub dir: PathBuf,
    /// `(section index, file name)` of every included row.
    pub sections: Vec<(usize, String)>,
    pub combined_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaveDialogMsg {
    Open {
        rows: Vec<SaveRow>,
        dir: Option<PathBuf>,
        combined_name: String,
    },
    Close,
    ToggleRow(usize),
    SetAll(bool),
    FilenameChanged { row: usize, name: String },
    ToggleCombined,
    CombinedNameChanged(String),
    BrowseDirectory,
    DirectoryPicked(Option<PathBuf>),
    Confirm,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaveDialogCommand {
    PickDirectory { start: Option<PathBuf> },
    Save(SaveSelection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveDialogEvent {
    pub message: String,
    pub is_error: bool,
}

impl SaveDialogModel {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn rows(&self) -> &[SaveRow] {
        &self.rows
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.output_dir.as_ref()
    }
}

fn error(message: &str) -> Option<SaveDialogEvent> {
    Some(SaveDialogEvent {
        message: message.to_string(),
        is_error: true,
    })
}

pub fn update(model: &mut SaveDialogModel, msg: SaveDialogMsg, cmds: &mut Vec<SaveDialogCommand>) -> Option<SaveDialogEvent> {
    match msg {
        SaveDialogMsg::Open {
            rows,
            dir,
            combined_name,
        } => {
            if rows.is_empty() {
                return error("No hay secciones con páginas para guardar.");
            }
            model.open = true;
            model.rows = rows;
            model.output_dir = dir;
            model.combined = false;
            model.combined_name = combined_name;
        }
        SaveDialogMsg::Close => {
            model.open = false;
            return Some(SaveDialogEvent {
                message: "Guardado cancelado.".into(),
                is_error: false,
            });
        }
        SaveDialogMsg::ToggleRow(row) => {
            if let Some(row) = model.rows.get_mut(row) {
                row.include = !row.include;
            }
        }
        SaveDialogMsg::SetAll(include) => model.rows.iter_mut().for_each(|r| r.include = include),
        SaveDialogMsg::FilenameChanged { row, name } => {
            if let Some(row) = model.rows.get_mut(row) {
                row.filename = name;
            }
        }
        SaveDialogMsg::ToggleCombined => model.combined = !model.combined,
        SaveDialogMsg::CombinedNameChanged(name) => model.combined_name = name,
        SaveDialogMsg::BrowseDirectory => cmds.push(SaveDialogCommand::PickDirectory {
            start: model.output_dir.clone(),
        }),
        SaveDialogMsg::DirectoryPicked(dir) => {
            if dir.is_some() {
                model.output_dir = dir;
            }
        }
        SaveDialogMsg::Confirm => {
            let Some(dir) = model.output_dir.clone() else {
                return error("Elige una carpeta de destino.");
            };
            let sections: Vec<(usize, String)> = model
                .rows
                .iter()
                .filter(|r| r.include)
                .map(|r| (r.section_index, r.filename.trim().to_string()))
                .collect();
            if sections.is_empty() && !model.combined {
                return error("Selecciona al menos una sección.");
            }
            if sections.iter().any(|(_, name)| name.is_empty()) {
                return error("Todas las secciones necesitan un nombre de archivo.");
            }
            let combined_name = if model.combined {
                let name = model.combined_name.trim();
                if name.is_empty() {
                    return error("El archivo combinado necesita un nombre.");
                }
                Some(name.to_string())
            } else {
                None
            };
            model.open = false;
            cmds.push(SaveDialogCommand::Save(SaveSelection {
                dir,
                sections,
                combined_name,
            }));
        }
    }
    None
}

pub fn view(ctx: &egui::Context, model: &SaveDialogModel) -> Vec<SaveDialogMsg> {
    let mut msgs = Vec::new();
    if !model.open {
        return msgs;
    }

    egui::Window::new("Guardar secciones")
        .collapsible(false)
        .resizable(true)
        .default_width(520.0)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Carpeta:");
                let dir = model
                    .output_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "(sin elegir)".into());
                ui.label(egui::RichText::new(dir).monospace());
                if ui
                    .button(format!("{} Examinar", egui_phosphor::regular::FOLDER_OPEN))
                    .clicked()
                {
                    msgs.push(SaveDialogMsg::BrowseDirectory);
                }
            });
            ui.add_space(6.0);

            ui.horizontal(|ui| {
                if ui.small_button("Todas").clicked() {
                    msgs.push(SaveDialogMsg::SetAll(true));
                }
                if ui.small_button("Ninguna").clicked() {
                    msgs.push(SaveDialogMsg::SetAll(false));
                }
            });

            egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
                egui::Grid::new("save_rows")
                    .num_columns(3)
                    .striped(true)
                    .show(ui, |ui| {
                        for (i, row) in model.rows.iter().enumerate() {
                            let mut include = row.include;
                            if ui.checkbox(&mut include, "").changed() {
                                msgs.push(SaveDialogMsg::ToggleRow(i));
                            }
                            let mut name = row.filename.clone();
                            if ui
                                .add(egui::TextEdit::singleline(&mut name).desired_width(320.0))
                                .changed()
                            {
                                msgs.push(SaveDialogMsg::FilenameChanged { row: i, name });
                            }
                            ui.label(format!("{} pág.", row.page_count));
                            ui.end_row();
                        }
                    });
            });

            ui.add_space(4.0);
            ui.label(
                egui::RichText::new("Sufijos: /6p divide cada 6 páginas, /5M cada 5 MB.")
                    .small()
                    .color(egui::Color32::from_gray(110)),
            );
            ui.separator();

            ui.horizontal(|ui| {
                let mut combined = model.combined;
                if ui.checkbox(&mut combined, "Además, un PDF con todo").changed() {
                    msgs.push(SaveDialogMsg::ToggleCombined);
                }
                let mut name = model.combined_name.clone();
                if ui
                    .add_enabled(model.combined, egui::TextEdit::singleline(&mut name))
                    .changed()
                {
                    msgs.push(SaveDialogMsg::CombinedNameChanged(name));
                }
            });

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui
                    .button(format!("{} Guardar", egui_phosphor::regular::FLOPPY_DISK))
                    .clicked()
                {
                    msgs.push(SaveDialogMsg::Confirm);
                }
                if ui.button("Cancelar").clicked() {
                    msgs.push(SaveDialogMsg::Close);
                }
            });
        });

    msgs
}
