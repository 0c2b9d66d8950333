// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Top-level egui application shell.
//! Owns the worker pool and background services, drains their channels into
//! the MVU kernel, and lays out the toolbar, section list and page grid.

pub mod components;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui_phosphor::regular as icons;

use crate::config::{AppearanceMode, WindowGeometry};
use crate::logic::thumbnails::ZOOM_LEVELS;
use crate::mvu::{self, AppModel, Command, Mode, Msg};
use crate::services::single_instance::InstanceServer;
use crate::services::watcher::{FolderWatcher, WatchSettings};
use crate::ui::components::log_viewer::{self, LogViewerMsg};
use crate::ui::components::page_grid::{self, PageAction};
use crate::ui::components::staging::StagingMsg;
use crate::ui::components::{save_dialog, settings, sidebar, staging};

/// How often the UI wakes up to poll background channels while idle.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Stateful egui application for organizing PDF pages.
pub struct PodofiloApp {
    model: AppModel,
    inbox: VecDeque<Msg>,
    cmd_tx: Sender<Command>,
    msg_rx: Receiver<Msg>,
    watch_tx: Sender<PathBuf>,
    watch_rx: Receiver<PathBuf>,
    instance_rx: Receiver<Vec<PathBuf>>,
    watcher: FolderWatcher,
    watch_patterns: Vec<String>,
    _instance: Option<InstanceServer>,
    applied_theme: Option<AppearanceMode>,
}

impl PodofiloApp {
    /// Spawn the workers and services; `initial_files` are opened on the first frame.
    pub fn new(model: AppModel, initial_files: Vec<PathBuf>) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded::<Msg>();

        let threads = std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2);
        for i in 0..threads {
            let cmd_rx = cmd_rx.clone();
            let msg_tx = msg_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    for cmd in cmd_rx.iter() {
                        let msg = mvu::run_command(cmd);
                        let _ = msg_tx.send(msg);
                    }
                });
            if let Err(err) = spawned {
                log::error!("Failed to spawn worker thread: {err}");
            }
        }

        let (instance_tx, instance_rx) = crossbeam_channel::unbounded();
        let instance = match InstanceServer::start(instance_tx) {
            Ok(server) => Some(server),
            Err(err) => {
                log::warn!("Single-instance server unavailable: {err:#}");
                None
            }
        };

        let (watch_tx, watch_rx) = crossbeam_channel::unbounded();
        let watch_patterns = model.config.config().watch_patterns.clone();
        let watcher = FolderWatcher::new(WatchSettings {
            patterns: watch_patterns.clone(),
            ..WatchSettings::default()
        });

        let mut inbox = VecDeque::new();
        if !initial_files.is_empty() {
            inbox.push_back(Msg::FilesPicked(initial_files));
        }
        log::info!("Running in {} mode", model.extensions.mode());

        let mut app = Self {
            model,
            inbox,
            cmd_tx,
            msg_rx,
            watch_tx,
            watch_rx,
            instance_rx,
            watcher,
            watch_patterns,
            _instance: instance,
            applied_theme: None,
        };
        app.sync_watcher();
        app
    }

    /// Route one message through the kernel, handling the few that need the egui context.
    fn dispatch(&mut self, ctx: &egui::Context, msg: Msg) {
        let msg = match msg {
            Msg::PreviewDecoded { key, level, image } => {
                let texture = ctx.load_texture(format!("preview-{key:?}-{level}"), image, egui::TextureOptions::LINEAR);
                Msg::PreviewRendered { key, level, texture }
            }
            Msg::LogViewer(LogViewerMsg::Copy) => {
                ctx.copy_text(crate::logging::recent_lines().join("\n"));
                return;
            }
            other => other,
        };
        let mut commands = Vec::new();
        mvu::update(&mut self.model, msg, &mut commands);
        for cmd in commands {
            if self.cmd_tx.send(cmd).is_ok() {
                self.model.pending_commands += 1;
            }
        }
    }

    /// Keep the folder watcher in step with the configured folders and patterns.
    fn sync_watcher(&mut self) {
        let config = self.model.config.config();
        let wanted: Vec<PathBuf> = config.watched_folders.iter().map(PathBuf::from).collect();

        if config.watch_patterns != self.watch_patterns {
            self.watcher.stop();
            self.watch_patterns = config.watch_patterns.clone();
            self.watcher = FolderWatcher::new(WatchSettings {
                patterns: self.watch_patterns.clone(),
                ..WatchSettings::default()
            });
        }

        let current = self.watcher.folders();
        for gone in current.iter().filter(|f| !wanted.contains(f)) {
            self.watcher.remove_watch(gone);
        }
        for folder in wanted.iter().filter(|f| !current.contains(f)) {
            if self.watcher.add_watch(folder) {
                log::info!("Watching {}", folder.display());
            }
        }

        if !self.watcher.folders().is_empty()
            && !self.watcher.is_running()
            && let Err(err) = self.watcher.start(self.watch_tx.clone())
        {
            log::error!("Could not start the folder watcher: {err:#}");
        }
    }

    fn collect_background(&mut self) {
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.model.pending_commands = self.model.pending_commands.saturating_sub(1);
            self.inbox.push_back(msg);
        }
        while let Ok(path) = self.watch_rx.try_recv() {
            self.inbox.push_back(Msg::WatchedFileReady(path));
        }
        while let Ok(files) = self.instance_rx.try_recv() {
            self.inbox.push_back(Msg::InstanceFiles(files));
        }
    }

    fn collect_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<PathBuf> = ctx.input(|i| i.raw.dropped_files.iter().filter_map(|f| f.path.clone()).collect());
        if !dropped.is_empty() {
            self.inbox.push_back(Msg::FilesPicked(dropped));
        }
    }

    fn collect_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.memory(|m| m.focused().is_some()) {
            return;
        }
        let command = egui::Modifiers::COMMAND;
        let redo = egui::Modifiers::COMMAND | egui::Modifiers::SHIFT;
        let pages = self.model.mode == Mode::Pages;
        ctx.input_mut(|i| {
            if i.consume_key(redo, egui::Key::Z) || i.consume_key(command, egui::Key::Y) {
                self.inbox.push_back(Msg::Redo);
            }
            if i.consume_key(command, egui::Key::Z) {
                self.inbox.push_back(Msg::Undo);
            }
            if i.consume_key(command, egui::Key::O) {
                self.inbox.push_back(Msg::OpenFiles);
            }
            if i.consume_key(command, egui::Key::S) {
                self.inbox.push_back(Msg::OpenSaveDialog);
            }
            if i.consume_key(command, egui::Key::Plus) || i.consume_key(command, egui::Key::Equals) {
                self.inbox.push_back(Msg::ZoomIn);
            }
            if i.consume_key(command, egui::Key::Minus) {
                self.inbox.push_back(Msg::ZoomOut);
            }
            if i.consume_key(egui::Modifiers::ALT, egui::Key::V) {
                self.inbox.push_back(Msg::ToggleContinuous);
            }
            if i.consume_key(command, egui::Key::A) {
                self.inbox.push_back(if pages {
                    Msg::Page(PageAction::SelectAll)
                } else {
                    Msg::Staging(StagingMsg::SelectAll)
                });
            }
            if i.consume_key(egui::Modifiers::NONE, egui::Key::Delete) {
                self.inbox.push_back(if pages {
                    Msg::Page(PageAction::Delete)
                } else {
                    Msg::Staging(StagingMsg::RemoveSelected)
                });
            }
            if i.consume_key(egui::Modifiers::NONE, egui::Key::Escape) {
                self.inbox.push_back(if pages {
                    Msg::Page(PageAction::DeselectAll)
                } else {
                    Msg::Staging(StagingMsg::ClearSelection)
                });
            }
        });
    }

    fn apply_theme(&mut self, ctx: &egui::Context) {
        let mode = self.model.config.config().appearance_mode;
        if self.applied_theme == Some(mode) {
            return;
        }
        ctx.set_theme(match mode {
            AppearanceMode::Dark => egui::ThemePreference::Dark,
            AppearanceMode::Light => egui::ThemePreference::Light,
            AppearanceMode::System => egui::ThemePreference::System,
        });
        self.applied_theme = Some(mode);
    }

    fn window_geometry(ctx: &egui::Context) -> Option<WindowGeometry> {
        ctx.input(|i| {
            let viewport = i.viewport();
            let inner = viewport.inner_rect?;
            let outer = viewport.outer_rect;
            Some(WindowGeometry {
                width: inner.width().round() as u32,
                height: inner.height().round() as u32,
                x: outer.map(|r| r.min.x.round() as i32),
                y: outer.map(|r| r.min.y.round() as i32),
                is_maximized: viewport.maximized.unwrap_or(false),
            })
        })
    }

    fn render_top_bar(&mut self, ui: &mut egui::Ui) {
        let model = &self.model;
        let pages = model.mode == Mode::Pages;
        ui.horizontal_wrapped(|ui| {
            if ui.button(format!("{} Abrir", icons::FOLDER_OPEN)).on_hover_text("Ctrl+O").clicked() {
                self.inbox.push_back(Msg::OpenFiles);
            }
            if ui
                .add_enabled(
                    model.staging.expandable().next().is_some(),
                    egui::Button::new(format!("{} Expandir", icons::ARROWS_OUT)),
                )
                .on_hover_text("Pasar los documentos cargados a la vista de páginas")
                .clicked()
            {
                self.inbox.push_back(Msg::Expand);
            }
            if ui
                .add_enabled(
                    !model.workspace.is_empty(),
                    egui::Button::new(format!("{} Recoger", icons::ARROWS_IN)),
                )
                .on_hover_text("Devolver las secciones a la bandeja")
                .clicked()
            {
                self.inbox.push_back(Msg::Collapse);
            }
            ui.separator();

            let mut mode = model.mode;
            ui.selectable_value(&mut mode, Mode::Boxes, format!("{} Bandeja", icons::TRAY));
            ui.selectable_value(&mut mode, Mode::Pages, format!("{} Páginas", icons::SQUARES_FOUR));
            if mode != model.mode {
                self.inbox.push_back(Msg::SetMode(mode));
            }
            ui.separator();

            if ui
                .add_enabled(model.workspace.can_undo(), egui::Button::new(icons::ARROW_COUNTER_CLOCKWISE))
                .on_hover_text("Deshacer (Ctrl+Z)")
                .clicked()
            {
                self.inbox.push_back(Msg::Undo);
            }
            if ui
                .add_enabled(model.workspace.can_redo(), egui::Button::new(icons::ARROW_CLOCKWISE))
                .on_hover_text("Rehacer (Ctrl+Y)")
                .clicked()
            {
                self.inbox.push_back(Msg::Redo);
            }

            if pages {
                ui.separator();
                let has_selection = !model.workspace.selected().is_empty();
                let tools = [
                    (icons::ARROW_ARC_LEFT, "Girar a la izquierda", PageAction::RotateLeft, has_selection),
                    (icons::ARROW_ARC_RIGHT, "Girar a la derecha", PageAction::RotateRight, has_selection),
                    (icons::COPY, "Duplicar", PageAction::Duplicate, has_selection),
                    (icons::FILE_PLUS, "Insertar página en blanco", PageAction::InsertBlank, true),
                    (icons::TRASH, "Borrar (Supr)", PageAction::Delete, has_selection),
                    (icons::SELECTION_SLASH, "Marcar páginas en blanco", PageAction::MarkBlank, has_selection),
                    (
                        icons::BROOM,
                        "Borrar páginas marcadas",
                        PageAction::DeleteMarked,
                        model.workspace.marked_count() > 0,
                    ),
                    (icons::HASH, "Numerar", PageAction::Number, has_selection),
                    (icons::SCISSORS, "Nueva sección aquí", PageAction::SplitSection, has_selection),
                    (icons::MAGNIFYING_GLASS, "Analizar", PageAction::Analyze, has_selection),
                ];
                for (icon, hover, action, enabled) in tools {
                    if ui.add_enabled(enabled, egui::Button::new(icon)).on_hover_text(hover).clicked() {
                        self.inbox.push_back(Msg::Page(action));
                    }
                }
            }
            ui.separator();

            let size = model.thumbnail_size;
            if ui
                .add_enabled(size > ZOOM_LEVELS[0], egui::Button::new(icons::MAGNIFYING_GLASS_MINUS))
                .clicked()
            {
                self.inbox.push_back(Msg::ZoomOut);
            }
            ui.label(mvu::zoom_label(size));
            if ui
                .add_enabled(
                    size < ZOOM_LEVELS[ZOOM_LEVELS.len() - 1],
                    egui::Button::new(icons::MAGNIFYING_GLASS_PLUS),
                )
                .clicked()
            {
                self.inbox.push_back(Msg::ZoomIn);
            }
            let view_hint = if model.continuous {
                "Vista normal con barra lateral (Alt+V)"
            } else {
                "Vista continua sin barra lateral (Alt+V)"
            };
            if ui
                .selectable_label(model.continuous, icons::ROWS)
                .on_hover_text(view_hint)
                .clicked()
            {
                self.inbox.push_back(Msg::ToggleContinuous);
            }
            ui.separator();

            if ui
                .add_enabled(
                    !model.workspace.is_empty() || model.staging.expandable().next().is_some(),
                    egui::Button::new(format!("{} Guardar", icons::FLOPPY_DISK)),
                )
                .on_hover_text("Ctrl+S")
                .clicked()
            {
                self.inbox.push_back(Msg::OpenSaveDialog);
            }
            if ui.button(icons::GEAR).on_hover_text("Configuración").clicked() {
                self.inbox.push_back(Msg::OpenSettings);
            }
            if ui.button(icons::SCROLL).on_hover_text("Registro").clicked() {
                self.inbox.push_back(Msg::ToggleLog);
            }
            ui.label(
                egui::RichText::new(model.extensions.mode().to_string())
                    .small()
                    .color(egui::Color32::from_gray(120)),
            );
        });
    }

    /// Render a simple modal window for error messages.
    fn render_error_modal(&mut self, ctx: &egui::Context) {
        if let Some(message) = self.model.error.clone() {
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
                .show(ctx, |ui| {
                    ui.label(message);
                    ui.add_space(8.0);
                    if ui.button("Aceptar").clicked() {
                        self.inbox.push_back(Msg::DismissError);
                    }
                });
        }
    }

    fn render_overwrite_prompt(&mut self, ctx: &egui::Context) {
        let Some(prompt) = &self.model.overwrite_prompt else {
            return;
        };
        egui::Window::new("Sobrescribir archivos")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(format!("Ya existen {} archivos:", prompt.existing.len()));
                egui::ScrollArea::vertical().max_height(160.0).show(ui, |ui| {
                    for path in &prompt.existing {
                        ui.monospace(path.display().to_string());
                    }
                });
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Sobrescribir").clicked() {
                        self.inbox.push_back(Msg::ConfirmOverwrite);
                    }
                    if ui.button("Cancelar").clicked() {
                        self.inbox.push_back(Msg::CancelOverwrite);
                    }
                });
            });
    }

    fn render_analysis(&mut self, ctx: &egui::Context) {
        let Some(view) = &self.model.analysis else {
            return;
        };
        let mut open = true;
        egui::Window::new(format!("Análisis de la página {}", view.page + 1))
            .open(&mut open)
            .default_width(420.0)
            .show(ctx, |ui| {
                if view.analysis.is_empty() {
                    ui.label(
                        egui::RichText::new("No se ha reconocido ningún código.")
                            .italics()
                            .color(egui::Color32::from_gray(120)),
                    );
                }
                for line in view.analysis.summary().lines() {
                    ui.label(line);
                }
            });
        if !open {
            self.inbox.push_back(Msg::DismissAnalysis);
        }
    }

    /// Render latest status message with a spinner while workers are busy.
    fn render_status(&self, ui: &mut egui::Ui) {
        let model = &self.model;
        ui.horizontal(|ui| {
            let summary = match model.mode {
                Mode::Pages => format!(
                    "{} páginas · {} secciones · {} seleccionadas",
                    model.workspace.page_count(),
                    model.workspace.sections().len(),
                    model.workspace.selected().len()
                ),
                Mode::Boxes => format!("{} documentos en la bandeja", model.staging.len()),
            };
            ui.label(egui::RichText::new(summary).color(egui::Color32::from_gray(110)));
            if let Some(text) = &model.status {
                ui.separator();
                let first_line = text.lines().next().unwrap_or_default();
                ui.label(egui::RichText::new(first_line).color(egui::Color32::from_gray(68)));
            }
            if model.pending_commands > 0 {
                ui.add(egui::Spinner::new().size(14.0))
                    .on_hover_text(format!("{} tareas en segundo plano", model.pending_commands));
            }
        });
    }
}

impl eframe::App for PodofiloApp {
    // Rendering happens in `update`, which eframe still invokes before `ui`.
    fn ui(&mut self, _ui: &mut egui::Ui, _frame: &mut eframe::Frame) {}

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_theme(ctx);
        self.collect_background();
        self.collect_dropped_files(ctx);
        self.collect_shortcuts(ctx);

        if ctx.input(|i| i.viewport().close_requested())
            && let Some(geometry) = Self::window_geometry(ctx)
        {
            self.inbox.push_back(Msg::WindowClosing(geometry));
        }

        while let Some(msg) = self.inbox.pop_front() {
            self.dispatch(ctx, msg);
        }
        self.sync_watcher();

        if std::mem::take(&mut self.model.focus_requested) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            self.render_top_bar(ui);
            ui.add_space(2.0);
        });

        egui::TopBottomPanel::bottom("status_panel")
            .resizable(false)
            .show(ctx, |ui| self.render_status(ui));

        if self.model.mode == Mode::Pages && !self.model.continuous {
            egui::SidePanel::left("sections")
                .resizable(true)
                .default_width(240.0)
                .show(ctx, |ui| {
                    let config = self.model.config.config();
                    let split = (config.last_split_pages, config.last_split_size_mb);
                    let msgs = sidebar::view(ui, &self.model.sidebar, &self.model.workspace, &config.section_names, split);
                    self.inbox.extend(msgs.into_iter().map(Msg::Sidebar));
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let level = self.model.thumbnail_size;
            match self.model.mode {
                Mode::Boxes => {
                    let msgs = staging::view(
                        ui,
                        &self.model.staging,
                        &self.model.staging_view,
                        &mut self.model.previews,
                        level,
                    );
                    self.inbox.extend(msgs.into_iter().map(Msg::Staging));
                }
                Mode::Pages => {
                    let msgs = page_grid::view(
                        ui,
                        &self.model.workspace,
                        &mut self.model.previews,
                        level,
                        self.model.continuous,
                    );
                    self.inbox.extend(msgs.into_iter().map(Msg::Grid));
                }
            }
        });

        let msgs = save_dialog::view(ctx, &self.model.save_dialog);
        self.inbox.extend(msgs.into_iter().map(Msg::SaveDialog));
        let msgs = settings::view(ctx, &self.model.settings);
        self.inbox.extend(msgs.into_iter().map(Msg::Settings));
        let lines = if self.model.log_open {
            crate::logging::recent_lines()
        } else {
            Vec::new()
        };
        let msgs = log_viewer::view(ctx, self.model.log_open, &lines);
        self.inbox.extend(msgs.into_iter().map(Msg::LogViewer));

        self.render_analysis(ctx);
        self.render_overwrite_prompt(ctx);
        self.render_error_modal(ctx);

        if !self.inbox.is_empty() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(IDLE_POLL);
        }
    }
}
