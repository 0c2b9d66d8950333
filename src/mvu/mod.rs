// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Root Model-View-Update kernel wiring workspace state, messages, and commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eframe::egui;
use uuid::Uuid;

use crate::config::{ConfigManager, WindowGeometry};
use crate::logic::analysis::{PageAnalysis, analyze_page};
use crate::logic::document::PdfDocument;
use crate::logic::export::{
    ExportPlan, ExportReport, SectionRequest, collisions, plan_outputs, write_plan,
};
use crate::logic::numbering::{NumberingOptions, number_pages};
use crate::logic::thumbnails::{
    PageCache, PreviewKey, render_blank, render_preview, snap_to_level, zoom_in,
    zoom_out, zoom_percentage,
};
use crate::logic::workspace::{DocumentSet, NumberingJob, Workspace};
use crate::models::page::PageRef;
use crate::models::staging::{BoxSource, BoxState, DocumentBox, StagingArea};
use crate::services::extensions::ExtensionRegistry;
use crate::services::watcher::{default_import_dir, prepare_import};
use crate::ui::components::log_viewer::LogViewerMsg;
use crate::ui::components::page_grid::{self, PageAction, PageGridModel, PageGridMsg};
use crate::ui::components::save_dialog::{
    self, SaveDialogCommand, SaveDialogModel, SaveDialogMsg, SaveRow, SaveSelection,
};
use crate::ui::components::settings::{
    self, SettingsCommand, SettingsDraft, SettingsModel, SettingsMsg,
};
use crate::ui::components::sidebar::{self, SidebarModel, SidebarMsg};
use crate::ui::components::staging::{self, StagingCommand, StagingMsg, StagingViewModel};
use crate::utils::hash_file;

/// Which grid the central panel shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Whole documents in the staging area.
    #[default]
    Boxes,
    /// Expanded pages grouped in sections.
    Pages,
}

/// Result of a page analysis, shown in its own window.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisView {
    pub page: usize,
    pub analysis: PageAnalysis,
}

/// A planned save waiting for the user to accept overwriting files.
#[derive(Clone, Debug, PartialEq)]
pub struct OverwritePrompt {
    pub plan: ExportPlan,
    pub existing: Vec<PathBuf>,
}

/// Top-level application state.
pub struct AppModel {
    /// Pages, sections and loaded documents.
    pub workspace: Workspace,
    /// Documents not yet expanded into pages.
    pub staging: StagingArea,
    pub staging_view: StagingViewModel,
    pub mode: Mode,
    /// Thumbnail height in pixels, always one of the zoom levels.
    pub thumbnail_size: u32,
    /// Pages flow without section row breaks and the sidebar is hidden.
    pub continuous: bool,
    /// Rendered previews keyed by page and zoom level.
    pub previews: PageCache<egui::TextureHandle>,
    pending_previews: HashSet<(PreviewKey, u32)>,
    failed_previews: HashSet<(PreviewKey, u32)>,
    /// Persisted settings.
    pub config: ConfigManager,
    pub extensions: ExtensionRegistry,
    pub grid: PageGridModel,
    pub sidebar: SidebarModel,
    pub save_dialog: SaveDialogModel,
    pub settings: SettingsModel,
    pub overwrite_prompt: Option<OverwritePrompt>,
    pub analysis: Option<AnalysisView>,
    pub log_open: bool,
    /// Set when another launch asked this window to come to the front.
    pub focus_requested: bool,
    /// Latest status message to display.
    pub status: Option<String>,
    /// Latest error message to display in modal.
    pub error: Option<String>,
    /// Count of queued background commands.
    pub pending_commands: usize,
}

impl AppModel {
    pub fn new(config: ConfigManager, extensions: ExtensionRegistry) -> Self {
        let settings = config.config();
        let workspace = Workspace::new(&settings.default_base_name);
        let thumbnail_size = snap_to_level(settings.thumbnail_size);
        Self {
            workspace,
            staging: StagingArea::new(),
            staging_view: StagingViewModel::default(),
            mode: Mode::Boxes,
            thumbnail_size,
            continuous: settings.continuous_mode,
            previews: PageCache::default(),
            pending_previews: HashSet::new(),
            failed_previews: HashSet::new(),
            config,
            extensions,
            grid: PageGridModel::default(),
            sidebar: SidebarModel::default(),
            save_dialog: SaveDialogModel::default(),
            settings: SettingsModel::default(),
            overwrite_prompt: None,
            analysis: None,
            log_open: false,
            focus_requested: false,
            status: None,
            error: None,
            pending_commands: 0,
        }
    }

    /// Whether a preview is queued or already failed at this level.
    pub fn preview_requested(&self, key: PreviewKey, level: u32) -> bool {
        self.pending_previews.contains(&(key, level)) || self.failed_previews.contains(&(key, level))
    }
}

/// Application messages routed through the update function.
pub enum Msg {
    OpenFiles,
    FilesPicked(Vec<PathBuf>),
    InstanceFiles(Vec<PathBuf>),
    WatchedFileReady(PathBuf),
    DocumentLoaded {
        box_id: Uuid,
        document: PdfDocument,
        signature: Option<String>,
    },
    LoadFailed {
        box_id: Uuid,
        error: String,
    },
    SetMode(Mode),
    Expand,
    Collapse,
    Undo,
    Redo,
    ZoomIn,
    ZoomOut,
    ToggleContinuous,
    Page(PageAction),
    Grid(PageGridMsg),
    Sidebar(SidebarMsg),
    Staging(StagingMsg),
    PreviewDecoded {
        key: PreviewKey,
        level: u32,
        image: egui::ColorImage,
    },
    PreviewRendered {
        key: PreviewKey,
        level: u32,
        texture: egui::TextureHandle,
    },
    PreviewFailed {
        key: PreviewKey,
        level: u32,
        error: String,
    },
    NumberingCompleted {
        job: NumberingJob,
        result: Result<PdfDocument, String>,
    },
    AnalysisCompleted {
        page: usize,
        result: Result<PageAnalysis, String>,
    },
    DismissAnalysis,
    OpenSaveDialog,
    SaveDialog(SaveDialogMsg),
    SavePlanned(Result<(ExportPlan, Vec<PathBuf>), String>),
    ConfirmOverwrite,
    CancelOverwrite,
    SaveCompleted(ExportReport),
    OpenSettings,
    Settings(SettingsMsg),
    ToggleLog,
    LogViewer(LogViewerMsg),
    PathOpened {
        path: PathBuf,
        result: Result<(), String>,
    },
    WindowClosing(WindowGeometry),
    DismissError,
}

/// What a preview depicts, resolved so a worker can draw it.
pub enum PreviewSource {
    Page {
        document: Arc<PdfDocument>,
        index: usize,
        rotation: u16,
    },
    Blank {
        width: f32,
        height: f32,
        rotation: u16,
    },
}

/// Commands represent side-effects executed between frames.
pub enum Command {
    PickFiles {
        start: PathBuf,
    },
    LoadDocument {
        box_id: Uuid,
        path: PathBuf,
    },
    ImportWatched {
        box_id: Uuid,
        path: PathBuf,
        auto_delete: bool,
        optimize: bool,
    },
    RenderPreview {
        key: PreviewKey,
        level: u32,
        source: PreviewSource,
    },
    NumberPages {
        job: NumberingJob,
        documents: DocumentSet,
        options: NumberingOptions,
    },
    AnalyzePage {
        page: usize,
        document: Option<Arc<PdfDocument>>,
        index: usize,
        size: (f32, f32),
    },
    PickSaveDir {
        start: Option<PathBuf>,
    },
    PickWatchFolder,
    /// Open a file or folder with the system's default application.
    OpenPath(PathBuf),
    SaveSections {
        documents: DocumentSet,
        requests: Vec<SectionRequest>,
        dir: PathBuf,
        combined_name: Option<String>,
    },
    WritePlan {
        documents: DocumentSet,
        plan: ExportPlan,
    },
}

/// Update the application model and enqueue commands.
pub fn update(model: &mut AppModel, msg: Msg, cmds: &mut Vec<Command>) {
    match msg {
        Msg::OpenFiles => cmds.push(Command::PickFiles {
            start: model.config.last_loaded_dir(),
        }),
        Msg::FilesPicked(paths) => open_paths(model, paths, cmds),
        Msg::InstanceFiles(paths) => {
            model.focus_requested = true;
            if !paths.is_empty() {
                open_paths(model, paths, cmds);
            }
        }
        Msg::WatchedFileReady(path) => {
            let document = DocumentBox::local(path.clone());
            let box_id = model.staging.add(document);
            let config = model.config.config();
            cmds.push(Command::ImportWatched {
                box_id,
                path: path.clone(),
                auto_delete: config.watch_auto_delete,
                optimize: config.watch_optimize_import,
            });
            surface_event(model, format!("Importando {}", path.display()), false);
        }
        Msg::DocumentLoaded {
            box_id,
            document,
            signature,
        } => document_loaded(model, box_id, document, signature),
        Msg::LoadFailed { box_id, error } => {
            if let Some(b) = model.staging.get_mut(box_id) {
                if b.state == BoxState::Cancelled {
                    return;
                }
                let name = b.name.clone();
                b.set_failed(error.clone());
                surface_event(model, format!("No se pudo cargar {name}: {error}"), false);
            }
        }
        Msg::SetMode(mode) => model.mode = mode,
        Msg::Expand => {
            let added = model.workspace.expand(&mut model.staging);
            model.staging_view = StagingViewModel::default();
            if added > 0 {
                model.mode = Mode::Pages;
                surface_event(model, format!("{added} páginas añadidas"), false);
            } else if model.workspace.is_empty() {
                surface_event(model, "No hay documentos listos para expandir.".into(), false);
            } else {
                model.mode = Mode::Pages;
            }
        }
        Msg::Collapse => {
            let boxes = model.workspace.collapse();
            let count = boxes.len();
            model.staging.extend(boxes);
            model.mode = Mode::Boxes;
            surface_event(model, format!("{count} secciones devueltas a la bandeja"), false);
        }
        Msg::Undo => {
            if model.workspace.undo() {
                surface_event(model, "Deshecho".into(), false);
            }
        }
        Msg::Redo => {
            if model.workspace.redo() {
                surface_event(model, "Rehecho".into(), false);
            }
        }
        Msg::ZoomIn | Msg::ZoomOut => {
            let next = if matches!(msg, Msg::ZoomIn) {
                zoom_in(model.thumbnail_size)
            } else {
                zoom_out(model.thumbnail_size)
            };
            if next != model.thumbnail_size {
                model.thumbnail_size = next;
                persist(model, |c| c.thumbnail_size = next);
                surface_event(model, format!("Zoom {}%", zoom_percentage(next)), false);
            }
        }
        Msg::ToggleContinuous => {
            let continuous = !model.continuous;
            model.continuous = continuous;
            persist(model, |c| c.continuous_mode = continuous);
            let message = if continuous {
                "Vista continua activada (barra lateral oculta)"
            } else {
                "Vista continua desactivada"
            };
            surface_event(model, message.into(), false);
        }
        Msg::Page(action) => page_action(model, action, cmds),
        Msg::Grid(grid_msg) => {
            if let Some(event) = page_grid::update(&mut model.grid, &mut model.workspace, &grid_msg) {
                surface_event(model, event.message, event.is_error);
            }
            match grid_msg {
                PageGridMsg::NeedPreview(index) => {
                    if let Some(&page) = model.workspace.pages().get(index) {
                        request_preview(model, page, cmds);
                    }
                }
                PageGridMsg::Context { action, .. } => page_action(model, action, cmds),
                PageGridMsg::Click { .. } | PageGridMsg::Move { .. } => {}
            }
        }
        Msg::Sidebar(m) => {
            if let Some(event) = sidebar::update(&mut model.sidebar, &mut model.workspace, m) {
                surface_event(model, event.message, event.is_error);
            }
        }
        Msg::Staging(m) => {
            let mut staging_cmds = Vec::new();
            if let Some(event) = staging::update(&mut model.staging, &mut model.staging_view, m, &mut staging_cmds) {
                surface_event(model, event.message, event.is_error);
            }
            for c in staging_cmds {
                match c {
                    StagingCommand::LoadDocument { box_id, path } => {
                        cmds.push(Command::LoadDocument { box_id, path })
                    }
                    StagingCommand::OpenFile(path) => cmds.push(Command::OpenPath(path)),
                    StagingCommand::RenderPreview(page) => request_preview(model, page, cmds),
                }
            }
        }
        Msg::PreviewDecoded { key, level, .. } => {
            // Texture creation happens in the UI shell where the egui context lives.
            log::warn!("Preview {key:?}@{level} reached update without a texture");
            model.pending_previews.remove(&(key, level));
        }
        Msg::PreviewRendered { key, level, texture } => {
            model.pending_previews.remove(&(key, level));
            model.previews.put(key, level, texture);
        }
        Msg::PreviewFailed { key, level, error } => {
            model.pending_previews.remove(&(key, level));
            model.failed_previews.insert((key, level));
            log::warn!("Preview {key:?}@{level} failed: {error}");
        }
        Msg::NumberingCompleted { job, result } => {
            let applied = result.and_then(|stamped| {
                model
                    .workspace
                    .apply_numbering(&job, stamped)
                    .map_err(|e| e.to_string())
            });
            match applied {
                Ok(count) => surface_event(model, format!("{count} páginas numeradas"), false),
                Err(err) => surface_event(model, format!("No se pudo numerar:\n\n{err}"), true),
            }
        }
        Msg::AnalysisCompleted { page, result } => match result {
            Ok(analysis) => {
                surface_event(model, format!("Página {} analizada", page + 1), false);
                model.analysis = Some(AnalysisView { page, analysis });
            }
            Err(err) => surface_event(model, format!("No se pudo analizar la página:\n\n{err}"), true),
        },
        Msg::DismissAnalysis => model.analysis = None,
        Msg::OpenSaveDialog => open_save_dialog(model, cmds),
        Msg::SaveDialog(m) => {
            let mut dialog_cmds = Vec::new();
            if let Some(event) = save_dialog::update(&mut model.save_dialog, m, &mut dialog_cmds) {
                surface_event(model, event.message, event.is_error);
            }
            for c in dialog_cmds {
                match c {
                    SaveDialogCommand::PickDirectory { start } => cmds.push(Command::PickSaveDir { start }),
                    SaveDialogCommand::Save(selection) => cmds.push(save_command(model, selection)),
                }
            }
        }
        Msg::SavePlanned(Err(err)) => {
            surface_event(model, format!("No se pudo preparar el guardado:\n\n{err}"), true)
        }
        Msg::SavePlanned(Ok((plan, existing))) => {
            if let Err(err) = model
                .config
                .remember_split(plan.last_split_pages, plan.last_split_size_mb)
            {
                log::warn!("Could not remember split settings: {err:#}");
            }
            if plan.is_empty() {
                surface_event(model, "No hay nada que guardar.".into(), false);
            } else if existing.is_empty() {
                cmds.push(Command::WritePlan {
                    documents: model.workspace.documents(),
                    plan,
                });
            } else {
                model.overwrite_prompt = Some(OverwritePrompt { plan, existing });
            }
        }
        Msg::ConfirmOverwrite => {
            if let Some(prompt) = model.overwrite_prompt.take() {
                cmds.push(Command::WritePlan {
                    documents: model.workspace.documents(),
                    plan: prompt.plan,
                });
            }
        }
        Msg::CancelOverwrite => {
            model.overwrite_prompt = None;
            surface_event(model, "Guardado cancelado.".into(), false);
        }
        Msg::SaveCompleted(report) => {
            if report.errors.is_empty() {
                surface_event(model, format!("{} archivos guardados", report.saved), false);
            } else {
                surface_event(
                    model,
                    format!(
                        "{} archivos guardados, {} con errores:\n\n{}",
                        report.saved,
                        report.errors.len(),
                        report.errors.join("\n")
                    ),
                    true,
                );
            }
        }
        Msg::OpenSettings => {
            let draft = SettingsDraft::from_config(model.config.config());
            settings::update(&mut model.settings, SettingsMsg::Open(draft), &mut Vec::new());
        }
        Msg::Settings(m) => {
            let mut settings_cmds = Vec::new();
            if let Some(event) = settings::update(&mut model.settings, m, &mut settings_cmds) {
                surface_event(model, event.message, event.is_error);
            }
            for c in settings_cmds {
                match c {
                    SettingsCommand::PickFolder => cmds.push(Command::PickWatchFolder),
                    SettingsCommand::OpenConfigFolder => {
                        if let Some(dir) = model.config.path().parent() {
                            cmds.push(Command::OpenPath(dir.to_path_buf()));
                        }
                    }
                    SettingsCommand::Apply(draft) => apply_settings(model, draft),
                }
            }
        }
        Msg::ToggleLog => model.log_open = !model.log_open,
        Msg::LogViewer(m) => match m {
            LogViewerMsg::Close => model.log_open = false,
            LogViewerMsg::Clear => crate::logging::clear_recent(),
            // Clipboard access happens in the UI shell.
            LogViewerMsg::Copy => {}
        },
        Msg::PathOpened { path, result } => match result {
            Ok(()) => log::debug!("Opened {}", path.display()),
            Err(err) => surface_event(model, format!("No se pudo abrir {}:\n\n{err}", path.display()), true),
        },
        Msg::WindowClosing(geometry) => {
            let size = model.thumbnail_size;
            persist(model, |c| {
                c.window_geometry = geometry;
                c.thumbnail_size = size;
            });
        }
        Msg::DismissError => model.error = None,
    }
}

/// Execute a command synchronously and return a resulting message.
pub fn run_command(cmd: Command) -> Msg {
    match cmd {
        Command::PickFiles { start } => {
            let files = rfd::FileDialog::new()
                .set_title("Abrir PDF")
                .add_filter("PDF", &["pdf", "PDF"])
                .set_directory(start)
                .pick_files()
                .unwrap_or_default();
            Msg::FilesPicked(files)
        }
        Command::LoadDocument { box_id, path } => load_document(box_id, &path),
        Command::ImportWatched {
            box_id,
            path,
            auto_delete,
            optimize,
        } => match prepare_import(&path, auto_delete, optimize, &default_import_dir()) {
            Ok(imported) => load_document(box_id, &imported),
            Err(err) => Msg::LoadFailed {
                box_id,
                error: format!("{err:#}"),
            },
        },
        Command::RenderPreview { key, level, source } => {
            let rendered = match source {
                PreviewSource::Page {
                    document,
                    index,
                    rotation,
                } => render_preview(&document, index, level, rotation).map_err(|e| e.to_string()),
                PreviewSource::Blank {
                    width,
                    height,
                    rotation,
                } => Ok(render_blank(width, height, rotation, level)),
            };
            match rendered {
                Ok(image) => {
                    let size = [image.width() as usize, image.height() as usize];
                    let pixels = image.into_raw();
                    Msg::PreviewDecoded {
                        key,
                        level,
                        image: egui::ColorImage::from_rgba_unmultiplied(size, &pixels),
                    }
                }
                Err(error) => Msg::PreviewFailed { key, level, error },
            }
        }
        Command::NumberPages {
            job,
            documents,
            options,
        } => {
            let result = number_pages(|id| documents.get(&id).map(|d| d.inner()), &job.refs, &options)
                .map(|stamped| PdfDocument::from_document("Numeración", stamped))
                .map_err(|e| e.to_string());
            Msg::NumberingCompleted { job, result }
        }
        Command::AnalyzePage {
            page,
            document,
            index,
            size,
        } => {
            let text = match document {
                Some(document) => document.extract_text(index).map_err(|e| e.to_string()),
                None => Ok(String::new()),
            };
            let result = text.map(|text| analyze_page(&text, size.0 as f64, size.1 as f64));
            Msg::AnalysisCompleted { page, result }
        }
        Command::PickSaveDir { start } => {
            let mut dialog = rfd::FileDialog::new().set_title("Carpeta de destino");
            if let Some(start) = start {
                dialog = dialog.set_directory(start);
            }
            Msg::SaveDialog(SaveDialogMsg::DirectoryPicked(dialog.pick_folder()))
        }
        Command::PickWatchFolder => {
            let folder = rfd::FileDialog::new()
                .set_title("Carpeta a vigilar")
                .pick_folder();
            Msg::Settings(SettingsMsg::FolderPicked(folder))
        }
        Command::OpenPath(path) => {
            let result = open::that_detached(&path).map_err(|e| e.to_string());
            Msg::PathOpened { path, result }
        }
        Command::SaveSections {
            documents,
            requests,
            dir,
            combined_name,
        } => {
            let planned = plan_outputs(&documents, &requests, &dir, combined_name.as_deref())
                .map(|plan| {
                    let existing = collisions(&plan);
                    (plan, existing)
                })
                .map_err(|e| format!("{e:#}"));
            Msg::SavePlanned(planned)
        }
        Command::WritePlan { documents, plan } => Msg::SaveCompleted(write_plan(&documents, &plan)),
    }
}

/// Update status/error fields consistently for user feedback.
fn surface_event(model: &mut AppModel, message: String, is_error: bool) {
    if is_error {
        log::error!("{message}");
        model.error = Some(message.clone());
    }
    model.status = Some(message);
}

/// Apply a config change and save it; failures only reach the log.
fn persist(model: &mut AppModel, change: impl FnOnce(&mut crate::config::AppConfig)) {
    if let Err(err) = model.config.update(change) {
        log::warn!("Could not save configuration: {err:#}");
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Add one box per PDF in `paths` and start loading them.
fn open_paths(model: &mut AppModel, paths: Vec<PathBuf>, cmds: &mut Vec<Command>) {
    if paths.is_empty() {
        surface_event(model, "Apertura cancelada.".into(), false);
        return;
    }
    let (pdfs, others): (Vec<PathBuf>, Vec<PathBuf>) = paths.into_iter().partition(|p| is_pdf(p));
    for other in &others {
        log::warn!("Skipping non-PDF file {}", other.display());
    }
    if let Some(dir) = pdfs.first().and_then(|p| p.parent()).map(Path::to_path_buf)
        && let Err(err) = model.config.set_last_loaded_dir(&dir)
    {
        log::warn!("Could not remember last directory: {err:#}");
    }
    for path in &pdfs {
        let box_id = model.staging.add(DocumentBox::local(path.clone()));
        cmds.push(Command::LoadDocument {
            box_id,
            path: path.clone(),
        });
    }
    let message = match (pdfs.len(), others.len()) {
        (0, _) => "Ninguno de los archivos es un PDF.".to_string(),
        (n, 0) => format!("Cargando {n} documentos"),
        (n, skipped) => format!("Cargando {n} documentos ({skipped} ignorados por no ser PDF)"),
    };
    surface_event(model, message, false);
}

fn load_document(box_id: Uuid, path: &Path) -> Msg {
    match PdfDocument::open(path) {
        Ok(document) => {
            let signature = hash_file(path)
                .inspect_err(|err| log::warn!("{err:#}"))
                .ok();
            Msg::DocumentLoaded {
                box_id,
                document,
                signature,
            }
        }
        Err(err) => Msg::LoadFailed {
            box_id,
            error: err.to_string(),
        },
    }
}

fn document_loaded(model: &mut AppModel, box_id: Uuid, document: PdfDocument, signature: Option<String>) {
    match model.staging.get_mut(box_id) {
        Some(b) if b.state != BoxState::Cancelled => {}
        _ => {
            log::info!("Discarding {} loaded for a cancelled or removed box", document.name());
            return;
        }
    }
    let name = document.name().to_string();
    let moved_to = document.path().map(Path::to_path_buf);
    let doc = model.workspace.add_document(document);
    let pages = model
        .workspace
        .document(doc)
        .map(|d| d.page_refs(doc))
        .unwrap_or_default();
    let count = pages.len();

    let Some(b) = model.staging.get_mut(box_id) else {
        return;
    };
    if let (BoxSource::Local { path }, Some(moved_to)) = (&mut b.source, moved_to) {
        *path = moved_to;
    }
    if pages.is_empty() {
        b.set_failed("El PDF no tiene páginas");
        surface_event(model, format!("{name} no tiene páginas"), false);
        return;
    }
    b.set_loaded(pages);
    let mut message = if model.mode == Mode::Pages {
        format!("{name} ({count} pág.) está en la bandeja; expande para añadirlo")
    } else {
        format!("{name} cargado ({count} pág.)")
    };
    if let Some(signature) = signature {
        match model.config.known_signature(&signature) {
            Some(first) => {
                log::info!("{name} has the same content as {first}");
                message.push_str(&format!(". Es idéntico a {first}"));
            }
            None => {
                if let Err(err) = model.config.remember_signature(&signature, &name) {
                    log::warn!("Could not save configuration: {err:#}");
                }
            }
        }
    }
    surface_event(model, message, false);
}

/// Queue a render of `page` at the current zoom unless one is cached or under way.
fn request_preview(model: &mut AppModel, page: PageRef, cmds: &mut Vec<Command>) {
    let key = PreviewKey::from(&page);
    let level = model.thumbnail_size;
    if model.previews.contains(key, level) || model.preview_requested(key, level) {
        return;
    }
    let source = match page {
        PageRef::Source { doc, page, rotation } => {
            let Some(document) = model.workspace.document(doc) else {
                return;
            };
            PreviewSource::Page {
                document: Arc::clone(document),
                index: page as usize - 1,
                rotation,
            }
        }
        PageRef::Blank {
            width,
            height,
            rotation,
        } => PreviewSource::Blank {
            width,
            height,
            rotation,
        },
    };
    model.pending_previews.insert((key, level));
    cmds.push(Command::RenderPreview { key, level, source });
}

fn page_action(model: &mut AppModel, action: PageAction, cmds: &mut Vec<Command>) {
    let workspace = &mut model.workspace;
    let needs_selection = !matches!(
        action,
        PageAction::InsertBlank
            | PageAction::DeleteMarked
            | PageAction::RemoveNumbering
            | PageAction::EmptyTrash
            | PageAction::SelectAll
            | PageAction::DeselectAll
    );
    if needs_selection && workspace.selected().is_empty() {
        surface_event(model, "Selecciona alguna página primero.".into(), false);
        return;
    }

    let message = match action {
        PageAction::RotateLeft => format!("{} páginas giradas", workspace.rotate_selected(-90)),
        PageAction::RotateRight => format!("{} páginas giradas", workspace.rotate_selected(90)),
        PageAction::Rotate180 => format!("{} páginas giradas", workspace.rotate_selected(180)),
        PageAction::Duplicate => format!("{} páginas duplicadas", workspace.duplicate_selected()),
        PageAction::InsertBlank => format!("{} páginas en blanco insertadas", workspace.insert_blank_pages()),
        PageAction::Delete => format!("{} páginas borradas", workspace.delete_selected()),
        PageAction::MarkBlank => match workspace.mark_selected_blank() {
            Ok(n) => format!("{n} páginas en blanco marcadas"),
            Err(err) => return surface_event(model, format!("No se pudo detectar páginas en blanco:\n\n{err:#}"), true),
        },
        PageAction::Unmark => format!("{} páginas desmarcadas", workspace.unmark_selected()),
        PageAction::DeleteMarked => format!("{} páginas marcadas borradas", workspace.delete_marked()),
        PageAction::Number => match workspace.numbering_job() {
            Ok(job) => {
                let count = job.refs.len();
                cmds.push(Command::NumberPages {
                    job,
                    documents: workspace.documents(),
                    options: model.config.config().numbering.clone(),
                });
                format!("Numerando {count} páginas")
            }
            Err(err) => return surface_event(model, err.to_string(), true),
        },
        PageAction::RemoveNumbering => format!("Numeración quitada de {} páginas", workspace.remove_numbering()),
        PageAction::SplitSection => {
            let Some(&first) = workspace.selected().first() else {
                return;
            };
            if workspace.split_section_at(first) {
                format!("Nueva sección desde la página {}", first + 1)
            } else {
                "La página ya empieza una sección.".to_string()
            }
        }
        PageAction::Analyze => {
            let Some(&page) = workspace.selected().first() else {
                return;
            };
            let size = workspace.page_size(page).unwrap_or_default();
            let (document, index) = match workspace.pages()[page] {
                PageRef::Source { doc, page, .. } => (workspace.document(doc).cloned(), page as usize - 1),
                PageRef::Blank { .. } => (None, 0),
            };
            cmds.push(Command::AnalyzePage {
                page,
                document,
                index,
                size,
            });
            format!("Analizando la página {}", page + 1)
        }
        PageAction::EmptyTrash => format!("{} páginas eliminadas definitivamente", workspace.empty_trash()),
        PageAction::SelectAll => {
            workspace.select_all();
            return;
        }
        PageAction::DeselectAll => {
            workspace.deselect_all();
            return;
        }
    };
    surface_event(model, message, false);
}

fn open_save_dialog(model: &mut AppModel, cmds: &mut Vec<Command>) {
    if model.staging.expandable().next().is_some() {
        update(model, Msg::Expand, cmds);
    }
    let rows: Vec<SaveRow> = model
        .workspace
        .sections()
        .sections()
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_special && s.page_count > 0)
        .map(|(section_index, s)| SaveRow {
            section_index,
            include: true,
            filename: s.title.clone(),
            page_count: s.page_count,
        })
        .collect();
    let msg = SaveDialogMsg::Open {
        rows,
        dir: Some(model.config.last_loaded_dir()),
        combined_name: model.config.config().default_base_name.clone(),
    };
    update(model, Msg::SaveDialog(msg), cmds);
}

fn save_command(model: &AppModel, selection: SaveSelection) -> Command {
    let pages = model.workspace.pages();
    let sections = model.workspace.sections();
    let requests = selection
        .sections
        .iter()
        .filter_map(|(index, filename)| {
            let section = sections.get(*index)?;
            let mut request = SectionRequest::from_section(section, pages);
            request.filename = filename.clone();
            Some(request)
        })
        .collect();
    Command::SaveSections {
        documents: model.workspace.documents(),
        requests,
        dir: selection.dir,
        combined_name: selection.combined_name,
    }
}

fn apply_settings(model: &mut AppModel, draft: SettingsDraft) {
    model.workspace.set_base_name(&draft.default_base_name);
    let folders = draft.watched_folders.clone();
    persist(model, move |c| {
        c.section_names = draft.section_names;
        c.default_base_name = draft.default_base_name;
        c.watch_patterns = draft.watch_patterns;
        c.watch_auto_delete = draft.watch_auto_delete;
        c.watch_optimize_import = draft.watch_optimize_import;
        c.appearance_mode = draft.appearance_mode;
        c.numbering = draft.numbering;
    });
    if let Err(err) = model.config.set_watched_folders(&folders) {
        log::warn!("Could not save watched folders: {err:#}");
    }
}

/// Thumbnail size as a percentage of the base level, for the zoom label.
pub fn zoom_label(size: u32) -> String {
    format!("{}%", zoom_percentage(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::fixtures;
    use crate::services::extensions::load_extensions;
    use tempfile::TempDir;

    fn model(home: &TempDir) -> AppModel {
        AppModel::new(ConfigManager::load_from_home(home.path()).unwrap(), load_extensions())
    }

    fn write_pdf(dir: &Path, name: &str, texts: &[&str]) -> PathBuf {
        let spec: Vec<(f32, f32, &str)> = texts.iter().map(|t| (595.0, 842.0, *t)).collect();
        let path = dir.join(name);
        std::fs::write(&path, fixtures::bytes(&spec)).unwrap();
        path
    }

    /// Run every command to completion, feeding results back.
    fn drain(model: &mut AppModel, mut cmds: Vec<Command>) {
        while let Some(cmd) = cmds.pop() {
            let msg = run_command(cmd);
            update(model, msg, &mut cmds);
        }
    }

    fn loaded_model(home: &TempDir, files: &[(&str, &[&str])]) -> AppModel {
        let mut model = model(home);
        let paths = files.iter().map(|(n, t)| write_pdf(home.path(), n, t)).collect();
        let mut cmds = Vec::new();
        update(&mut model, Msg::FilesPicked(paths), &mut cmds);
        drain(&mut model, cmds);
        model
    }

    #[test]
    fn picked_files_become_loaded_boxes() {
        let home = TempDir::new().unwrap();
        let model = loaded_model(&home, &[("a.pdf", &["uno", "dos"]), ("b.pdf", &["tres"])]);
        assert_eq!(model.staging.len(), 2);
        assert!(model.staging.boxes().iter().all(|b| b.state == BoxState::Loaded));
        assert_eq!(model.staging.boxes()[0].pages.len(), 2);
        assert_eq!(model.config.last_loaded_dir(), home.path());
    }

    #[test]
    fn reopening_the_same_file_is_reported() {
        let home = TempDir::new().unwrap();
        let path = write_pdf(home.path(), "a.pdf", &["x"]);
        let mut model = model(&home);
        for _ in 0..2 {
            let mut cmds = Vec::new();
            update(&mut model, Msg::FilesPicked(vec![path.clone()]), &mut cmds);
            drain(&mut model, cmds);
        }
        assert_eq!(model.staging.len(), 2);
        let status = model.status.as_deref().unwrap_or_default();
        assert!(status.contains("idéntico a a.pdf"), "{status}");
    }

    #[test]
    fn duplicates_are_recognised_after_a_restart() {
        let home = TempDir::new().unwrap();
        let path = write_pdf(home.path(), "a.pdf", &["x"]);
        let copy = home.path().join("copia.pdf");
        std::fs::copy(&path, &copy).unwrap();

        let mut first = model(&home);
        let mut cmds = Vec::new();
        update(&mut first, Msg::FilesPicked(vec![path]), &mut cmds);
        drain(&mut first, cmds);
        drop(first);

        let mut second = model(&home);
        let mut cmds = Vec::new();
        update(&mut second, Msg::FilesPicked(vec![copy]), &mut cmds);
        drain(&mut second, cmds);
        let status = second.status.as_deref().unwrap_or_default();
        assert!(status.contains("idéntico a a.pdf"), "{status}");
    }

    #[test]
    fn broken_files_mark_their_box_failed() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("roto.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let mut model = model(&home);
        let mut cmds = Vec::new();
        update(&mut model, Msg::FilesPicked(vec![path, home.path().join("notes.txt")]), &mut cmds);
        assert_eq!(cmds.len(), 1, "only the PDF is loaded");
        drain(&mut model, cmds);
        assert_eq!(model.staging.boxes()[0].state, BoxState::Failed);
        assert!(model.error.is_none());
    }

    #[test]
    fn cancelled_boxes_ignore_late_results() {
        let home = TempDir::new().unwrap();
        let path = write_pdf(home.path(), "a.pdf", &["x"]);
        let mut model = model(&home);
        let mut cmds = Vec::new();
        update(&mut model, Msg::FilesPicked(vec![path]), &mut cmds);
        update(&mut model, Msg::Staging(StagingMsg::Click { index: 0, toggle: false }), &mut Vec::new());
        update(&mut model, Msg::Staging(StagingMsg::CancelSelected), &mut Vec::new());
        drain(&mut model, cmds);
        assert_eq!(model.staging.boxes()[0].state, BoxState::Cancelled);
        assert!(model.staging.boxes()[0].pages.is_empty());
    }

    #[test]
    fn expand_switches_to_pages_and_collapse_returns() {
        let home = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["1", "2"]), ("b.pdf", &["3"])]);
        update(&mut model, Msg::Expand, &mut Vec::new());
        assert_eq!(model.mode, Mode::Pages);
        assert_eq!(model.workspace.page_count(), 3);
        assert!(model.staging.is_empty());

        update(&mut model, Msg::Collapse, &mut Vec::new());
        assert_eq!(model.mode, Mode::Boxes);
        assert_eq!(model.staging.len(), 2);
        assert!(model.workspace.is_empty());
    }

    #[test]
    fn page_actions_need_a_selection() {
        let home = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["1", "2"])]);
        update(&mut model, Msg::Expand, &mut Vec::new());
        let mut cmds = Vec::new();
        update(&mut model, Msg::Page(PageAction::Delete), &mut cmds);
        assert_eq!(model.workspace.page_count(), 2);
        assert_eq!(model.status.as_deref(), Some("Selecciona alguna página primero."));

        update(&mut model, Msg::Page(PageAction::SelectAll), &mut cmds);
        update(&mut model, Msg::Page(PageAction::RotateRight), &mut cmds);
        assert!(model.workspace.pages().iter().all(|p| p.rotation() == 90));
        update(&mut model, Msg::Undo, &mut cmds);
        assert!(model.workspace.pages().iter().all(|p| p.rotation() == 0));
        assert!(cmds.is_empty());
    }

    #[test]
    fn previews_are_requested_once_and_cached_after_render() {
        let home = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["hola"])]);
        update(&mut model, Msg::Expand, &mut Vec::new());

        let mut cmds = Vec::new();
        update(&mut model, Msg::Grid(PageGridMsg::NeedPreview(0)), &mut cmds);
        update(&mut model, Msg::Grid(PageGridMsg::NeedPreview(0)), &mut cmds);
        assert_eq!(cmds.len(), 1);

        let Msg::PreviewDecoded { key, level, image } = run_command(cmds.pop().unwrap()) else {
            panic!("expected a decoded preview");
        };
        assert_eq!(level, model.thumbnail_size);
        assert_eq!(image.size[1], level as usize);

        let ctx = egui::Context::default();
        let texture = ctx.load_texture("preview", image, egui::TextureOptions::default());
        update(&mut model, Msg::PreviewRendered { key, level, texture }, &mut cmds);
        assert!(model.previews.contains(key, level));
        update(&mut model, Msg::Grid(PageGridMsg::NeedPreview(0)), &mut cmds);
        assert!(cmds.is_empty());
    }

    #[test]
    fn failed_previews_are_not_retried() {
        let home = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["x"])]);
        let page = model.staging.boxes()[0].pages[0];
        let key = PreviewKey::from(&page);
        let level = model.thumbnail_size;
        update(
            &mut model,
            Msg::PreviewFailed {
                key,
                level,
                error: "boom".into(),
            },
            &mut Vec::new(),
        );
        let mut cmds = Vec::new();
        update(&mut model, Msg::Staging(StagingMsg::NeedPreview(page)), &mut cmds);
        assert!(cmds.is_empty());
    }

    #[test]
    fn numbering_runs_in_the_background_and_applies() {
        let home = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["1", "2", "3"])]);
        update(&mut model, Msg::Expand, &mut Vec::new());
        update(&mut model, Msg::Page(PageAction::SelectAll), &mut Vec::new());

        let mut cmds = Vec::new();
        update(&mut model, Msg::Page(PageAction::Number), &mut cmds);
        assert!(matches!(cmds.as_slice(), [Command::NumberPages { .. }]));
        drain(&mut model, cmds);

        assert!(model.error.is_none(), "{:?}", model.error);
        assert!((0..3).all(|i| model.workspace.is_numbered(i)));

        let mut cmds = Vec::new();
        update(&mut model, Msg::Page(PageAction::Number), &mut cmds);
        assert!(cmds.is_empty());
        assert!(model.error.is_some());
    }

    #[test]
    fn save_flow_writes_sections_and_asks_before_overwriting() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut model = loaded_model(&home, &[("a.pdf", &["1", "2"]), ("b.pdf", &["3"])]);

        let mut cmds = Vec::new();
        update(&mut model, Msg::OpenSaveDialog, &mut cmds);
        assert_eq!(model.mode, Mode::Pages, "loaded boxes are expanded first");
        assert!(model.save_dialog.is_open());
        assert_eq!(model.save_dialog.rows().len(), 2);

        update(
            &mut model,
            Msg::SaveDialog(SaveDialogMsg::DirectoryPicked(Some(out.path().to_path_buf()))),
            &mut cmds,
        );
        update(&mut model, Msg::SaveDialog(SaveDialogMsg::Confirm), &mut cmds);
        assert!(matches!(cmds.as_slice(), [Command::SaveSections { .. }]));
        drain(&mut model, cmds);

        assert!(model.error.is_none(), "{:?}", model.error);
        assert!(out.path().join("a.pdf.pdf").exists() || out.path().join("a.pdf").exists());
        assert_eq!(model.status.as_deref(), Some("2 archivos guardados"));

        let mut cmds = Vec::new();
        update(&mut model, Msg::OpenSaveDialog, &mut cmds);
        update(
            &mut model,
            Msg::SaveDialog(SaveDialogMsg::DirectoryPicked(Some(out.path().to_path_buf()))),
            &mut cmds,
        );
        update(&mut model, Msg::SaveDialog(SaveDialogMsg::Confirm), &mut cmds);
        drain(&mut model, cmds);
        let prompt = model.overwrite_prompt.as_ref().expect("overwrite prompt");
        assert_eq!(prompt.existing.len(), 2);

        let mut cmds = Vec::new();
        update(&mut model, Msg::ConfirmOverwrite, &mut cmds);
        assert!(matches!(cmds.as_slice(), [Command::WritePlan { .. }]));
        drain(&mut model, cmds);
        assert!(model.overwrite_prompt.is_none());
    }

    #[test]
    fn zoom_is_clamped_and_persisted() {
        let home = TempDir::new().unwrap();
        let mut model = model(&home);
        for _ in 0..20 {
            update(&mut model, Msg::ZoomIn, &mut Vec::new());
        }
        assert_eq!(model.thumbnail_size, 450);
        assert_eq!(model.config.config().thumbnail_size, 450);

        let reloaded = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(reloaded.config().thumbnail_size, 450);
        assert_eq!(zoom_label(150), "100%");
        assert_eq!(zoom_label(450), "300%");
    }

    #[test]
    fn continuous_view_is_toggled_and_persisted() {
        let home = TempDir::new().unwrap();
        let mut model = model(&home);
        assert!(!model.continuous);
        update(&mut model, Msg::ToggleContinuous, &mut Vec::new());
        assert!(model.continuous);
        assert!(model.status.as_deref().unwrap_or_default().contains("activada"));

        let reloaded = AppModel::new(ConfigManager::load_from_home(home.path()).unwrap(), load_extensions());
        assert!(reloaded.continuous);

        update(&mut model, Msg::ToggleContinuous, &mut Vec::new());
        assert!(!model.continuous);
        assert!(!model.config.config().continuous_mode);
    }

    #[test]
    fn instance_messages_focus_and_open() {
        let home = TempDir::new().unwrap();
        let path = write_pdf(home.path(), "a.pdf", &["x"]);
        let mut model = model(&home);
        let mut cmds = Vec::new();
        update(&mut model, Msg::InstanceFiles(vec![]), &mut cmds);
        assert!(model.focus_requested);
        assert!(cmds.is_empty());

        update(&mut model, Msg::InstanceFiles(vec![path]), &mut cmds);
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn watched_files_are_imported_into_boxes() {
        let home = TempDir::new().unwrap();
        let path = write_pdf(home.path(), "scan.pdf", &["x"]);
        let mut model = model(&home);
        let mut cmds = Vec::new();
        update(&mut model, Msg::WatchedFileReady(path.clone()), &mut cmds);
        drain(&mut model, cmds);
        assert_eq!(model.staging.boxes()[0].state, BoxState::Loaded);
        assert!(path.exists(), "auto-delete is off by default");
    }

    #[test]
    fn settings_apply_persists_and_renames_new_sections() {
        let home = TempDir::new().unwrap();
        let mut model = model(&home);
        let mut cmds = Vec::new();
        update(&mut model, Msg::OpenSettings, &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::BaseNameChanged("expediente".into())), &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::NewFolderChanged("/b".into())), &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::AddFolder), &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::NewFolderChanged("/a".into())), &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::AddFolder), &mut cmds);
        update(&mut model, Msg::Settings(SettingsMsg::Apply), &mut cmds);
        assert!(cmds.is_empty());

        let config = model.config.config();
        assert_eq!(config.default_base_name, "expediente");
        let folders = &config.watched_folders;
        let a = folders.iter().position(|f| f == "/a").unwrap();
        let b = folders.iter().position(|f| f == "/b").unwrap();
        assert!(a < b, "watched folders are kept sorted");
    }
}
