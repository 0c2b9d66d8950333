// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Poll watched folders for new PDFs and hand them over once fully written.
//!
//! Files already present when a folder starts being watched are ignored;
//! only files that appear afterwards are reported, each once per appearance.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded, select, tick};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::logic::document::PdfDocument;

/// Timing and matching knobs for the watcher.
#[derive(Clone, Debug)]
pub struct WatchSettings {
    pub patterns: Vec<String>,
    /// How long a file size must stay unchanged before it is reported.
    pub stability: Duration,
    /// Give up on files that never settle within this time.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            patterns: vec!["*.pdf".into()],
            stability: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid watch pattern '{pattern}'"))?,
        );
    }
    Ok(builder.build()?)
}

#[derive(Debug)]
struct Candidate {
    first_seen: Instant,
    last_size: Option<u64>,
    stable_since: Option<Instant>,
}

/// Polling state; driven by the watcher thread or directly in tests.
#[derive(Debug)]
pub struct WatchState {
    settings: WatchSettings,
    patterns: GlobSet,
    primed: HashSet<PathBuf>,
    candidates: HashMap<PathBuf, Candidate>,
    /// Reported or abandoned files still on disk.
    settled: HashSet<PathBuf>,
}

impl WatchState {
    pub fn new(settings: WatchSettings) -> Result<Self> {
        let patterns = compile_patterns(&settings.patterns)?;
        Ok(Self {
            settings,
            patterns,
            primed: HashSet::new(),
            candidates: HashMap::new(),
            settled: HashSet::new(),
        })
    }

    fn is_watched_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        !name.starts_with('~') && !name.starts_with('.') && self.patterns.is_match(name)
    }

    fn list(&self, folder: &Path) -> Vec<PathBuf> {
        match fs::read_dir(folder) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && self.is_watched_name(p))
                .collect(),
            Err(err) => {
                log::debug!("Cannot list {}: {err}", folder.display());
                Vec::new()
            }
        }
    }

    /// One polling pass over `folders`; returns files ready to import.
    pub fn poll(&mut self, folders: &[PathBuf], now: Instant) -> Vec<PathBuf> {
        let mut present = HashSet::new();
        let mut ready = Vec::new();

        for folder in folders {
            let files = self.list(folder);
            if self.primed.insert(folder.clone()) {
                log::info!("Started watching {} ({} existing files ignored)", folder.display(), files.len());
                self.settled.extend(files.iter().cloned());
                present.extend(files);
                continue;
            }
            for path in files {
                present.insert(path.clone());
                if self.settled.contains(&path) {
                    continue;
                }
                if self.check(&path, now) {
                    ready.push(path);
                }
            }
        }

        self.primed.retain(|f| folders.contains(f));
        self.settled.retain(|p| present.contains(p));
        self.candidates.retain(|p, _| present.contains(p));
        ready
    }

    /// Advance the debounce for one file; true once it has settled.
    fn check(&mut self, path: &Path, now: Instant) -> bool {
        let size = fs::metadata(path).map(|m| m.len()).ok();
        let settings = &self.settings;
        let candidate = self.candidates.entry(path.to_path_buf()).or_insert_with(|| {
            log::info!("File detected: {}", path.display());
            Candidate {
                first_seen: now,
                last_size: None,
                stable_since: None,
            }
        });

        if size.is_some() && size == candidate.last_size && size != Some(0) {
            let since = *candidate.stable_since.get_or_insert(now);
            if now.duration_since(since) >= settings.stability && can_open_for_append(path) {
                log::info!("File stabilized: {} ({} bytes)", path.display(), size.unwrap_or(0));
                self.candidates.remove(path);
                self.settled.insert(path.to_path_buf());
                return true;
            }
        } else {
            candidate.last_size = size;
            candidate.stable_since = None;
        }

        if now.duration_since(candidate.first_seen) >= settings.timeout {
            log::warn!("Timeout waiting for {} to settle", path.display());
            self.candidates.remove(path);
            self.settled.insert(path.to_path_buf());
        }
        false
    }
}

fn can_open_for_append(path: &Path) -> bool {
    OpenOptions::new().append(true).open(path).is_ok()
}

/// Background folder poller.
pub struct FolderWatcher {
    settings: WatchSettings,
    folders: Arc<Mutex<Vec<PathBuf>>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FolderWatcher {
    pub fn new(settings: WatchSettings) -> Self {
        Self {
            settings,
            folders: Arc::new(Mutex::new(Vec::new())),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        self.folders.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Watch `path`; non-existent and already watched paths are ignored.
    pub fn add_watch(&self, path: &Path) -> bool {
        if !path.is_dir() {
            log::warn!("Cannot watch non-existent path: {}", path.display());
            return false;
        }
        let Ok(mut folders) = self.folders.lock() else {
            return false;
        };
        if folders.iter().any(|f| f == path) {
            return false;
        }
        folders.push(path.to_path_buf());
        true
    }

    pub fn remove_watch(&self, path: &Path) -> bool {
        let Ok(mut folders) = self.folders.lock() else {
            return false;
        };
        let before = folders.len();
        folders.retain(|f| f != path);
        let removed = folders.len() != before;
        if removed {
            log::info!("Stopped watching {}", path.display());
        }
        removed
    }

    /// Start polling; ready files are sent on `tx`.
    pub fn start(&mut self, tx: Sender<PathBuf>) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let mut state = WatchState::new(self.settings.clone())?;
        let folders = Arc::clone(&self.folders);
        let ticker = tick(self.settings.poll_interval);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("folder-watcher".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let current = folders.lock().map(|f| f.clone()).unwrap_or_default();
                            for path in state.poll(&current, Instant::now()) {
                                if tx.send(path).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            })
            .context("Failed to spawn folder watcher thread")?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        log::info!("Watcher service started");
        Ok(())
    }

    /// Stop polling and wait for the thread to finish.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Folder watcher thread panicked");
            }
            log::info!("Watcher service stopped");
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Directory imported files are moved to when auto-delete is on.
pub fn default_import_dir() -> PathBuf {
    std::env::temp_dir().join("podofilo_import")
}

/// `dir/name`, or `dir/stem_N.ext` with the first free `N`.
fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}_{n}.{ext}")),
            None => dir.join(format!("{stem}_{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to).with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    }
    Ok(())
}

/// Post-process a detected file before loading it.
///
/// Without auto-delete the file is loaded in place. With it, the file is
/// moved into `import_dir`, re-saved compressed first when `optimize` is on.
pub fn prepare_import(path: &Path, auto_delete: bool, optimize: bool, import_dir: &Path) -> Result<PathBuf> {
    if !auto_delete {
        return Ok(path.to_path_buf());
    }
    fs::create_dir_all(import_dir).with_context(|| format!("Failed to create {}", import_dir.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("watched file has no name")?;
    let destination = unique_destination(import_dir, name);

    if optimize {
        let optimized = PdfDocument::open(path).and_then(|doc| doc.save(&destination));
        match optimized {
            Ok(()) => {
                fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
                log::info!("Imported {} optimized as {}", path.display(), destination.display());
                return Ok(destination);
            }
            Err(err) => {
                log::warn!("Optimizing {} failed ({err}); moving it instead", path.display());
                let _ = fs::remove_file(&destination);
            }
        }
    }

    move_file(path, &destination)?;
    log::info!("Imported {} as {}", path.display(), destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::fixtures;
    use tempfile::TempDir;

    fn state() -> WatchState {
        WatchState::new(WatchSettings::default()).unwrap()
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    #[test]
    fn existing_files_are_ignored_and_new_ones_reported_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.pdf"), b"old").unwrap();
        let folders = vec![dir.path().to_path_buf()];
        let mut state = state();
        let t0 = Instant::now();

        assert!(state.poll(&folders, t0).is_empty());

        let new = dir.path().join("Nuevo.PDF");
        fs::write(&new, b"%PDF-1.5 data").unwrap();
        assert!(state.poll(&folders, t0 + secs(0.5)).is_empty());
        assert!(state.poll(&folders, t0 + secs(1.0)).is_empty());
        assert_eq!(state.poll(&folders, t0 + secs(3.5)), [new.clone()]);
        assert!(state.poll(&folders, t0 + secs(4.0)).is_empty());

        // Reappearing counts as a new file.
        fs::remove_file(&new).unwrap();
        assert!(state.poll(&folders, t0 + secs(5.0)).is_empty());
        fs::write(&new, b"%PDF-1.5 again").unwrap();
        state.poll(&folders, t0 + secs(5.5));
        state.poll(&folders, t0 + secs(6.0));
        assert_eq!(state.poll(&folders, t0 + secs(8.5)), [new]);
    }

    #[test]
    fn growing_files_reset_the_stability_window() {
        let dir = TempDir::new().unwrap();
        let folders = vec![dir.path().to_path_buf()];
        let mut state = state();
        let t0 = Instant::now();
        state.poll(&folders, t0);

        let file = dir.path().join("scan.pdf");
        fs::write(&file, b"12").unwrap();
        state.poll(&folders, t0 + secs(0.5));
        state.poll(&folders, t0 + secs(1.0));
        fs::write(&file, b"1234").unwrap();
        assert!(state.poll(&folders, t0 + secs(3.5)).is_empty());
        state.poll(&folders, t0 + secs(4.0));
        assert_eq!(state.poll(&folders, t0 + secs(6.5)), [file]);
    }

    #[test]
    fn temp_and_foreign_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let folders = vec![dir.path().to_path_buf()];
        let mut state = state();
        let t0 = Instant::now();
        state.poll(&folders, t0);
        for name in ["~lock.pdf", ".hidden.pdf", "notes.txt"] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        for step in 1..10 {
            assert!(state.poll(&folders, t0 + secs(step as f32)).is_empty());
        }
    }

    #[test]
    fn empty_files_time_out() {
        let dir = TempDir::new().unwrap();
        let folders = vec![dir.path().to_path_buf()];
        let mut state = state();
        let t0 = Instant::now();
        state.poll(&folders, t0);
        fs::write(dir.path().join("empty.pdf"), b"").unwrap();
        state.poll(&folders, t0 + secs(1.0));
        assert!(state.poll(&folders, t0 + secs(40.0)).is_empty());
        assert!(state.candidates.is_empty());
        fs::write(dir.path().join("empty.pdf"), b"now with data").unwrap();
        assert!(state.poll(&folders, t0 + secs(45.0)).is_empty());
    }

    #[test]
    fn add_watch_ignores_missing_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let watcher = FolderWatcher::new(WatchSettings::default());
        assert!(watcher.add_watch(dir.path()));
        assert!(!watcher.add_watch(dir.path()));
        assert!(!watcher.add_watch(&dir.path().join("missing")));
        assert_eq!(watcher.folders().len(), 1);
        assert!(watcher.remove_watch(dir.path()));
        assert!(!watcher.remove_watch(dir.path()));
    }

    #[test]
    fn watcher_thread_starts_and_stops() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut watcher = FolderWatcher::new(WatchSettings::default());
        watcher.start(tx).unwrap();
        assert!(watcher.is_running());
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn import_without_auto_delete_keeps_file_in_place() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        fs::write(&file, fixtures::bytes(&[(100.0, 100.0, "x")])).unwrap();
        let imported = prepare_import(&file, false, true, &dir.path().join("import")).unwrap();
        assert_eq!(imported, file);
        assert!(file.exists());
    }

    #[test]
    fn import_moves_with_collision_safe_names() {
        let dir = TempDir::new().unwrap();
        let import = dir.path().join("import");
        fs::create_dir_all(&import).unwrap();
        fs::write(import.join("a.pdf"), b"taken").unwrap();

        let file = dir.path().join("a.pdf");
        fs::write(&file, b"not really a pdf").unwrap();
        let imported = prepare_import(&file, true, true, &import).unwrap();
        assert_eq!(imported, import.join("a_1.pdf"));
        assert!(!file.exists());
        assert_eq!(fs::read(&imported).unwrap(), b"not really a pdf");
    }

    #[test]
    fn import_optimizes_valid_pdfs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan.pdf");
        fs::write(&file, fixtures::bytes(&[(100.0, 100.0, "x"), (100.0, 100.0, "y")])).unwrap();
        let imported = prepare_import(&file, true, true, &dir.path().join("import")).unwrap();
        assert!(!file.exists());
        assert_eq!(PdfDocument::open(&imported).unwrap().page_count(), 2);
    }
}
