// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Persistent user settings stored as JSON under `<home>/podofilo`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::numbering::NumberingOptions;

const CONFIG_DIR: &str = "podofilo";
const LEGACY_CONFIG_DIR: &str = ".podofilo";
const CONFIG_FILE: &str = "config_v2.json";

/// Section titles offered in the sidebar menu.
pub const DEFAULT_SECTION_NAMES: [&str; 4] = [
    "1 ACUERDO DE DEVOLUCION",
    "2 RECURSO DE ALZADA EN TRAMITE",
    "3 RECURSO CONTENCIOSO",
    "3 AUTO MC",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppearanceMode {
    #[default]
    Dark,
    Light,
    System,
}

impl AppearanceMode {
    pub const ALL: [AppearanceMode; 3] = [AppearanceMode::Dark, AppearanceMode::Light, AppearanceMode::System];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Dark => "Oscuro",
            Self::Light => "Claro",
            Self::System => "Sistema",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub is_maximized: bool,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            x: None,
            y: None,
            is_maximized: false,
        }
    }
}

/// Every persisted setting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub section_names: Vec<String>,
    pub default_base_name: String,
    pub last_split_pages: u32,
    pub last_split_size_mb: u64,
    pub appearance_mode: AppearanceMode,
    pub window_geometry: WindowGeometry,
    pub thumbnail_size: u32,
    pub continuous_mode: bool,
    pub watched_folders: Vec<String>,
    pub watch_auto_delete: bool,
    pub watch_optimize_import: bool,
    pub watch_patterns: Vec<String>,
    pub last_loaded_dir: String,
    /// Content hash of every document ever loaded, with the name it was first loaded as.
    pub doc_signature_map: BTreeMap<String, String>,
    pub numbering: NumberingOptions,
}

impl AppConfig {
    /// Defaults for a user whose home directory is `home`.
    pub fn defaults_for(home: &Path) -> Self {
        Self {
            section_names: DEFAULT_SECTION_NAMES.iter().map(|s| s.to_string()).collect(),
            default_base_name: "resultado".into(),
            last_split_pages: 6,
            last_split_size_mb: 5,
            appearance_mode: AppearanceMode::Dark,
            window_geometry: WindowGeometry::default(),
            thumbnail_size: 150,
            continuous_mode: false,
            watched_folders: vec![home.join("AppData").join("Local").join("oviscapto").display().to_string()],
            watch_auto_delete: false,
            watch_optimize_import: true,
            watch_patterns: vec!["*.pdf".into()],
            last_loaded_dir: home.join("Documents").display().to_string(),
            doc_signature_map: BTreeMap::new(),
            numbering: NumberingOptions::default(),
        }
    }
}

/// Loads, holds and persists [`AppConfig`].
#[derive(Debug)]
pub struct ConfigManager {
    home: PathBuf,
    path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Load settings for the current user.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("No se pudo determinar la carpeta personal")?;
        Self::load_from_home(&home)
    }

    /// Load settings stored under `home`, migrating the legacy location if needed.
    pub fn load_from_home(home: &Path) -> Result<Self> {
        let dir = home.join(CONFIG_DIR);
        let path = dir.join(CONFIG_FILE);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let legacy = home.join(LEGACY_CONFIG_DIR).join(CONFIG_FILE);
        if !path.exists() && legacy.exists() {
            match fs::copy(&legacy, &path) {
                Ok(_) => log::info!("Migrated config from {} to {}", legacy.display(), path.display()),
                Err(err) => log::warn!("Error migrating config from {}: {err}", legacy.display()),
            }
        }

        let defaults = AppConfig::defaults_for(home);
        let (config, completed) = match fs::read_to_string(&path) {
            Ok(text) => merge_with_defaults(&text, &defaults),
            Err(_) => (defaults, true),
        };

        let manager = Self {
            home: home.to_path_buf(),
            path,
            config,
        };
        if completed {
            manager.save()?;
        }
        log::info!("Loaded configuration from {}", manager.path.display());
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config).context("Failed to serialize configuration")?;
        fs::write(&self.path, json).with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Apply `change` and persist immediately.
    pub fn update(&mut self, change: impl FnOnce(&mut AppConfig)) -> Result<()> {
        change(&mut self.config);
        self.save()
    }

    /// Ignores unknown modes; returns whether the mode changed.
    pub fn set_appearance_mode(&mut self, mode: &str) -> Result<bool> {
        match AppearanceMode::parse(mode) {
            Some(mode) => {
                self.update(|c| c.appearance_mode = mode)?;
                Ok(true)
            }
            None => {
                log::warn!("Ignoring unknown appearance mode '{mode}'");
                Ok(false)
            }
        }
    }

    /// Store watched folders trimmed, without empties or duplicates, sorted.
    pub fn set_watched_folders<S: AsRef<str>>(&mut self, folders: &[S]) -> Result<()> {
        let mut cleaned: Vec<String> = folders
            .iter()
            .map(|f| f.as_ref().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        cleaned.sort();
        cleaned.dedup();
        self.update(|c| c.watched_folders = cleaned)
    }

    pub fn add_watched_folder(&mut self, folder: &str) -> Result<()> {
        let mut folders = self.config.watched_folders.clone();
        folders.push(folder.to_string());
        self.set_watched_folders(&folders)
    }

    pub fn remove_watched_folder(&mut self, folder: &str) -> Result<()> {
        let folders: Vec<String> = self
            .config
            .watched_folders
            .iter()
            .filter(|f| f.as_str() != folder)
            .cloned()
            .collect();
        self.set_watched_folders(&folders)
    }

    /// Last directory a file was opened from, if it still exists.
    pub fn last_loaded_dir(&self) -> PathBuf {
        let stored = PathBuf::from(&self.config.last_loaded_dir);
        if !self.config.last_loaded_dir.is_empty() && stored.exists() {
            stored
        } else {
            self.home.join("Documents")
        }
    }

    pub fn set_last_loaded_dir(&mut self, dir: &Path) -> Result<()> {
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let dir = dir.display().to_string();
        self.update(|c| c.last_loaded_dir = dir)
    }

    /// Name of the document first loaded with this content hash.
    pub fn known_signature(&self, signature: &str) -> Option<&str> {
        self.config.doc_signature_map.get(signature).map(String::as_str)
    }

    /// Record `name` for `signature` unless the hash is already known.
    pub fn remember_signature(&mut self, signature: &str, name: &str) -> Result<()> {
        if self.config.doc_signature_map.contains_key(signature) {
            return Ok(());
        }
        let (signature, name) = (signature.to_string(), name.to_string());
        self.update(|c| {
            c.doc_signature_map.insert(signature, name);
        })
    }

    /// Remember split values picked while saving; a zero size is ignored.
    pub fn remember_split(&mut self, pages: Option<u32>, size_mb: Option<u64>) -> Result<()> {
        if pages.is_none() && size_mb.is_none_or(|mb| mb == 0) {
            return Ok(());
        }
        self.update(|c| {
            if let Some(pages) = pages {
                c.last_split_pages = pages;
            }
            if let Some(mb) = size_mb.filter(|&mb| mb > 0) {
                c.last_split_size_mb = mb;
            }
        })
    }
}

/// Overlay the stored keys on `defaults`.
///
/// Returns the merged config and whether defaults had to fill gaps. A file
/// that does not parse yields plain defaults.
fn merge_with_defaults(text: &str, defaults: &AppConfig) -> (AppConfig, bool) {
    let stored = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            log::warn!("Configuration file is not valid JSON; using defaults");
            return (defaults.clone(), false);
        }
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(defaults) else {
        return (defaults.clone(), false);
    };
    let completed = merged.keys().any(|key| !stored.contains_key(key));
    for (key, value) in stored {
        merged.insert(key, value);
    }

    match serde_json::from_value::<AppConfig>(Value::Object(merged)) {
        Ok(config) => (config, completed),
        Err(err) => {
            log::warn!("Configuration file has invalid values ({err}); using defaults");
            (defaults.clone(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_defaults() {
        let home = TempDir::new().unwrap();
        let manager = ConfigManager::load_from_home(home.path()).unwrap();
        assert!(manager.path().exists());
        assert_eq!(manager.config(), &AppConfig::defaults_for(home.path()));
        assert_eq!(manager.config().section_names.len(), 4);
        assert_eq!(manager.config().numbering.font_size, 11.0);
    }

    #[test]
    fn legacy_config_is_migrated() {
        let home = TempDir::new().unwrap();
        let legacy = home.path().join(".podofilo");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join(CONFIG_FILE), r#"{"default_base_name": "viejo"}"#).unwrap();

        let manager = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(manager.config().default_base_name, "viejo");
        assert_eq!(manager.config().last_split_pages, 6);

        // Missing keys were filled in and written back.
        let written = fs::read_to_string(manager.path()).unwrap();
        assert!(written.contains("watch_patterns"));
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), "{ not json").unwrap();
        let manager = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(manager.config().default_base_name, "resultado");

        fs::write(dir.join(CONFIG_FILE), r#"{"appearance_mode": "purple"}"#).unwrap();
        let manager = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(manager.config().appearance_mode, AppearanceMode::Dark);
    }

    #[test]
    fn setters_persist_immediately() {
        let home = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from_home(home.path()).unwrap();
        manager.update(|c| c.thumbnail_size = 225).unwrap();
        assert!(manager.set_appearance_mode("LIGHT").unwrap());
        assert!(!manager.set_appearance_mode("neon").unwrap());

        let reloaded = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(reloaded.config().thumbnail_size, 225);
        assert_eq!(reloaded.config().appearance_mode, AppearanceMode::Light);
    }

    #[test]
    fn watched_folders_are_cleaned() {
        let home = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from_home(home.path()).unwrap();
        manager.set_watched_folders(&[" /b ", "/a", "", "/b", "   "]).unwrap();
        assert_eq!(manager.config().watched_folders, ["/a", "/b"]);

        manager.add_watched_folder("/a").unwrap();
        manager.add_watched_folder("/c").unwrap();
        manager.remove_watched_folder("/b").unwrap();
        assert_eq!(manager.config().watched_folders, ["/a", "/c"]);
    }

    #[test]
    fn last_loaded_dir_requires_existing_path() {
        let home = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from_home(home.path()).unwrap();
        manager.set_last_loaded_dir(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(manager.last_loaded_dir(), home.path().join("Documents"));

        manager.set_last_loaded_dir(home.path()).unwrap();
        assert_eq!(manager.last_loaded_dir(), home.path());
    }

    #[test]
    fn signatures_survive_a_reload() {
        let home = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from_home(home.path()).unwrap();
        manager.remember_signature("abc123", "a.pdf").unwrap();
        manager.remember_signature("abc123", "copia.pdf").unwrap();

        let reloaded = ConfigManager::load_from_home(home.path()).unwrap();
        assert_eq!(reloaded.known_signature("abc123"), Some("a.pdf"));
        assert_eq!(reloaded.known_signature("other"), None);
        assert_eq!(reloaded.config().doc_signature_map.len(), 1);
    }

    #[test]
    fn retired_keys_are_ignored() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), r#"{"ove_auto_connect": true, "continuous_mode": true}"#).unwrap();
        let manager = ConfigManager::load_from_home(home.path()).unwrap();
        assert!(manager.config().continuous_mode);
    }

    #[test]
    fn remember_split_ignores_zero_sizes() {
        let home = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from_home(home.path()).unwrap();
        manager.remember_split(Some(10), Some(0)).unwrap();
        assert_eq!(manager.config().last_split_pages, 10);
        assert_eq!(manager.config().last_split_size_mb, 5);
        manager.remember_split(None, Some(8)).unwrap();
        assert_eq!(manager.config().last_split_size_mb, 8);
    }
}
