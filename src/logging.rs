// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Logging bootstrap: rotating log files, stderr for warnings, a panic hook
//! and an in-memory tail of recent lines for the log viewer.
//!
//! Initialisation is idempotent for the same directory and level and never
//! panics; switching either afterwards is rejected.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use flexi_logger::writers::LogWriter;
use flexi_logger::{
    Cleanup, Criterion, DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::Record;
use once_cell::sync::OnceCell;

/// Environment variable overriding the default level.
pub const LOG_ENV_VAR: &str = "PODOFILO_LOG";
const LOG_FILE_BASENAME: &str = "podofilo";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;
/// Lines kept for the in-app log viewer.
pub const RECENT_CAPACITY: usize = 500;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();
static RECENT: LazyLock<Mutex<VecDeque<String>>> =
    LazyLock::new(|| Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)));

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

/// Writer feeding the recent-lines ring.
struct RecentLines;

impl LogWriter for RecentLines {
    fn write(&self, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
        push_line(format!(
            "{} {:<5} [{}] {}",
            now.format("%H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        ));
        Ok(())
    }

    fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

fn push_line(line: String) {
    let mut recent = RECENT.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if recent.len() == RECENT_CAPACITY {
        recent.pop_front();
    }
    recent.push_back(line);
}

/// Most recent log lines, oldest first.
pub fn recent_lines() -> Vec<String> {
    RECENT
        .lock()
        .map(|recent| recent.iter().cloned().collect())
        .unwrap_or_default()
}

pub fn clear_recent() {
    if let Ok(mut recent) = RECENT.lock() {
        recent.clear();
    }
}

/// Default directory for log files: `<home>/podofilo/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("podofilo").join("logs"))
}

/// Level from `PODOFILO_LOG`, else by build mode.
pub fn default_log_level() -> String {
    std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| {
        if cfg!(debug_assertions) { "debug" } else { "info" }.to_string()
    })
}

/// Start file logging in `log_dir` at `level`.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), String> {
    let level = normalize_level(level)?;
    if !log_dir.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{}`", log_dir.display()));
    }

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|err| format!("failed to create log directory `{}`: {err}", log_dir.display()))?;

        let logger = Logger::try_with_str(level)
            .map_err(|err| format!("invalid log level `{level}`: {err}"))?
            .log_to_file_and_writer(
                FileSpec::default().directory(log_dir).basename(LOG_FILE_BASENAME),
                Box::new(RecentLines),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(MAX_LOG_FILES),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|err| format!("failed to start logger: {err}"))?;

        install_panic_hook_once();
        log::info!(
            "Podofilo {} starting on {} ({} build), level {level}, logs in {}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            if cfg!(debug_assertions) { "debug" } else { "release" },
            log_dir.display()
        );

        Ok(LoggingState {
            level,
            log_dir: log_dir.to_path_buf(),
            _logger: logger,
        })
    })?;

    if state.log_dir != log_dir {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.log_dir.display(),
            log_dir.display()
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{level}`",
            state.level
        ));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.get().is_some() {
        return;
    }
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        log::error!(
            "Panic at {location}: {}",
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(info);
    }));
    let _ = PANIC_HOOK_INSTALLED.set(());
}

/// Single-line, length-capped version of `value`.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated: String = normalized.chars().take(max_chars).collect();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level(" INFO "), Ok("info"));
        assert_eq!(normalize_level("warning"), Ok("warn"));
        assert!(normalize_level("loud").is_err());
    }

    #[test]
    fn panic_payloads_are_flattened_and_capped() {
        assert_eq!(sanitize_message("a\nb\rc", 10), "a b c");
        assert_eq!(sanitize_message("abcdef", 3), "abc...");
    }

    #[test]
    fn recent_ring_keeps_the_tail() {
        clear_recent();
        for i in 0..(RECENT_CAPACITY + 5) {
            push_line(format!("line {i}"));
        }
        let lines = recent_lines();
        assert!(lines.len() <= RECENT_CAPACITY);
        assert!(lines.contains(&format!("line {}", RECENT_CAPACITY + 4)));
        assert!(!lines.contains(&"line 0".to_string()));
    }

    #[test]
    fn init_is_idempotent_and_rejects_switching() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        assert!(init_logging("info", Path::new("relative/logs")).is_err());
        init_logging("info", dir.path()).unwrap();
        init_logging("INFO", dir.path()).unwrap();
        assert!(init_logging("debug", dir.path()).is_err());
        assert!(init_logging("info", other.path()).is_err());
    }
}
