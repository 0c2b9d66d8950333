// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod logging;
mod logic;
mod models;
mod mvu;
mod services;
mod ui;
mod utils;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crate::services::single_instance::send_to_instance;

/// Organize, split and number the pages of PDF documents.
#[derive(Debug, Parser)]
#[command(name = "podofilo", version, about)]
struct Args {
    /// PDF files to open.
    files: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Directory for log files.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = args.log_level.unwrap_or_else(logging::default_log_level);
    let log_dir = args
        .log_dir
        .map(absolute)
        .or_else(logging::default_log_dir)
        .unwrap_or_else(|| std::env::temp_dir().join("podofilo").join("logs"));
    if let Err(err) = logging::init_logging(&level, &log_dir) {
        eprintln!("Logging disabled: {err}");
    }
    log::info!("Podofilo {} starting", env!("CARGO_PKG_VERSION"));

    let files: Vec<PathBuf> = args.files.into_iter().map(absolute).collect();
    if send_to_instance(&files) {
        log::info!("Handed {} files to the running instance", files.len());
        return ExitCode::SUCCESS;
    }

    match app::run(files) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
