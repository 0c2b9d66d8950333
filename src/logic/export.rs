// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Turn sections into output files: naming, page/byte splitting, collision
//! checks and the final write.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::Document;

use crate::logic::compose::compose;
use crate::logic::document::{PdfError, to_bytes, write_document};
use crate::logic::workspace::DocumentSet;
use crate::models::page::{DocId, PageRef};
use crate::models::section::{Section, SplitConfig};
use crate::utils::sanitize_component;

const MIB: u64 = 1024 * 1024;

/// One section the user asked to save.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionRequest {
    /// File name as typed; a trailing split suffix overrides `split`.
    pub filename: String,
    pub pages: Vec<PageRef>,
    pub split: Option<SplitConfig>,
}

impl SectionRequest {
    /// Request for `section` named after its title.
    pub fn from_section(section: &Section, pages: &[PageRef]) -> Self {
        let end = section.end_page().min(pages.len());
        let start = section.start_page.min(end);
        Self {
            filename: section.title.clone(),
            pages: pages[start..end].to_vec(),
            split: section.split,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub pages: Vec<PageRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportPlan {
    pub files: Vec<PlannedFile>,
    pub combined: Option<PlannedFile>,
    /// Split values found in file names, for the settings to remember.
    pub last_split_pages: Option<u32>,
    pub last_split_size_mb: Option<u64>,
}

impl ExportPlan {
    pub fn total_files(&self) -> usize {
        self.files.len() + usize::from(self.combined.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.total_files() == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportReport {
    pub saved: usize,
    pub errors: Vec<String>,
}

fn lookup<'a>(documents: &'a DocumentSet) -> impl Fn(DocId) -> Option<&'a Document> + 'a {
    |id| documents.get(&id).map(|d| d.inner())
}

fn with_pdf_extension(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

fn chunk_path(dir: &Path, stem: &str, start: usize, len: usize) -> PathBuf {
    dir.join(format!("{stem}_p{}-p{}.pdf", start + 1, start + len))
}

/// Composed size in bytes of `pages`.
fn composed_size(documents: &DocumentSet, pages: &[PageRef]) -> Result<u64, PdfError> {
    let mut doc = compose(lookup(documents), pages)?;
    Ok(to_bytes(&mut doc)?.len() as u64)
}

/// Cut `pages` into runs whose composed size stays under `limit` bytes.
///
/// A page that alone exceeds the limit forms its own run.
fn split_by_bytes(documents: &DocumentSet, pages: &[PageRef], limit: u64) -> Result<Vec<(usize, usize)>, PdfError> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut len = 0;
    while start + len < pages.len() {
        let candidate = &pages[start..start + len + 1];
        let size = composed_size(documents, candidate)?;
        if size > limit {
            if len == 0 {
                runs.push((start, 1));
                start += 1;
            } else {
                runs.push((start, len));
                start += len;
                len = 0;
            }
        } else {
            len += 1;
        }
    }
    if len > 0 {
        runs.push((start, len));
    }
    Ok(runs)
}

/// Work out every file to write into `dir`.
pub fn plan_outputs(
    documents: &DocumentSet,
    requests: &[SectionRequest],
    dir: &Path,
    combined_name: Option<&str>,
) -> Result<ExportPlan> {
    let mut plan = ExportPlan::default();

    for request in requests {
        if request.pages.is_empty() {
            continue;
        }
        let filename = with_pdf_extension(request.filename.trim());
        let raw_stem = &filename[..filename.len() - 4];
        let (stem, from_name) = SplitConfig::parse_suffix(raw_stem);
        match from_name {
            Some(SplitConfig::Pages(n)) => plan.last_split_pages = Some(n),
            Some(SplitConfig::Bytes(b)) if b >= MIB => plan.last_split_size_mb = Some(b / MIB),
            _ => {}
        }
        let split = from_name.or(request.split);
        let stem = sanitize_component(stem);

        match split {
            Some(SplitConfig::Pages(n)) if n > 0 => {
                for (i, chunk) in request.pages.chunks(n as usize).enumerate() {
                    plan.files.push(PlannedFile {
                        path: chunk_path(dir, &stem, i * n as usize, chunk.len()),
                        pages: chunk.to_vec(),
                    });
                }
            }
            Some(SplitConfig::Bytes(limit)) if limit > 0 => {
                let runs = split_by_bytes(documents, &request.pages, limit)
                    .with_context(|| format!("Error al medir el tamaño de '{stem}'"))?;
                log::debug!("Byte split of '{stem}' at {limit} bytes gave {} parts", runs.len());
                for (start, len) in runs {
                    plan.files.push(PlannedFile {
                        path: chunk_path(dir, &stem, start, len),
                        pages: request.pages[start..start + len].to_vec(),
                    });
                }
            }
            _ => plan.files.push(PlannedFile {
                path: dir.join(format!("{stem}.pdf")),
                pages: request.pages.clone(),
            }),
        }
    }

    if let Some(name) = combined_name.map(str::trim).filter(|n| !n.is_empty()) {
        let pages: Vec<PageRef> = requests.iter().flat_map(|r| r.pages.iter().copied()).collect();
        if !pages.is_empty() {
            let filename = with_pdf_extension(name);
            let stem = sanitize_component(&filename[..filename.len() - 4]);
            plan.combined = Some(PlannedFile {
                path: dir.join(format!("{stem}.pdf")),
                pages,
            });
        }
    }

    log::info!("Planned {} output files in {}", plan.total_files(), dir.display());
    Ok(plan)
}

/// Planned paths that already exist on disk.
pub fn collisions(plan: &ExportPlan) -> Vec<PathBuf> {
    plan.files
        .iter()
        .chain(plan.combined.iter())
        .map(|f| f.path.clone())
        .filter(|p| p.exists())
        .collect()
}

/// Write through a `.tmp` sibling and move it into place.
fn write_file(documents: &DocumentSet, file: &PlannedFile) -> Result<(), PdfError> {
    if let Some(parent) = file.path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = file.path.clone().into_os_string();
    temp_name.push(".tmp");
    let temp = PathBuf::from(temp_name);

    let mut doc = compose(lookup(documents), &file.pages)?;
    let result = write_document(&mut doc, &temp).and_then(|()| {
        if file.path.exists() {
            fs::remove_file(&file.path)?;
        }
        fs::rename(&temp, &file.path)?;
        Ok(())
    });
    if result.is_err() && temp.exists() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Write every planned file; failures are collected rather than aborting.
pub fn write_plan(documents: &DocumentSet, plan: &ExportPlan) -> ExportReport {
    let mut report = ExportReport::default();
    for file in plan.files.iter().chain(plan.combined.iter()) {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match write_file(documents, file) {
            Ok(()) => {
                report.saved += 1;
                log::info!("Saved {name} ({} pages)", file.pages.len());
            }
            Err(err) => {
                log::error!("Error saving {name}: {err}");
                report.errors.push(format!("{name}: {err}"));
            }
        }
    }
    report
}
