// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Staging area: whole documents waiting to be expanded into pages.

use std::path::PathBuf;

use anyhow::{Result, bail};
use uuid::Uuid;

use crate::models::page::PageRef;
use crate::models::section::{Section, SplitConfig};

/// Loading lifecycle of a document box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxState {
    Loading,
    Loaded,
    Failed,
    Queued,
    Cancelled,
    /// Ignored by the user; skipped on expand.
    Marked,
}

/// Where the box content comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoxSource {
    Local {
        path: PathBuf,
    },
    Remote {
        source: String,
        document_id: String,
        download_url: String,
        retries_left: u32,
    },
    /// Pages collapsed back from a workspace section.
    Section { section_id: String },
    /// Result of merging several boxes.
    Merged { from: Vec<String> },
}

impl BoxSource {
    pub fn remote(source: impl Into<String>, document_id: impl Into<String>, download_url: impl Into<String>) -> Self {
        BoxSource::Remote {
            source: source.into(),
            document_id: document_id.into(),
            download_url: download_url.into(),
            retries_left: 1,
        }
    }
}

/// A document in the staging area.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentBox {
    pub id: Uuid,
    pub name: String,
    pub state: BoxState,
    pub pages: Vec<PageRef>,
    pub progress: f32,
    pub error_message: String,
    pub source: BoxSource,
    pub split: Option<SplitConfig>,
}

impl DocumentBox {
    pub fn new(name: impl Into<String>, source: BoxSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: BoxState::Loading,
            pages: Vec::new(),
            progress: 0.0,
            error_message: String::new(),
            source,
            split: None,
        }
    }

    pub fn local(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, BoxSource::Local { path })
    }

    pub fn is_expanded(&self) -> bool {
        !self.pages.is_empty() && self.state == BoxState::Loaded
    }

    pub fn can_expand(&self) -> bool {
        self.state == BoxState::Loaded && !self.pages.is_empty()
    }

    pub fn mark_ignored(&mut self) {
        self.state = BoxState::Marked;
    }

    pub fn unmark(&mut self) {
        if self.state == BoxState::Marked {
            self.state = if self.pages.is_empty() {
                BoxState::Loading
            } else {
                BoxState::Loaded
            };
        }
    }

    pub fn cancel(&mut self) {
        self.state = BoxState::Cancelled;
    }

    pub fn set_failed(&mut self, message: impl Into<String>) {
        self.state = BoxState::Failed;
        self.error_message = message.into();
    }

    pub fn set_loaded(&mut self, pages: Vec<PageRef>) {
        self.pages = pages;
        self.state = BoxState::Loaded;
        self.progress = 1.0;
        self.error_message.clear();
    }

    /// Queue a failed remote download again, consuming one retry.
    pub fn retry(&mut self) -> bool {
        match &mut self.source {
            BoxSource::Remote { retries_left, .. } if *retries_left > 0 => {
                *retries_left -= 1;
                self.state = BoxState::Queued;
                self.progress = 0.0;
                self.error_message.clear();
                true
            }
            _ => false,
        }
    }
}

/// Ordered list of document boxes.
#[derive(Clone, Debug, Default)]
pub struct StagingArea {
    boxes: Vec<DocumentBox>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxes(&self) -> &[DocumentBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn add(&mut self, document: DocumentBox) -> Uuid {
        let id = document.id;
        self.boxes.push(document);
        id
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut DocumentBox> {
        self.boxes.iter_mut().find(|b| b.id == id)
    }

    pub fn get_mut_at(&mut self, index: usize) -> Option<&mut DocumentBox> {
        self.boxes.get_mut(index)
    }

    /// Remove boxes by index; out-of-range indices are ignored.
    pub fn remove(&mut self, indices: &[usize]) -> Vec<DocumentBox> {
        let mut sorted: Vec<usize> = indices.iter().copied().filter(|&i| i < self.boxes.len()).collect();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .rev()
            .map(|i| self.boxes.remove(i))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Move one box so that it ends up at `to`.
    pub fn move_box(&mut self, from: usize, to: usize) -> bool {
        if from >= self.boxes.len() || to >= self.boxes.len() || from == to {
            return false;
        }
        let item = self.boxes.remove(from);
        self.boxes.insert(to, item);
        true
    }

    /// Merge the given boxes into one, placed where the first one was.
    ///
    /// Every merged box must be loaded. Returns the position of the new box.
    pub fn merge(&mut self, indices: &[usize]) -> Result<usize> {
        let mut selected: Vec<usize> = indices.to_vec();
        selected.sort_unstable();
        selected.dedup();

        if selected.len() < 2 {
            bail!("Selecciona al menos 2 cajas para fusionar");
        }
        if let Some(&bad) = selected.iter().find(|&&i| i >= self.boxes.len()) {
            bail!("box index {bad} out of range");
        }
        if let Some(not_ready) = selected
            .iter()
            .map(|&i| &self.boxes[i])
            .find(|b| b.state != BoxState::Loaded)
        {
            bail!("La caja '{}' no está lista para fusionar", not_ready.name);
        }

        let parts: Vec<&DocumentBox> = selected.iter().map(|&i| &self.boxes[i]).collect();
        let name = match parts.as_slice() {
            [a, b] => format!("{} + {}", a.name, b.name),
            [first, rest @ ..] => format!("{} (+{})", first.name, rest.len()),
            [] => unreachable!("at least two boxes selected"),
        };
        let pages: Vec<PageRef> = parts.iter().flat_map(|b| b.pages.iter().copied()).collect();
        let from = parts.iter().map(|b| b.name.clone()).collect();

        let mut merged = DocumentBox::new(name, BoxSource::Merged { from });
        merged.set_loaded(pages);

        let insert_at = selected[0];
        self.remove(&selected);
        self.boxes.insert(insert_at, merged);
        Ok(insert_at)
    }

    /// Boxes that will turn into pages on expand.
    pub fn expandable(&self) -> impl Iterator<Item = &DocumentBox> {
        self.boxes.iter().filter(|b| b.can_expand())
    }

    /// Drop every box that has been expanded, keeping pending ones.
    pub fn take_expandable(&mut self) -> Vec<DocumentBox> {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.boxes)
            .into_iter()
            .partition(DocumentBox::can_expand);
        self.boxes = pending;
        ready
    }

    /// Rebuild one loaded box per saveable section.
    pub fn from_sections<'a>(sections: impl IntoIterator<Item = &'a Section>, pages: &[PageRef]) -> Self {
        let boxes = sections
            .into_iter()
            .filter(|s| !s.is_special && s.page_count > 0)
            .map(|s| {
                let end = s.end_page().min(pages.len());
                let start = s.start_page.min(end);
                let mut document = DocumentBox::new(
                    crate::models::section::strip_split_suffix(&s.title).to_string(),
                    BoxSource::Section {
                        section_id: s.id.clone(),
                    },
                );
                document.split = s.split;
                document.set_loaded(pages[start..end].to_vec());
                document
            })
            .collect();
        Self { boxes }
    }

    /// Append boxes from another staging area.
    pub fn extend(&mut self, other: StagingArea) {
        self.boxes.extend(other.boxes);
    }
}
