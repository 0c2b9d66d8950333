// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! The editable page workspace: page references grouped into sections,
//! selection, blank marks and undo/redo.
//!
//! Every structural edit goes through [`Workspace::rebuild`], which keeps
//! blank marks attached to the pages they were set on.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use lopdf::Document;
use uuid::Uuid;

use crate::logic::analysis::{PageAnalysis, analyze_page};
use crate::logic::document::PdfDocument;
use crate::logic::numbering::{NumberingOptions, number_pages};
use crate::models::page::{A4_SIZE, DocId, PageRef, displayed_size, normalize_rotation};
use crate::models::section::{DEFAULT_BASE_NAME, SectionManager, SplitConfig};
use crate::models::staging::StagingArea;

/// Maximum number of undo snapshots kept.
pub const MAX_UNDO: usize = 50;

/// Loaded source documents shared with background workers.
pub type DocumentSet = BTreeMap<DocId, Arc<PdfDocument>>;

#[derive(Clone, Debug)]
struct Snapshot {
    pages: Vec<PageRef>,
    sections: SectionManager,
    marked: BTreeSet<usize>,
}

/// One position of a rebuilt page list.
enum Slot {
    Keep(usize),
    New(PageRef),
}

/// Pages picked for numbering, with their current positions.
#[derive(Clone, Debug)]
pub struct NumberingJob {
    pub indices: Vec<usize>,
    pub refs: Vec<PageRef>,
}

#[derive(Debug)]
pub struct Workspace {
    documents: DocumentSet,
    next_doc: u32,
    pages: Vec<PageRef>,
    sections: SectionManager,
    selected: BTreeSet<usize>,
    marked: BTreeSet<usize>,
    /// Stamped page (document, page number) -> page it was stamped from.
    numbered: HashMap<(DocId, u32), PageRef>,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    base_name: String,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_NAME)
    }
}

impl Workspace {
    pub fn new(base_name: &str) -> Self {
        Self {
            documents: DocumentSet::new(),
            next_doc: 1,
            pages: Vec::new(),
            sections: SectionManager::new(),
            selected: BTreeSet::new(),
            marked: BTreeSet::new(),
            numbered: HashMap::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            base_name: base_name.to_string(),
        }
    }

    pub fn set_base_name(&mut self, base_name: &str) {
        self.base_name = base_name.to_string();
    }

    // Documents

    /// Register a loaded document and return its handle.
    pub fn add_document(&mut self, document: PdfDocument) -> DocId {
        let id = DocId(self.next_doc);
        self.next_doc += 1;
        log::info!("Registered {} ({} pages) as {id}", document.name(), document.page_count());
        self.documents.insert(id, Arc::new(document));
        id
    }

    pub fn document(&self, id: DocId) -> Option<&Arc<PdfDocument>> {
        self.documents.get(&id)
    }

    /// Cheap clone of every loaded document, for use off the UI thread.
    pub fn documents(&self) -> DocumentSet {
        self.documents.clone()
    }

    fn lookup<'a>(&'a self) -> impl Fn(DocId) -> Option<&'a Document> + 'a {
        |id| self.documents.get(&id).map(|d| d.inner())
    }

    // Read access

    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn sections(&self) -> &SectionManager {
        &self.sections
    }

    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn is_marked(&self, index: usize) -> bool {
        self.marked.contains(&index)
    }

    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    pub fn is_numbered(&self, index: usize) -> bool {
        match self.pages.get(index) {
            Some(PageRef::Source { doc, page, .. }) => self.numbered.contains_key(&(*doc, *page)),
            _ => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn in_trash(&self, index: usize) -> bool {
        self.sections.section_at(index).is_some_and(|s| s.is_deleted())
    }

    /// Page size in points as displayed, extra rotation included.
    pub fn page_size(&self, index: usize) -> Option<(f32, f32)> {
        match *self.pages.get(index)? {
            PageRef::Source { doc, page, rotation } => {
                let document = self.documents.get(&doc)?;
                let (w, h) = document.page_size(page as usize - 1).ok()?;
                let base = document.rotation(page as usize - 1).ok()?;
                Some(displayed_size(w, h, normalize_rotation(base as i32 + rotation as i32)))
            }
            PageRef::Blank {
                width,
                height,
                rotation,
            } => Some(displayed_size(width, height, rotation)),
        }
    }

    /// Whether the page paints nothing. Blank refs are always blank.
    pub fn is_page_blank(&self, index: usize) -> Result<bool> {
        match self.pages.get(index) {
            Some(PageRef::Source { doc, page, .. }) => {
                let document = self
                    .documents
                    .get(doc)
                    .with_context(|| format!("{doc} is not loaded"))?;
                Ok(document.is_page_blank(*page as usize - 1)?)
            }
            Some(PageRef::Blank { .. }) => Ok(true),
            None => bail!("page {index} out of range"),
        }
    }

    /// Recognise codes on a page from its text and size.
    pub fn analyze(&self, index: usize) -> Result<PageAnalysis> {
        let (width, height) = self.page_size(index).context("page not available")?;
        let text = match self.pages[index] {
            PageRef::Source { doc, page, .. } => self
                .documents
                .get(&doc)
                .with_context(|| format!("{doc} is not loaded"))?
                .extract_text(page as usize - 1)?,
            PageRef::Blank { .. } => String::new(),
        };
        Ok(analyze_page(&text, width as f64, height as f64))
    }

    // Undo / redo

    fn capture(&self) -> Snapshot {
        Snapshot {
            pages: self.pages.clone(),
            sections: self.sections.clone(),
            marked: self.marked.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.pages = snapshot.pages;
        self.sections = snapshot.sections;
        self.marked = snapshot.marked;
        self.selected.clear();
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        self.undo.push(snapshot);
        if self.undo.len() > MAX_UNDO {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    fn checkpoint(&mut self) {
        let snapshot = self.capture();
        self.push_undo(snapshot);
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.undo.pop() else {
            return false;
        };
        let current = self.capture();
        self.redo.push(current);
        self.restore(snapshot);
        log::debug!("Undo ({} left)", self.undo.len());
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.redo.pop() else {
            return false;
        };
        let current = self.capture();
        self.undo.push(current);
        self.restore(snapshot);
        log::debug!("Redo ({} left)", self.redo.len());
        true
    }

    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    // Selection

    pub fn select(&mut self, index: usize) {
        self.selected.clear();
        if index < self.pages.len() {
            self.selected.insert(index);
        }
    }

    /// Select every page between `from` and `to`, both included.
    pub fn select_range(&mut self, from: usize, to: usize) {
        let (a, b) = (from.min(to), from.max(to));
        self.selected = (a..=b).filter(|&i| i < self.pages.len()).collect();
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.selected.remove(&index) && index < self.pages.len() {
            self.selected.insert(index);
        }
    }

    pub fn select_all(&mut self) {
        self.selected = (0..self.pages.len()).collect();
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    // Page edits

    fn rebuild(&mut self, order: Vec<Slot>) {
        let mut pages = Vec::with_capacity(order.len());
        let mut marked = BTreeSet::new();
        for (position, slot) in order.into_iter().enumerate() {
            match slot {
                Slot::Keep(old) => {
                    if self.marked.contains(&old) {
                        marked.insert(position);
                    }
                    pages.push(self.pages[old]);
                }
                Slot::New(page) => pages.push(page),
            }
        }
        self.pages = pages;
        self.marked = marked;
    }

    /// Insert `new_pages` at `at` (clamped before the trash) and select them.
    fn insert_at(&mut self, at: usize, new_pages: Vec<PageRef>) -> usize {
        let at = at.min(self.sections.regular_page_count()).min(self.pages.len());
        let count = new_pages.len();
        let order = (0..at)
            .map(Slot::Keep)
            .chain(new_pages.into_iter().map(Slot::New))
            .chain((at..self.pages.len()).map(Slot::Keep))
            .collect();
        self.rebuild(order);
        self.sections.grow_at(at, count, &self.base_name);
        self.selected = (at..at + count).collect();
        count
    }

    pub fn rotate_selected(&mut self, degrees: i32) -> usize {
        if self.selected.is_empty() {
            return 0;
        }
        self.checkpoint();
        for &i in &self.selected {
            if let Some(page) = self.pages.get_mut(i) {
                *page = page.rotated(degrees);
            }
        }
        log::info!("Rotated {} pages by {degrees}°", self.selected.len());
        self.selected.len()
    }

    /// Insert blank pages after the selection (one per selected page), or one at the end.
    pub fn insert_blank_pages(&mut self) -> usize {
        let (at, count) = match self.selected.last() {
            Some(&last) => (last + 1, self.selected.len()),
            None => (self.sections.regular_page_count(), 1),
        };
        let at = at.min(self.sections.regular_page_count()).min(self.pages.len());
        let (width, height) = at
            .checked_sub(1)
            .and_then(|prev| self.page_size(prev))
            .unwrap_or(A4_SIZE);

        self.checkpoint();
        let inserted = self.insert_at(at, vec![PageRef::blank(width, height); count]);
        log::info!("Inserted {inserted} blank pages at {at}");
        inserted
    }

    /// Copy the selected pages right after the last selected one.
    pub fn duplicate_selected(&mut self) -> usize {
        let Some(&last) = self.selected.last() else {
            return 0;
        };
        let copies: Vec<PageRef> = self.selected.iter().map(|&i| self.pages[i]).collect();
        self.checkpoint();
        let inserted = self.insert_at(last + 1, copies);
        log::info!("Duplicated {inserted} pages");
        inserted
    }

    /// Move `indices` to the trash, or drop them for good when they already are there.
    pub fn delete_selected(&mut self) -> usize {
        let indices: Vec<usize> = self.selected.iter().copied().collect();
        let Some(&first) = indices.first() else {
            return 0;
        };
        self.checkpoint();
        let deleted = if self.in_trash(first) {
            self.remove_permanently(&indices)
        } else {
            self.soft_delete(&indices)
        };
        self.selected.clear();
        deleted
    }

    fn soft_delete(&mut self, indices: &[usize]) -> usize {
        let chosen: BTreeSet<usize> = indices.iter().copied().filter(|&i| i < self.pages.len()).collect();
        let sorted: Vec<usize> = chosen.iter().copied().collect();
        self.sections.record_soft_delete(&sorted);
        let order = (0..self.pages.len())
            .filter(|i| !chosen.contains(i))
            .chain(sorted.iter().copied())
            .map(Slot::Keep)
            .collect();
        self.rebuild(order);
        log::info!("Moved {} pages to the trash", sorted.len());
        sorted.len()
    }

    fn remove_permanently(&mut self, indices: &[usize]) -> usize {
        let chosen: BTreeSet<usize> = indices.iter().copied().filter(|&i| i < self.pages.len()).collect();
        let sorted: Vec<usize> = chosen.iter().copied().collect();
        self.sections.record_removal(&sorted);
        let order = (0..self.pages.len())
            .filter(|i| !chosen.contains(i))
            .map(Slot::Keep)
            .collect();
        self.rebuild(order);
        log::info!("Permanently removed {} pages", sorted.len());
        sorted.len()
    }

    /// Mark the selected pages that turn out to be blank.
    pub fn mark_selected_blank(&mut self) -> Result<usize> {
        let mut blank = Vec::new();
        for &i in &self.selected {
            if !self.marked.contains(&i) && self.is_page_blank(i)? {
                blank.push(i);
            }
        }
        if !blank.is_empty() {
            self.checkpoint();
            self.marked.extend(blank.iter().copied());
        }
        log::info!("Marked {} of {} selected pages as blank", blank.len(), self.selected.len());
        Ok(blank.len())
    }

    pub fn unmark_selected(&mut self) -> usize {
        let hits: Vec<usize> = self.selected.intersection(&self.marked).copied().collect();
        if hits.is_empty() {
            return 0;
        }
        self.checkpoint();
        for i in &hits {
            self.marked.remove(i);
        }
        hits.len()
    }

    /// Soft-delete every marked page.
    pub fn delete_marked(&mut self) -> usize {
        if self.marked.is_empty() {
            return 0;
        }
        let marked: Vec<usize> = self.marked.iter().copied().collect();
        self.checkpoint();
        let deleted = self.soft_delete(&marked);
        self.marked.clear();
        self.selected.clear();
        deleted
    }

    /// Move `indices` so they land in front of the page currently at `target`.
    ///
    /// Sections keep their sizes, so pages dropped across a boundary change section.
    pub fn move_pages(&mut self, indices: &[usize], target: usize) -> bool {
        let moving: BTreeSet<usize> = indices.iter().copied().filter(|&i| i < self.pages.len()).collect();
        if moving.is_empty() {
            return false;
        }
        let target = target.min(self.pages.len());
        let rest: Vec<usize> = (0..self.pages.len()).filter(|i| !moving.contains(i)).collect();
        let insert_at = target - moving.iter().filter(|&&i| i < target).count();

        let mut order: Vec<usize> = rest[..insert_at].to_vec();
        order.extend(moving.iter().copied());
        order.extend_from_slice(&rest[insert_at..]);
        if order.iter().copied().eq(0..self.pages.len()) {
            return false;
        }

        self.checkpoint();
        self.rebuild(order.into_iter().map(Slot::Keep).collect());
        self.selected = (insert_at..insert_at + moving.len()).collect();
        log::debug!("Moved {} pages to {insert_at}", moving.len());
        true
    }

    // Sections

    pub fn split_section_at(&mut self, page: usize) -> bool {
        let before = self.capture();
        match self.sections.split_section(page, None, None) {
            Some(index) => {
                self.push_undo(before);
                log::info!("Split section at page {page} into section {index}");
                true
            }
            None => false,
        }
    }

    pub fn merge_section_up(&mut self, index: usize) -> bool {
        let before = self.capture();
        let merged = self.sections.merge_section_up(index);
        if merged {
            self.push_undo(before);
        }
        merged
    }

    pub fn rename_section(&mut self, index: usize, title: &str) {
        let before = self.capture();
        self.sections.rename_section(index, title);
        if self.sections != before.sections {
            self.push_undo(before);
        }
    }

    pub fn set_split_config(&mut self, index: usize, config: SplitConfig) {
        let before = self.capture();
        self.sections.set_split_config(index, config);
        if self.sections != before.sections {
            self.push_undo(before);
        }
    }

    /// Drop every page in the trash for good.
    pub fn empty_trash(&mut self) -> usize {
        let Some(trash) = self.sections.deleted() else {
            return 0;
        };
        let indices: Vec<usize> = (trash.start_page..trash.end_page()).collect();
        if indices.is_empty() {
            return 0;
        }
        self.checkpoint();
        self.selected.clear();
        self.remove_permanently(&indices)
    }

    // Staging round-trip

    /// Append the pages of every expandable box, one section per box.
    pub fn expand(&mut self, staging: &mut StagingArea) -> usize {
        let boxes = staging.take_expandable();
        let mut added = 0;
        for document in boxes {
            if document.pages.is_empty() {
                continue;
            }
            let count = document.pages.len();
            let at = self.sections.regular_page_count().min(self.pages.len());
            let order = (0..at)
                .map(Slot::Keep)
                .chain(document.pages.into_iter().map(Slot::New))
                .chain((at..self.pages.len()).map(Slot::Keep))
                .collect();
            self.rebuild(order);
            self.sections.push(Uuid::new_v4().to_string(), document.name.clone(), count);
            if let Some(split) = document.split
                && let Some(index) = self.sections.sections().iter().rposition(|s| !s.is_special)
            {
                self.sections.set_split_config(index, split);
            }
            added += count;
        }
        if added > 0 {
            self.selected.clear();
            self.clear_history();
            log::info!("Expanded {added} pages into the workspace");
        }
        added
    }

    /// Turn every saveable section back into a box and empty the workspace.
    pub fn collapse(&mut self) -> StagingArea {
        let staging = StagingArea::from_sections(self.sections.sections(), &self.pages);
        self.pages.clear();
        self.sections.clear();
        self.selected.clear();
        self.marked.clear();
        self.clear_history();
        log::info!("Collapsed workspace into {} boxes", staging.len());
        staging
    }

    // Numbering

    /// Selected pages outside the trash, in page order.
    pub fn numbering_job(&self) -> Result<NumberingJob> {
        let indices: Vec<usize> = self.selected.iter().copied().filter(|&i| !self.in_trash(i)).collect();
        if indices.is_empty() {
            bail!("No hay páginas seleccionadas para numerar");
        }
        if indices.iter().any(|&i| self.is_numbered(i)) {
            bail!("Algunas páginas seleccionadas ya están numeradas; quita la numeración primero");
        }
        let refs = indices.iter().map(|&i| self.pages[i]).collect();
        Ok(NumberingJob { indices, refs })
    }

    /// Swap the job's pages for the stamped ones of `stamped`.
    pub fn apply_numbering(&mut self, job: &NumberingJob, stamped: PdfDocument) -> Result<usize> {
        if stamped.page_count() != job.refs.len() {
            bail!(
                "stamped document has {} pages, expected {}",
                stamped.page_count(),
                job.refs.len()
            );
        }
        if job.indices.iter().zip(&job.refs).any(|(&i, r)| self.pages.get(i) != Some(r)) {
            bail!("Las páginas cambiaron mientras se numeraban; vuelve a intentarlo");
        }
        let doc = self.add_document(stamped);
        self.checkpoint();
        for (k, (&i, original)) in job.indices.iter().zip(&job.refs).enumerate() {
            let page = k as u32 + 1;
            self.numbered.insert((doc, page), *original);
            self.pages[i] = PageRef::source(doc, page);
        }
        log::info!("Numbered {} pages", job.indices.len());
        Ok(job.indices.len())
    }

    /// Number the selected pages 1..N in place.
    pub fn number_selected(&mut self, options: &NumberingOptions) -> Result<usize> {
        let job = self.numbering_job()?;
        let stamped = number_pages(self.lookup(), &job.refs, options)?;
        self.apply_numbering(&job, PdfDocument::from_document("Numeración", stamped))
    }

    /// Put back the unnumbered pages in the selection, or everywhere when nothing is selected.
    ///
    /// Rotation applied after numbering carries over to the restored page.
    pub fn remove_numbering(&mut self) -> usize {
        let scope: Vec<usize> = if self.selected.is_empty() {
            (0..self.pages.len()).collect()
        } else {
            self.selected.iter().copied().collect()
        };
        let swaps: Vec<(usize, PageRef)> = scope
            .into_iter()
            .filter_map(|i| match self.pages.get(i)? {
                PageRef::Source { doc, page, rotation } => self
                    .numbered
                    .get(&(*doc, *page))
                    .map(|original| (i, original.rotated(*rotation as i32))),
                PageRef::Blank { .. } => None,
            })
            .collect();
        if swaps.is_empty() {
            return 0;
        }
        self.checkpoint();
        for &(i, original) in &swaps {
            self.pages[i] = original;
        }
        log::info!("Removed numbering from {} pages", swaps.len());
        swaps.len()
    }
}
