// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Logical sections: contiguous page ranges exported as separate files.
//!
//! Sections always tile the workspace in order. The special "Borrados"
//! section, when present, is the last one and collects soft-deleted pages.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Identifier of the special section that collects soft-deleted pages.
pub const DELETED_ID: &str = "deleted";
/// Title shown for the soft-deleted pages section.
pub const DELETED_TITLE: &str = "Borrados";
/// Base name used when nothing better is known.
pub const DEFAULT_BASE_NAME: &str = "resultado";

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

static SPLIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)([pPbBmMkK])$").expect("valid split suffix regex"));

/// How an exported section is cut into several files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitConfig {
    /// At most this many pages per file.
    Pages(u32),
    /// At most this many bytes per file (a single oversize page still gets its own file).
    Bytes(u64),
}

impl SplitConfig {
    /// Parse a trailing `/6p`, `/5M`, `/300k` or `/1000b` suffix.
    ///
    /// Returns the title without the suffix and the parsed config, or the
    /// untouched title and `None` when no suffix is present.
    pub fn parse_suffix(title: &str) -> (&str, Option<SplitConfig>) {
        let Some(caps) = SPLIT_SUFFIX.captures(title) else {
            return (title, None);
        };
        let Ok(value) = caps[1].parse::<u64>() else {
            return (title, None);
        };
        let config = match caps[2].to_ascii_lowercase().as_str() {
            "p" => SplitConfig::Pages(value.min(u32::MAX as u64) as u32),
            "m" => SplitConfig::Bytes(value.saturating_mul(MIB)),
            "k" => SplitConfig::Bytes(value.saturating_mul(KIB)),
            _ => SplitConfig::Bytes(value),
        };
        let start = caps.get(0).map(|m| m.start()).unwrap_or(title.len());
        (&title[..start], Some(config))
    }

    /// Render the config as the title suffix shown to the user.
    pub fn suffix(&self) -> String {
        match *self {
            SplitConfig::Pages(n) => format!("/{n}p"),
            SplitConfig::Bytes(n) if n >= MIB => format!("/{}M", n / MIB),
            SplitConfig::Bytes(n) if n >= KIB => format!("/{}k", n / KIB),
            SplitConfig::Bytes(n) => format!("/{n}b"),
        }
    }
}

/// Remove any split suffix from a title.
pub fn strip_split_suffix(title: &str) -> &str {
    SplitConfig::parse_suffix(title).0
}

/// Contiguous range of workspace pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub title: String,
    /// 0-based index of the first page in the workspace.
    pub start_page: usize,
    pub page_count: usize,
    pub split: Option<SplitConfig>,
    /// Special sections (the "Borrados" trash) are never exported.
    pub is_special: bool,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, start_page: usize, page_count: usize) -> Self {
        let title = title.into();
        let split = SplitConfig::parse_suffix(&title).1;
        Self {
            id: id.into(),
            title,
            start_page,
            page_count,
            split,
            is_special: false,
        }
    }

    pub fn end_page(&self) -> usize {
        self.start_page + self.page_count
    }

    pub fn contains(&self, page: usize) -> bool {
        self.start_page <= page && page < self.end_page()
    }

    pub fn is_deleted(&self) -> bool {
        self.is_special && self.id == DELETED_ID
    }
}

/// Ordered list of sections tiling the workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionManager {
    sections: Vec<Section>,
}

impl SectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }

    /// Replace all sections by a single one covering `total_pages`.
    pub fn initialize_default(&mut self, total_pages: usize, base_name: &str) {
        let base = if base_name.trim().is_empty() {
            DEFAULT_BASE_NAME
        } else {
            base_name.trim()
        };
        self.sections = vec![Section::new("default", base, 0, total_pages)];
    }

    /// Append a regular section right before the trash.
    pub fn push(&mut self, id: impl Into<String>, title: impl Into<String>, page_count: usize) {
        let insert_at = self.regular_len();
        let start = self.sections[..insert_at]
            .last()
            .map(Section::end_page)
            .unwrap_or(0);
        self.sections
            .insert(insert_at, Section::new(id, title, start, page_count));
        self.recompute_starts();
    }

    /// Sections that produce output files: non-special and non-empty.
    pub fn saveable_sections(&self) -> Vec<&Section> {
        self.sections
            .iter()
            .filter(|s| !s.is_special && s.page_count > 0)
            .collect()
    }

    pub fn section_index_at(&self, page: usize) -> Option<usize> {
        self.sections.iter().position(|s| s.contains(page))
    }

    pub fn section_at(&self, page: usize) -> Option<&Section> {
        self.section_index_at(page).map(|i| &self.sections[i])
    }

    pub fn deleted(&self) -> Option<&Section> {
        self.sections.last().filter(|s| s.is_deleted())
    }

    /// Page count of every section except the trash.
    pub fn regular_page_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| !s.is_special)
            .map(|s| s.page_count)
            .sum()
    }

    fn regular_len(&self) -> usize {
        match self.sections.last() {
            Some(s) if s.is_special => self.sections.len() - 1,
            _ => self.sections.len(),
        }
    }

    /// Ensure the trash section exists as the last section and return it.
    pub fn deleted_section(&mut self) -> &mut Section {
        if !self.sections.last().is_some_and(Section::is_deleted) {
            let start = self.sections.last().map(Section::end_page).unwrap_or(0);
            let mut deleted = Section::new(DELETED_ID, DELETED_TITLE, start, 0);
            deleted.is_special = true;
            self.sections.push(deleted);
        }
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    /// Lay sections back to back starting from page 0.
    pub fn recompute_starts(&mut self) {
        let mut start = 0;
        for section in &mut self.sections {
            section.start_page = start;
            start += section.page_count;
        }
    }

    /// Grow the regular section that owns the page right before `at` by `count`.
    ///
    /// Falls back to the last regular section; creates a default section when
    /// there is none.
    pub fn grow_at(&mut self, at: usize, count: usize, base_name: &str) {
        if count == 0 {
            return;
        }
        let owner = at
            .checked_sub(1)
            .and_then(|prev| self.section_index_at(prev))
            .filter(|&i| !self.sections[i].is_special)
            .or_else(|| self.regular_len().checked_sub(1));

        match owner {
            Some(i) => self.sections[i].page_count += count,
            None => {
                let title = self.next_title(base_name);
                self.sections.insert(0, Section::new("default", title, 0, count));
            }
        }
        self.recompute_starts();
    }

    /// Grow the last regular section by `count` pages.
    pub fn add_to_last(&mut self, count: usize, base_name: &str) {
        let end = self.regular_page_count();
        self.grow_at(end, count, base_name);
    }

    /// Bookkeeping for a soft delete of `pages` (indices before the move).
    ///
    /// Pages taken from regular sections shrink those sections and grow the
    /// trash; pages that were already in the trash stay there.
    pub fn record_soft_delete(&mut self, pages: &[usize]) {
        let mut per_section: BTreeMap<usize, usize> = BTreeMap::new();
        for &page in pages {
            if let Some(i) = self.section_index_at(page)
                && !self.sections[i].is_special
            {
                *per_section.entry(i).or_default() += 1;
            }
        }
        let moved: usize = per_section.values().sum();
        for (i, n) in per_section {
            self.sections[i].page_count -= n;
        }
        self.deleted_section().page_count += moved;
        self.recompute_starts();
    }

    /// Bookkeeping for a permanent removal of `pages` (indices before removal).
    pub fn record_removal(&mut self, pages: &[usize]) {
        let mut per_section: BTreeMap<usize, usize> = BTreeMap::new();
        for &page in pages {
            if let Some(i) = self.section_index_at(page) {
                *per_section.entry(i).or_default() += 1;
            }
        }
        for (i, n) in per_section {
            self.sections[i].page_count -= n;
        }
        self.recompute_starts();
    }

    /// Split `(base, number)` out of a title like `resultado_3/6p`.
    pub fn split_base_number(title: &str) -> (String, Option<u32>) {
        let base = strip_split_suffix(title).trim();
        if let Some((prefix, suffix)) = base.rsplit_once('_')
            && !suffix.is_empty()
            && suffix.chars().all(|c| c.is_ascii_digit())
            && let Ok(number) = suffix.parse::<u32>()
        {
            let prefix = if prefix.is_empty() { DEFAULT_BASE_NAME } else { prefix };
            return (prefix.to_string(), Some(number));
        }
        let base = if base.is_empty() { DEFAULT_BASE_NAME } else { base };
        (base.to_string(), None)
    }

    /// Next free title in the `base`, `base_2`, `base_3` sequence.
    pub fn next_title(&self, base_name: &str) -> String {
        let normalized = match base_name.trim() {
            "" => DEFAULT_BASE_NAME,
            other => other,
        };
        let highest = self
            .sections
            .iter()
            .filter_map(|s| {
                let (base, number) = Self::split_base_number(&s.title);
                (base == normalized).then(|| number.unwrap_or(1))
            })
            .max();

        match highest {
            None => normalized.to_string(),
            Some(n) => format!("{normalized}_{}", n + 1),
        }
    }

    /// Start a new section at `page`.
    ///
    /// No-op when `page` is outside every regular section or already starts one.
    /// Returns the index of the new section.
    pub fn split_section(
        &mut self,
        page: usize,
        new_title: Option<&str>,
        base_name: Option<&str>,
    ) -> Option<usize> {
        let idx = self.section_index_at(page)?;
        let original = &self.sections[idx];
        if original.is_special || page == original.start_page {
            return None;
        }

        let offset = page - original.start_page;
        let remaining = original.page_count - offset;
        let base = match base_name {
            Some(base) => Self::split_base_number(base).0,
            None => Self::split_base_number(&original.title).0,
        };
        let title = match new_title {
            Some(title) => title.to_string(),
            None => self.next_title(&base),
        };

        self.sections[idx].page_count = offset;
        self.sections
            .insert(idx + 1, Section::new(format!("sec_{page}"), title, page, remaining));
        Some(idx + 1)
    }

    /// Fold section `index` into the one above it.
    pub fn merge_section_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.sections.len() {
            return false;
        }
        if self.sections[index].is_special || self.sections[index - 1].is_special {
            return false;
        }
        let current = self.sections.remove(index);
        self.sections[index - 1].page_count += current.page_count;
        true
    }

    /// Attach a split config and reflect it in the title suffix.
    pub fn set_split_config(&mut self, index: usize, config: SplitConfig) {
        if let Some(section) = self.sections.get_mut(index) {
            let base = strip_split_suffix(&section.title).to_string();
            section.title = format!("{base}{}", config.suffix());
            section.split = Some(config);
        }
    }

    /// Rename a section; a split suffix in the new title becomes its config.
    pub fn rename_section(&mut self, index: usize, new_title: &str) {
        if let Some(section) = self.sections.get_mut(index) {
            if section.is_special {
                return;
            }
            section.title = new_title.trim().to_string();
            section.split = SplitConfig::parse_suffix(&section.title).1;
        }
    }

    /// Direct access for collapse/expand round-trips.
    pub fn replace_all(&mut self, sections: Vec<Section>) {
        self.sections = sections;
        self.recompute_starts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(counts: &[usize]) -> SectionManager {
        let mut m = SectionManager::new();
        for (i, &count) in counts.iter().enumerate() {
            m.push(format!("s{i}"), format!("sec{i}"), count);
        }
        m
    }

    #[test]
    fn parse_suffix_understands_every_unit() {
        assert_eq!(
            SplitConfig::parse_suffix("doc/6p"),
            ("doc", Some(SplitConfig::Pages(6)))
        );
        assert_eq!(
            SplitConfig::parse_suffix("doc/5M"),
            ("doc", Some(SplitConfig::Bytes(5 * 1024 * 1024)))
        );
        assert_eq!(
            SplitConfig::parse_suffix("doc/300K"),
            ("doc", Some(SplitConfig::Bytes(300 * 1024)))
        );
        assert_eq!(
            SplitConfig::parse_suffix("doc/1000b"),
            ("doc", Some(SplitConfig::Bytes(1000)))
        );
        assert_eq!(SplitConfig::parse_suffix("doc/6x"), ("doc/6x", None));
        assert_eq!(SplitConfig::parse_suffix("a/6p b"), ("a/6p b", None));
    }

    #[test]
    fn suffix_picks_the_largest_whole_unit() {
        assert_eq!(SplitConfig::Pages(6).suffix(), "/6p");
        assert_eq!(SplitConfig::Bytes(5 * 1024 * 1024).suffix(), "/5M");
        assert_eq!(SplitConfig::Bytes(2048).suffix(), "/2k");
        assert_eq!(SplitConfig::Bytes(500).suffix(), "/500b");
    }

    #[test]
    fn initialize_default_covers_everything() {
        let mut m = SectionManager::new();
        m.initialize_default(12, "expediente");
        assert_eq!(m.len(), 1);
        assert_eq!(m.sections()[0].title, "expediente");
        assert_eq!(m.sections()[0].end_page(), 12);
        assert_eq!(m.section_at(11).map(|s| s.id.as_str()), Some("default"));
        assert!(m.section_at(12).is_none());
    }

    #[test]
    fn split_section_cuts_and_numbers_titles() {
        let mut m = SectionManager::new();
        m.initialize_default(10, "resultado");

        assert_eq!(m.split_section(4, None, None), Some(1));
        assert_eq!(m.split_section(7, None, None), Some(2));

        let titles: Vec<_> = m.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["resultado", "resultado_2", "resultado_3"]);
        let counts: Vec<_> = m.sections().iter().map(|s| s.page_count).collect();
        assert_eq!(counts, [4, 3, 3]);
        assert_eq!(m.sections()[2].start_page, 7);
        assert_eq!(m.sections()[1].id, "sec_4");
    }

    #[test]
    fn split_section_is_noop_at_section_start_or_out_of_range() {
        let mut m = SectionManager::new();
        m.initialize_default(5, "r");
        assert_eq!(m.split_section(0, None, None), None);
        assert_eq!(m.split_section(5, None, None), None);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn split_section_uses_explicit_title_and_base() {
        let mut m = SectionManager::new();
        m.initialize_default(6, "r");
        m.split_section(2, Some("2 RECURSO"), None);
        m.split_section(4, None, Some("anexo/3p"));
        let titles: Vec<_> = m.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["r", "2 RECURSO", "anexo"]);
    }

    #[test]
    fn next_title_ignores_split_suffixes() {
        let mut m = SectionManager::new();
        m.initialize_default(4, "doc/6p");
        assert_eq!(m.next_title("doc"), "doc_2");
        assert_eq!(m.next_title("other"), "other");
        assert_eq!(m.next_title("  "), "resultado");
    }

    #[test]
    fn merge_section_up_rejects_first_and_out_of_range() {
        let mut m = manager(&[2, 3, 4]);
        assert!(!m.merge_section_up(0));
        assert!(!m.merge_section_up(3));
        assert!(m.merge_section_up(2));
        assert_eq!(m.len(), 2);
        assert_eq!(m.sections()[1].page_count, 7);
    }

    #[test]
    fn set_split_config_rewrites_title_suffix() {
        let mut m = manager(&[3]);
        m.set_split_config(0, SplitConfig::Pages(6));
        assert_eq!(m.sections()[0].title, "sec0/6p");
        m.set_split_config(0, SplitConfig::Bytes(5 * 1024 * 1024));
        assert_eq!(m.sections()[0].title, "sec0/5M");
        assert_eq!(m.sections()[0].split, Some(SplitConfig::Bytes(5 * 1024 * 1024)));
    }

    #[test]
    fn rename_section_parses_or_clears_split() {
        let mut m = manager(&[3]);
        m.rename_section(0, "anexos/2k");
        assert_eq!(m.sections()[0].split, Some(SplitConfig::Bytes(2048)));
        m.rename_section(0, "anexos");
        assert_eq!(m.sections()[0].split, None);
    }

    #[test]
    fn deleted_section_is_created_once_at_the_end() {
        let mut m = manager(&[2, 3]);
        assert_eq!(m.deleted_section().start_page, 5);
        m.deleted_section().page_count = 1;
        assert_eq!(m.len(), 3);
        assert!(m.deleted().is_some());
        assert_eq!(m.saveable_sections().len(), 2);
    }

    #[test]
    fn soft_delete_moves_counts_into_trash() {
        let mut m = manager(&[3, 3]);
        // One page from each regular section.
        m.record_soft_delete(&[1, 4]);
        let counts: Vec<_> = m.sections().iter().map(|s| s.page_count).collect();
        assert_eq!(counts, [2, 2, 2]);
        let starts: Vec<_> = m.sections().iter().map(|s| s.start_page).collect();
        assert_eq!(starts, [0, 2, 4]);

        // Pages already in the trash stay there.
        m.record_soft_delete(&[0, 5]);
        let counts: Vec<_> = m.sections().iter().map(|s| s.page_count).collect();
        assert_eq!(counts, [1, 2, 3]);
    }

    #[test]
    fn removal_shrinks_owning_sections() {
        let mut m = manager(&[2, 2]);
        m.record_soft_delete(&[0]);
        m.record_removal(&[3]);
        assert_eq!(m.deleted().map(|s| s.page_count), Some(0));
        assert_eq!(m.regular_page_count(), 3);
    }

    #[test]
    fn grow_at_extends_owner_or_creates_default() {
        let mut m = manager(&[2, 2]);
        m.grow_at(2, 3, "r");
        let counts: Vec<_> = m.sections().iter().map(|s| s.page_count).collect();
        assert_eq!(counts, [5, 2]);

        let mut empty = SectionManager::new();
        empty.grow_at(0, 1, "nuevo");
        assert_eq!(empty.sections()[0].title, "nuevo");
        assert_eq!(empty.sections()[0].page_count, 1);
    }

    #[test]
    fn push_keeps_trash_last() {
        let mut m = manager(&[2]);
        m.deleted_section().page_count = 1;
        m.recompute_starts();
        m.push("x", "extra", 4);
        assert!(m.sections().last().is_some_and(Section::is_deleted));
        assert_eq!(m.sections()[1].start_page, 2);
        assert_eq!(m.sections()[2].start_page, 6);
    }

    #[test]
    fn split_base_number_handles_edge_titles() {
        assert_eq!(
            SectionManager::split_base_number("resultado_12/6p"),
            ("resultado".to_string(), Some(12))
        );
        assert_eq!(
            SectionManager::split_base_number("a_b"),
            ("a_b".to_string(), None)
        );
        assert_eq!(
            SectionManager::split_base_number("_3"),
            ("resultado".to_string(), Some(3))
        );
    }
}
