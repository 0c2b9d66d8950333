// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Lightweight page references that make up the editable workspace.

use std::fmt;

/// A4 portrait in PDF points.
pub const A4_SIZE: (f32, f32) = (595.0, 842.0);

/// Handle to a source document loaded into the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// One page in the workspace.
///
/// Source pages point at a page of a loaded document; the PDF itself is
/// never touched until export. `rotation` is the extra clockwise rotation
/// applied on top of whatever the source page already declares.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageRef {
    Source { doc: DocId, page: u32, rotation: u16 },
    Blank { width: f32, height: f32, rotation: u16 },
}

impl PageRef {
    pub fn source(doc: DocId, page: u32) -> Self {
        PageRef::Source {
            doc,
            page,
            rotation: 0,
        }
    }

    pub fn blank(width: f32, height: f32) -> Self {
        PageRef::Blank {
            width,
            height,
            rotation: 0,
        }
    }

    pub fn rotation(&self) -> u16 {
        match self {
            PageRef::Source { rotation, .. } | PageRef::Blank { rotation, .. } => *rotation,
        }
    }

    pub fn doc(&self) -> Option<DocId> {
        match self {
            PageRef::Source { doc, .. } => Some(*doc),
            PageRef::Blank { .. } => None,
        }
    }

    /// Return a copy rotated by `delta` degrees clockwise (negative turns counter-clockwise).
    pub fn rotated(self, delta: i32) -> Self {
        let next = normalize_rotation(self.rotation() as i32 + delta);
        match self {
            PageRef::Source { doc, page, .. } => PageRef::Source {
                doc,
                page,
                rotation: next,
            },
            PageRef::Blank { width, height, .. } => PageRef::Blank {
                width,
                height,
                rotation: next,
            },
        }
    }
}

/// Fold any multiple of 90 into `0..360`.
pub fn normalize_rotation(degrees: i32) -> u16 {
    degrees.rem_euclid(360) as u16
}

/// Swap width and height when a rotation turns the page on its side.
pub fn displayed_size(width: f32, height: f32, rotation: u16) -> (f32, f32) {
    if rotation % 180 == 90 {
        (height, width)
    } else {
        (width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_in_both_directions() {
        let page = PageRef::source(DocId(1), 3);
        assert_eq!(page.rotated(90).rotation(), 90);
        assert_eq!(page.rotated(-90).rotation(), 270);
        assert_eq!(page.rotated(270).rotated(180).rotation(), 90);
        assert_eq!(page.rotated(360).rotation(), 0);
    }

    #[test]
    fn rotated_keeps_identity_of_the_page() {
        let page = PageRef::source(DocId(7), 2).rotated(90);
        assert_eq!(
            page,
            PageRef::Source {
                doc: DocId(7),
                page: 2,
                rotation: 90
            }
        );
        assert_eq!(page.doc(), Some(DocId(7)));
        assert_eq!(PageRef::blank(10.0, 20.0).doc(), None);
    }

    #[test]
    fn displayed_size_swaps_on_quarter_turns() {
        assert_eq!(displayed_size(595.0, 842.0, 0), (595.0, 842.0));
        assert_eq!(displayed_size(595.0, 842.0, 90), (842.0, 595.0));
        assert_eq!(displayed_size(595.0, 842.0, 180), (595.0, 842.0));
        assert_eq!(displayed_size(595.0, 842.0, 270), (842.0, 595.0));
    }
}
