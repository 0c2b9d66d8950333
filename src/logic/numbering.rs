// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Stamp page numbers ("Página 3 de 12") onto PDF pages.
//!
//! Text is set in the standard Helvetica font so nothing needs embedding.
//! Placement is computed in the displayed frame and mapped back through the
//! page rotation, so the label reads upright however the page is turned.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::logic::compose::compose;
use crate::logic::document::{PdfError, inherited_attribute, media_box, page_rotation, write_document};
use crate::models::page::{DocId, PageRef, displayed_size};

/// Resource name of the stamped font.
const FONT_RESOURCE: &str = "FPodo";
/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];
const DEFAULT_WIDTH: u16 = 556;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Vertical {
    Top,
    Middle,
    #[default]
    Bottom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Horizontal {
    Left,
    #[default]
    Center,
    Right,
}

/// Where on the page the label goes, written as `"bottom-center"` and friends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Position {
    pub vertical: Vertical,
    pub horizontal: Horizontal,
}

impl Position {
    pub const ALL: [Position; 9] = {
        use Horizontal::*;
        use Vertical::*;
        [
            Position { vertical: Top, horizontal: Left },
            Position { vertical: Top, horizontal: Center },
            Position { vertical: Top, horizontal: Right },
            Position { vertical: Middle, horizontal: Left },
            Position { vertical: Middle, horizontal: Center },
            Position { vertical: Middle, horizontal: Right },
            Position { vertical: Bottom, horizontal: Left },
            Position { vertical: Bottom, horizontal: Center },
            Position { vertical: Bottom, horizontal: Right },
        ]
    };

    /// Lenient parse: anything not naming a side falls back to middle/center.
    pub fn parse(value: &str) -> Self {
        let value = value.to_ascii_lowercase();
        let vertical = if value.contains("top") {
            Vertical::Top
        } else if value.contains("bottom") {
            Vertical::Bottom
        } else {
            Vertical::Middle
        };
        let horizontal = if value.contains("left") {
            Horizontal::Left
        } else if value.contains("right") {
            Horizontal::Right
        } else {
            Horizontal::Center
        };
        Self { vertical, horizontal }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.vertical {
            Vertical::Top => "top",
            Vertical::Middle => "middle",
            Vertical::Bottom => "bottom",
        };
        let h = match self.horizontal {
            Horizontal::Left => "left",
            Horizontal::Center => "center",
            Horizontal::Right => "right",
        };
        write!(f, "{v}-{h}")
    }
}

impl From<String> for Position {
    fn from(value: String) -> Self {
        Position::parse(&value)
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.to_string()
    }
}

/// User-tunable numbering settings, persisted in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingOptions {
    pub format: String,
    pub position: Position,
    pub font_size: f32,
    pub margin: f32,
}

impl Default for NumberingOptions {
    fn default() -> Self {
        Self {
            format: "Página %(n) de %(N)".into(),
            position: Position::default(),
            font_size: 11.0,
            margin: 30.0,
        }
    }
}

/// Expand `%(n)` and `%(N)` in a format string.
pub fn format_label(format: &str, n: usize, total: usize) -> String {
    format.replace("%(n)", &n.to_string()).replace("%(N)", &total.to_string())
}

/// Advance width of `text` in Helvetica at `size` points.
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    units as f32 * size / 1000.0
}

fn char_width(c: char) -> u16 {
    let ascii = |c: char| match c as u32 {
        code @ 32..=126 => Some(HELVETICA_WIDTHS[(code - 32) as usize]),
        _ => None,
    };
    ascii(c)
        .or_else(|| {
            // Accented Latin letters share the width of their base letter.
            deunicode::deunicode_char(c)
                .and_then(|s| s.chars().next())
                .and_then(ascii)
        })
        .unwrap_or(DEFAULT_WIDTH)
}

/// Encode for WinAnsiEncoding; characters it cannot express become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            0x20AC => 0x80,
            _ => b'?',
        })
        .collect()
}

/// Baseline start of the label in the displayed frame (origin bottom-left).
fn placement(options: &NumberingOptions, width: f32, height: f32, text_w: f32) -> (f32, f32) {
    let size = options.font_size;
    let margin = options.margin.max(0.0);
    let box_w = (text_w + size).max(size * 4.0);
    let box_h = (size * 2.0).max(size + 20.0);
    let (half_w, half_h) = (box_w / 2.0, box_h / 2.0);

    let center_x = match options.position.horizontal {
        Horizontal::Left => half_w + margin,
        Horizontal::Right => width - margin - half_w,
        Horizontal::Center => width / 2.0,
    };
    // Measured from the top edge.
    let center_y = match options.position.vertical {
        Vertical::Top => half_h + margin,
        Vertical::Bottom => height - margin / 2.0 - half_h,
        Vertical::Middle => height / 2.0,
    };
    let center_x = center_x.max(half_w).min((width - half_w).max(half_w));
    let center_y = center_y.max(half_h).min((height - half_h).max(half_h));

    let baseline_from_top = center_y + size * 0.35;
    (center_x - text_w / 2.0, height - baseline_from_top)
}

/// Map a displayed-frame point to user space and give the text matrix axes.
fn to_user_space(dx: f32, dy: f32, width: f32, height: f32, rotation: u16) -> (f32, f32, [f32; 4]) {
    match rotation {
        90 => (width - dy, dx, [0.0, 1.0, -1.0, 0.0]),
        180 => (width - dx, height - dy, [-1.0, 0.0, 0.0, -1.0]),
        270 => (dy, height - dx, [0.0, -1.0, 1.0, 0.0]),
        _ => (dx, dy, [1.0, 0.0, 0.0, 1.0]),
    }
}

/// Stamp `text` on one page of `doc`.
pub fn stamp_page(doc: &mut Document, page_id: ObjectId, text: &str, options: &NumberingOptions) -> Result<(), PdfError> {
    let [llx, lly, urx, ury] = media_box(doc, page_id);
    let (width, height) = ((urx - llx).abs(), (ury - lly).abs());
    let rotation = page_rotation(doc, page_id);
    let (shown_w, shown_h) = displayed_size(width, height, rotation);

    let text_w = text_width(text, options.font_size);
    let (dx, dy) = placement(options, shown_w, shown_h, text_w);
    let (ux, uy, [a, b, c, d]) = to_user_space(dx, dy, width, height, rotation);

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources = resources_with_font(doc, page_id, font_id);

    let prefix = Content {
        operations: vec![Operation::new("q", vec![])],
    };
    let suffix = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), Object::Real(options.font_size)],
            ),
            Operation::new("g", vec![Object::Integer(0)]),
            Operation::new(
                "Tm",
                [a, b, c, d, ux + llx.min(urx), uy + lly.min(ury)]
                    .into_iter()
                    .map(Object::Real)
                    .collect(),
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let prefix_id = doc.add_object(Stream::new(dictionary! {}, prefix.encode()?));
    let suffix_id = doc.add_object(Stream::new(dictionary! {}, suffix.encode()?));

    let mut contents = vec![Object::Reference(prefix_id)];
    contents.extend(existing_contents(doc, page_id)?);
    contents.push(Object::Reference(suffix_id));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, PdfError> {
    let contents = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

fn resolved_dict(doc: &Document, object: Option<Object>) -> Dictionary {
    match object {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => doc.get_dictionary(id).cloned().unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

fn resources_with_font(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = resolved_dict(doc, inherited_attribute(doc, page_id, b"Resources"));
    let mut fonts = resolved_dict(doc, resources.get(b"Font").ok().cloned());
    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

/// Number every page of `input` (n = page, N = page count) into `output`.
pub fn add_page_numbers(input: &Path, output: &Path, options: &NumberingOptions) -> Result<usize, PdfError> {
    let mut doc = Document::load(input)?;
    let pages = doc.get_pages();
    let total = pages.len();
    log::info!("Adding page numbers to {total} pages");

    for (&number, &page_id) in &pages {
        let text = format_label(&options.format, number as usize, total);
        stamp_page(&mut doc, page_id, &text, options)?;
        log::debug!("Added number to page {number}: '{text}'");
    }

    write_document(&mut doc, output)?;
    log::info!("Numbered PDF saved to: {}", output.display());
    Ok(total)
}

/// Number only the given 0-based pages; out-of-range indices are skipped.
pub fn add_page_numbers_to_selection(
    input: &Path,
    output: &Path,
    pages: &[usize],
    options: &NumberingOptions,
) -> Result<usize, PdfError> {
    let mut doc = Document::load(input)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let total = page_ids.len();
    log::info!("Adding page numbers to {} selected pages", pages.len());

    let mut stamped = 0;
    for &index in pages {
        let Some(&page_id) = page_ids.get(index) else {
            log::warn!("Skipping invalid page index: {index}");
            continue;
        };
        let text = format_label(&options.format, index + 1, total);
        stamp_page(&mut doc, page_id, &text, options)?;
        stamped += 1;
    }

    write_document(&mut doc, output)?;
    log::info!("Numbered PDF saved to: {}", output.display());
    Ok(stamped)
}

/// Compose `refs` into a new document and number its pages 1..N in order.
pub fn number_pages<'a, F>(lookup: F, refs: &[PageRef], options: &NumberingOptions) -> Result<Document, PdfError>
where
    F: Fn(DocId) -> Option<&'a Document>,
{
    let mut doc = compose(lookup, refs)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let total = page_ids.len();
    for (i, page_id) in page_ids.into_iter().enumerate() {
        let text = format_label(&options.format, i + 1, total);
        stamp_page(&mut doc, page_id, &text, options)?;
    }
    Ok(doc)
}

static NUMBERING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^Página\s+\d+\s+de\s+\d+$",
        r"^Pág\.?\s*\d+\s*(de\s+\d+)?$",
        r"^\d+\s*/\s*\d+$",
        r"^\d+\s+de\s+\d+$",
        r"^-\s*\d+\s*-$",
        r"^\[\s*\d+\s*\]$",
        r"^\(\s*\d+\s*\)$",
        r"^Page\s+\d+\s+of\s+\d+$",
        r"^\d{1,4}$",
    ]
    .iter()
    .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
    .collect()
});

/// Whether a line of text looks like a stamped page number.
pub fn is_numbering_text(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && NUMBERING_PATTERNS.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::{PdfDocument, fixtures};
    use tempfile::TempDir;

    #[test]
    fn format_label_expands_placeholders() {
        assert_eq!(format_label("Página %(n) de %(N)", 3, 12), "Página 3 de 12");
        assert_eq!(format_label("%(n)", 1, 1), "1");
        assert_eq!(format_label("sin marcas", 1, 2), "sin marcas");
    }

    #[test]
    fn position_parses_leniently_and_round_trips() {
        assert_eq!(Position::parse("top-right").to_string(), "top-right");
        assert_eq!(Position::parse("bottom").to_string(), "bottom-center");
        assert_eq!(Position::parse("left").to_string(), "middle-left");
        assert_eq!(Position::parse("??").to_string(), "middle-center");
        for position in Position::ALL {
            assert_eq!(Position::parse(&position.to_string()), position);
        }
    }

    #[test]
    fn options_deserialize_position_from_string() {
        let opts: NumberingOptions =
            serde_json::from_str(r#"{"format":"%(n)","position":"top-left","font_size":9,"margin":10}"#).unwrap();
        assert_eq!(opts.position, Position::parse("top-left"));
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"top-left\""));
    }

    #[test]
    fn text_width_uses_helvetica_metrics() {
        assert!((text_width("0", 10.0) - 5.56).abs() < 1e-4);
        assert!((text_width("í", 10.0) - text_width("i", 10.0)).abs() < 1e-4);
        assert!(text_width("W", 10.0) > text_width("i", 10.0));
    }

    #[test]
    fn win_ansi_keeps_latin1() {
        assert_eq!(encode_win_ansi("Pá"), vec![b'P', 0xE1]);
        assert_eq!(encode_win_ansi("€"), vec![0x80]);
        assert_eq!(encode_win_ansi("漢"), vec![b'?']);
    }

    #[test]
    fn placement_stays_inside_the_page() {
        for position in Position::ALL {
            let opts = NumberingOptions {
                position,
                ..Default::default()
            };
            let w = text_width("Página 10 de 10", opts.font_size);
            let (x, y) = placement(&opts, 595.0, 842.0, w);
            assert!(x >= 0.0 && x + w <= 595.0, "{position}: x={x}");
            assert!(y >= 0.0 && y <= 842.0, "{position}: y={y}");
        }
        let centered = NumberingOptions::default();
        let (x, _) = placement(&centered, 600.0, 800.0, 100.0);
        assert!((x - 250.0).abs() < 1e-4);
    }

    #[test]
    fn rotated_frames_map_corners_back_to_the_page() {
        // Displayed bottom-left corner of a page turned 90° clockwise is the user-space bottom-right.
        assert_eq!(to_user_space(0.0, 0.0, 595.0, 842.0, 90).0, 595.0);
        assert_eq!(to_user_space(0.0, 0.0, 595.0, 842.0, 180).1, 842.0);
        assert_eq!(to_user_space(0.0, 0.0, 595.0, 842.0, 270).1, 842.0);
        assert_eq!(to_user_space(10.0, 20.0, 595.0, 842.0, 0), (10.0, 20.0, [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn add_page_numbers_stamps_every_page() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.pdf");
        let output = tmp.path().join("out.pdf");
        std::fs::write(&input, fixtures::bytes(&[(595.0, 842.0, "uno"), (595.0, 842.0, "")])).unwrap();

        let opts = NumberingOptions {
            format: "%(n)/%(N)".into(),
            ..Default::default()
        };
        assert_eq!(add_page_numbers(&input, &output, &opts).unwrap(), 2);

        let doc = PdfDocument::open(&output).unwrap();
        assert!(doc.extract_text(1).unwrap().contains("2/2"));
        assert!(!doc.is_page_blank(1).unwrap());
    }

    #[test]
    fn selection_skips_invalid_indices() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.pdf");
        let output = tmp.path().join("out.pdf");
        std::fs::write(&input, fixtures::bytes(&[(595.0, 842.0, ""); 3])).unwrap();

        let stamped =
            add_page_numbers_to_selection(&input, &output, &[2, 7], &NumberingOptions::default()).unwrap();
        assert_eq!(stamped, 1);
        let doc = PdfDocument::open(&output).unwrap();
        assert!(doc.is_page_blank(0).unwrap());
        assert!(!doc.is_page_blank(2).unwrap());
    }

    #[test]
    fn number_pages_uses_relative_numbers() {
        let sources = [fixtures::document(&[(595.0, 842.0, ""); 4])];
        let refs = [PageRef::source(DocId(0), 4), PageRef::source(DocId(0), 2).rotated(90)];
        let opts = NumberingOptions {
            format: "%(n) de %(N)".into(),
            ..Default::default()
        };
        let doc = number_pages(|d| sources.get(d.0 as usize), &refs, &opts).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert!(doc.extract_text(&[2]).unwrap().contains("2 de 2"));
    }

    #[test]
    fn recognises_stamped_numbers() {
        for text in ["Página 3 de 10", "pág. 4", "3/10", "3 de 10", "- 7 -", "[2]", "(12)", "Page 1 of 2", " 42 "] {
            assert!(is_numbering_text(text), "{text}");
        }
        for text in ["", "Acuerdo", "12345", "Página tres"] {
            assert!(!is_numbering_text(text), "{text}");
        }
    }
}
