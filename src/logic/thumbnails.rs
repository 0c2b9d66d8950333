// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Page previews: zoom levels, a multi-level LRU cache and a schematic renderer.
//!
//! Previews are wireframes built from the page content stream: text runs
//! become grey bars, images become blocks and filled/stroked paths keep
//! their colour. They are meant to recognise a page at a glance, not to
//! reproduce it.

use std::collections::HashMap;
use std::hash::Hash;

use image::{Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::logic::document::{PdfDocument, PdfError, inherited_attribute, media_box, number, page_rotation, resolve};
use crate::models::page::{DocId, PageRef, displayed_size, normalize_rotation};

/// Thumbnail heights in pixels.
pub const ZOOM_LEVELS: [u32; 9] = [75, 100, 120, 150, 180, 225, 300, 375, 450];
/// Level shown as 100 %.
pub const BASE_LEVEL: u32 = 150;
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Operations rendered per page before giving up on the rest.
const MAX_OPERATIONS: usize = 200_000;
const MAX_FORM_DEPTH: usize = 4;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([190, 190, 190, 255]);
const TEXT: Rgba<u8> = Rgba([110, 110, 110, 255]);
const IMAGE_FILL: Rgba<u8> = Rgba([215, 215, 215, 255]);
const IMAGE_EDGE: Rgba<u8> = Rgba([160, 160, 160, 255]);

/// Closest zoom level to `size`.
pub fn snap_to_level(size: u32) -> u32 {
    ZOOM_LEVELS
        .iter()
        .copied()
        .min_by_key(|level| level.abs_diff(size))
        .unwrap_or(BASE_LEVEL)
}

pub fn zoom_in(size: u32) -> u32 {
    ZOOM_LEVELS
        .iter()
        .copied()
        .find(|&level| level > size)
        .unwrap_or(ZOOM_LEVELS[ZOOM_LEVELS.len() - 1])
}

pub fn zoom_out(size: u32) -> u32 {
    ZOOM_LEVELS
        .iter()
        .rev()
        .copied()
        .find(|&level| level < size)
        .unwrap_or(ZOOM_LEVELS[0])
}

pub fn zoom_percentage(size: u32) -> u32 {
    (size as f32 * 100.0 / BASE_LEVEL as f32).round() as u32
}

/// What a preview depicts, independent of zoom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PreviewKey {
    Source { doc: DocId, page: u32, rotation: u16 },
    Blank { width: u32, height: u32, rotation: u16 },
}

impl From<&PageRef> for PreviewKey {
    fn from(page: &PageRef) -> Self {
        match *page {
            PageRef::Source { doc, page, rotation } => PreviewKey::Source { doc, page, rotation },
            PageRef::Blank {
                width,
                height,
                rotation,
            } => PreviewKey::Blank {
                width: width.to_bits(),
                height: height.to_bits(),
                rotation,
            },
        }
    }
}

impl PreviewKey {
    pub fn doc(&self) -> Option<DocId> {
        match self {
            PreviewKey::Source { doc, .. } => Some(*doc),
            PreviewKey::Blank { .. } => None,
        }
    }
}

/// LRU cache of previews keyed by page and zoom level.
pub struct PageCache<V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<(PreviewKey, u32), (V, u64)>,
}

impl<V: Clone> Default for PageCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<V: Clone> PageCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn contains(&self, key: PreviewKey, level: u32) -> bool {
        self.entries.contains_key(&(key, level))
    }

    /// Exact lookup; refreshes recency.
    pub fn get(&mut self, key: PreviewKey, level: u32) -> Option<V> {
        let tick = self.touch();
        let (value, used) = self.entries.get_mut(&(key, level))?;
        *used = tick;
        Some(value.clone())
    }

    /// Exact level, or else the nearest larger cached level, or else the largest smaller one.
    ///
    /// Returns the value and the level it was rendered at.
    pub fn get_or_fallback(&mut self, key: PreviewKey, level: u32) -> Option<(V, u32)> {
        if let Some(value) = self.get(key, level) {
            return Some((value, level));
        }
        let larger = ZOOM_LEVELS
            .iter()
            .copied()
            .filter(|&l| l > level)
            .find(|&l| self.contains(key, l));
        let fallback = larger.or_else(|| {
            ZOOM_LEVELS
                .iter()
                .rev()
                .copied()
                .filter(|&l| l < level)
                .find(|&l| self.contains(key, l))
        })?;
        self.get(key, fallback).map(|v| (v, fallback))
    }

    pub fn put(&mut self, key: PreviewKey, level: u32, value: V) {
        let slot = (key, level);
        if !self.entries.contains_key(&slot) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                log::trace!("Evicted {oldest:?} from preview cache");
            }
        }
        let tick = self.touch();
        self.entries.insert(slot, (value, tick));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        log::info!("Preview cache cleared");
    }

    /// Drop every preview of one source document.
    pub fn clear_source(&mut self, doc: DocId) {
        let before = self.entries.len();
        self.entries.retain(|(key, _), _| key.doc() != Some(doc));
        log::debug!("Cleared {} previews for {doc}", before - self.entries.len());
    }
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m × n` in PDF row-vector convention.
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, value) in m.iter_mut().zip(operands) {
        *slot = number(value)?;
    }
    Some(m)
}

fn operand(operands: &[Object], index: usize) -> f32 {
    operands.get(index).and_then(number).unwrap_or(0.0)
}

fn gray(level: f32) -> Rgba<u8> {
    let v = (level.clamp(0.0, 1.0) * 255.0) as u8;
    Rgba([v, v, v, 255])
}

fn rgb(operands: &[Object]) -> Rgba<u8> {
    let c = |i| (operand(operands, i).clamp(0.0, 1.0) * 255.0) as u8;
    Rgba([c(0), c(1), c(2), 255])
}

fn cmyk(operands: &[Object]) -> Rgba<u8> {
    let k = operand(operands, 3).clamp(0.0, 1.0);
    let c = |i| ((1.0 - operand(operands, i).clamp(0.0, 1.0)) * (1.0 - k) * 255.0) as u8;
    Rgba([c(0), c(1), c(2), 255])
}

/// Target image plus the mapping from user space to pixels.
struct Canvas {
    image: RgbaImage,
    scale: f32,
    rotation: u16,
    origin: (f32, f32),
    size: (f32, f32),
    shown_height: f32,
}

impl Canvas {
    fn new(width: f32, height: f32, origin: (f32, f32), rotation: u16, target_height: u32) -> Self {
        let (shown_w, shown_h) = displayed_size(width, height, rotation);
        let scale = target_height.max(1) as f32 / shown_h.max(1.0);
        let pixel_w = ((shown_w * scale).round() as u32).max(1);
        let mut image = RgbaImage::from_pixel(pixel_w, target_height.max(1), WHITE);
        let (w, h) = image.dimensions();
        for x in 0..w {
            image.put_pixel(x, 0, BORDER);
            image.put_pixel(x, h - 1, BORDER);
        }
        for y in 0..h {
            image.put_pixel(0, y, BORDER);
            image.put_pixel(w - 1, y, BORDER);
        }
        Self {
            image,
            scale,
            rotation,
            origin,
            size: (width, height),
            shown_height: shown_h,
        }
    }

    fn to_pixel(&self, ux: f32, uy: f32) -> (f32, f32) {
        let (x, y) = (ux - self.origin.0, uy - self.origin.1);
        let (w, h) = self.size;
        let (dx, dy) = match self.rotation {
            90 => (y, w - x),
            180 => (w - x, h - y),
            270 => (h - y, x),
            _ => (x, y),
        };
        (dx * self.scale, (self.shown_height - dy) * self.scale)
    }

    /// Pixel bounding box of user-space points, clipped to the image.
    fn bounds(&self, points: &[(f32, f32)]) -> Option<(u32, u32, u32, u32)> {
        let pixels: Vec<(f32, f32)> = points.iter().map(|&(x, y)| self.to_pixel(x, y)).collect();
        let min_x = pixels.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = pixels.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = pixels.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = pixels.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        let (w, h) = self.image.dimensions();
        if !min_x.is_finite() || max_x < 0.0 || max_y < 0.0 || min_x >= w as f32 || min_y >= h as f32 {
            return None;
        }
        let x0 = min_x.max(0.0) as u32;
        let y0 = min_y.max(0.0) as u32;
        let x1 = (max_x.ceil() as u32).clamp(x0 + 1, w);
        let y1 = (max_y.ceil() as u32).clamp(y0 + 1, h);
        Some((x0, y0, x1, y1))
    }

    fn fill(&mut self, points: &[(f32, f32)], color: Rgba<u8>) {
        if let Some((x0, y0, x1, y1)) = self.bounds(points) {
            for y in y0..y1 {
                for x in x0..x1 {
                    self.image.put_pixel(x, y, color);
                }
            }
        }
    }

    fn outline(&mut self, points: &[(f32, f32)], color: Rgba<u8>) {
        if let Some((x0, y0, x1, y1)) = self.bounds(points) {
            for x in x0..x1 {
                self.image.put_pixel(x, y0, color);
                self.image.put_pixel(x, y1 - 1, color);
            }
            for y in y0..y1 {
                self.image.put_pixel(x0, y, color);
                self.image.put_pixel(x1 - 1, y, color);
            }
        }
    }
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgba<u8>,
    stroke: Rgba<u8>,
}

struct TextState {
    matrix: Matrix,
    line: Matrix,
    size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            line: IDENTITY,
            size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line);
        self.matrix = self.line;
    }
}

struct Renderer<'a> {
    doc: &'a Document,
    canvas: Canvas,
    budget: usize,
}

impl Renderer<'_> {
    fn run(&mut self, operations: &[Operation], resources: &Dictionary, ctm: Matrix, depth: usize) {
        let mut state = GraphicsState {
            ctm,
            fill: Rgba([0, 0, 0, 255]),
            stroke: Rgba([0, 0, 0, 255]),
        };
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text = TextState::default();
        let mut path: Vec<(f32, f32)> = Vec::new();

        for op in operations {
            if self.budget == 0 {
                return;
            }
            self.budget -= 1;
            let args = op.operands.as_slice();

            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(previous) = stack.pop() {
                        state = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(args) {
                        state.ctm = multiply(&m, &state.ctm);
                    }
                }
                "g" => state.fill = gray(operand(args, 0)),
                "G" => state.stroke = gray(operand(args, 0)),
                "rg" => state.fill = rgb(args),
                "RG" => state.stroke = rgb(args),
                "k" => state.fill = cmyk(args),
                "K" => state.stroke = cmyk(args),
                "m" | "l" => path.push(apply(&state.ctm, operand(args, 0), operand(args, 1))),
                "c" => path.push(apply(&state.ctm, operand(args, 4), operand(args, 5))),
                "v" | "y" => path.push(apply(&state.ctm, operand(args, 2), operand(args, 3))),
                "re" => {
                    let (x, y, w, h) = (operand(args, 0), operand(args, 1), operand(args, 2), operand(args, 3));
                    for (px, py) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
                        path.push(apply(&state.ctm, px, py));
                    }
                }
                "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    self.canvas.fill(&path, state.fill);
                    path.clear();
                }
                "S" | "s" => {
                    self.canvas.outline(&path, state.stroke);
                    path.clear();
                }
                "n" => path.clear(),
                "BT" => text = TextState::default(),
                "Tf" => text.size = operand(args, 1),
                "TL" => text.leading = operand(args, 0),
                "Td" => text.next_line(operand(args, 0), operand(args, 1)),
                "TD" => {
                    text.leading = -operand(args, 1);
                    text.next_line(operand(args, 0), operand(args, 1));
                }
                "Tm" => {
                    if let Some(m) = matrix_from(args) {
                        text.matrix = m;
                        text.line = m;
                    }
                }
                "T*" => text.next_line(0.0, -text.leading),
                "Tj" => self.show_text(&mut text, &state, string_units(args.first())),
                "'" => {
                    text.next_line(0.0, -text.leading);
                    self.show_text(&mut text, &state, string_units(args.first()));
                }
                "\"" => {
                    text.next_line(0.0, -text.leading);
                    self.show_text(&mut text, &state, string_units(args.get(2)));
                }
                "TJ" => {
                    let units = args
                        .first()
                        .and_then(|a| a.as_array().ok())
                        .map(|items| {
                            items
                                .iter()
                                .map(|item| match item {
                                    Object::String(..) => string_units(Some(item)),
                                    other => -number(other).unwrap_or(0.0) / 1000.0,
                                })
                                .sum()
                        })
                        .unwrap_or(0.0);
                    self.show_text(&mut text, &state, units);
                }
                "Do" => {
                    if let Some(name) = args.first().and_then(|a| a.as_name().ok()) {
                        self.draw_xobject(name, resources, &state, depth);
                    }
                }
                "BI" | "ID" => self.draw_image(&state.ctm),
                _ => {}
            }
        }
    }

    /// Draw a bar for a run of `units` em-widths and advance the text matrix.
    fn show_text(&mut self, text: &mut TextState, state: &GraphicsState, units: f32) {
        let width = units * text.size;
        if width > 0.0 {
            let m = multiply(&text.matrix, &state.ctm);
            let height = text.size * 0.7;
            let corners = [
                apply(&m, 0.0, 0.0),
                apply(&m, width, 0.0),
                apply(&m, 0.0, height),
                apply(&m, width, height),
            ];
            self.canvas.fill(&corners, TEXT);
        }
        text.matrix = multiply(&[1.0, 0.0, 0.0, 1.0, width, 0.0], &text.matrix);
    }

    fn draw_image(&mut self, ctm: &Matrix) {
        let corners = [
            apply(ctm, 0.0, 0.0),
            apply(ctm, 1.0, 0.0),
            apply(ctm, 0.0, 1.0),
            apply(ctm, 1.0, 1.0),
        ];
        self.canvas.fill(&corners, IMAGE_FILL);
        self.canvas.outline(&corners, IMAGE_EDGE);
    }

    fn draw_xobject(&mut self, name: &[u8], resources: &Dictionary, state: &GraphicsState, depth: usize) {
        let doc = self.doc;
        let Some(stream) = resources
            .get(b"XObject")
            .ok()
            .map(|x| resolve(doc, x))
            .and_then(|x| x.as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .map(|x| resolve(doc, x))
            .and_then(|x| x.as_stream().ok())
        else {
            return;
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => self.draw_image(&state.ctm),
            Ok(b"Form") if depth < MAX_FORM_DEPTH => {
                let content = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let Ok(decoded) = Content::decode(&content) else {
                    return;
                };
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| m.as_array().ok())
                    .and_then(|m| matrix_from(m))
                    .unwrap_or(IDENTITY);
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .map(|r| resolve(doc, r))
                    .and_then(|r| r.as_dict().ok())
                    .unwrap_or(resources)
                    .clone();
                let ctm = multiply(&form_matrix, &state.ctm);
                self.run(&decoded.operations, &form_resources, ctm, depth + 1);
            }
            _ => {}
        }
    }
}

/// Approximate advance of a shown string in em units (half an em per byte).
fn string_units(object: Option<&Object>) -> f32 {
    match object {
        Some(Object::String(bytes, _)) => bytes.len() as f32 * 0.5,
        _ => 0.0,
    }
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve(doc, &r).as_dict().ok().cloned())
        .unwrap_or_else(Dictionary::new)
}

/// Render a schematic preview of page `index` at `height` pixels, turned by `extra_rotation`.
pub fn render_preview(document: &PdfDocument, index: usize, height: u32, extra_rotation: u16) -> Result<RgbaImage, PdfError> {
    let doc = document.inner();
    let page_id = document.page_id(index)?;
    let [llx, lly, urx, ury] = media_box(doc, page_id);
    let rotation = normalize_rotation(page_rotation(doc, page_id) as i32 + extra_rotation as i32);
    let canvas = Canvas::new(
        (urx - llx).abs(),
        (ury - lly).abs(),
        (llx.min(urx), lly.min(ury)),
        rotation,
        height,
    );

    let operations = document.operations(index)?;
    let resources = page_resources(doc, page_id);
    let mut renderer = Renderer {
        doc,
        canvas,
        budget: MAX_OPERATIONS,
    };
    renderer.run(&operations, &resources, IDENTITY, 0);
    Ok(renderer.canvas.image)
}

/// Preview of an empty page.
pub fn render_blank(width: f32, height: f32, rotation: u16, target_height: u32) -> RgbaImage {
    Canvas::new(width, height, (0.0, 0.0), rotation, target_height).image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::fixtures;

    fn key(page: u32) -> PreviewKey {
        PreviewKey::from(&PageRef::source(DocId(1), page))
    }

    #[test]
    fn zoom_steps_walk_the_levels() {
        assert_eq!(zoom_in(150), 180);
        assert_eq!(zoom_in(450), 450);
        assert_eq!(zoom_in(160), 180);
        assert_eq!(zoom_out(150), 120);
        assert_eq!(zoom_out(75), 75);
        assert_eq!(zoom_out(160), 150);
        assert_eq!(snap_to_level(160), 150);
        assert_eq!(snap_to_level(1000), 450);
        assert_eq!(zoom_percentage(150), 100);
        assert_eq!(zoom_percentage(300), 200);
        assert_eq!(zoom_percentage(75), 50);
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let mut cache = PageCache::new(2);
        cache.put(key(1), 150, "one");
        cache.put(key(2), 150, "two");
        assert_eq!(cache.get(key(1), 150), Some("one"));
        cache.put(key(3), 150, "three");
        assert_eq!(cache.len(), 2);
        assert!(cache.get(key(2), 150).is_none());
        assert!(cache.get(key(1), 150).is_some());
    }

    #[test]
    fn cache_put_replaces_without_evicting() {
        let mut cache = PageCache::new(2);
        cache.put(key(1), 150, 1);
        cache.put(key(2), 150, 2);
        cache.put(key(1), 150, 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(key(1), 150), Some(10));
    }

    #[test]
    fn fallback_prefers_nearest_larger_level() {
        let mut cache = PageCache::new(10);
        cache.put(key(1), 75, "small");
        cache.put(key(1), 300, "big");
        cache.put(key(1), 450, "huge");
        assert_eq!(cache.get_or_fallback(key(1), 180), Some(("big", 300)));
        assert_eq!(cache.get_or_fallback(key(1), 75), Some(("small", 75)));
        cache.put(key(2), 75, "only-small");
        assert_eq!(cache.get_or_fallback(key(2), 150), Some(("only-small", 75)));
        assert_eq!(cache.get_or_fallback(key(3), 150), None);
    }

    #[test]
    fn rotation_is_part_of_the_key() {
        let plain = PreviewKey::from(&PageRef::source(DocId(1), 1));
        let turned = PreviewKey::from(&PageRef::source(DocId(1), 1).rotated(90));
        assert_ne!(plain, turned);
    }

    #[test]
    fn clear_source_drops_only_that_document() {
        let mut cache = PageCache::new(10);
        cache.put(key(1), 150, 1);
        cache.put(PreviewKey::from(&PageRef::source(DocId(2), 1)), 150, 2);
        cache.put(PreviewKey::from(&PageRef::blank(10.0, 10.0)), 150, 3);
        cache.clear_source(DocId(1));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn preview_keeps_aspect_ratio_and_rotation() {
        let doc = PdfDocument::from_document("t.pdf", fixtures::document(&[(595.0, 842.0, "Texto")]));
        let upright = render_preview(&doc, 0, 150, 0).unwrap();
        assert_eq!(upright.height(), 150);
        assert_eq!(upright.width(), (595.0_f32 * 150.0 / 842.0).round() as u32);

        let turned = render_preview(&doc, 0, 150, 90).unwrap();
        assert!(turned.width() > turned.height());
    }

    #[test]
    fn text_shows_up_as_dark_pixels() {
        let doc = PdfDocument::from_document(
            "t.pdf",
            fixtures::document(&[(595.0, 842.0, "Texto de prueba"), (595.0, 842.0, "")]),
        );
        let dark = |img: &RgbaImage| img.pixels().filter(|p| p.0 == TEXT.0).count();
        assert!(dark(&render_preview(&doc, 0, 300, 0).unwrap()) > 0);
        assert_eq!(dark(&render_preview(&doc, 1, 300, 0).unwrap()), 0);
    }

    #[test]
    fn blank_preview_is_white_inside_the_border() {
        let img = render_blank(842.0, 595.0, 0, 100);
        assert!(img.width() > img.height());
        assert_eq!(img.get_pixel(img.width() / 2, 50).0, WHITE.0);
    }
}
