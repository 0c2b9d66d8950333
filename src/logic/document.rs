// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Loaded PDF documents and page-level operations on top of `lopdf`.

use std::io;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use thiserror::Error;

use crate::models::page::{A4_SIZE, DocId, PageRef, displayed_size, normalize_rotation};

/// Errors produced by the PDF layer.
#[derive(Error, Debug)]
pub enum PdfError {
    /// The underlying lopdf parser or writer failed.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("rotation must be 90, 180 or 270 degrees, got {0}")]
    InvalidRotation(i32),

    /// The target file is open in another program or not writable.
    #[error(
        "No se pudo guardar '{}' porque el archivo está en uso o no hay permisos. \
         Cierra cualquier visor que lo tenga abierto o elige otra ubicación.",
        path.display()
    )]
    FileInUse { path: PathBuf },

    #[error("document {0} is not loaded")]
    MissingDocument(DocId),

    #[error("malformed PDF structure: {0}")]
    Malformed(String),
}

/// Operators that put marks on the page.
const PAINT_OPERATORS: &[&str] = &[
    "Tj", "TJ", "'", "\"", "S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "Do", "sh", "BI", "ID", "EI",
];

/// A PDF loaded into memory.
#[derive(Debug)]
pub struct PdfDocument {
    name: String,
    path: Option<PathBuf>,
    inner: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    /// Read and parse a PDF file.
    pub fn open(path: &Path) -> Result<Self, PdfError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut document = Self::from_bytes(name, &bytes)?;
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    /// Parse a PDF held in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, PdfError> {
        let inner = Document::load_mem(bytes)?;
        let document = Self::from_document(name, inner);
        log::info!("Loaded PDF: {} ({} pages)", document.name, document.page_count());
        Ok(document)
    }

    pub fn from_document(name: impl Into<String>, inner: Document) -> Self {
        let mut document = Self {
            name: name.into(),
            path: None,
            inner,
            page_ids: Vec::new(),
        };
        document.refresh_pages();
        document
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn inner(&self) -> &Document {
        &self.inner
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Workspace references for every page, in order.
    pub fn page_refs(&self, doc: DocId) -> Vec<PageRef> {
        (1..=self.page_count() as u32)
            .map(|page| PageRef::source(doc, page))
            .collect()
    }

    fn refresh_pages(&mut self) {
        self.page_ids = self.inner.get_pages().into_values().collect();
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId, PdfError> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(PdfError::PageOutOfRange {
                index,
                count: self.page_ids.len(),
            })
    }

    /// MediaBox width and height in points, as stored (unrotated).
    pub fn page_size(&self, index: usize) -> Result<(f32, f32), PdfError> {
        let page_id = self.page_id(index)?;
        let [llx, lly, urx, ury] = media_box(&self.inner, page_id);
        Ok(((urx - llx).abs(), (ury - lly).abs()))
    }

    /// Page size as seen on screen once the page's own rotation is applied.
    pub fn displayed_page_size(&self, index: usize) -> Result<(f32, f32), PdfError> {
        let (w, h) = self.page_size(index)?;
        Ok(displayed_size(w, h, self.rotation(index)?))
    }

    /// Rotation declared by the page (inherited through the page tree).
    pub fn rotation(&self, index: usize) -> Result<u16, PdfError> {
        let page_id = self.page_id(index)?;
        Ok(page_rotation(&self.inner, page_id))
    }

    /// Add `degrees` to the page rotation.
    pub fn rotate_page(&mut self, index: usize, degrees: i32) -> Result<(), PdfError> {
        if !matches!(degrees, 90 | 180 | 270 | -90 | -180 | -270) {
            return Err(PdfError::InvalidRotation(degrees));
        }
        let page_id = self.page_id(index)?;
        let current = page_rotation(&self.inner, page_id);
        let next = normalize_rotation(current as i32 + degrees);
        self.inner
            .get_dictionary_mut(page_id)?
            .set("Rotate", Object::Integer(next as i64));
        log::debug!("Rotated page {index} from {current}° to {next}°");
        Ok(())
    }

    pub fn extract_text(&self, index: usize) -> Result<String, PdfError> {
        self.page_id(index)?;
        Ok(self.inner.extract_text(&[index as u32 + 1])?)
    }

    /// Decoded content stream operations of a page.
    pub fn operations(&self, index: usize) -> Result<Vec<Operation>, PdfError> {
        let page_id = self.page_id(index)?;
        page_operations(&self.inner, page_id)
    }

    /// A page is blank when its content stream never paints anything.
    pub fn is_page_blank(&self, index: usize) -> Result<bool, PdfError> {
        let operations = self.operations(index)?;
        let blank = !operations
            .iter()
            .any(|op| PAINT_OPERATORS.contains(&op.operator.as_str()));
        log::debug!("Page {index} blank check: {blank}");
        Ok(blank)
    }

    pub fn delete_page(&mut self, index: usize) -> Result<(), PdfError> {
        self.page_id(index)?;
        self.inner.delete_pages(&[index as u32 + 1]);
        self.refresh_pages();
        log::debug!("Deleted page {index}");
        Ok(())
    }

    /// Insert an empty page so that it ends up at `index`.
    pub fn insert_blank_page(&mut self, index: usize, width: f32, height: f32) -> Result<(), PdfError> {
        let count = self.page_count();
        if index > count {
            return Err(PdfError::PageOutOfRange { index, count });
        }

        // Parent node and position in its Kids array for the new page.
        let (parent_id, position) = if index < count {
            let anchor = self.page_ids[index];
            let parent = parent_of(&self.inner, anchor)?;
            let kids = self.inner.get_dictionary(parent)?.get(b"Kids")?.as_array()?;
            let pos = kids
                .iter()
                .position(|k| k.as_reference().ok() == Some(anchor))
                .unwrap_or(kids.len());
            (parent, pos)
        } else if let Some(&last) = self.page_ids.last() {
            let parent = parent_of(&self.inner, last)?;
            let len = self.inner.get_dictionary(parent)?.get(b"Kids")?.as_array()?.len();
            (parent, len)
        } else {
            let root = pages_root(&self.inner)?;
            let len = self.inner.get_dictionary(root)?.get(b"Kids")?.as_array()?.len();
            (root, len)
        };

        let content_id = self.inner.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = self.inner.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => parent_id,
            "MediaBox" => rect_object([0.0, 0.0, width, height]),
            "Contents" => content_id,
        });

        if let Object::Array(kids) = self
            .inner
            .get_dictionary_mut(parent_id)?
            .get_mut(b"Kids")?
        {
            kids.insert(position, Object::Reference(page_id));
        }

        // Bump Count on the parent and every ancestor.
        let mut node = Some(parent_id);
        while let Some(id) = node {
            let dict = self.inner.get_dictionary_mut(id)?;
            let current = dict.get(b"Count").ok().and_then(number).unwrap_or(0.0) as i64;
            dict.set("Count", Object::Integer(current + 1));
            node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }

        self.refresh_pages();
        log::debug!("Inserted blank page at {index}");
        Ok(())
    }

    /// Save the whole document, compressed.
    pub fn save(&self, path: &Path) -> Result<(), PdfError> {
        let mut copy = self.inner.clone();
        copy.prune_objects();
        write_document(&mut copy, path)?;
        log::info!("Saved PDF to {}", path.display());
        Ok(())
    }

    /// Save selected pages (0-based) into a new file. An empty list writes nothing.
    pub fn save_subset(&self, path: &Path, pages: &[usize]) -> Result<(), PdfError> {
        if pages.is_empty() {
            return Ok(());
        }
        let plan = pages
            .iter()
            .map(|&index| {
                self.page_id(index)?;
                Ok(PageRef::source(DocId(0), index as u32 + 1))
            })
            .collect::<Result<Vec<_>, PdfError>>()?;

        let mut output = crate::logic::compose::compose(|_| Some(&self.inner), &plan)?;
        write_document(&mut output, path)?;
        log::info!("Saved subset to {} ({} pages)", path.display(), pages.len());
        Ok(())
    }

    /// Concatenate whole files into one.
    pub fn merge_pdfs(paths: &[PathBuf], output: &Path) -> Result<(), PdfError> {
        let documents = paths
            .iter()
            .map(|p| PdfDocument::open(p))
            .collect::<Result<Vec<_>, _>>()?;
        let plan: Vec<PageRef> = documents
            .iter()
            .enumerate()
            .flat_map(|(i, d)| d.page_refs(DocId(i as u32)))
            .collect();

        let mut merged = crate::logic::compose::compose(
            |doc| documents.get(doc.0 as usize).map(|d| d.inner()),
            &plan,
        )?;
        write_document(&mut merged, output)?;
        log::info!("Merged {} PDFs into {}", paths.len(), output.display());
        Ok(())
    }

    /// Cut a file into `part_001.pdf`, `part_002.pdf`, ... of `pages_per_file` pages.
    pub fn split_pdf(path: &Path, output_dir: &Path, pages_per_file: usize) -> Result<Vec<PathBuf>, PdfError> {
        std::fs::create_dir_all(output_dir)?;
        let source = PdfDocument::open(path)?;
        let all: Vec<usize> = (0..source.page_count()).collect();
        let mut written = Vec::new();

        for (i, chunk) in all.chunks(pages_per_file.max(1)).enumerate() {
            let target = output_dir.join(format!("part_{:03}.pdf", i + 1));
            source.save_subset(&target, chunk)?;
            log::info!(
                "Created {} (pages {}-{})",
                target.display(),
                chunk[0] + 1,
                chunk[chunk.len() - 1] + 1
            );
            written.push(target);
        }
        Ok(written)
    }
}

/// Read a numeric PDF object.
pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

pub fn rect_object(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|&v| Object::Real(v)).collect())
}

/// Follow one level of indirection.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

/// Look a page attribute up, walking Parent links for inheritable keys.
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = Some(page_id);
    let mut depth = 0;
    while let Some(id) = node {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 64 {
            break;
        }
    }
    None
}

fn rect_from(doc: &Document, object: &Object) -> Option<[f32; 4]> {
    let values = resolve(doc, object).as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(values) {
        *slot = number(resolve(doc, value))?;
    }
    Some(rect)
}

/// Page MediaBox, A4 when missing or unreadable.
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| rect_from(doc, &obj))
        .unwrap_or([0.0, 0.0, A4_SIZE.0, A4_SIZE.1])
}

pub fn page_rotation(doc: &Document, page_id: ObjectId) -> u16 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| number(resolve(doc, &obj)))
        .map(|deg| normalize_rotation(deg as i32))
        .unwrap_or(0)
}

/// Decoded operations of a page; a page without contents has none.
pub fn page_operations(doc: &Document, page_id: ObjectId) -> Result<Vec<Operation>, PdfError> {
    let has_contents = doc
        .get_dictionary(page_id)
        .map(|d| d.has(b"Contents"))
        .unwrap_or(false);
    if !has_contents {
        return Ok(Vec::new());
    }
    let raw = doc.get_page_content(page_id)?;
    Ok(Content::decode(&raw)?.operations)
}

fn parent_of(doc: &Document, page_id: ObjectId) -> Result<ObjectId, PdfError> {
    Ok(doc.get_dictionary(page_id)?.get(b"Parent")?.as_reference()?)
}

fn pages_root(doc: &Document) -> Result<ObjectId, PdfError> {
    let catalog: &Dictionary = doc.catalog()?;
    Ok(catalog.get(b"Pages")?.as_reference()?)
}

/// Serialize to memory; used to measure output size before writing.
pub fn to_bytes(doc: &mut Document) -> Result<Vec<u8>, PdfError> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Compress and write a document, reporting locked targets as [`PdfError::FileInUse`].
pub fn write_document(doc: &mut Document, path: &Path) -> Result<(), PdfError> {
    let bytes = to_bytes(doc)?;
    std::fs::write(path, bytes).map_err(|err| translate_save_error(err, path))
}

fn translate_save_error(err: io::Error, path: &Path) -> PdfError {
    let message = err.to_string().to_lowercase();
    let locked = err.kind() == io::ErrorKind::PermissionDenied
        || err.raw_os_error() == Some(13)
        || message.contains("permission denied")
        || message.contains("access is denied")
        || message.contains("being used by another process");
    if locked {
        PdfError::FileInUse {
            path: path.to_path_buf(),
        }
    } else {
        PdfError::Io(err)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PdfDocument {
        PdfDocument::from_bytes(
            "sample.pdf",
            &fixtures::bytes(&[(595.0, 842.0, "Hola"), (842.0, 595.0, ""), (300.0, 400.0, "Adios")]),
        )
        .expect("load")
    }

    #[test]
    fn loads_pages_and_sizes() {
        let doc = sample();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_size(0).unwrap(), (595.0, 842.0));
        assert_eq!(doc.page_size(1).unwrap(), (842.0, 595.0));
        assert!(matches!(
            doc.page_size(3),
            Err(PdfError::PageOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn rotate_page_is_incremental_and_validated() {
        let mut doc = sample();
        doc.rotate_page(0, 90).unwrap();
        doc.rotate_page(0, 270).unwrap();
        assert_eq!(doc.rotation(0).unwrap(), 0);
        doc.rotate_page(0, -90).unwrap();
        assert_eq!(doc.rotation(0).unwrap(), 270);
        assert_eq!(doc.displayed_page_size(0).unwrap(), (842.0, 595.0));
        assert!(matches!(doc.rotate_page(0, 45), Err(PdfError::InvalidRotation(45))));
    }

    #[test]
    fn blank_detection_looks_for_painting_operators() {
        let doc = sample();
        assert!(!doc.is_page_blank(0).unwrap());
        assert!(doc.is_page_blank(1).unwrap());
    }

    #[test]
    fn extract_text_reads_shown_strings() {
        let doc = sample();
        assert!(doc.extract_text(0).unwrap().contains("Hola"));
    }

    #[test]
    fn insert_and_delete_pages_keep_order() {
        let mut doc = sample();
        doc.insert_blank_page(1, A4_SIZE.0, A4_SIZE.1).unwrap();
        assert_eq!(doc.page_count(), 4);
        assert!(doc.is_page_blank(1).unwrap());
        assert_eq!(doc.page_size(2).unwrap(), (842.0, 595.0));

        doc.insert_blank_page(4, 100.0, 100.0).unwrap();
        assert_eq!(doc.page_size(4).unwrap(), (100.0, 100.0));

        doc.delete_page(0).unwrap();
        assert_eq!(doc.page_count(), 4);
        assert!(doc.is_page_blank(0).unwrap());
        assert!(doc.insert_blank_page(9, 1.0, 1.0).is_err());
    }

    #[test]
    fn save_subset_writes_only_requested_pages() {
        let tmp = TempDir::new().unwrap();
        let doc = sample();
        let out = tmp.path().join("subset.pdf");

        doc.save_subset(&out, &[2, 0]).unwrap();
        let reloaded = PdfDocument::open(&out).unwrap();
        assert_eq!(reloaded.page_count(), 2);
        assert_eq!(reloaded.page_size(0).unwrap(), (300.0, 400.0));

        let skipped = tmp.path().join("none.pdf");
        doc.save_subset(&skipped, &[]).unwrap();
        assert!(!skipped.exists());
    }

    #[test]
    fn save_round_trips_rotation() {
        let tmp = TempDir::new().unwrap();
        let mut doc = sample();
        doc.rotate_page(2, 180).unwrap();
        let out = tmp.path().join("rotated.pdf");
        doc.save(&out).unwrap();
        assert_eq!(PdfDocument::open(&out).unwrap().rotation(2).unwrap(), 180);
    }

    #[test]
    fn merge_and_split_files() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.pdf");
        let b = tmp.path().join("b.pdf");
        std::fs::write(&a, fixtures::bytes(&[(100.0, 100.0, "a"); 3])).unwrap();
        std::fs::write(&b, fixtures::bytes(&[(200.0, 200.0, "b"); 2])).unwrap();

        let merged = tmp.path().join("merged.pdf");
        PdfDocument::merge_pdfs(&[a, b], &merged).unwrap();
        let doc = PdfDocument::open(&merged).unwrap();
        assert_eq!(doc.page_count(), 5);
        assert_eq!(doc.page_size(4).unwrap(), (200.0, 200.0));

        let parts = PdfDocument::split_pdf(&merged, &tmp.path().join("parts"), 2).unwrap();
        let names: Vec<_> = parts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["part_001.pdf", "part_002.pdf", "part_003.pdf"]);
        assert_eq!(PdfDocument::open(&parts[2]).unwrap().page_count(), 1);
    }

    #[test]
    fn permission_errors_become_file_in_use() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            translate_save_error(err, Path::new("x.pdf")),
            PdfError::FileInUse { .. }
        ));
        let other = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert!(matches!(translate_save_error(other, Path::new("x.pdf")), PdfError::Io(_)));
    }
}
