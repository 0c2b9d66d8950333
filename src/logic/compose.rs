// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Build a fresh PDF out of page references spread across many sources.
//!
//! Every source is copied in once with its object ids shifted past the ids
//! already in use; output pages are copies of the source page dictionaries
//! with inherited attributes made explicit. The source page tree and catalog
//! are left behind so unused pages get pruned.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::logic::document::{PdfError, inherited_attribute, number, rect_object, resolve};
use crate::models::page::{DocId, PageRef, normalize_rotation};

const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Pages of one imported source, keyed by 1-based page number.
struct Imported {
    pages: BTreeMap<u32, (ObjectId, Dictionary)>,
}

/// Compose a new document from `plan`, resolving source pages through `lookup`.
pub fn compose<'a, F>(lookup: F, plan: &[PageRef]) -> Result<Document, PdfError>
where
    F: Fn(DocId) -> Option<&'a Document>,
{
    let mut output = Document::with_version("1.5");
    let pages_id = output.new_object_id();

    let wanted: BTreeSet<DocId> = plan.iter().filter_map(PageRef::doc).collect();
    let mut imported: BTreeMap<DocId, Imported> = BTreeMap::new();
    for doc in wanted {
        let source = lookup(doc).ok_or(PdfError::MissingDocument(doc))?;
        imported.insert(doc, import(&mut output, source)?);
    }

    let mut kids = Vec::with_capacity(plan.len());
    // Old page id -> first new page id, for annotation back-references.
    let mut renamed: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();

    for page in plan {
        let new_id = match *page {
            PageRef::Source { doc, page, rotation } => {
                let source = imported.get(&doc).ok_or(PdfError::MissingDocument(doc))?;
                let (old_id, template) =
                    source
                        .pages
                        .get(&page)
                        .ok_or_else(|| PdfError::PageOutOfRange {
                            index: page.saturating_sub(1) as usize,
                            count: source.pages.len(),
                        })?;
                let mut dict = template.clone();
                let base = dict
                    .get(b"Rotate")
                    .ok()
                    .and_then(number)
                    .unwrap_or(0.0) as i32;
                dict.set("Rotate", Object::Integer(normalize_rotation(base + rotation as i32) as i64));
                dict.set("Parent", pages_id);
                let id = output.add_object(dict);
                renamed.entry(*old_id).or_insert(id);
                id
            }
            PageRef::Blank {
                width,
                height,
                rotation,
            } => {
                let content_id = output.add_object(Stream::new(dictionary! {}, Vec::new()));
                output.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => rect_object([0.0, 0.0, width, height]),
                    "Resources" => dictionary! {},
                    "Contents" => content_id,
                    "Rotate" => Object::Integer(rotation as i64),
                })
            }
        };
        kids.push(Object::Reference(new_id));
    }

    relink_annotations(&mut output, &renamed);

    let count = kids.len() as i64;
    output.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = output.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    output.trailer.set("Root", catalog_id);

    output.prune_objects();
    output.renumber_objects();
    Ok(output)
}

/// Copy a source's objects into `output` and capture flattened page templates.
fn import(output: &mut Document, source: &Document) -> Result<Imported, PdfError> {
    let mut copy = source.clone();
    copy.renumber_objects_with(output.max_id + 1);

    let page_ids = copy.get_pages();
    let mut pages = BTreeMap::new();
    for (&number, &page_id) in &page_ids {
        pages.insert(number, (page_id, flatten_page(&copy, page_id)?));
    }

    let mut skip: BTreeSet<ObjectId> = page_ids.values().copied().collect();
    if let Ok(root) = copy.trailer.get(b"Root").and_then(Object::as_reference) {
        skip.insert(root);
    }
    for (&id, object) in &copy.objects {
        if let Object::Dictionary(dict) = object
            && dict.get(b"Type").and_then(Object::as_name).ok() == Some(b"Pages".as_slice())
        {
            skip.insert(id);
        }
    }

    output.max_id = output.max_id.max(copy.max_id);
    for (id, object) in std::mem::take(&mut copy.objects) {
        if !skip.contains(&id) {
            output.objects.insert(id, object);
        }
    }
    Ok(Imported { pages })
}

/// Clone a page dictionary with inherited attributes made explicit and
/// signature widgets removed.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, PdfError> {
    let mut dict = doc.get_dictionary(page_id)?.clone();
    for key in INHERITABLE {
        if !dict.has(key)
            && let Some(value) = inherited_attribute(doc, page_id, key)
        {
            dict.set(key.to_vec(), value);
        }
    }
    dict.remove(b"Parent");

    if let Ok(annots) = dict.get(b"Annots") {
        let kept: Vec<Object> = resolve(doc, annots)
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| !is_signature_widget(doc, item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if kept.is_empty() {
            dict.remove(b"Annots");
        } else {
            dict.set("Annots", Object::Array(kept));
        }
    }
    Ok(dict)
}

fn is_signature_widget(doc: &Document, annotation: &Object) -> bool {
    let Ok(dict) = resolve(doc, annotation).as_dict() else {
        return false;
    };
    let field_type = |d: &Dictionary| d.get(b"FT").and_then(Object::as_name).ok() == Some(b"Sig".as_slice());
    if field_type(dict) {
        return true;
    }
    // Widget kids carry the field type on their parent field.
    dict.get(b"Parent")
        .ok()
        .and_then(|parent| resolve(doc, parent).as_dict().ok())
        .is_some_and(field_type)
}

/// Point annotation `/P` entries at the new page objects.
fn relink_annotations(output: &mut Document, renamed: &BTreeMap<ObjectId, ObjectId>) {
    if renamed.is_empty() {
        return;
    }
    for object in output.objects.values_mut() {
        let Object::Dictionary(dict) = object else {
            continue;
        };
        let target = match dict.get(b"P") {
            Ok(Object::Reference(target)) => *target,
            _ => continue,
        };
        if let Some(&new_id) = renamed.get(&target)
            && dict.has(b"Subtype")
        {
            dict.set("P", Object::Reference(new_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::document::{PdfDocument, fixtures, media_box, page_rotation};

    fn docs() -> Vec<Document> {
        vec![
            fixtures::document(&[(100.0, 200.0, "a1"), (100.0, 200.0, "a2")]),
            fixtures::document(&[(300.0, 400.0, "b1")]),
        ]
    }

    fn compose_plan(sources: &[Document], plan: &[PageRef]) -> Document {
        compose(|doc| sources.get(doc.0 as usize), plan).expect("compose")
    }

    #[test]
    fn pages_follow_the_plan_across_sources() {
        let sources = docs();
        let plan = [
            PageRef::source(DocId(1), 1),
            PageRef::source(DocId(0), 2),
            PageRef::blank(50.0, 60.0),
        ];
        let out = compose_plan(&sources, &plan);
        let pages: Vec<_> = out.get_pages().into_values().collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(media_box(&out, pages[0]), [0.0, 0.0, 300.0, 400.0]);
        assert_eq!(media_box(&out, pages[1]), [0.0, 0.0, 100.0, 200.0]);
        assert_eq!(media_box(&out, pages[2]), [0.0, 0.0, 50.0, 60.0]);
        assert!(out.extract_text(&[2]).unwrap().contains("a2"));
    }

    #[test]
    fn inherited_resources_are_flattened() {
        let sources = docs();
        let out = compose_plan(&sources, &[PageRef::source(DocId(0), 1)]);
        let page_id = out.get_pages()[&1];
        assert!(out.get_dictionary(page_id).unwrap().has(b"Resources"));
    }

    #[test]
    fn rotation_adds_to_source_rotation() {
        let mut sources = docs();
        let page_id = sources[0].get_pages()[&1];
        sources[0]
            .get_dictionary_mut(page_id)
            .unwrap()
            .set("Rotate", Object::Integer(90));

        let out = compose_plan(&sources, &[PageRef::source(DocId(0), 1).rotated(270)]);
        assert_eq!(page_rotation(&out, out.get_pages()[&1]), 0);
    }

    #[test]
    fn duplicates_become_distinct_pages() {
        let sources = docs();
        let page = PageRef::source(DocId(0), 1);
        let out = compose_plan(&sources, &[page, page.rotated(90)]);
        let pages: Vec<_> = out.get_pages().into_values().collect();
        assert_eq!(pages.len(), 2);
        assert_ne!(pages[0], pages[1]);
        assert_eq!(page_rotation(&out, pages[1]), 90);
    }

    #[test]
    fn unused_source_pages_are_pruned() {
        let big = vec![fixtures::document(&[(100.0, 100.0, "x"); 20])];
        let full = compose_plan(&big, &(1..=20).map(|p| PageRef::source(DocId(0), p)).collect::<Vec<_>>());
        let one = compose_plan(&big, &[PageRef::source(DocId(0), 3)]);
        assert!(one.objects.len() < full.objects.len());
    }

    #[test]
    fn signature_widgets_are_dropped() {
        let mut sources = docs();
        let sig = sources[0].add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
        });
        let link = sources[0].add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
        });
        let page_id = sources[0].get_pages()[&1];
        sources[0].get_dictionary_mut(page_id).unwrap().set(
            "Annots",
            Object::Array(vec![Object::Reference(sig), Object::Reference(link)]),
        );

        let out = compose_plan(&sources, &[PageRef::source(DocId(0), 1)]);
        let new_page = out.get_pages()[&1];
        let annots = out
            .get_dictionary(new_page)
            .unwrap()
            .get(b"Annots")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(annots.len(), 1);
    }

    #[test]
    fn missing_source_or_page_is_an_error() {
        let sources = docs();
        assert!(matches!(
            compose(|doc| sources.get(doc.0 as usize), &[PageRef::source(DocId(5), 1)]),
            Err(PdfError::MissingDocument(DocId(5)))
        ));
        assert!(matches!(
            compose(|doc| sources.get(doc.0 as usize), &[PageRef::source(DocId(1), 4)]),
            Err(PdfError::PageOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn output_reloads_cleanly() {
        let sources = docs();
        let mut out = compose_plan(&sources, &[PageRef::source(DocId(0), 1), PageRef::blank(10.0, 10.0)]);
        let bytes = crate::logic::document::to_bytes(&mut out).unwrap();
        let reloaded = PdfDocument::from_bytes("out.pdf", &bytes).unwrap();
        assert_eq!(reloaded.page_count(), 2);
        assert!(reloaded.is_page_blank(1).unwrap());
    }
}
