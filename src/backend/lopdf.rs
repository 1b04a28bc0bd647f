//! In-process backend built on the `lopdf` parser.
//!
//! First in almost every fallback chain: no external dependency, exact
//! page-subset semantics, and the only adapter that can stamp page numbers.
//! All lopdf work is CPU-bound and runs under `spawn_blocking` so the async
//! workers never stall on a large document.
//!
//! Merge uses object-ID remapping into a destination document; split uses
//! delete-the-complement plus object pruning. Both keep each input's
//! internal page order.

use crate::backend::{Backend, BackendKind, Invocation, Operation, Outcome};
use crate::document::{DocumentHandle, Workspace};
use crate::error::BackendFailure;
use crate::format::{PageNumberSpec, Position, RotationSpec};
use crate::selector::PageSelector;
use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Font resource name used for page-number stamps. Deliberately unusual so
/// it cannot collide with a document's own `/F1`-style resource names.
const STAMP_FONT: &str = "Fpml";

pub struct LopdfBackend;

impl LopdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LopdfBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for LopdfBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lopdf
    }

    fn supports(&self, op: Operation) -> bool {
        !matches!(op, Operation::Ocr)
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        // Everything lopdf does is blocking CPU work; stage owned copies of
        // the request and move them onto the blocking pool.
        match request {
            Invocation::PageCount { doc } => {
                let path = doc.path().to_path_buf();
                blocking(move || {
                    let doc = load(&path)?;
                    Ok(Outcome::Count(doc.get_pages().len()))
                })
                .await
            }
            Invocation::ExtractText { doc, pages } => {
                let path = doc.path().to_path_buf();
                let pages = pages.cloned();
                blocking(move || {
                    let doc = load(&path)?;
                    let wanted: Vec<u32> = match pages {
                        Some(sel) => sel.pages().to_vec(),
                        None => doc.get_pages().keys().copied().collect(),
                    };
                    if wanted.is_empty() {
                        return Ok(Outcome::Text(String::new()));
                    }
                    // A page with no text layer extracts to empty, which is
                    // exactly the contract; only a parse failure is an error.
                    let text = doc.extract_text(&wanted).unwrap_or_default();
                    Ok(Outcome::Text(text))
                })
                .await
            }
            Invocation::Rotate { doc, spec } => {
                let path = doc.path().to_path_buf();
                let spec = spec.clone();
                let ws = workspace.clone();
                blocking(move || {
                    let mut doc = load(&path)?;
                    apply_rotations(&mut doc, &spec);
                    Ok(Outcome::Document(save_into(doc, &ws, "rotated.pdf")?))
                })
                .await
            }
            Invocation::Merge { docs } => {
                let paths: Vec<PathBuf> = docs.iter().map(|d| d.path().to_path_buf()).collect();
                let ws = workspace.clone();
                blocking(move || {
                    let loaded = paths.iter().map(|p| load(p)).collect::<Result<_, _>>()?;
                    let merged = merge_documents(loaded)?;
                    Ok(Outcome::Document(save_into(merged, &ws, "merged.pdf")?))
                })
                .await
            }
            Invocation::Split { doc, parts } => {
                let path = doc.path().to_path_buf();
                let parts = parts.to_vec();
                let ws = workspace.clone();
                blocking(move || {
                    let base = load(&path)?;
                    let mut outputs = Vec::with_capacity(parts.len());
                    for (i, selector) in parts.iter().enumerate() {
                        let part = extract_pages(&base, selector)?;
                        outputs.push(save_into(part, &ws, &format!("part-{}.pdf", i + 1))?);
                    }
                    Ok(Outcome::Documents(outputs))
                })
                .await
            }
            Invocation::Paginate { doc, spec, targets } => {
                let path = doc.path().to_path_buf();
                let spec = spec.clone();
                let targets = targets.clone();
                let ws = workspace.clone();
                blocking(move || {
                    let mut doc = load(&path)?;
                    stamp_page_numbers(&mut doc, &spec, &targets)?;
                    Ok(Outcome::Document(save_into(doc, &ws, "numbered.pdf")?))
                })
                .await
            }
            Invocation::Ocr { .. } => unreachable!("lopdf does not register for ocr"),
        }
    }
}

// ── Blocking helpers ─────────────────────────────────────────────────────

async fn blocking<F>(work: F) -> Result<Outcome, BackendFailure>
where
    F: FnOnce() -> Result<Outcome, BackendFailure> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| {
            // A panic inside lopdf means the input defeated the parser.
            Err(BackendFailure::Corrupt {
                detail: format!("lopdf task panicked: {e}"),
            })
        })
}

fn load(path: &Path) -> Result<Document, BackendFailure> {
    Document::load(path).map_err(|e| BackendFailure::Corrupt {
        detail: e.to_string(),
    })
}

fn save_into(
    mut doc: Document,
    workspace: &Workspace,
    name: &str,
) -> Result<DocumentHandle, BackendFailure> {
    let path = workspace.scratch_path(name);
    doc.save(&path).map_err(|e| BackendFailure::Corrupt {
        detail: format!("failed to serialize output: {e}"),
    })?;
    Ok(workspace.adopt(path))
}

// ── Rotation ─────────────────────────────────────────────────────────────

/// Add each page's net rotation delta to its existing `/Rotate` value,
/// mod 360. Pages with a zero delta are left byte-identical.
fn apply_rotations(doc: &mut Document, spec: &RotationSpec) {
    let pages: BTreeMap<u32, ObjectId> = doc.get_pages();
    for (page_num, page_id) in pages {
        let delta = spec.delta_for(page_num);
        if delta == 0 {
            continue;
        }
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            let current = dict
                .get(b"Rotate")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(0);
            let next = (current + delta as i64).rem_euclid(360);
            dict.set("Rotate", Object::Integer(next));
            debug!("page {page_num}: /Rotate {current} -> {next}");
        }
    }
}

// ── Merge ────────────────────────────────────────────────────────────────

/// Merge documents by importing every object of each source into the first
/// one with remapped IDs, then rebuilding the page tree so output page order
/// is the concatenation of the inputs.
pub(crate) fn merge_documents(mut docs: Vec<Document>) -> Result<Document, BackendFailure> {
    if docs.is_empty() {
        return Err(BackendFailure::Corrupt {
            detail: "nothing to merge".into(),
        });
    }
    if docs.len() == 1 {
        return Ok(docs.remove(0));
    }

    let mut dest = docs.remove(0);
    let mut max_id = dest.max_id;
    let mut page_order: Vec<ObjectId> = dest.get_pages().values().copied().collect();

    for source in docs {
        let offset = max_id;
        let source_pages: Vec<ObjectId> = source.get_pages().values().copied().collect();
        max_id = (source.max_id + offset).max(max_id);

        for (old_id, object) in source.objects {
            dest.objects
                .insert((old_id.0 + offset, old_id.1), shift_refs(object, offset));
        }
        page_order.extend(source_pages.iter().map(|id| (id.0 + offset, id.1)));
    }

    rebuild_page_tree(&mut dest, &page_order)?;
    dest.max_id = max_id;
    dest.compress();
    Ok(dest)
}

/// Recursively add `offset` to every object reference.
fn shift_refs(object: Object, offset: u32) -> Object {
    match object {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(items) => {
            Object::Array(items.into_iter().map(|o| shift_refs(o, offset)).collect())
        }
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = shift_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = shift_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the catalog's page tree at `page_order`, reparenting every page.
fn rebuild_page_tree(doc: &mut Document, page_order: &[ObjectId]) -> Result<(), BackendFailure> {
    let corrupt = |detail: &str| BackendFailure::Corrupt {
        detail: detail.to_string(),
    };

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .map_err(|_| corrupt("trailer has no /Root reference"))?;
    let pages_id = doc
        .get_object(catalog_id)
        .and_then(|o| o.as_dict())
        .and_then(|d| d.get(b"Pages"))
        .and_then(|o| o.as_reference())
        .map_err(|_| corrupt("catalog has no /Pages reference"))?;

    match doc.get_object_mut(pages_id) {
        Ok(Object::Dictionary(pages_dict)) => {
            pages_dict.set(
                "Kids",
                Object::Array(page_order.iter().map(|&id| Object::Reference(id)).collect()),
            );
            pages_dict.set("Count", Object::Integer(page_order.len() as i64));
        }
        _ => return Err(corrupt("page tree root is not a dictionary")),
    }

    // Imported pages still point at their old parent node.
    for &page_id in page_order {
        if let Ok(Object::Dictionary(page_dict)) = doc.get_object_mut(page_id) {
            page_dict.set("Parent", Object::Reference(pages_id));
        }
    }
    Ok(())
}

// ── Split ────────────────────────────────────────────────────────────────

/// Produce a document containing exactly the selector's pages, in ascending
/// order, by deleting the complement and pruning unreachable objects.
fn extract_pages(base: &Document, selector: &PageSelector) -> Result<Document, BackendFailure> {
    if selector.is_empty() {
        return Err(BackendFailure::Corrupt {
            detail: "empty page selection".into(),
        });
    }
    let total = base.get_pages().len() as u32;
    let mut doc = base.clone();

    let mut to_delete: Vec<u32> = (1..=total).filter(|p| !selector.contains(*p)).collect();
    // Reverse order keeps the remaining indices stable while deleting.
    to_delete.reverse();
    for page in to_delete {
        doc.delete_pages(&[page]);
    }

    doc.prune_objects();
    doc.compress();
    Ok(doc)
}

// ── Page numbering ───────────────────────────────────────────────────────

/// Stamp a formatted label onto every target page by appending a small
/// content stream and a shared Helvetica font resource.
fn stamp_page_numbers(
    doc: &mut Document,
    spec: &PageNumberSpec,
    targets: &PageSelector,
) -> Result<(), BackendFailure> {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    let font_id = doc.add_object(Object::Dictionary(font));

    let pages: BTreeMap<u32, ObjectId> = doc.get_pages();
    for (&page_num, &page_id) in &pages {
        if !targets.contains(page_num) {
            continue;
        }
        let label = spec.label_for(page_num);
        let (width, height) = page_size(doc, page_id);
        let (x, y) = label_anchor(spec, &label, width, height);

        let content = format!(
            "q\nBT\n/{STAMP_FONT} {size} Tf\n{x:.2} {y:.2} Td\n({text}) Tj\nET\nQ",
            size = spec.font_size,
            text = escape_pdf_string(&label),
        );
        let stamp_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        append_content(doc, page_id, stamp_id)?;
        ensure_font_resource(doc, page_id, font_id)?;
    }
    Ok(())
}

/// Page dimensions from `/MediaBox`, falling back to US Letter when the
/// entry is absent or inherited out of reach.
fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .and_then(|d| d.get(b"MediaBox"))
        .and_then(|o| o.as_array())
        .ok()
        .map(|arr| {
            let coord = |i: usize| -> f32 {
                match arr.get(i) {
                    Some(Object::Integer(v)) => *v as f32,
                    Some(Object::Real(v)) => *v,
                    _ => 0.0,
                }
            };
            (coord(2) - coord(0), coord(3) - coord(1))
        });
    match media_box {
        Some((w, h)) if w > 0.0 && h > 0.0 => (w, h),
        _ => (612.0, 792.0),
    }
}

/// Text-origin coordinates for the label. Width is estimated at half an em
/// per glyph, close enough for margin-anchored placement of short labels.
fn label_anchor(spec: &PageNumberSpec, label: &str, width: f32, height: f32) -> (f32, f32) {
    let est_width = label.chars().count() as f32 * spec.font_size * 0.5;
    let x = match spec.position {
        Position::TopLeft | Position::BottomLeft => spec.margin_x,
        Position::TopCenter | Position::BottomCenter => (width - est_width) / 2.0,
        Position::TopRight | Position::BottomRight => width - spec.margin_x - est_width,
    };
    let y = if spec.position.is_top() {
        height - spec.margin_y - spec.font_size
    } else {
        spec.margin_y
    };
    (x.max(0.0), y.max(0.0))
}

fn escape_pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Append `stamp_id` to the page's `/Contents`, promoting a single reference
/// to an array when needed.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    stamp_id: ObjectId,
) -> Result<(), BackendFailure> {
    let page = doc.get_object_mut(page_id).map_err(|e| BackendFailure::Corrupt {
        detail: format!("page object missing: {e}"),
    })?;
    let Object::Dictionary(dict) = page else {
        return Err(BackendFailure::Corrupt {
            detail: "page object is not a dictionary".into(),
        });
    };
    let contents = match dict.get(b"Contents").ok().cloned() {
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(stamp_id));
            Object::Array(items)
        }
        Some(single) => Object::Array(vec![single, Object::Reference(stamp_id)]),
        None => Object::Reference(stamp_id),
    };
    dict.set("Contents", contents);
    Ok(())
}

/// Make the stamp font reachable from the page's `/Resources/Font` dict,
/// following one level of indirection if `/Resources` is a reference.
fn ensure_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<(), BackendFailure> {
    let resources_entry = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .ok()
        .and_then(|d| d.get(b"Resources").ok().cloned());

    match resources_entry {
        Some(Object::Reference(res_id)) => {
            if let Ok(Object::Dictionary(res)) = doc.get_object_mut(res_id) {
                set_font_entry(res, font_id);
            }
        }
        Some(Object::Dictionary(mut res)) => {
            set_font_entry(&mut res, font_id);
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                page.set("Resources", Object::Dictionary(res));
            }
        }
        _ => {
            // No resources at all (or inherited): give the page its own.
            let mut res = Dictionary::new();
            set_font_entry(&mut res, font_id);
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                page.set("Resources", Object::Dictionary(res));
            }
        }
    }
    Ok(())
}

fn set_font_entry(resources: &mut Dictionary, font_id: ObjectId) {
    let mut fonts = match resources.get(b"Font").ok().cloned() {
        Some(Object::Dictionary(d)) => d,
        _ => Dictionary::new(),
    };
    fonts.set(STAMP_FONT, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
}

/// Merge already-materialized PDF files into one byte buffer. Used by the
/// OCR adapter to reassemble per-page tesseract output without shelling out
/// a second time.
pub(crate) fn merge_files(paths: &[PathBuf]) -> Result<Vec<u8>, BackendFailure> {
    let docs = paths.iter().map(|p| load(p)).collect::<Result<Vec<_>, _>>()?;
    let mut merged = merge_documents(docs)?;
    let mut buffer = Vec::new();
    merged
        .save_to(&mut buffer)
        .map_err(|e| BackendFailure::Corrupt {
            detail: format!("failed to serialize merged output: {e}"),
        })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal n-page PDF built object-by-object, one text line per page.
    fn fixture_pdf(num_pages: u32) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for i in 0..num_pages {
            let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Object::Stream(Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            )));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Contents", Object::Reference(content_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            );
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(num_pages as i64));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    fn roundtrip(mut doc: Document) -> Document {
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        Document::load_mem(&buf).unwrap()
    }

    #[test]
    fn merge_concatenates_in_input_order() {
        let merged = merge_documents(vec![fixture_pdf(2), fixture_pdf(3), fixture_pdf(1)]).unwrap();
        assert_eq!(roundtrip(merged).get_pages().len(), 6);
    }

    #[test]
    fn merge_single_document_is_identity() {
        let merged = merge_documents(vec![fixture_pdf(4)]).unwrap();
        assert_eq!(merged.get_pages().len(), 4);
    }

    #[test]
    fn merge_empty_fails() {
        assert!(merge_documents(vec![]).is_err());
    }

    #[test]
    fn extract_keeps_selected_pages_only() {
        let base = fixture_pdf(5);
        let sel = PageSelector::from_pages([2, 4], 5);
        let part = extract_pages(&base, &sel).unwrap();
        assert_eq!(roundtrip(part).get_pages().len(), 2);
    }

    #[test]
    fn extract_empty_selector_fails() {
        let base = fixture_pdf(3);
        let sel = PageSelector::from_pages([], 3);
        assert!(extract_pages(&base, &sel).is_err());
    }

    #[test]
    fn rotation_accumulates_on_existing_value() {
        let mut doc = fixture_pdf(2);
        let spec = RotationSpec::uniform(PageSelector::from_pages([1], 2), 90);
        apply_rotations(&mut doc, &spec);
        apply_rotations(&mut doc, &spec);

        let pages = doc.get_pages();
        let rotate_of = |doc: &Document, id: ObjectId| {
            doc.get_object(id)
                .and_then(|o| o.as_dict())
                .ok()
                .and_then(|d| d.get(b"Rotate").ok())
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(0)
        };
        assert_eq!(rotate_of(&doc, pages[&1]), 180);
        assert_eq!(rotate_of(&doc, pages[&2]), 0);
    }

    #[test]
    fn four_quarter_turns_return_to_zero() {
        let mut doc = fixture_pdf(1);
        let spec = RotationSpec::uniform(PageSelector::all(1), 90);
        for _ in 0..4 {
            apply_rotations(&mut doc, &spec);
        }
        let pages = doc.get_pages();
        let rotate = doc
            .get_object(pages[&1])
            .and_then(|o| o.as_dict())
            .ok()
            .and_then(|d| d.get(b"Rotate").ok())
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        assert_eq!(rotate, 0);
    }

    #[test]
    fn stamping_appends_content_and_font() {
        let mut doc = fixture_pdf(3);
        let spec = PageNumberSpec::default();
        let targets = PageSelector::all(3);
        stamp_page_numbers(&mut doc, &spec, &targets).unwrap();

        let doc = roundtrip(doc);
        for (_, page_id) in doc.get_pages() {
            let dict = doc.get_object(page_id).unwrap().as_dict().unwrap();
            // Contents promoted to a two-element array: original + stamp.
            let contents = dict.get(b"Contents").unwrap().as_array().unwrap();
            assert_eq!(contents.len(), 2);
            let resources = dict.get(b"Resources").unwrap().as_dict().unwrap();
            let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
            assert!(fonts.get(STAMP_FONT.as_bytes()).is_ok());
        }
    }

    #[test]
    fn pdf_string_escaping() {
        assert_eq!(escape_pdf_string("p. (1)"), "p. \\(1\\)");
        assert_eq!(escape_pdf_string("a\\b"), "a\\\\b");
    }
}
