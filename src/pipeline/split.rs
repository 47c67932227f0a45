//! Page splitting: turn one multi-page PDF into standalone one-page PDFs.
//!
//! Splitting is structural. Each output keeps the original page object and
//! everything it references (content streams, fonts, images) byte-for-byte;
//! nothing is re-rendered. The page tree is cut down to the single page and
//! unreachable objects are pruned, so every output opens as a 1-page PDF.
//!
//! Attributes a page inherits from its ancestors in the page tree
//! (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are copied onto the page
//! itself before the tree is rewritten, otherwise a page would lose its
//! fonts or its size when its intermediate `Pages` node is pruned.

use super::PageDocument;
use crate::error::OcrError;
use lopdf::{Document, Object, ObjectId};
use std::path::Path;
use tracing::debug;

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Catalog entries that can keep other pages reachable after the tree is cut.
const CATALOG_PAGE_REFS: [&[u8]; 7] = [
    b"Outlines",
    b"Names",
    b"Dests",
    b"OpenAction",
    b"AcroForm",
    b"StructTreeRoot",
    b"PageLabels",
];

/// Guard against cyclic `Parent` links in broken files.
const MAX_TREE_DEPTH: usize = 64;

/// A parsed PDF ready to be split.
#[derive(Debug, Clone)]
pub struct PdfSource {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfSource {
    /// Parse PDF bytes. Fails with [`OcrError::MalformedDocument`] when the
    /// bytes are not a paginated PDF.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OcrError> {
        let doc = Document::load_mem(bytes).map_err(|e| OcrError::MalformedDocument {
            detail: e.to_string(),
        })?;
        Self::from_document(doc)
    }

    /// Parse a PDF file from disk.
    pub fn load(path: &Path) -> Result<Self, OcrError> {
        let doc = Document::load(path).map_err(|e| OcrError::MalformedDocument {
            detail: format!("{}: {}", path.display(), e),
        })?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> Result<Self, OcrError> {
        root_pages_id(&doc).map_err(|detail| OcrError::MalformedDocument { detail })?;
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        debug!("PDF parsed: {} pages", page_ids.len());
        Ok(Self { doc, page_ids })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Extract page `page_num` (1-indexed) as a standalone document.
    pub fn extract_page(&self, page_num: usize) -> Result<PageDocument, OcrError> {
        let page_id = page_num
            .checked_sub(1)
            .and_then(|i| self.page_ids.get(i))
            .copied()
            .ok_or_else(|| OcrError::Internal(format!(
                "page {} out of range (document has {} pages)",
                page_num,
                self.page_count()
            )))?;

        let mut doc = self.doc.clone();
        isolate_page(&mut doc, page_id).map_err(|detail| OcrError::MalformedDocument {
            detail: format!("page {page_num}: {detail}"),
        })?;
        doc.prune_objects();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| OcrError::MalformedDocument {
                detail: format!("page {page_num}: cannot serialise: {e}"),
            })?;
        debug!("Extracted page {} → {} bytes", page_num, bytes.len());
        Ok(PageDocument::new(page_num, bytes))
    }

    /// Every page, in order. `result[i].page_num == i + 1`.
    pub fn split(&self) -> Result<Vec<PageDocument>, OcrError> {
        (1..=self.page_count())
            .map(|n| self.extract_page(n))
            .collect()
    }
}

/// Number of pages in a PDF held in memory.
pub fn page_count(bytes: &[u8]) -> Result<usize, OcrError> {
    PdfSource::from_bytes(bytes).map(|s| s.page_count())
}

fn root_pages_id(doc: &Document) -> Result<ObjectId, String> {
    doc.catalog()
        .and_then(|c| c.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| format!("no page tree: {e}"))
}

/// Rewrite `doc` so its page tree holds only `page_id`.
fn isolate_page(doc: &mut Document, page_id: ObjectId) -> Result<(), String> {
    let pages_id = root_pages_id(doc)?;
    let inherited = inherited_attributes(doc, page_id);

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("page object: {e}"))?;
    for (key, value) in inherited {
        page.set(key, value);
    }
    page.set("Parent", pages_id);

    let pages = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("page tree root: {e}"))?;
    pages.set("Kids", vec![Object::from(page_id)]);
    pages.set("Count", 1);

    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| format!("trailer root: {e}"))?;
    if let Ok(catalog) = doc.get_object_mut(root_id).and_then(Object::as_dict_mut) {
        for key in CATALOG_PAGE_REFS {
            catalog.remove(key);
        }
    }
    Ok(())
}

/// Inheritable attributes the page does not set itself, nearest ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let mut found = Vec::new();
    let Ok(page) = doc.get_dictionary(page_id) else {
        return found;
    };
    let mut missing: Vec<&[u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    found
}
