//! PDF merge and split, on top of `lopdf`.
//!
//! Both operations work purely on in-memory buffers; writing results to the
//! upload directory is the caller's job.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use thiserror::Error;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against cyclic `Parent` chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("at least two PDFs are required, got {0}")]
    TooFewInputs(usize),

    #[error("input {index} is not a valid PDF: {reason}")]
    InvalidInput { index: usize, reason: String },

    #[error("failed to write merged PDF: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("input is not a valid PDF: {0}")]
    InvalidInput(String),

    #[error("document has no pages")]
    NoPages,

    #[error("failed to write page {page}: {reason}")]
    Write { page: u32, reason: String },
}

/// Merge PDFs in the given order into one document.
///
/// Page order follows input order. Outlines and document-level catalog
/// entries of the inputs are not carried over.
pub fn merge<B: AsRef<[u8]>>(inputs: &[B]) -> Result<Vec<u8>, MergeError> {
    if inputs.len() < 2 {
        return Err(MergeError::TooFewInputs(inputs.len()));
    }

    let mut merged = Document::with_version("1.5");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut max_id = 1;

    for (i, input) in inputs.iter().enumerate() {
        let index = i + 1;
        let mut doc = Document::load_mem(input.as_ref()).map_err(|e| MergeError::InvalidInput {
            index,
            reason: e.to_string(),
        })?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let page = flatten_page(&doc, page_id)
                .map_err(|reason| MergeError::InvalidInput { index, reason })?;
            pages.push((page_id, page));
        }

        for (id, object) in std::mem::take(&mut doc.objects) {
            if !is_structural(&object) {
                merged.objects.insert(id, object);
            }
        }
    }

    let pages_id = (max_id, 0);
    let catalog_id = (max_id + 1, 0);

    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);
    merged.max_id = catalog_id.0;

    merged.renumber_objects();
    merged.prune_objects();
    merged.compress();

    let mut out = Vec::new();
    merged
        .save_to(&mut out)
        .map_err(|e| MergeError::Write(e.to_string()))?;
    Ok(out)
}

/// Split a PDF into single-page documents, in page order
pub fn split(input: &[u8]) -> Result<Vec<Vec<u8>>, SplitError> {
    let doc = Document::load_mem(input).map_err(|e| SplitError::InvalidInput(e.to_string()))?;

    let page_numbers: Vec<u32> = doc.get_pages().into_keys().collect();
    if page_numbers.is_empty() {
        return Err(SplitError::NoPages);
    }

    page_numbers
        .iter()
        .map(|&keep| {
            let others: Vec<u32> = page_numbers.iter().copied().filter(|&n| n != keep).collect();

            let mut single = doc.clone();
            single.delete_pages(&others);
            single.prune_objects();
            single.compress();

            let mut out = Vec::new();
            single.save_to(&mut out).map_err(|e| SplitError::Write {
                page: keep,
                reason: e.to_string(),
            })?;
            Ok(out)
        })
        .collect()
}

/// Number of pages, or `None` if the buffer is not a readable PDF
#[cfg(test)]
pub fn page_count(input: &[u8]) -> Option<usize> {
    Document::load_mem(input).ok().map(|doc| doc.get_pages().len())
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()?
        .get(b"Type")
        .and_then(Object::as_name)
        .ok()
}

/// Page-tree and outline nodes are rebuilt, not copied
fn is_structural(object: &Object) -> bool {
    matches!(
        type_name(object),
        Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline")
    )
}

/// A copy of the page dictionary with inherited attributes made explicit,
/// so it can be re-parented under a flat page tree.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, String> {
    let mut page = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("page {:?}: {}", page_id, e))?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    Ok(page)
}
