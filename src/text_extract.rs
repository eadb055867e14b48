// src/text_extract.rs

use lopdf::{Dictionary, Document};
use tracing::{info, warn};

/// Result of attempting to extract text from an uploaded document.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned / image-only.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

/// Seam the ingestion pipeline uses for the text-extraction capability.
pub trait TextSource: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> PdfContent;
}

/// Production implementation backed by lopdf + pdf-extract.
pub struct PdfTextSource;

impl TextSource for PdfTextSource {
    fn extract(&self, bytes: &[u8]) -> PdfContent {
        extract_text_from_pdf(bytes)
    }
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Takes raw PDF bytes and classifies their content.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    // Structural check first: a document whose pages carry images but no
    // fonts will not yield text no matter what the extractor does.
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short — treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            PdfContent::ScannedImage
        }
    }
}

/// Heuristic: if ≥80% of pages have XObject images but no Font resources,
/// treat the whole document as a scan.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell — let text extraction try
    }

    let image_only_pages = pages
        .values()
        .filter_map(|object_id| doc.get_object(*object_id).ok()?.as_dict().ok())
        .filter(|page| {
            resource_entry_nonempty(doc, page, b"XObject")
                && !resource_entry_nonempty(doc, page, b"Font")
        })
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );
    ratio >= 0.8
}

/// True when the page's Resources dictionary has a non-empty entry
/// under `key`, following indirect references.
fn resource_entry_nonempty(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|v| doc.dereference(v).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|dict| !dict.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_an_error() {
        let result = extract_text_from_pdf(b"this is not a pdf");
        assert!(matches!(result, PdfContent::Error(_)));
    }

    #[test]
    fn test_empty_bytes_are_an_error() {
        assert!(matches!(extract_text_from_pdf(b""), PdfContent::Error(_)));
    }
}
