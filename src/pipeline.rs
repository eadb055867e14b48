// src/pipeline.rs

use time::Date;
use tracing::{info, warn};

use crate::dates;
use crate::extract_client::{ExtractedFields, FieldExtractor, parse_fields};
use crate::file_store::FileStore;
use crate::invoice_store::{Invoice, InvoiceStore};
use crate::text_extract::{PdfContent, TextSource};

/// Sentinel vendors, one per failure point. The record always survives
/// with its stored file so the user can correct fields by hand.
pub const VENDOR_UNKNOWN: &str = "Unknown";
pub const VENDOR_PDF_EMPTY: &str = "Unknown (PDF Empty)";
pub const VENDOR_AI_FAILED: &str = "Unknown (AI Failed)";
pub const VENDOR_PARSE_ERROR: &str = "Unknown (Parse Error)";

/// Turns an uploaded document into a persisted invoice.
///
/// Only losing the file store is fatal; every later stage degrades to
/// sentinel data instead of propagating. No stage is retried.
pub struct IngestionPipeline<'a> {
    files: &'a FileStore,
    db: &'a InvoiceStore,
    text_source: &'a dyn TextSource,
    extractor: &'a dyn FieldExtractor,
    initial_status: String,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        files: &'a FileStore,
        db: &'a InvoiceStore,
        text_source: &'a dyn TextSource,
        extractor: &'a dyn FieldExtractor,
        initial_status: impl Into<String>,
    ) -> Self {
        Self {
            files,
            db,
            text_source,
            extractor,
            initial_status: initial_status.into(),
        }
    }

    pub async fn ingest(
        &self,
        file_bytes: &[u8],
        original_filename: &str,
    ) -> Result<Invoice, Box<dyn std::error::Error>> {
        // Stage 1: store the original. There is nothing to degrade to if
        // this fails — no file reference, no invoice.
        let stored_name = self.files.store(file_bytes, original_filename)?;
        let ingested_on = dates::today();

        let mut invoice = Invoice {
            id: None,
            vendor: String::new(),
            invoice_number: None,
            amount: None,
            date: ingested_on,
            category: None,
            status: self.initial_status.clone(),
            file_ref: stored_name,
        };

        // Stages 2-4: text extraction, field extraction, merge. Failures
        // resolve to sentinel data at the point they occur.
        match self.text_source.extract(file_bytes) {
            PdfContent::Text(text) => match self.extractor.extract(&text).await {
                Some(raw) => match parse_fields(&raw) {
                    Ok(fields) => {
                        merge_fields(&mut invoice, fields, ingested_on);
                        info!(
                            filename = %original_filename,
                            vendor = %invoice.vendor,
                            amount = ?invoice.amount,
                            "Fields extracted"
                        );
                    }
                    Err(e) => {
                        warn!(filename = %original_filename, error = %e, "AI response unparseable");
                        invoice.vendor = VENDOR_PARSE_ERROR.to_string();
                    }
                },
                None => {
                    warn!(filename = %original_filename, "Extraction call failed");
                    invoice.vendor = VENDOR_AI_FAILED.to_string();
                }
            },
            PdfContent::ScannedImage => {
                info!(filename = %original_filename, "No extractable text");
                invoice.vendor = VENDOR_PDF_EMPTY.to_string();
            }
            PdfContent::Error(e) => {
                warn!(filename = %original_filename, error = %e, "Text extraction failed");
                invoice.vendor = VENDOR_PDF_EMPTY.to_string();
            }
        }

        let saved = self.db.insert(&invoice)?;
        Ok(saved)
    }
}

/// Merge only the fields the model actually returned; everything absent
/// keeps its default. Dates fall back to the ingestion date, a missing
/// vendor to the plain sentinel.
fn merge_fields(invoice: &mut Invoice, fields: ExtractedFields, ingested_on: Date) {
    invoice.vendor = fields
        .vendor
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| VENDOR_UNKNOWN.to_string());
    invoice.invoice_number = fields.invoice_number;
    invoice.amount = fields.amount;
    invoice.category = fields.category;
    invoice.date = fields
        .date
        .as_deref()
        .and_then(dates::parse_iso)
        .unwrap_or(ingested_on);
}
