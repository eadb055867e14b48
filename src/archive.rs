// src/archive.rs

use regex::Regex;
use std::io::{Cursor, Write};
use time::Date;
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::dates;
use crate::file_store::FileStore;
use crate::invoice_store::{Invoice, InvoiceStore};
use crate::report;

/// Fixed name of the rendered report, always the first archive entry.
const REPORT_ENTRY: &str = "Weekly_Summary_Report.pdf";

/// Subfolder holding the original source documents.
const PROOFS_DIR: &str = "Proofs";

/// Build the downloadable archive for a date range: the rendered report
/// first, then one entry per invoice whose original file is still
/// retrievable. A missing original skips that invoice, never the bundle;
/// only failing to assemble the container itself is an error.
pub fn bundle(
    db: &InvoiceStore,
    files: &FileStore,
    start: Date,
    end: Date,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let rendered = report::render_pdf(&report::build_report(db, start, end)?)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(REPORT_ENTRY, options)?;
    zip.write_all(&rendered)?;

    let sanitizer = Regex::new("[^A-Za-z0-9 ]")?;
    let mut added = 0usize;
    let mut skipped = 0usize;
    for invoice in db.find_by_date_range(start, end)? {
        let Some(bytes) = files.retrieve(&invoice.file_ref) else {
            warn!(file_ref = %invoice.file_ref, invoice_id = ?invoice.id, "Original missing — skipped");
            skipped += 1;
            continue;
        };
        zip.start_file(proof_entry_name(&sanitizer, &invoice), options)?;
        zip.write_all(&bytes)?;
        added += 1;
    }

    info!(added, skipped, "Archive assembled");
    Ok(zip.finish()?.into_inner())
}

/// "Proofs/Costco 15-December-2025 #INV123.pdf". The trailing component
/// is the invoice number or, when absent, the record id — which is what
/// keeps two same-vendor same-date entries distinct.
fn proof_entry_name(sanitizer: &Regex, invoice: &Invoice) -> String {
    let safe_vendor = sanitizer
        .replace_all(&invoice.vendor, "")
        .trim()
        .to_string();
    let number = invoice
        .invoice_number
        .clone()
        .unwrap_or_else(|| invoice.id.unwrap_or(0).to_string());
    format!(
        "{PROOFS_DIR}/{safe_vendor} {} #{number}.pdf",
        dates::to_long(invoice.date)
    )
}
