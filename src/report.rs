// src/report.rs

use std::collections::HashMap;
use std::io::BufWriter;

use printpdf::*;
use time::Date;

use crate::dates;
use crate::invoice_store::{Invoice, InvoiceStore};

/// Invoices sharing an identical vendor string, with their summed amount.
/// Absent amounts count as zero.
#[derive(Debug)]
pub struct VendorGroup {
    pub vendor: String,
    pub invoices: Vec<Invoice>,
    pub subtotal: f64,
}

/// Aggregated report for an inclusive date range.
#[derive(Debug)]
pub struct PaymentReport {
    pub start: Date,
    pub end: Date,
    pub groups: Vec<VendorGroup>,
    pub grand_total: f64,
}

/// Fetch the range and group by vendor. Grouping is literal string
/// equality — "Costco" and "COSTCO" are distinct groups — in first-seen
/// order over the date-ordered retrieval, so output is deterministic
/// for identical data. An inverted range simply yields an empty report.
pub fn build_report(
    db: &InvoiceStore,
    start: Date,
    end: Date,
) -> Result<PaymentReport, Box<dyn std::error::Error>> {
    let invoices = db.find_by_date_range(start, end)?;

    let mut groups: Vec<VendorGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for invoice in invoices {
        let idx = *index.entry(invoice.vendor.clone()).or_insert_with(|| {
            groups.push(VendorGroup {
                vendor: invoice.vendor.clone(),
                invoices: Vec::new(),
                subtotal: 0.0,
            });
            groups.len() - 1
        });
        groups[idx].subtotal += invoice.amount.unwrap_or(0.0);
        groups[idx].invoices.push(invoice);
    }

    let grand_total = groups.iter().map(|g| g.subtotal).sum();
    Ok(PaymentReport {
        start,
        end,
        groups,
        grand_total,
    })
}

// US Letter dimensions (mm)
const PAGE_W: f32 = 215.9;
const PAGE_H: f32 = 279.4;
const MARGIN_TOP: f32 = 25.4;
const MARGIN_BOTTOM: f32 = 25.4;
const MARGIN_LEFT: f32 = 19.05;
const MARGIN_RIGHT: f32 = 19.05;
const ROW_H: f32 = 5.5;
const FONT_SIZE: f32 = 10.0;
const HEADING_SIZE: f32 = 14.0;
const TITLE_SIZE: f32 = 18.0;

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.len() as f32 * size * 0.18
}

fn money(amount: Option<f64>) -> String {
    format!("${:.2}", amount.unwrap_or(0.0))
}

fn pdf_err(e: impl std::fmt::Debug) -> Box<dyn std::error::Error> {
    format!("{e:?}").into()
}

/// Cursor-style PDF writer: y grows downward from the top margin and a
/// new page is started when a row would cross the bottom margin.
struct ReportPdf {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    y: f32,
}

impl ReportPdf {
    fn new(title: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_err)?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_err)?;
        Ok(Self {
            doc,
            font,
            font_bold,
            page,
            layer,
            y: MARGIN_TOP,
        })
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y + needed > PAGE_H - MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer");
            self.page = page;
            self.layer = layer;
            self.y = MARGIN_TOP;
        }
    }

    fn text(&self, s: &str, x: f32, size: f32, bold: bool) {
        let font = if bold { &self.font_bold } else { &self.font };
        let layer = self.doc.get_page(self.page).get_layer(self.layer);
        layer.use_text(s, size, Mm(x), Mm(PAGE_H - self.y), font);
    }

    fn line(&mut self, s: &str, size: f32, bold: bool) {
        self.ensure_space(ROW_H);
        self.text(s, MARGIN_LEFT, size, bold);
        self.y += ROW_H;
    }

    fn line_centered(&mut self, s: &str, size: f32, bold: bool) {
        self.ensure_space(ROW_H);
        let x = (PAGE_W - approx_text_width(s, size)) / 2.0;
        self.text(s, x.max(MARGIN_LEFT), size, bold);
        self.y += ROW_H;
    }

    fn line_right(&mut self, s: &str, size: f32, bold: bool) {
        self.ensure_space(ROW_H);
        let x = PAGE_W - MARGIN_RIGHT - approx_text_width(s, size);
        self.text(s, x.max(MARGIN_LEFT), size, bold);
        self.y += ROW_H;
    }

    fn table_row(&mut self, cells: [&str; 3], bold: bool) {
        self.ensure_space(ROW_H);
        // Date | Invoice # | Amount (amount right-aligned)
        self.text(cells[0], MARGIN_LEFT, FONT_SIZE, bold);
        self.text(cells[1], MARGIN_LEFT + 55.0, FONT_SIZE, bold);
        let amount_x = PAGE_W - MARGIN_RIGHT - approx_text_width(cells[2], FONT_SIZE);
        self.text(cells[2], amount_x, FONT_SIZE, bold);
        self.y += ROW_H;
    }

    fn divider(&mut self) {
        self.ensure_space(ROW_H);
        let layer = self.doc.get_page(self.page).get_layer(self.layer);
        layer.set_outline_thickness(0.5);
        let line = Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(PAGE_H - self.y)), false),
                (
                    Point::new(Mm(PAGE_W - MARGIN_RIGHT), Mm(PAGE_H - self.y)),
                    false,
                ),
            ],
            is_closed: false,
        };
        layer.add_line(line);
        self.y += ROW_H;
    }

    fn blank(&mut self) {
        self.y += ROW_H / 2.0;
    }

    fn into_bytes(self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(pdf_err)?;
        Ok(buf.into_inner().map_err(pdf_err)?)
    }
}

/// Render the aggregated report as a PDF document: centered title and
/// period, one section per vendor group, a bold grand total at the end.
pub fn render_pdf(report: &PaymentReport) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut pdf = ReportPdf::new("Weekly Payment Report")?;

    pdf.line_centered("Weekly Payment Report", TITLE_SIZE, true);
    pdf.blank();
    let period = format!(
        "Period: {} to {}",
        dates::to_iso(report.start),
        dates::to_iso(report.end)
    );
    pdf.line_centered(&period, FONT_SIZE, false);
    pdf.blank();

    for group in &report.groups {
        pdf.line(&group.vendor.to_uppercase(), HEADING_SIZE, true);
        pdf.table_row(["Date", "Invoice #", "Amount"], true);
        for invoice in &group.invoices {
            let date = dates::to_iso(invoice.date);
            let number = invoice.invoice_number.as_deref().unwrap_or("N/A");
            // Absent amounts render as $0.00 and contribute 0 to totals.
            pdf.table_row([&date, number, &money(invoice.amount)], false);
        }
        let subtotal = format!("Total for {}: {}", group.vendor, money(Some(group.subtotal)));
        pdf.line_right(&subtotal, FONT_SIZE, false);
        pdf.divider();
    }

    pdf.blank();
    let grand = format!("GRAND TOTAL: {}", money(Some(report.grand_total)));
    pdf.line_right(&grand, HEADING_SIZE, true);

    pdf.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn invoice(vendor: &str, day: Date, amount: Option<f64>) -> Invoice {
        Invoice {
            id: None,
            vendor: vendor.to_string(),
            invoice_number: None,
            amount,
            date: day,
            category: None,
            status: "On Payment Term".to_string(),
            file_ref: "x_y.pdf".to_string(),
        }
    }

    fn seeded_db() -> InvoiceStore {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&invoice("Costco", date!(2025 - 06 - 02), Some(100.0))).unwrap();
        db.insert(&invoice("Costco", date!(2025 - 06 - 03), Some(50.0))).unwrap();
        db.insert(&invoice("Pepsi", date!(2025 - 06 - 03), Some(25.0))).unwrap();
        db
    }

    #[test]
    fn test_grouping_subtotals_and_grand_total() {
        let db = seeded_db();
        let report = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();

        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].vendor, "Costco");
        assert_eq!(report.groups[0].invoices.len(), 2);
        assert_eq!(report.groups[0].subtotal, 150.0);
        assert_eq!(report.groups[1].vendor, "Pepsi");
        assert_eq!(report.groups[1].subtotal, 25.0);
        assert_eq!(report.grand_total, 175.0);
    }

    #[test]
    fn test_group_order_is_stable_across_builds() {
        let db = seeded_db();
        let a = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();
        let b = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();
        let vendors_a: Vec<_> = a.groups.iter().map(|g| g.vendor.clone()).collect();
        let vendors_b: Vec<_> = b.groups.iter().map(|g| g.vendor.clone()).collect();
        assert_eq!(vendors_a, vendors_b);
    }

    #[test]
    fn test_vendor_equality_is_case_sensitive() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&invoice("Costco", date!(2025 - 06 - 02), Some(1.0))).unwrap();
        db.insert(&invoice("COSTCO", date!(2025 - 06 - 02), Some(2.0))).unwrap();

        let report = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();
        assert_eq!(report.groups.len(), 2);
    }

    #[test]
    fn test_absent_amount_counts_as_zero() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&invoice("Costco", date!(2025 - 06 - 02), None)).unwrap();
        db.insert(&invoice("Costco", date!(2025 - 06 - 03), Some(40.0))).unwrap();

        let report = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();
        assert_eq!(report.groups[0].invoices.len(), 2);
        assert_eq!(report.groups[0].subtotal, 40.0);
        assert_eq!(report.grand_total, 40.0);
    }

    #[test]
    fn test_empty_range_is_an_empty_report_not_an_error() {
        let db = seeded_db();
        let report = build_report(&db, date!(2030 - 01 - 01), date!(2030 - 01 - 07)).unwrap();
        assert!(report.groups.is_empty());
        assert_eq!(report.grand_total, 0.0);

        let bytes = render_pdf(&report).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_inverted_range_is_empty_not_an_error() {
        let db = seeded_db();
        let report = build_report(&db, date!(2025 - 06 - 07), date!(2025 - 06 - 01)).unwrap();
        assert!(report.groups.is_empty());
        assert_eq!(report.grand_total, 0.0);
    }

    #[test]
    fn test_render_produces_a_pdf() {
        let db = seeded_db();
        let report = build_report(&db, date!(2025 - 06 - 01), date!(2025 - 06 - 07)).unwrap();
        let bytes = render_pdf(&report).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(Some(150.0)), "$150.00");
        assert_eq!(money(Some(12.345)), "$12.35");
        assert_eq!(money(None), "$0.00");
    }
}
