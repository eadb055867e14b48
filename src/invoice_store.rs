use rusqlite::{Connection, Result as SqliteResult, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::Date;
use tracing::info;

use crate::dates;

pub struct InvoiceStore {
    conn: Connection,
}

/// A persisted invoice record. `vendor`, `date`, `status` and `file_ref`
/// are always populated once ingestion completes; the pipeline substitutes
/// sentinels when extraction cannot determine them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Option<i64>,
    pub vendor: String,
    pub invoice_number: Option<String>,
    pub amount: Option<f64>,
    #[serde(with = "dates::serde_iso")]
    pub date: Date,
    pub category: Option<String>,
    pub status: String,
    /// Stored name of the original document in the file store. Immutable.
    pub file_ref: String,
}

/// Editable subset of an invoice. Status has its own operation and the
/// file reference is set once at ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceEdit {
    pub vendor: String,
    pub invoice_number: Option<String>,
    pub amount: Option<f64>,
    #[serde(with = "dates::serde_iso")]
    pub date: Date,
    pub category: Option<String>,
}

/// A cash-intake entry ("Register 1", "Catering", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earning {
    pub id: Option<i64>,
    #[serde(with = "dates::serde_iso")]
    pub date: Date,
    pub amount: f64,
    pub source: String,
}

impl InvoiceStore {
    /// Open (or create) the store with a SQLite backend.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> SqliteResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vendor TEXT NOT NULL,
                invoice_number TEXT,
                amount REAL,
                date TEXT NOT NULL,
                category TEXT,
                status TEXT NOT NULL,
                file_ref TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS earnings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                amount REAL NOT NULL,
                source TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_date ON invoices(date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_vendor ON invoices(vendor)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_earnings_date ON earnings(date)",
            [],
        )?;
        Ok(())
    }

    /// Insert an invoice and return it with its assigned id.
    pub fn insert(&self, invoice: &Invoice) -> SqliteResult<Invoice> {
        self.conn.execute(
            "INSERT INTO invoices
                (vendor, invoice_number, amount, date, category, status, file_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                invoice.vendor,
                invoice.invoice_number,
                invoice.amount,
                dates::to_iso(invoice.date),
                invoice.category,
                invoice.status,
                invoice.file_ref,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(invoice_id = id, vendor = %invoice.vendor, "Invoice stored");
        Ok(Invoice {
            id: Some(id),
            ..invoice.clone()
        })
    }

    const INVOICE_COLS: &'static str =
        "id, vendor, invoice_number, amount, date, category, status, file_ref";

    fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invoice> {
        let raw_date: String = row.get(4)?;
        let date = dates::parse_iso(&raw_date).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(4, "date".to_string(), rusqlite::types::Type::Text)
        })?;
        Ok(Invoice {
            id: Some(row.get(0)?),
            vendor: row.get(1)?,
            invoice_number: row.get(2)?,
            amount: row.get(3)?,
            date,
            category: row.get(5)?,
            status: row.get(6)?,
            file_ref: row.get(7)?,
        })
    }

    pub fn find_all(&self) -> SqliteResult<Vec<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices ORDER BY date, id",
            Self::INVOICE_COLS
        ))?;
        let rows = stmt.query_map([], |row| Self::row_to_invoice(row))?;
        rows.collect()
    }

    pub fn find_by_id(&self, id: i64) -> SqliteResult<Option<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE id = ?1",
            Self::INVOICE_COLS
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_invoice(row)?)),
            None => Ok(None),
        }
    }

    /// Invoices whose date falls within [start, end] inclusive, ordered by
    /// date then id so retrieval order is stable across runs.
    pub fn find_by_date_range(&self, start: Date, end: Date) -> SqliteResult<Vec<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE date >= ?1 AND date <= ?2 ORDER BY date, id",
            Self::INVOICE_COLS
        ))?;
        let rows = stmt.query_map(
            params![dates::to_iso(start), dates::to_iso(end)],
            |row| Self::row_to_invoice(row),
        )?;
        rows.collect()
    }

    /// Apply a full-record edit. Returns `None` when no such invoice exists.
    pub fn update(&self, id: i64, edit: &InvoiceEdit) -> SqliteResult<Option<Invoice>> {
        let changed = self.conn.execute(
            "UPDATE invoices
             SET vendor = ?1, invoice_number = ?2, amount = ?3, date = ?4, category = ?5
             WHERE id = ?6",
            params![
                edit.vendor,
                edit.invoice_number,
                edit.amount,
                dates::to_iso(edit.date),
                edit.category,
                id,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        info!(invoice_id = id, "Invoice updated");
        self.find_by_id(id)
    }

    /// Workflow-status change, independent of the other fields. Returns
    /// `None` when no such invoice exists (no partial write occurs).
    pub fn update_status(&self, id: i64, status: &str) -> SqliteResult<Option<Invoice>> {
        let changed = self.conn.execute(
            "UPDATE invoices SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        info!(invoice_id = id, status = status, "Invoice status updated");
        self.find_by_id(id)
    }

    pub fn delete_by_id(&self, id: i64) -> SqliteResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!(invoice_id = id, "Invoice deleted");
        }
        Ok(removed > 0)
    }

    pub fn exists_by_id(&self, id: i64) -> SqliteResult<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM invoices WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
    }

    pub fn insert_earning(&self, earning: &Earning) -> SqliteResult<Earning> {
        self.conn.execute(
            "INSERT INTO earnings (date, amount, source) VALUES (?1, ?2, ?3)",
            params![dates::to_iso(earning.date), earning.amount, earning.source],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(earning_id = id, source = %earning.source, "Earning stored");
        Ok(Earning {
            id: Some(id),
            ..earning.clone()
        })
    }

    /// All earnings, newest first.
    pub fn earnings_newest_first(&self) -> SqliteResult<Vec<Earning>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, date, amount, source FROM earnings ORDER BY date DESC, id DESC")?;
        let rows = stmt.query_map([], |row| {
            let raw_date: String = row.get(1)?;
            let date = dates::parse_iso(&raw_date).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(
                    1,
                    "date".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;
            Ok(Earning {
                id: Some(row.get(0)?),
                date,
                amount: row.get(2)?,
                source: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn delete_earning(&self, id: i64) -> SqliteResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM earnings WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn sample(vendor: &str, day: Date, amount: Option<f64>) -> Invoice {
        Invoice {
            id: None,
            vendor: vendor.to_string(),
            invoice_number: None,
            amount,
            date: day,
            category: None,
            status: "On Payment Term".to_string(),
            file_ref: "abc_test.pdf".to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_id_and_round_trips() {
        let db = InvoiceStore::open_in_memory().unwrap();
        let saved = db
            .insert(&sample("Costco", date!(2025 - 06 - 10), Some(99.5)))
            .unwrap();
        let id = saved.id.unwrap();
        let found = db.find_by_id(id).unwrap().unwrap();
        assert_eq!(found, saved);
        assert!(db.exists_by_id(id).unwrap());
    }

    #[test]
    fn test_date_range_is_inclusive_on_both_ends() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&sample("A", date!(2025 - 06 - 01), Some(1.0))).unwrap();
        db.insert(&sample("B", date!(2025 - 06 - 07), Some(2.0))).unwrap();
        db.insert(&sample("C", date!(2025 - 06 - 08), Some(3.0))).unwrap();

        let hits = db
            .find_by_date_range(date!(2025 - 06 - 01), date!(2025 - 06 - 07))
            .unwrap();
        let vendors: Vec<_> = hits.iter().map(|i| i.vendor.as_str()).collect();
        assert_eq!(vendors, vec!["A", "B"]);
    }

    #[test]
    fn test_inverted_range_is_empty_not_error() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&sample("A", date!(2025 - 06 - 05), None)).unwrap();
        let hits = db
            .find_by_date_range(date!(2025 - 06 - 10), date!(2025 - 06 - 01))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_update_status_on_missing_id_is_not_found() {
        let db = InvoiceStore::open_in_memory().unwrap();
        assert_eq!(db.update_status(404, "Paid").unwrap(), None);

        let saved = db
            .insert(&sample("Pepsi", date!(2025 - 06 - 02), Some(25.0)))
            .unwrap();
        let updated = db.update_status(saved.id.unwrap(), "Paid").unwrap().unwrap();
        assert_eq!(updated.status, "Paid");
        assert_eq!(updated.vendor, "Pepsi");
    }

    #[test]
    fn test_full_edit_preserves_status_and_file_ref() {
        let db = InvoiceStore::open_in_memory().unwrap();
        let saved = db
            .insert(&sample("Unknown (Parse Error)", date!(2025 - 06 - 02), None))
            .unwrap();
        let edit = InvoiceEdit {
            vendor: "Costco".to_string(),
            invoice_number: Some("INV-7".to_string()),
            amount: Some(150.0),
            date: date!(2025 - 06 - 03),
            category: Some("Groceries".to_string()),
        };
        let updated = db.update(saved.id.unwrap(), &edit).unwrap().unwrap();
        assert_eq!(updated.vendor, "Costco");
        assert_eq!(updated.amount, Some(150.0));
        assert_eq!(updated.status, "On Payment Term");
        assert_eq!(updated.file_ref, "abc_test.pdf");

        assert_eq!(db.update(404, &edit).unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let db = InvoiceStore::open_in_memory().unwrap();
        let saved = db.insert(&sample("A", date!(2025 - 06 - 01), None)).unwrap();
        let id = saved.id.unwrap();
        assert!(db.delete_by_id(id).unwrap());
        assert!(!db.delete_by_id(id).unwrap());
        assert!(!db.exists_by_id(id).unwrap());
    }

    #[test]
    fn test_earnings_newest_first() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert_earning(&Earning {
            id: None,
            date: date!(2025 - 06 - 01),
            amount: 300.0,
            source: "Register 1".to_string(),
        })
        .unwrap();
        let newer = db
            .insert_earning(&Earning {
                id: None,
                date: date!(2025 - 06 - 03),
                amount: 120.0,
                source: "Catering".to_string(),
            })
            .unwrap();

        let all = db.earnings_newest_first().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], newer);

        assert!(db.delete_earning(newer.id.unwrap()).unwrap());
        assert_eq!(db.earnings_newest_first().unwrap().len(), 1);
    }
}
