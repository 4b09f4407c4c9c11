//! Purchase history operations

use rusqlite::types::Value;
use rusqlite::{params, Row};

use super::{parse_date, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::history::parse_number;
use crate::models::{HistoryRecord, RowHandle, StoredRecord, MODIFIED_AT_FORMAT};
use crate::upsert::HistoryStore;

const HISTORY_COLUMNS: &str = "id, product, transaction_id, purchase_date, unit_price, quantity,
                               unit, note, merchant, receipt_file, modified_at";

impl Database {
    /// Number of rows in the purchase history
    pub fn count_history(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM purchase_history", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Distinct products with at least one saved purchase
    pub fn list_history_products(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT product FROM purchase_history ORDER BY product")?;
        let products = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(products)
    }

    fn row_to_stored(row: &Row) -> rusqlite::Result<StoredRecord> {
        let purchase_date: Option<String> = row.get(3)?;
        let modified_at: Option<String> = row.get(10)?;
        Ok(StoredRecord {
            handle: RowHandle(row.get(0)?),
            record: HistoryRecord {
                product: row.get(1)?,
                transaction_id: row.get(2)?,
                purchase_date: purchase_date.as_deref().and_then(parse_date),
                unit_price: loose_number(row.get(4)?),
                quantity: loose_number(row.get(5)?),
                unit: row.get(6)?,
                note: row.get(7)?,
                merchant: row.get(8)?,
                receipt_file: row.get(9)?,
                modified_at: modified_at.as_deref().and_then(parse_datetime),
            },
        })
    }
}

/// Numeric column that may hold hand-typed text; anything unreadable is absent
fn loose_number(value: Value) -> Option<f64> {
    match value {
        Value::Real(f) => Some(f),
        Value::Integer(i) => Some(i as f64),
        Value::Text(s) => parse_number(&s),
        Value::Null | Value::Blob(_) => None,
    }
}

fn date_text(record: &HistoryRecord) -> Option<String> {
    record.purchase_date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn stamp_text(record: &HistoryRecord) -> Option<String> {
    record
        .modified_at
        .map(|t| t.format(MODIFIED_AT_FORMAT).to_string())
}

impl HistoryStore for Database {
    fn read_all(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM purchase_history ORDER BY id",
            HISTORY_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Self::row_to_stored)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn append(&self, record: &HistoryRecord) -> Result<RowHandle> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO purchase_history (product, transaction_id, purchase_date, unit_price,
             quantity, unit, note, merchant, receipt_file, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.product,
                record.transaction_id,
                date_text(record),
                record.unit_price,
                record.quantity,
                record.unit,
                record.note,
                record.merchant,
                record.receipt_file,
                stamp_text(record),
            ],
        )?;
        Ok(RowHandle(conn.last_insert_rowid()))
    }

    fn overwrite(&self, handle: RowHandle, record: &HistoryRecord) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE purchase_history SET product = ?, transaction_id = ?, purchase_date = ?,
             unit_price = ?, quantity = ?, unit = ?, note = ?, merchant = ?, receipt_file = ?,
             modified_at = ?
             WHERE id = ?",
            params![
                record.product,
                record.transaction_id,
                date_text(record),
                record.unit_price,
                record.quantity,
                record.unit,
                record.note,
                record.merchant,
                record.receipt_file,
                stamp_text(record),
                handle.0,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("history row {}", handle)));
        }
        Ok(())
    }
}
