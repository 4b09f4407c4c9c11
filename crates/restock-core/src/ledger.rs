//! Ledger snapshot reader
//!
//! The finance app exports its database as a SQLite file (`*.fydb`). Three
//! tables are read, read-only:
//! - `TRANSACTIONSTABLE` - id, date, notes, item link, split id
//! - `ITEMTABLE` - item id to item (merchant) name
//! - `PICTURETABLE` - receipt pictures per transaction
//!
//! Identifiers of any SQLite type are converted to strings here, so the rest
//! of the crate never compares mixed-type keys.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{ReceiptAttachment, Transaction};

/// File extension of ledger snapshots
pub const SNAPSHOT_EXTENSION: &str = "fydb";

/// All transactions and receipt attachments as of one point in time
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub transactions: Vec<Transaction>,
    pub attachments: Vec<ReceiptAttachment>,
    /// Item id to item name, used as the merchant name
    pub items: HashMap<String, String>,
    /// File the snapshot was read from
    pub source: Option<PathBuf>,
}

impl LedgerSnapshot {
    /// Build a snapshot from already-loaded data
    pub fn new(
        transactions: Vec<Transaction>,
        attachments: Vec<ReceiptAttachment>,
        items: HashMap<String, String>,
    ) -> Self {
        Self {
            transactions,
            attachments,
            items,
            source: None,
        }
    }

    /// Read a snapshot file, keeping transactions dated up to today
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_as_of(path, Local::now().date_naive())
    }

    /// Read a snapshot file, keeping transactions dated on or before `as_of`
    pub fn open_as_of(path: &Path, as_of: NaiveDate) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Ledger(format!(
                "Snapshot not found: {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let transactions = read_transactions(&conn, as_of)?;
        let attachments = read_attachments(&conn)?;
        let items = read_items(&conn)?;

        info!(
            path = %path.display(),
            transactions = transactions.len(),
            receipts = attachments.len(),
            items = items.len(),
            "Loaded ledger snapshot"
        );

        Ok(Self {
            transactions,
            attachments,
            items,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == id)
    }

    /// Merchant (item) name linked to a transaction
    pub fn merchant_for(&self, tx: &Transaction) -> Option<&str> {
        tx.item_id
            .as_deref()
            .and_then(|id| self.items.get(id))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Resolve a configured ledger path: a file is used as is, a directory
/// yields its most recently modified snapshot
pub fn resolve_snapshot_path(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        latest_snapshot(path)
    } else {
        Ok(path.to_path_buf())
    }
}

/// Most recently modified `*.fydb` file in a directory
pub fn latest_snapshot(dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_snapshot = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SNAPSHOT_EXTENSION));
        if !is_snapshot || !path.is_file() {
            continue;
        }

        let modified = fs::metadata(&path)?.modified()?;
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(|| {
        Error::Ledger(format!(
            "No .{} snapshots found in {}",
            SNAPSHOT_EXTENSION,
            dir.display()
        ))
    })
}

/// Parse a ledger timestamp (`YYYY-MM-DD HH:MM:SS`, optionally with `.0`)
pub fn parse_ledger_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Stringify an identifier column; NULL, blank, "nan" and "None" are absent
fn value_to_key(value: Value) -> Option<String> {
    let key = match value {
        Value::Null | Value::Blob(_) => return None,
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", f as i64),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.trim().to_string(),
    };

    match key.as_str() {
        "" | "nan" | "None" => None,
        _ => Some(key),
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::Text(s) => s,
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Null | Value::Blob(_) => String::new(),
    }
}

/// Lowercased column names of a table; empty when the table does not exist
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns.into_iter().map(|c| c.to_lowercase()).collect())
}

fn read_transactions(conn: &Connection, as_of: NaiveDate) -> Result<Vec<Transaction>> {
    let columns = table_columns(conn, "TRANSACTIONSTABLE")?;
    if columns.is_empty() {
        return Err(Error::Ledger(
            "Snapshot has no TRANSACTIONSTABLE".to_string(),
        ));
    }

    let has = |name: &str| columns.iter().any(|c| c == name);
    let item_col = if has("itemid") { "itemID" } else { "NULL" };
    let notes_col = if has("notes") { "notes" } else { "NULL" };
    let split_col = if has("newsplittransactionid") {
        "NewSplitTransactionID"
    } else {
        debug!("Snapshot has no split column, treating every transaction as unsplit");
        "NULL"
    };

    let sql = format!(
        "SELECT transactionsTableID, date, {}, {}, {} FROM TRANSACTIONSTABLE",
        notes_col, item_col, split_col
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Value>(0)?,
                row.get::<_, Value>(1)?,
                row.get::<_, Value>(2)?,
                row.get::<_, Value>(3)?,
                row.get::<_, Value>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut transactions = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    let mut future = 0usize;

    for (id, date, notes, item, split) in rows {
        let Some(id) = value_to_key(id) else {
            skipped += 1;
            continue;
        };
        let Some(date) = parse_ledger_datetime(&value_to_text(date)) else {
            skipped += 1;
            continue;
        };
        if date.date() > as_of {
            future += 1;
            continue;
        }

        transactions.push(Transaction {
            id,
            date,
            note: value_to_text(notes),
            item_id: value_to_key(item),
            split_id: value_to_key(split),
        });
    }

    if skipped > 0 {
        warn!(skipped, "Skipped ledger rows without id or parseable date");
    }
    debug!(future, "Dropped future-dated transactions");

    Ok(transactions)
}

fn read_attachments(conn: &Connection) -> Result<Vec<ReceiptAttachment>> {
    let columns = table_columns(conn, "PICTURETABLE")?;
    if !columns.iter().any(|c| c == "transactionid")
        || !columns.iter().any(|c| c == "picturefilename")
    {
        debug!("Snapshot has no usable PICTURETABLE");
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT transactionID, pictureFileName FROM PICTURETABLE")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(tid, file)| {
            let transaction_id = value_to_key(tid)?;
            let file_name = value_to_text(file).trim().to_string();
            if file_name.is_empty() {
                return None;
            }
            Some(ReceiptAttachment {
                transaction_id,
                file_name,
            })
        })
        .collect())
}

fn read_items(conn: &Connection) -> Result<HashMap<String, String>> {
    let columns = table_columns(conn, "ITEMTABLE")?;
    if !columns.iter().any(|c| c == "itemtableid") || !columns.iter().any(|c| c == "itemname") {
        return Ok(HashMap::new());
    }

    let mut stmt = conn.prepare("SELECT itemTableID, itemName FROM ITEMTABLE")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, name)| Some((value_to_key(id)?, value_to_text(name))))
        .collect())
}
