//! Purchase history CSV export and import
//!
//! The CSV layout mirrors the hand-kept history sheet: product, transaction
//! id, date, unit price, quantity, unit, note, merchant, receipt file and
//! last-modified stamp. Import goes through the upsert coordinator, so the
//! (product, transaction id) invariant holds for imported rows too.

use std::io::{Read, Write};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::history::{format_number, parse_date, parse_number};
use crate::models::{PurchaseEntry, SaveOutcome, MODIFIED_AT_FORMAT};
use crate::upsert::{HistoryStore, UpsertCoordinator};

/// One CSV row; every field is text so hand-edited files still load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryCsvRow {
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub unit_price: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub receipt_file: String,
    #[serde(default)]
    pub modified_at: String,
}

/// Counts from one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    /// Existing (product, transaction id) rows left untouched
    pub duplicates: usize,
    /// Rows without a key or with an unparseable price or quantity
    pub skipped: usize,
}

/// Write the whole history as CSV, returning the number of rows
pub fn export_history_csv<S, W>(store: &S, writer: W) -> Result<usize>
where
    S: HistoryStore + ?Sized,
    W: Write,
{
    let rows = store.read_all()?;
    let mut csv = WriterBuilder::new().from_writer(writer);

    for stored in &rows {
        let r = &stored.record;
        csv.serialize(HistoryCsvRow {
            product: r.product.clone(),
            transaction_id: r.transaction_id.clone(),
            date: r
                .purchase_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            unit_price: r.unit_price.map(format_number).unwrap_or_default(),
            quantity: r.quantity.map(format_number).unwrap_or_default(),
            unit: r.unit.clone(),
            note: r.note.clone(),
            merchant: r.merchant.clone(),
            receipt_file: r.receipt_file.clone(),
            modified_at: r
                .modified_at
                .map(|t| t.format(MODIFIED_AT_FORMAT).to_string())
                .unwrap_or_default(),
        })?;
    }
    csv.flush()?;

    info!(rows = rows.len(), "Exported purchase history");
    Ok(rows.len())
}

/// Load history rows from CSV through the upsert coordinator
pub fn import_history_csv<S, R>(store: &S, reader: R, allow_overwrite: bool) -> Result<ImportStats>
where
    S: HistoryStore + ?Sized,
    R: Read,
{
    let mut csv = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let coordinator = UpsertCoordinator::new(store);
    let mut stats = ImportStats::default();

    for (line, row) in csv.deserialize::<HistoryCsvRow>().enumerate() {
        let row = row?;
        let (Some(unit_price), Some(quantity)) =
            (parse_number(&row.unit_price), parse_number(&row.quantity))
        else {
            debug!(line = line + 2, "Skipping row without price or quantity");
            stats.skipped += 1;
            continue;
        };
        if row.product.trim().is_empty() || row.transaction_id.trim().is_empty() {
            debug!(line = line + 2, "Skipping row without product or transaction id");
            stats.skipped += 1;
            continue;
        }

        let entry = PurchaseEntry {
            purchase_date: parse_date(&row.date),
            unit_price,
            quantity,
            unit: row.unit,
            note: row.note,
            merchant: row.merchant,
            receipt_file: row.receipt_file,
        };

        match coordinator.save(&row.product, &row.transaction_id, &entry, allow_overwrite)? {
            SaveOutcome::Created { .. } => stats.created += 1,
            SaveOutcome::Updated { .. } => stats.updated += 1,
            SaveOutcome::RejectedDuplicate { .. } => stats.duplicates += 1,
        }
    }

    info!(
        created = stats.created,
        updated = stats.updated,
        duplicates = stats.duplicates,
        skipped = stats.skipped,
        "Imported purchase history"
    );
    Ok(stats)
}
