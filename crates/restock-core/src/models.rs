//! Domain models for Restock

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Format used for last-modified stamps in the history store
pub const MODIFIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One ledger entry from the finance app snapshot
///
/// Identifiers are stringified at ingestion so numeric and textual keys
/// never mix inside the grouper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDateTime,
    /// Free-text note written by the user (the only searchable field)
    pub note: String,
    /// Link to the catalog item (used to resolve the merchant name)
    pub item_id: Option<String>,
    /// Shared identifier of sibling transactions forming one purchase
    pub split_id: Option<String>,
}

/// A stored receipt file linked to one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptAttachment {
    pub transaction_id: String,
    pub file_name: String,
}

/// Opaque handle addressing one row of the history store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowHandle(pub i64);

impl std::fmt::Display for RowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A persisted purchase-history row
///
/// Fields that may come from hand-edited or imported data are optional;
/// rows missing them are skipped by the aggregator instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Normalized product query the purchase was saved under
    pub product: String,
    pub transaction_id: String,
    pub purchase_date: Option<NaiveDate>,
    pub unit_price: Option<f64>,
    pub quantity: Option<f64>,
    pub unit: String,
    pub note: String,
    pub merchant: String,
    pub receipt_file: String,
    pub modified_at: Option<NaiveDateTime>,
}

/// A history record together with its storage handle
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub handle: RowHandle,
    pub record: HistoryRecord,
}

/// What the user enters (plus ledger context) when saving a purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub purchase_date: Option<NaiveDate>,
    pub unit_price: f64,
    pub quantity: f64,
    pub unit: String,
    pub note: String,
    pub merchant: String,
    pub receipt_file: String,
}

/// Result of an upsert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// No record existed; a new row was appended
    Created { handle: RowHandle },
    /// A record existed and was overwritten in place
    Updated { handle: RowHandle },
    /// A record existed and overwrite was not allowed; nothing changed
    RejectedDuplicate { handle: RowHandle },
}

impl SaveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::RejectedDuplicate { .. } => "rejected_duplicate",
        }
    }

    pub fn handle(&self) -> RowHandle {
        match self {
            Self::Created { handle }
            | Self::Updated { handle }
            | Self::RejectedDuplicate { handle } => *handle,
        }
    }
}

impl std::fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Weighted price and consumption statistics for one product and unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub unit: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Number of valid rows that entered the statistics
    pub purchases: usize,
    pub price_min: f64,
    pub price_max: f64,
    /// Quantity-weighted average unit price
    pub price_avg: f64,
    /// Quantity counted in the consumption numerator
    pub consumed_units: f64,
    /// Units per 30.44-day month
    pub monthly_consumption: f64,
    /// Whether the most recent purchase was left out of the numerator
    pub excludes_latest: bool,
}
