//! Upsert coordinator for the purchase history
//!
//! The history store enforces nothing; this module keeps at most one record
//! per (normalized product, transaction id). The existing record is looked
//! up from a fresh read of the store immediately before each decision.

use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{HistoryRecord, PurchaseEntry, RowHandle, SaveOutcome, StoredRecord};
use crate::normalize::normalize;

/// Flat, append/overwrite history storage addressed by row handles
pub trait HistoryStore {
    /// Every record with its handle, in storage order
    fn read_all(&self) -> Result<Vec<StoredRecord>>;

    /// Append a record, returning its handle
    fn append(&self, record: &HistoryRecord) -> Result<RowHandle>;

    /// Replace the record at `handle`
    fn overwrite(&self, handle: RowHandle, record: &HistoryRecord) -> Result<()>;
}

/// In-process history store
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            rows: Mutex::new(records),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<HistoryRecord>>> {
        self.rows
            .lock()
            .map_err(|_| Error::InvalidData("history store lock poisoned".to_string()))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn read_all(&self) -> Result<Vec<StoredRecord>> {
        Ok(self
            .lock()?
            .iter()
            .enumerate()
            .map(|(i, record)| StoredRecord {
                handle: RowHandle(i as i64),
                record: record.clone(),
            })
            .collect())
    }

    fn append(&self, record: &HistoryRecord) -> Result<RowHandle> {
        let mut rows = self.lock()?;
        rows.push(record.clone());
        Ok(RowHandle(rows.len() as i64 - 1))
    }

    fn overwrite(&self, handle: RowHandle, record: &HistoryRecord) -> Result<()> {
        let mut rows = self.lock()?;
        let slot = usize::try_from(handle.0)
            .ok()
            .and_then(|i| rows.get_mut(i))
            .ok_or_else(|| Error::NotFound(format!("history row {}", handle)))?;
        *slot = record.clone();
        Ok(())
    }
}

/// Find the record for (product, transaction id) in a set of stored rows
pub fn find_record<'a>(
    rows: &'a [StoredRecord],
    product: &str,
    transaction_id: &str,
) -> Option<&'a StoredRecord> {
    let product = normalize(product);
    let transaction_id = transaction_id.trim();
    rows.iter().find(|r| {
        r.record.transaction_id.trim() == transaction_id && normalize(&r.record.product) == product
    })
}

/// Decides insert vs update for history saves
pub struct UpsertCoordinator<'a, S: HistoryStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: HistoryStore + ?Sized> UpsertCoordinator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Current record for (product, transaction id), read from the store
    pub fn existing(&self, product: &str, transaction_id: &str) -> Result<Option<StoredRecord>> {
        let rows = self.store.read_all()?;
        Ok(find_record(&rows, product, transaction_id).cloned())
    }

    /// Save a purchase under (product, transaction id)
    ///
    /// - no record: append, `Created`
    /// - record, `allow_overwrite == false`: nothing written, `RejectedDuplicate`
    /// - record, `allow_overwrite == true`: every field replaced, `Updated`
    pub fn save(
        &self,
        product: &str,
        transaction_id: &str,
        entry: &PurchaseEntry,
        allow_overwrite: bool,
    ) -> Result<SaveOutcome> {
        let product = normalize(product);
        if product.is_empty() {
            return Err(Error::InvalidData("product must not be empty".to_string()));
        }
        let transaction_id = transaction_id.trim();
        if transaction_id.is_empty() {
            return Err(Error::InvalidData(
                "transaction id must not be empty".to_string(),
            ));
        }

        let existing = self.existing(&product, transaction_id)?;
        let previous_stamp = existing.as_ref().and_then(|e| e.record.modified_at);
        let record = HistoryRecord {
            product: product.clone(),
            transaction_id: transaction_id.to_string(),
            purchase_date: entry.purchase_date,
            unit_price: Some(entry.unit_price),
            quantity: Some(entry.quantity),
            unit: entry.unit.trim().to_string(),
            note: entry.note.clone(),
            merchant: entry.merchant.clone(),
            receipt_file: entry.receipt_file.clone(),
            modified_at: Some(next_stamp(previous_stamp)),
        };

        let outcome = match existing {
            None => {
                let handle = self.store.append(&record)?;
                SaveOutcome::Created { handle }
            }
            Some(stored) if !allow_overwrite => SaveOutcome::RejectedDuplicate {
                handle: stored.handle,
            },
            Some(stored) => {
                self.store.overwrite(stored.handle, &record)?;
                SaveOutcome::Updated {
                    handle: stored.handle,
                }
            }
        };

        info!(
            product = %product,
            transaction_id,
            outcome = outcome.as_str(),
            "History save"
        );
        Ok(outcome)
    }
}

/// Current time at microsecond precision, strictly after `previous`
fn next_stamp(previous: Option<NaiveDateTime>) -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let now = now
        .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now);
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(price: f64, quantity: f64, unit: &str) -> PurchaseEntry {
        PurchaseEntry {
            purchase_date: NaiveDate::from_ymd_opt(2024, 8, 2),
            unit_price: price,
            quantity,
            unit: unit.to_string(),
            note: "leche entera".to_string(),
            merchant: "Lider".to_string(),
            receipt_file: "r.jpg".to_string(),
        }
    }

    #[test]
    fn test_first_save_creates() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);

        let outcome = coordinator
            .save("Leche", "42", &entry(990.0, 6.0, "lt"), false)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Created { handle: RowHandle(0) });

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.product, "leche");
        assert_eq!(rows[0].record.unit_price, Some(990.0));
        assert!(rows[0].record.modified_at.is_some());
    }

    #[test]
    fn test_duplicate_without_overwrite_is_rejected() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);

        coordinator
            .save("leche", "42", &entry(990.0, 6.0, "lt"), false)
            .unwrap();
        let before = store.read_all().unwrap();

        let outcome = coordinator
            .save("LECHE ", "42", &entry(1200.0, 1.0, "lt"), false)
            .unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::RejectedDuplicate { handle: RowHandle(0) }
        );
        assert_eq!(store.read_all().unwrap(), before);
    }

    #[test]
    fn test_overwrite_replaces_fields_and_advances_stamp() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);

        coordinator
            .save("leche", "42", &entry(990.0, 6.0, "lt"), false)
            .unwrap();
        let first_stamp = store.read_all().unwrap()[0].record.modified_at.unwrap();

        let second = entry(1100.0, 12.0, "un");
        let outcome = coordinator.save("leche", "42", &second, true).unwrap();
        assert_eq!(outcome, SaveOutcome::Updated { handle: RowHandle(0) });

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        let record = &rows[0].record;
        assert_eq!(record.unit_price, Some(1100.0));
        assert_eq!(record.quantity, Some(12.0));
        assert_eq!(record.unit, "un");
        assert!(record.modified_at.unwrap() > first_stamp);
    }

    #[test]
    fn test_same_transaction_different_product_is_separate() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);

        coordinator
            .save("leche", "42", &entry(990.0, 6.0, "lt"), false)
            .unwrap();
        let outcome = coordinator
            .save("pan", "42", &entry(1500.0, 1.0, "kg"), false)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Created { handle: RowHandle(1) });
    }

    #[test]
    fn test_decision_uses_fresh_read() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        assert!(coordinator.existing("leche", "7").unwrap().is_none());

        // another writer appends behind the coordinator's back
        let other = UpsertCoordinator::new(&store);
        other
            .save("leche", "7", &entry(10.0, 1.0, "lt"), false)
            .unwrap();

        let outcome = coordinator
            .save("leche", "7", &entry(20.0, 1.0, "lt"), false)
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::RejectedDuplicate { .. }));
    }

    #[test]
    fn test_empty_key_is_invalid() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        assert!(coordinator
            .save("  ", "1", &entry(1.0, 1.0, "un"), false)
            .is_err());
        assert!(coordinator
            .save("leche", " ", &entry(1.0, 1.0, "un"), false)
            .is_err());
    }

    #[test]
    fn test_next_stamp_is_strictly_after_future_previous() {
        let future = Utc::now().naive_utc() + Duration::hours(1);
        assert_eq!(next_stamp(Some(future)), future + Duration::microseconds(1));
    }

    #[test]
    fn test_overwrite_unknown_handle_fails() {
        let store = MemoryHistoryStore::new();
        let record = HistoryRecord {
            product: "x".into(),
            transaction_id: "1".into(),
            purchase_date: None,
            unit_price: None,
            quantity: None,
            unit: String::new(),
            note: String::new(),
            merchant: String::new(),
            receipt_file: String::new(),
            modified_at: None,
        };
        assert!(store.overwrite(RowHandle(3), &record).is_err());
    }
}
