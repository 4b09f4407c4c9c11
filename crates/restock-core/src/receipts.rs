//! Receipt resolution and retrieval
//!
//! `ReceiptIndex` maps every purchase group to its receipt attachments,
//! most recent first (by the owning transaction's date). Fetching the bytes
//! goes through a `ReceiptStore`; a missing file is a displayable state,
//! not an error.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::grouping::PurchaseGroups;
use crate::models::{ReceiptAttachment, Transaction};

/// A receipt attachment resolved into a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReceipt {
    pub file_name: String,
    pub transaction_id: String,
    /// Date of the owning transaction, if it is in the snapshot
    pub date: Option<NaiveDateTime>,
}

/// Receipt attachments per purchase group, newest first
#[derive(Debug, Clone, Default)]
pub struct ReceiptIndex {
    by_comp: HashMap<String, Vec<ResolvedReceipt>>,
}

impl ReceiptIndex {
    pub fn build(
        groups: &PurchaseGroups,
        transactions: &[Transaction],
        attachments: &[ReceiptAttachment],
    ) -> Self {
        let date_of: HashMap<&str, NaiveDateTime> = transactions
            .iter()
            .map(|tx| (tx.id.as_str(), tx.date))
            .collect();

        let mut by_comp: HashMap<String, Vec<ResolvedReceipt>> = HashMap::new();
        for attachment in attachments {
            let comp = groups
                .comp_id(&attachment.transaction_id)
                .unwrap_or(attachment.transaction_id.as_str())
                .to_string();
            by_comp.entry(comp).or_default().push(ResolvedReceipt {
                file_name: attachment.file_name.clone(),
                transaction_id: attachment.transaction_id.clone(),
                date: date_of.get(attachment.transaction_id.as_str()).copied(),
            });
        }

        for receipts in by_comp.values_mut() {
            // Option orders None first, so reversing puts undated receipts last
            receipts.sort_by(|a, b| {
                b.date
                    .cmp(&a.date)
                    .then_with(|| a.file_name.cmp(&b.file_name))
            });
        }

        Self { by_comp }
    }

    /// Receipts of a group, most recent first; empty when there are none
    pub fn files_for(&self, comp_id: &str) -> &[ResolvedReceipt] {
        self.by_comp.get(comp_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The newest receipt of a group
    pub fn most_recent(&self, comp_id: &str) -> Option<&ResolvedReceipt> {
        self.files_for(comp_id).first()
    }

    /// Most recent receipt timestamp of a group
    pub fn latest_date(&self, comp_id: &str) -> Option<NaiveDateTime> {
        self.files_for(comp_id).iter().filter_map(|r| r.date).max()
    }
}

/// Kind of receipt file, from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Image,
    Pdf,
    Other,
}

impl ReceiptKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("jpg") | Some("jpeg") | Some("png") => Self::Image,
            Some("pdf") => Self::Pdf,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Other => "other",
        }
    }
}

/// Outcome of fetching a receipt's bytes
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptContent {
    Available { kind: ReceiptKind, bytes: Vec<u8> },
    /// Referenced by the ledger but not retrievable
    Unavailable { reason: String },
}

impl ReceiptContent {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Storage that can return receipt file bytes by name
pub trait ReceiptStore: Send + Sync {
    /// Human-readable name for this store
    fn name(&self) -> &str;

    /// Fetch a file; `Ok(None)` when it does not exist
    fn fetch(&self, file_name: &str) -> Result<Option<Vec<u8>>>;
}

/// Receipt pictures stored in a local directory
pub struct LocalReceiptStore {
    dir: PathBuf,
}

impl LocalReceiptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReceiptStore for LocalReceiptStore {
    fn name(&self) -> &str {
        "local"
    }

    fn fetch(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        let name = Path::new(file_name);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(Error::InvalidData(format!(
                "Receipt file name must not contain a path: {}",
                file_name
            )));
        }

        match fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fetch a receipt, folding every failure into `Unavailable`
pub fn fetch_receipt(store: &dyn ReceiptStore, file_name: &str) -> ReceiptContent {
    match store.fetch(file_name) {
        Ok(Some(bytes)) => {
            debug!(file = file_name, size = bytes.len(), "Fetched receipt");
            ReceiptContent::Available {
                kind: ReceiptKind::from_file_name(file_name),
                bytes,
            }
        }
        Ok(None) => {
            warn!(file = file_name, store = store.name(), "Receipt referenced but not found");
            ReceiptContent::Unavailable {
                reason: format!("not found in {} store", store.name()),
            }
        }
        Err(e) => {
            warn!(file = file_name, error = %e, "Failed to fetch receipt");
            ReceiptContent::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(id: &str, day: u32, split: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            note: String::new(),
            item_id: None,
            split_id: split.map(String::from),
        }
    }

    fn pic(tid: &str, file: &str) -> ReceiptAttachment {
        ReceiptAttachment {
            transaction_id: tid.to_string(),
            file_name: file.to_string(),
        }
    }

    #[test]
    fn test_files_for_group_newest_first() {
        let txs = vec![tx("1", 3, Some("s")), tx("2", 9, Some("s")), tx("3", 5, None)];
        let pics = vec![pic("1", "old.jpg"), pic("2", "new.jpg"), pic("3", "other.pdf")];
        let groups = PurchaseGroups::build(&txs, &pics);
        let index = ReceiptIndex::build(&groups, &txs, &pics);

        let comp = groups.comp_id("1").unwrap();
        let files: Vec<&str> = index
            .files_for(comp)
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();
        assert_eq!(files, vec!["new.jpg", "old.jpg"]);
        assert_eq!(index.most_recent(comp).unwrap().file_name, "new.jpg");
        assert_eq!(index.latest_date(comp), Some(txs[1].date));
    }

    #[test]
    fn test_group_without_receipts_is_empty() {
        let txs = vec![tx("1", 1, None)];
        let groups = PurchaseGroups::build(&txs, &[]);
        let index = ReceiptIndex::build(&groups, &txs, &[]);

        assert!(index.files_for(groups.comp_id("1").unwrap()).is_empty());
        assert!(index.latest_date("1").is_none());
    }

    #[test]
    fn test_undated_receipt_sorts_last() {
        let txs = vec![tx("1", 2, None)];
        let pics = vec![pic("1", "b.jpg"), pic("404", "a.jpg")];
        let groups = PurchaseGroups::build(&txs, &pics);
        let index = ReceiptIndex::build(&groups, &txs, &pics);

        assert_eq!(index.files_for("404")[0].date, None);
        assert_eq!(index.latest_date("404"), None);
    }

    #[test]
    fn test_receipt_kind_from_extension() {
        assert_eq!(ReceiptKind::from_file_name("x.JPG"), ReceiptKind::Image);
        assert_eq!(ReceiptKind::from_file_name("x.png"), ReceiptKind::Image);
        assert_eq!(ReceiptKind::from_file_name("x.pdf"), ReceiptKind::Pdf);
        assert_eq!(ReceiptKind::from_file_name("x"), ReceiptKind::Other);
    }

    #[test]
    fn test_local_store_fetch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r1.jpg"), b"jpeg-bytes").unwrap();
        let store = LocalReceiptStore::new(dir.path());

        assert_eq!(store.fetch("r1.jpg").unwrap(), Some(b"jpeg-bytes".to_vec()));
        assert_eq!(store.fetch("missing.jpg").unwrap(), None);
        assert!(store.fetch("../etc/passwd").is_err());
    }

    #[test]
    fn test_fetch_receipt_missing_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.pdf"), b"%PDF").unwrap();
        let store = LocalReceiptStore::new(dir.path());

        let ok = fetch_receipt(&store, "ok.pdf");
        assert_eq!(
            ok,
            ReceiptContent::Available {
                kind: ReceiptKind::Pdf,
                bytes: b"%PDF".to_vec()
            }
        );
        assert!(!fetch_receipt(&store, "gone.jpg").is_available());
        assert!(!fetch_receipt(&store, "a/b.jpg").is_available());
    }
}
