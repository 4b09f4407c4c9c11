//! Restock Core Library
//!
//! Shared functionality for the Restock purchase tracker:
//! - Ledger snapshot reader (transactions, receipt pictures, items)
//! - Purchase grouping over split transactions (union-find)
//! - Exact-first, fuzzy-fallback note matching
//! - Ranking of purchase groups with a session discard set
//! - Receipt resolution and pluggable receipt storage
//! - Purchase history store, upsert coordinator and statistics
//! - Configuration and CSV export/import

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod grouping;
pub mod history;
pub mod ledger;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod ranker;
pub mod receipts;
pub mod session;
pub mod upsert;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use export::{export_history_csv, import_history_csv, ImportStats};
pub use grouping::{DisjointSet, PurchaseGroups};
pub use history::{dominant_unit, summarize};
pub use ledger::LedgerSnapshot;
pub use matcher::{MatchEngine, MatchKind};
pub use models::*;
pub use normalize::normalize;
pub use ranker::{rank, DiscardSet, RankOptions, RankOutcome};
pub use receipts::{
    fetch_receipt, LocalReceiptStore, ReceiptContent, ReceiptIndex, ReceiptKind, ReceiptStore,
};
pub use session::{BrowseSession, DisplayPlan, GroupView, PlanOptions, PlanState, PurchaseIndex};
pub use upsert::{HistoryStore, MemoryHistoryStore, UpsertCoordinator};
