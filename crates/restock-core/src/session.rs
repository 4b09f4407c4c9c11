//! Display planning and browsing sessions
//!
//! `PurchaseIndex` freezes one ledger snapshot together with its purchase
//! groups and receipt index. `PurchaseIndex::plan` is the projection from
//! (query, options, discards, history) to a `DisplayPlan`; it is pure and is
//! called again after every discard or save.
//!
//! `BrowseSession` owns the discard set for one interactive query and is
//! dropped when the user leaves; nothing about it is persisted.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::grouping::PurchaseGroups;
use crate::history::{dominant_unit, rows_for_product, summarize};
use crate::ledger::LedgerSnapshot;
use crate::matcher::{Corpus, MatchEngine, MatchKind};
use crate::models::{PurchaseEntry, RowHandle, SaveOutcome, StoredRecord, Summary};
use crate::normalize::normalize;
use crate::ranker::{rank, DiscardSet, RankOptions, RankOutcome, RankedGroup};
use crate::receipts::{ReceiptIndex, ResolvedReceipt};
use crate::upsert::{find_record, HistoryStore, UpsertCoordinator};

/// User-controlled knobs for one projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub receipts_only: bool,
    pub max_count: usize,
    /// Leave the latest purchase out of the consumption estimate
    pub exclude_latest: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            receipts_only: true,
            max_count: 3,
            exclude_latest: true,
        }
    }
}

/// Why a plan has (or has no) groups to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlanState {
    /// The query is blank after normalization
    EmptyQuery,
    /// The snapshot has no transactions
    EmptyCorpus,
    /// Nothing matched (try another term)
    NoMatches,
    /// Matches exist but none has a receipt (relax the receipt filter)
    NoReceiptedMatches { matched_groups: usize },
    Ready,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::EmptyCorpus => "empty_corpus",
            Self::NoMatches => "no_matches",
            Self::NoReceiptedMatches { .. } => "no_receipted_matches",
            Self::Ready => "ready",
        }
    }
}

/// Prefilled values for the save form of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormDefaults {
    pub unit_price: f64,
    pub quantity: f64,
    pub unit: String,
    /// Row already saved for (product, representative transaction)
    pub existing: Option<RowHandle>,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            unit_price: 0.0,
            quantity: 1.0,
            unit: String::new(),
            existing: None,
        }
    }
}

/// One purchase group as the renderer shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    /// 1-based position in the plan
    pub position: usize,
    pub comp_id: String,
    /// Representative transaction
    pub transaction_id: String,
    pub date: NaiveDateTime,
    pub note: String,
    pub merchant: Option<String>,
    /// Matching transactions in the group
    pub matched: usize,
    pub has_receipt: bool,
    /// Receipts of the group, newest first
    pub receipts: Vec<ResolvedReceipt>,
    pub form: FormDefaults,
}

/// Everything the renderer needs for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayPlan {
    /// Normalized query, also the product key in the history
    pub product: String,
    #[serde(flatten)]
    pub state: PlanState,
    pub match_kind: Option<MatchKind>,
    pub groups: Vec<GroupView>,
    /// Statistics over the product's whole history, independent of `groups`
    pub summary: Option<Summary>,
    pub discarded: usize,
}

impl DisplayPlan {
    pub fn group(&self, position: usize) -> Option<&GroupView> {
        self.groups.iter().find(|g| g.position == position)
    }
}

/// A ledger snapshot with group membership and receipt index built once
pub struct PurchaseIndex {
    snapshot: LedgerSnapshot,
    groups: PurchaseGroups,
    receipts: ReceiptIndex,
    matcher: MatchEngine,
}

impl PurchaseIndex {
    pub fn new(snapshot: LedgerSnapshot, matcher: MatchEngine) -> Self {
        let groups = PurchaseGroups::build(&snapshot.transactions, &snapshot.attachments);
        let receipts = ReceiptIndex::build(&groups, &snapshot.transactions, &snapshot.attachments);
        Self {
            snapshot,
            groups,
            receipts,
            matcher,
        }
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    pub fn groups(&self) -> &PurchaseGroups {
        &self.groups
    }

    pub fn receipts(&self) -> &ReceiptIndex {
        &self.receipts
    }

    /// Compute the display plan for a query
    pub fn plan(
        &self,
        query: &str,
        options: PlanOptions,
        discarded: &DiscardSet,
        history: &[StoredRecord],
    ) -> DisplayPlan {
        let product = normalize(query);
        let mut plan = DisplayPlan {
            product: product.clone(),
            state: PlanState::Ready,
            match_kind: None,
            groups: Vec::new(),
            summary: None,
            discarded: discarded.len(),
        };

        if product.is_empty() {
            plan.state = PlanState::EmptyQuery;
            return plan;
        }

        plan.summary = product_summary(history, &product, None, options.exclude_latest);

        if self.snapshot.is_empty() {
            plan.state = PlanState::EmptyCorpus;
            return plan;
        }

        let corpus = Corpus::new(&self.snapshot.transactions);
        let matches = self.matcher.search(&corpus, &product);
        if !matches.is_empty() {
            plan.match_kind = Some(matches.kind);
        }

        let outcome = rank(
            &matches.transactions,
            &self.groups,
            &self.receipts,
            discarded,
            RankOptions {
                receipts_only: options.receipts_only,
                max_count: options.max_count,
            },
        );

        match outcome {
            RankOutcome::NoMatches => plan.state = PlanState::NoMatches,
            RankOutcome::NoReceiptedMatches { matched_groups } => {
                plan.state = PlanState::NoReceiptedMatches { matched_groups }
            }
            RankOutcome::Ranked(ranked) => {
                plan.groups = ranked
                    .iter()
                    .enumerate()
                    .map(|(i, group)| self.view(i + 1, group, &product, history))
                    .collect();
            }
        }

        debug!(
            product = %plan.product,
            state = plan.state.as_str(),
            groups = plan.groups.len(),
            "Computed display plan"
        );
        plan
    }

    fn view(
        &self,
        position: usize,
        group: &RankedGroup<'_>,
        product: &str,
        history: &[StoredRecord],
    ) -> GroupView {
        let tx = group.representative;
        let form = match find_record(history, product, &tx.id) {
            Some(stored) => FormDefaults {
                unit_price: stored.record.unit_price.unwrap_or(0.0),
                quantity: stored.record.quantity.unwrap_or(1.0),
                unit: stored.record.unit.clone(),
                existing: Some(stored.handle),
            },
            None => FormDefaults::default(),
        };

        GroupView {
            position,
            comp_id: group.comp_id.clone(),
            transaction_id: tx.id.clone(),
            date: tx.date,
            note: tx.note.clone(),
            merchant: self.snapshot.merchant_for(tx).map(String::from),
            matched: group.matched,
            has_receipt: group.has_receipt,
            receipts: self.receipts.files_for(&group.comp_id).to_vec(),
            form,
        }
    }

    /// Build the history entry for a transaction, filling note, date,
    /// merchant and receipt file from the ledger
    pub fn entry_for(
        &self,
        transaction_id: &str,
        unit_price: f64,
        quantity: f64,
        unit: &str,
    ) -> Result<PurchaseEntry> {
        let transaction_id = transaction_id.trim();
        let tx = self.snapshot.transaction(transaction_id).ok_or_else(|| {
            Error::NotFound(format!("transaction {} in ledger snapshot", transaction_id))
        })?;

        let receipt_file = self
            .groups
            .comp_id(&tx.id)
            .and_then(|comp| self.receipts.most_recent(comp))
            .map(|r| r.file_name.clone())
            .unwrap_or_default();

        Ok(PurchaseEntry {
            purchase_date: Some(tx.date.date()),
            unit_price,
            quantity,
            unit: unit.trim().to_string(),
            note: tx.note.clone(),
            merchant: self.snapshot.merchant_for(tx).unwrap_or_default().to_string(),
            receipt_file,
        })
    }
}

/// Summary for a product in `unit`, or in its most frequent unit
pub fn product_summary(
    history: &[StoredRecord],
    product: &str,
    unit: Option<&str>,
    exclude_latest: bool,
) -> Option<Summary> {
    let records: Vec<_> = history.iter().map(|s| s.record.clone()).collect();
    let rows = rows_for_product(&records, product);
    let unit = match unit {
        Some(unit) => unit.trim().to_string(),
        None => dominant_unit(rows.iter().copied())?,
    };
    summarize(rows, &unit, exclude_latest)
}

/// One interactive query with its session-scoped discard set
pub struct BrowseSession<'a> {
    index: &'a PurchaseIndex,
    query: String,
    options: PlanOptions,
    discarded: DiscardSet,
    plan: DisplayPlan,
}

impl<'a> BrowseSession<'a> {
    /// Start a session and compute the first plan
    pub fn start<S: HistoryStore + ?Sized>(
        index: &'a PurchaseIndex,
        query: &str,
        options: PlanOptions,
        store: &S,
    ) -> Result<Self> {
        let discarded = DiscardSet::new();
        let history = store.read_all()?;
        let plan = index.plan(query, options, &discarded, &history);
        Ok(Self {
            index,
            query: query.to_string(),
            options,
            discarded,
            plan,
        })
    }

    pub fn plan(&self) -> &DisplayPlan {
        &self.plan
    }

    pub fn discarded(&self) -> &DiscardSet {
        &self.discarded
    }

    /// Recompute the plan from the current history
    pub fn refresh<S: HistoryStore + ?Sized>(&mut self, store: &S) -> Result<&DisplayPlan> {
        let history = store.read_all()?;
        self.plan = self
            .index
            .plan(&self.query, self.options, &self.discarded, &history);
        Ok(&self.plan)
    }

    /// Hide the group at `position` and backfill from the remaining groups
    pub fn discard<S: HistoryStore + ?Sized>(
        &mut self,
        position: usize,
        store: &S,
    ) -> Result<&DisplayPlan> {
        let comp_id = self.group_at(position)?.comp_id.clone();
        self.discarded.insert(comp_id);
        self.refresh(store)
    }

    /// Save a priced purchase for the group at `position`
    pub fn save<S: HistoryStore + ?Sized>(
        &mut self,
        position: usize,
        unit_price: f64,
        quantity: f64,
        unit: &str,
        allow_overwrite: bool,
        store: &S,
    ) -> Result<SaveOutcome> {
        let transaction_id = self.group_at(position)?.transaction_id.clone();
        let entry = self
            .index
            .entry_for(&transaction_id, unit_price, quantity, unit)?;
        let outcome = UpsertCoordinator::new(store).save(
            &self.query,
            &transaction_id,
            &entry,
            allow_overwrite,
        )?;
        self.refresh(store)?;
        Ok(outcome)
    }

    fn group_at(&self, position: usize) -> Result<&GroupView> {
        self.plan.group(position).ok_or_else(|| {
            Error::InvalidData(format!(
                "no purchase at position {} (showing {})",
                position,
                self.plan.groups.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReceiptAttachment, Transaction};
    use crate::upsert::MemoryHistoryStore;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn tx(id: &str, day: u32, note: &str, split: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            note: note.to_string(),
            item_id: Some("it1".to_string()),
            split_id: split.map(String::from),
        }
    }

    fn pic(tid: &str, file: &str) -> ReceiptAttachment {
        ReceiptAttachment {
            transaction_id: tid.to_string(),
            file_name: file.to_string(),
        }
    }

    fn index() -> PurchaseIndex {
        let txs = vec![
            tx("1", 1, "Leche descremada", None),
            tx("2", 5, "leche entera", Some("s1")),
            tx("3", 6, "pan", Some("s1")),
            tx("4", 9, "Leche sin lactosa", None),
            tx("5", 12, "bread", None),
            tx("6", 15, "leche chocolate", None),
        ];
        let pics = vec![
            pic("1", "one.jpg"),
            pic("3", "split-late.jpg"),
            pic("2", "split-early.jpg"),
            pic("4", "four.pdf"),
        ];
        let items = HashMap::from([("it1".to_string(), "Lider".to_string())]);
        PurchaseIndex::new(
            LedgerSnapshot::new(txs, pics, items),
            MatchEngine::default(),
        )
    }

    fn options(max_count: usize) -> PlanOptions {
        PlanOptions {
            receipts_only: true,
            max_count,
            exclude_latest: true,
        }
    }

    #[test]
    fn test_plan_ready() {
        let index = index();
        let plan = index.plan("LECHE", options(3), &DiscardSet::new(), &[]);

        assert_eq!(plan.state, PlanState::Ready);
        assert_eq!(plan.match_kind, Some(MatchKind::Exact));
        assert_eq!(plan.product, "leche");
        let ids: Vec<&str> = plan.groups.iter().map(|g| g.transaction_id.as_str()).collect();
        // tx 6 has no receipt; split group s1 surfaces through tx 2
        assert_eq!(ids, vec!["4", "2", "1"]);
        assert_eq!(plan.groups[0].position, 1);
        assert_eq!(plan.groups[0].merchant.as_deref(), Some("Lider"));
        assert_eq!(plan.groups[0].form, FormDefaults::default());
        assert!(plan.summary.is_none());
    }

    #[test]
    fn test_split_group_lists_sibling_receipts() {
        let index = index();
        let plan = index.plan("leche entera", options(3), &DiscardSet::new(), &[]);
        let files: Vec<&str> = plan.groups[0]
            .receipts
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();
        assert_eq!(files, vec!["split-late.jpg", "split-early.jpg"]);
    }

    #[test]
    fn test_boundary_states() {
        let index = index();
        let none = DiscardSet::new();

        assert_eq!(index.plan("   ", options(3), &none, &[]).state, PlanState::EmptyQuery);
        assert_eq!(index.plan("zzzzqqq", options(3), &none, &[]).state, PlanState::NoMatches);
        assert_eq!(
            index.plan("bread", options(3), &none, &[]).state,
            PlanState::NoReceiptedMatches { matched_groups: 1 }
        );

        let empty = PurchaseIndex::new(LedgerSnapshot::default(), MatchEngine::default());
        assert_eq!(empty.plan("leche", options(3), &none, &[]).state, PlanState::EmptyCorpus);
    }

    #[test]
    fn test_session_discard_backfills() {
        let index = index();
        let store = MemoryHistoryStore::new();
        let mut session = BrowseSession::start(&index, "leche", options(2), &store).unwrap();
        assert_eq!(session.plan().groups.len(), 2);

        let plan = session.discard(1, &store).unwrap();
        let ids: Vec<&str> = plan.groups.iter().map(|g| g.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(plan.discarded, 1);

        assert!(session.discard(9, &store).is_err());
    }

    #[test]
    fn test_session_save_fills_from_ledger_and_sets_defaults() {
        let index = index();
        let store = MemoryHistoryStore::new();
        let mut session = BrowseSession::start(&index, "Leche", options(3), &store).unwrap();

        let outcome = session.save(2, 1090.0, 6.0, "lt", false, &store).unwrap();
        assert!(matches!(outcome, SaveOutcome::Created { .. }));

        let rows = store.read_all().unwrap();
        let record = &rows[0].record;
        assert_eq!(record.product, "leche");
        assert_eq!(record.transaction_id, "2");
        assert_eq!(record.merchant, "Lider");
        assert_eq!(record.receipt_file, "split-late.jpg");
        assert_eq!(record.purchase_date, NaiveDate::from_ymd_opt(2024, 3, 5));

        let view = session.plan().group(2).unwrap();
        assert_eq!(view.form.existing, Some(outcome.handle()));
        assert_eq!(view.form.unit_price, 1090.0);
        assert_eq!(view.form.unit, "lt");

        let summary = session.plan().summary.as_ref().unwrap();
        assert_eq!(summary.unit, "lt");
        assert_eq!(summary.purchases, 1);

        let again = session.save(2, 999.0, 1.0, "lt", false, &store).unwrap();
        assert!(matches!(again, SaveOutcome::RejectedDuplicate { .. }));
    }

    #[test]
    fn test_entry_for_unknown_transaction() {
        let index = index();
        assert!(matches!(
            index.entry_for("404", 1.0, 1.0, "un"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_product_summary_unit_selection() {
        let store = MemoryHistoryStore::new();
        let coordinator = UpsertCoordinator::new(&store);
        let index = index();
        for (tid, unit) in [("1", "kg"), ("2", "lt"), ("4", "lt")] {
            let entry = index.entry_for(tid, 1000.0, 1.0, unit).unwrap();
            coordinator.save("leche", tid, &entry, false).unwrap();
        }
        let history = store.read_all().unwrap();

        let dominant = product_summary(&history, "Leche", None, false).unwrap();
        assert_eq!(dominant.unit, "lt");
        assert_eq!(dominant.purchases, 2);

        let kg = product_summary(&history, "leche", Some(" kg"), false).unwrap();
        assert_eq!(kg.unit, "kg");
        assert_eq!(kg.purchases, 1);

        assert!(product_summary(&history, "leche", Some("un"), false).is_none());
        assert!(product_summary(&history, "pan", None, false).is_none());
    }

    #[test]
    fn test_plan_serializes_state_tag() {
        let index = index();
        let plan = index.plan("bread", options(3), &DiscardSet::new(), &[]);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["state"], "no_receipted_matches");
        assert_eq!(json["matched_groups"], 1);
    }
}
