//! Purchase grouping
//!
//! Ledger entries that belong to one real-world purchase (split transactions,
//! one receipt allocated across several categories) are merged into a single
//! group with a union-find over string keys:
//! - every transaction id is registered
//! - a transaction with a split id is unioned with that split id
//! - every receipt's transaction id is registered, so a receipt on any
//!   sibling marks the whole group as "has receipt"
//!
//! Membership is computed once from the full snapshot and then frozen.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{ReceiptAttachment, Transaction};

/// Union-find over string keys with path compression and union by rank
#[derive(Debug, Default, Clone)]
pub struct DisjointSet {
    parent: HashMap<String, String>,
    rank: HashMap<String, u32>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` as its own group if unseen
    pub fn add(&mut self, key: &str) {
        if !self.parent.contains_key(key) {
            self.parent.insert(key.to_string(), key.to_string());
            self.rank.insert(key.to_string(), 0);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parent.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Canonical representative of `key`'s group, adding `key` if unseen.
    ///
    /// Uses path halving: every visited node is re-pointed at its grandparent.
    pub fn find(&mut self, key: &str) -> String {
        self.add(key);
        let mut current = key.to_string();
        loop {
            let parent = self.parent[&current].clone();
            if parent == current {
                return current;
            }
            let grandparent = self.parent[&parent].clone();
            self.parent.insert(current, grandparent.clone());
            current = grandparent;
        }
    }

    /// Merge the groups containing `a` and `b`
    pub fn union(&mut self, a: &str, b: &str) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }

        let rank_a = self.rank[&root_a];
        let rank_b = self.rank[&root_b];
        if rank_a < rank_b {
            std::mem::swap(&mut root_a, &mut root_b);
        }

        self.parent.insert(root_b, root_a.clone());
        if rank_a == rank_b {
            if let Some(rank) = self.rank.get_mut(&root_a) {
                *rank += 1;
            }
        }
    }

    /// Whether `a` and `b` are in the same group
    pub fn same_group(&mut self, a: &str, b: &str) -> bool {
        self.find(a) == self.find(b)
    }
}

/// Frozen group membership for one ledger snapshot
#[derive(Debug, Clone, Default)]
pub struct PurchaseGroups {
    comp_of: HashMap<String, String>,
    with_receipt: HashSet<String>,
}

impl PurchaseGroups {
    /// Build group membership from the full transaction and receipt sets
    pub fn build(transactions: &[Transaction], attachments: &[ReceiptAttachment]) -> Self {
        let mut dsu = DisjointSet::new();

        for tx in transactions {
            dsu.add(&tx.id);
        }

        for tx in transactions {
            if let Some(split) = tx.split_id.as_deref().filter(|s| !s.is_empty()) {
                dsu.union(&tx.id, split);
            }
        }

        for attachment in attachments {
            dsu.add(&attachment.transaction_id);
        }

        let mut comp_of = HashMap::with_capacity(transactions.len() + attachments.len());
        for tx in transactions {
            let comp = dsu.find(&tx.id);
            comp_of.insert(tx.id.clone(), comp);
        }

        let mut with_receipt = HashSet::new();
        for attachment in attachments {
            let comp = dsu.find(&attachment.transaction_id);
            comp_of.insert(attachment.transaction_id.clone(), comp.clone());
            with_receipt.insert(comp);
        }

        debug!(
            keys = dsu.len(),
            groups = comp_of.values().collect::<HashSet<_>>().len(),
            with_receipt = with_receipt.len(),
            "Built purchase groups"
        );

        Self {
            comp_of,
            with_receipt,
        }
    }

    /// Group identifier of a transaction (or receipt owner) id
    pub fn comp_id(&self, transaction_id: &str) -> Option<&str> {
        self.comp_of.get(transaction_id).map(String::as_str)
    }

    /// Whether any receipt attachment resolves into the group
    pub fn has_receipt(&self, comp_id: &str) -> bool {
        self.with_receipt.contains(comp_id)
    }

    /// Transaction ids belonging to a group, sorted
    pub fn members(&self, comp_id: &str) -> Vec<&str> {
        let mut members: Vec<&str> = self
            .comp_of
            .iter()
            .filter(|(_, comp)| comp.as_str() == comp_id)
            .map(|(id, _)| id.as_str())
            .collect();
        members.sort_unstable();
        members
    }

    /// Number of distinct groups
    pub fn group_count(&self) -> usize {
        self.comp_of.values().collect::<HashSet<_>>().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(id: &str, split: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
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
    fn test_find_is_idempotent() {
        let mut dsu = DisjointSet::new();
        dsu.union("a", "b");
        dsu.union("c", "d");
        dsu.union("b", "d");

        let first = dsu.find("a");
        let second = dsu.find("a");
        assert_eq!(first, second);
        for key in ["b", "c", "d"] {
            assert_eq!(dsu.find(key), first);
        }
    }

    #[test]
    fn test_union_is_transitive() {
        let mut dsu = DisjointSet::new();
        dsu.union("A", "B");
        dsu.union("B", "C");
        assert_eq!(dsu.find("A"), dsu.find("C"));
        assert!(!dsu.same_group("A", "Z"));
    }

    #[test]
    fn test_find_adds_unseen_key() {
        let mut dsu = DisjointSet::new();
        assert!(!dsu.contains("x"));
        assert_eq!(dsu.find("x"), "x");
        assert!(dsu.contains("x"));
        assert_eq!(dsu.len(), 1);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut dsu = DisjointSet::new();
        dsu.add("k");
        dsu.union("k", "j");
        let root = dsu.find("k");
        dsu.add("k");
        assert_eq!(dsu.find("k"), root);
        assert_eq!(dsu.len(), 2);
    }

    #[test]
    fn test_union_by_rank_keeps_deeper_root() {
        let mut dsu = DisjointSet::new();
        dsu.union("a", "b"); // rank(root ab) = 1
        let deep_root = dsu.find("a");
        dsu.union("c", deep_root.as_str()); // c has rank 0, attaches under deep_root
        assert_eq!(dsu.find("c"), deep_root);
    }

    #[test]
    fn test_long_chain_compresses() {
        let mut dsu = DisjointSet::new();
        for i in 0..100 {
            dsu.union(&format!("k{}", i), &format!("k{}", i + 1));
        }
        let root = dsu.find("k0");
        for i in 0..=100 {
            assert_eq!(dsu.find(&format!("k{}", i)), root);
        }
    }

    #[test]
    fn test_split_siblings_share_group() {
        let txs = vec![tx("1", Some("900")), tx("2", Some("900")), tx("3", None)];
        let groups = PurchaseGroups::build(&txs, &[]);

        assert_eq!(groups.comp_id("1"), groups.comp_id("2"));
        assert_ne!(groups.comp_id("1"), groups.comp_id("3"));
        assert_eq!(groups.group_count(), 2);
    }

    #[test]
    fn test_empty_split_is_ignored() {
        let txs = vec![tx("1", Some("")), tx("2", Some(""))];
        let groups = PurchaseGroups::build(&txs, &[]);
        assert_ne!(groups.comp_id("1"), groups.comp_id("2"));
    }

    #[test]
    fn test_receipt_on_sibling_marks_group() {
        let txs = vec![tx("1", Some("s")), tx("2", Some("s")), tx("3", None)];
        let groups = PurchaseGroups::build(&txs, &[pic("2", "r.jpg")]);

        let comp = groups.comp_id("1").unwrap();
        assert!(groups.has_receipt(comp));
        assert!(!groups.has_receipt(groups.comp_id("3").unwrap()));
    }

    #[test]
    fn test_receipt_for_unknown_transaction_is_own_group() {
        let txs = vec![tx("1", None)];
        let groups = PurchaseGroups::build(&txs, &[pic("77", "orphan.jpg")]);

        assert_eq!(groups.comp_id("77"), Some("77"));
        assert!(!groups.has_receipt(groups.comp_id("1").unwrap()));
    }

    #[test]
    fn test_members_lists_group() {
        let txs = vec![tx("1", Some("s")), tx("2", Some("s")), tx("3", None)];
        let groups = PurchaseGroups::build(&txs, &[]);
        let comp = groups.comp_id("2").unwrap().to_string();
        assert_eq!(groups.members(&comp), vec!["1", "2"]);
    }
}
