//! Component ranker: which purchase groups to show, and in what order
//!
//! Steps, applied to the matches of one query:
//! 1. drop groups the user discarded this session
//! 2. with `receipts_only`, keep groups that have a receipt on any member
//! 3. order by the group's newest receipt, groups without one last
//! 4. cap to `max_count`
//! 5. pick the newest matching transaction of each group as representative
//!
//! Because discards are applied before the cap, re-ranking after a discard
//! backfills from the next eligible group.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::grouping::PurchaseGroups;
use crate::models::Transaction;
use crate::receipts::ReceiptIndex;

/// Group identifiers hidden by the user during one browsing session
#[derive(Debug, Clone, Default)]
pub struct DiscardSet {
    comps: HashSet<String>,
}

impl DiscardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide a group; returns false if it was already hidden
    pub fn insert(&mut self, comp_id: impl Into<String>) -> bool {
        self.comps.insert(comp_id.into())
    }

    pub fn contains(&self, comp_id: &str) -> bool {
        self.comps.contains(comp_id)
    }

    pub fn len(&self) -> usize {
        self.comps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DiscardSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            comps: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ranking parameters chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    pub receipts_only: bool,
    pub max_count: usize,
}

/// A purchase group selected for display
#[derive(Debug, Clone, PartialEq)]
pub struct RankedGroup<'a> {
    pub comp_id: String,
    /// Newest matching transaction in the group
    pub representative: &'a Transaction,
    pub latest_receipt: Option<NaiveDateTime>,
    pub has_receipt: bool,
    /// Number of matching transactions in the group
    pub matched: usize,
}

/// Ranking result with its boundary conditions
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome<'a> {
    /// Nothing matched (or every match was discarded)
    NoMatches,
    /// Matches exist, but none of their groups has a receipt
    NoReceiptedMatches { matched_groups: usize },
    Ranked(Vec<RankedGroup<'a>>),
}

/// Rank the groups of `matches` for display
pub fn rank<'a>(
    matches: &[&'a Transaction],
    groups: &PurchaseGroups,
    receipts: &ReceiptIndex,
    discarded: &DiscardSet,
    options: RankOptions,
) -> RankOutcome<'a> {
    let mut by_comp: HashMap<&str, Vec<&'a Transaction>> = HashMap::new();
    for tx in matches {
        let comp = groups.comp_id(&tx.id).unwrap_or(tx.id.as_str());
        if discarded.contains(comp) {
            continue;
        }
        by_comp.entry(comp).or_default().push(tx);
    }

    if by_comp.is_empty() {
        return RankOutcome::NoMatches;
    }

    if options.receipts_only {
        let matched_groups = by_comp.len();
        by_comp.retain(|comp, _| groups.has_receipt(comp));
        if by_comp.is_empty() {
            return RankOutcome::NoReceiptedMatches { matched_groups };
        }
    }

    let mut ranked: Vec<RankedGroup<'a>> = by_comp
        .into_iter()
        .filter_map(|(comp, members)| {
            let representative = members.iter().copied().max_by(|a, b| {
                a.date.cmp(&b.date).then_with(|| b.id.cmp(&a.id))
            })?;
            Some(RankedGroup {
                comp_id: comp.to_string(),
                representative,
                latest_receipt: receipts.latest_date(comp),
                has_receipt: groups.has_receipt(comp),
                matched: members.len(),
            })
        })
        .collect();

    // None < Some, so comparing b to a puts groups without receipts last
    ranked.sort_by(|a, b| {
        b.latest_receipt
            .cmp(&a.latest_receipt)
            .then_with(|| b.representative.date.cmp(&a.representative.date))
            .then_with(|| a.comp_id.cmp(&b.comp_id))
    });
    ranked.truncate(options.max_count);

    RankOutcome::Ranked(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceiptAttachment;
    use chrono::NaiveDate;

    fn tx(id: &str, day: u32, split: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 7, day)
                .unwrap()
                .and_hms_opt(18, 30, 0)
                .unwrap(),
            note: "milk".to_string(),
            item_id: None,
            split_id: split.map(String::from),
        }
    }

    fn pic(tid: &str) -> ReceiptAttachment {
        ReceiptAttachment {
            transaction_id: tid.to_string(),
            file_name: format!("{}.jpg", tid),
        }
    }

    struct Fixture {
        txs: Vec<Transaction>,
        groups: PurchaseGroups,
        receipts: ReceiptIndex,
    }

    impl Fixture {
        fn new(txs: Vec<Transaction>, pics: Vec<ReceiptAttachment>) -> Self {
            let groups = PurchaseGroups::build(&txs, &pics);
            let receipts = ReceiptIndex::build(&groups, &txs, &pics);
            Self {
                txs,
                groups,
                receipts,
            }
        }

        fn rank(
            &self,
            discarded: &DiscardSet,
            receipts_only: bool,
            max_count: usize,
        ) -> RankOutcome<'_> {
            let matches: Vec<&Transaction> = self.txs.iter().collect();
            rank(
                &matches,
                &self.groups,
                &self.receipts,
                discarded,
                RankOptions {
                    receipts_only,
                    max_count,
                },
            )
        }
    }

    fn rep_ids(outcome: &RankOutcome) -> Vec<String> {
        match outcome {
            RankOutcome::Ranked(groups) => groups
                .iter()
                .map(|g| g.representative.id.clone())
                .collect(),
            other => panic!("expected ranked groups, got {:?}", other),
        }
    }

    fn five_receipted_groups() -> Fixture {
        let txs = (1..=5).map(|d| tx(&d.to_string(), d, None)).collect();
        let pics = (1..=5).map(|d| pic(&d.to_string())).collect();
        Fixture::new(txs, pics)
    }

    #[test]
    fn test_cap_returns_most_recent() {
        let fx = five_receipted_groups();
        let outcome = fx.rank(&DiscardSet::new(), true, 2);
        assert_eq!(rep_ids(&outcome), vec!["5", "4"]);
    }

    #[test]
    fn test_discard_backfills_cap() {
        let fx = five_receipted_groups();
        let mut discarded = DiscardSet::new();

        let first = fx.rank(&discarded, true, 2);
        let top = match &first {
            RankOutcome::Ranked(groups) => groups[0].comp_id.clone(),
            _ => unreachable!(),
        };
        discarded.insert(top);

        let second = fx.rank(&discarded, true, 2);
        assert_eq!(rep_ids(&second), vec!["4", "3"]);
    }

    #[test]
    fn test_discarded_group_never_resurfaces() {
        let fx = five_receipted_groups();
        let discarded: DiscardSet = ["5", "3"].into_iter().collect();
        let outcome = fx.rank(&discarded, false, 10);
        assert_eq!(rep_ids(&outcome), vec!["4", "2", "1"]);
    }

    #[test]
    fn test_cap_is_not_a_minimum() {
        let fx = five_receipted_groups();
        let outcome = fx.rank(&DiscardSet::new(), true, 50);
        assert_eq!(rep_ids(&outcome).len(), 5);
    }

    #[test]
    fn test_split_receipt_on_sibling_surfaces_group() {
        // tx 1 carries the receipt, tx 2 is the later sibling without one
        let fx = Fixture::new(
            vec![tx("1", 10, Some("split-9")), tx("2", 11, Some("split-9"))],
            vec![pic("1")],
        );
        let outcome = fx.rank(&DiscardSet::new(), true, 3);
        match &outcome {
            RankOutcome::Ranked(groups) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].representative.id, "2");
                assert_eq!(groups[0].matched, 2);
                assert!(groups[0].has_receipt);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_no_receipted_matches_is_distinct() {
        let fx = Fixture::new(vec![tx("1", 1, None), tx("2", 2, None)], vec![]);
        assert_eq!(
            fx.rank(&DiscardSet::new(), true, 3),
            RankOutcome::NoReceiptedMatches { matched_groups: 2 }
        );
        assert_eq!(rep_ids(&fx.rank(&DiscardSet::new(), false, 3)), vec!["2", "1"]);
    }

    #[test]
    fn test_no_matches() {
        let fx = Fixture::new(vec![], vec![]);
        assert_eq!(fx.rank(&DiscardSet::new(), true, 3), RankOutcome::NoMatches);
    }

    #[test]
    fn test_groups_without_receipt_sort_last() {
        // tx 9 is the newest purchase but has no receipt
        let fx = Fixture::new(
            vec![tx("1", 1, None), tx("9", 20, None), tx("5", 5, None)],
            vec![pic("1"), pic("5")],
        );
        let outcome = fx.rank(&DiscardSet::new(), false, 3);
        assert_eq!(rep_ids(&outcome), vec!["5", "1", "9"]);
    }

    #[test]
    fn test_representative_tie_breaks_by_id() {
        let fx = Fixture::new(
            vec![tx("b", 3, Some("s")), tx("a", 3, Some("s"))],
            vec![pic("b")],
        );
        assert_eq!(rep_ids(&fx.rank(&DiscardSet::new(), true, 1)), vec!["a"]);
    }
}
