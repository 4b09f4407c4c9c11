//! Match engine: finds the transactions whose note mentions a product
//!
//! Exact substring containment on normalized notes comes first. Only when
//! nothing matches literally does the fuzzy fallback run, scoring each note
//! with a Levenshtein-based partial ratio and keeping notes at or above the
//! threshold.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::models::Transaction;
use crate::normalize::normalize;

/// Default minimum partial-ratio score for the fuzzy fallback
pub const DEFAULT_FUZZY_THRESHOLD: u8 = 80;

/// How the returned matches were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Transactions paired with their normalized notes, built once per snapshot
#[derive(Debug, Clone)]
pub struct Corpus<'a> {
    entries: Vec<(&'a Transaction, String)>,
}

impl<'a> Corpus<'a> {
    pub fn new(transactions: &'a [Transaction]) -> Self {
        Self {
            entries: transactions
                .iter()
                .map(|tx| (tx, normalize(&tx.note)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a search: matching transactions in corpus order
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    pub kind: MatchKind,
    pub transactions: Vec<&'a Transaction>,
}

impl Matches<'_> {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}

/// Exact-first, fuzzy-fallback note matcher
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine {
    threshold: u8,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl MatchEngine {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Find transactions matching an already-normalized query
    ///
    /// An empty query matches nothing.
    pub fn search<'a>(&self, corpus: &Corpus<'a>, query_normalized: &str) -> Matches<'a> {
        if query_normalized.is_empty() {
            return Matches {
                kind: MatchKind::Exact,
                transactions: Vec::new(),
            };
        }

        let exact: Vec<&Transaction> = corpus
            .entries
            .iter()
            .filter(|(_, note)| note.contains(query_normalized))
            .map(|(tx, _)| *tx)
            .collect();

        if !exact.is_empty() {
            debug!(query = query_normalized, matches = exact.len(), "Exact note matches");
            return Matches {
                kind: MatchKind::Exact,
                transactions: exact,
            };
        }

        let fuzzy: Vec<&Transaction> = corpus
            .entries
            .iter()
            .filter(|(_, note)| !note.is_empty())
            .filter(|(_, note)| partial_ratio(query_normalized, note) >= self.threshold)
            .map(|(tx, _)| *tx)
            .collect();

        debug!(
            query = query_normalized,
            matches = fuzzy.len(),
            threshold = self.threshold,
            "No exact match, used fuzzy fallback"
        );

        Matches {
            kind: MatchKind::Fuzzy,
            transactions: fuzzy,
        }
    }
}

/// Similarity of the shorter string against its best-aligned window in the
/// longer one, on a 0..=100 scale. A literal substring scores 100.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return 0;
    }

    let needle: String = short.iter().collect();
    let window = short.len();
    let best = (0..=long.len() - window)
        .map(|start| {
            let candidate: String = long[start..start + window].iter().collect();
            normalized_levenshtein(&needle, &candidate)
        })
        .fold(0.0_f64, f64::max);

    (best * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(id: &str, note: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            note: note.to_string(),
            item_id: None,
            split_id: None,
        }
    }

    fn ids(matches: &Matches) -> Vec<String> {
        matches.transactions.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_partial_ratio_substring_is_100() {
        assert_eq!(partial_ratio("leche", "compra leche descremada"), 100);
        assert_eq!(partial_ratio("compra leche descremada", "leche"), 100);
    }

    #[test]
    fn test_partial_ratio_tolerates_typo() {
        // one substitution in five characters
        assert_eq!(partial_ratio("lechr", "leche descremada"), 80);
        assert_eq!(partial_ratio("tomatr", "tomate cherry"), 83);
    }

    #[test]
    fn test_partial_ratio_unrelated_is_low() {
        assert!(partial_ratio("milk", "bread") < 80);
        assert_eq!(partial_ratio("", "bread"), 0);
    }

    #[test]
    fn test_exact_match_first() {
        let txs = vec![
            tx("1", "bought milk"),
            tx("2", "leche descremada"),
            tx("3", "bread"),
        ];
        let corpus = Corpus::new(&txs);
        let engine = MatchEngine::default();

        let milk = engine.search(&corpus, "milk");
        assert_eq!(milk.kind, MatchKind::Exact);
        assert_eq!(ids(&milk), vec!["1"]);

        let leche = engine.search(&corpus, "leche");
        assert_eq!(leche.kind, MatchKind::Exact);
        assert_eq!(ids(&leche), vec!["2"]);
    }

    #[test]
    fn test_exact_match_is_accent_insensitive() {
        let txs = vec![tx("1", "Plátanos orgánicos"), tx("2", "PLATANO")];
        let corpus = Corpus::new(&txs);
        let matches = MatchEngine::default().search(&corpus, &normalize("platano"));
        assert_eq!(ids(&matches), vec!["1", "2"]);
    }

    #[test]
    fn test_substring_not_word_boundary() {
        let txs = vec![tx("1", "buttermilk pancakes")];
        let corpus = Corpus::new(&txs);
        let matches = MatchEngine::default().search(&corpus, "milk");
        assert_eq!(ids(&matches), vec!["1"]);
    }

    #[test]
    fn test_fuzzy_fallback_only_without_exact() {
        let txs = vec![tx("1", "leche descremada"), tx("2", "pan amasado")];
        let corpus = Corpus::new(&txs);
        let matches = MatchEngine::default().search(&corpus, "lechr");
        assert_eq!(matches.kind, MatchKind::Fuzzy);
        assert_eq!(ids(&matches), vec!["1"]);
    }

    #[test]
    fn test_fuzzy_does_not_run_when_exact_hits() {
        // "lech" would fuzzy-match note 2 as well, but note 1 contains it literally
        let txs = vec![tx("1", "lech"), tx("2", "leche")];
        let corpus = Corpus::new(&txs);
        let matches = MatchEngine::default().search(&corpus, "leche");
        assert_eq!(matches.kind, MatchKind::Exact);
        assert_eq!(ids(&matches), vec!["2"]);
    }

    #[test]
    fn test_fuzzy_skips_empty_notes() {
        let txs = vec![tx("1", ""), tx("2", "   ")];
        let corpus = Corpus::new(&txs);
        let matches = MatchEngine::default().search(&corpus, "milk");
        assert!(matches.is_empty());
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let txs = vec![tx("1", "milk")];
        let corpus = Corpus::new(&txs);
        assert!(MatchEngine::default().search(&corpus, "").is_empty());
    }

    #[test]
    fn test_threshold_is_configurable() {
        let txs = vec![tx("1", "leche descremada")];
        let corpus = Corpus::new(&txs);
        assert!(MatchEngine::new(90).search(&corpus, "lechr").is_empty());
        assert_eq!(MatchEngine::new(200).threshold(), 100);
    }
}
