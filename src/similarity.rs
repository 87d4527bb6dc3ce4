//! Fuzzy best-match between submission identifiers and reference
//! identifiers.
//!
//! The metric is a case-folded Jaro similarity with a Winkler-style bonus
//! for a shared prefix (factor 0.2, prefix capped at three characters). The
//! envelope this buys: one- or two-character typos on short identifiers
//! score well above 0.9, plausible renamings (`compte` → `count`) stay above
//! 0.8, and dissimilar identifiers fall below 0.5. The factor stays far from
//! the degenerate `p · l = 1` corner, so only identical strings reach 1.0.

use std::collections::HashMap;

const PREFIX_SCALE: f64 = 0.2;
const MAX_PREFIX: usize = 3;

/// Scores the similarity of two identifiers in `[0, 1]`; 1 means identical
/// up to case. The metric is symmetric.
#[must_use]
pub fn identifier_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let jaro = strsim::jaro(&a, &b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let boosted = jaro + (prefix as f64) * PREFIX_SCALE * (1.0 - jaro);
    boosted.clamp(0.0, 1.0)
}

/// A match target: a primary name plus the aliases that score as well as the
/// name itself.
#[derive(Debug, Clone)]
pub struct MatchCandidate<'a> {
    /// The primary name of the candidate.
    pub name: &'a str,
    /// Alias names; the candidate scores as the maximum over name and
    /// aliases.
    pub aliases: &'a [String],
}

impl<'a> MatchCandidate<'a> {
    /// A candidate without aliases.
    #[must_use]
    pub fn plain(name: &'a str) -> Self {
        Self { name, aliases: &[] }
    }

    fn score_against(&self, row: &str) -> f64 {
        std::iter::once(self.name)
            .chain(self.aliases.iter().map(String::as_str))
            .map(|candidate| identifier_similarity(row, candidate))
            .fold(0.0, f64::max)
    }
}

/// Computes best matches between two sets of names under a threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f64,
}

impl SimilarityMatcher {
    /// Creates a matcher with the given threshold in `[0, 1]`.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The best column for one row, or `None` when every column scores
    /// below the threshold. Ties keep the earliest column.
    #[must_use]
    pub fn best_match(&self, row: &str, columns: &[MatchCandidate<'_>]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, column) in columns.iter().enumerate() {
            let score = column.score_against(row);
            if score < self.threshold {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }

    /// Maps each row to its best column. When two rows pick the same column,
    /// only the strictly better row keeps its mapping; the loser gets none.
    /// Equal scores keep the earlier row, so the result is stable for equal
    /// inputs.
    #[must_use]
    pub fn match_sets(
        &self,
        rows: &[&str],
        columns: &[MatchCandidate<'_>],
    ) -> HashMap<usize, usize> {
        let mut by_column: HashMap<usize, (usize, f64)> = HashMap::new();
        for (row_index, row) in rows.iter().enumerate() {
            if let Some((column_index, score)) = self.best_match(row, columns) {
                match by_column.get(&column_index) {
                    Some(&(_, winning_score)) if score <= winning_score => {}
                    _ => {
                        by_column.insert(column_index, (row_index, score));
                    }
                }
            }
        }
        by_column
            .into_iter()
            .map(|(column_index, (row_index, _))| (row_index, column_index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert!((identifier_similarity("count", "count") - 1.0).abs() < f64::EPSILON);
        assert!((identifier_similarity("Count", "count") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn small_typos_score_high() {
        assert!(identifier_similarity("getValue", "getValeu") > 0.9);
        assert!(identifier_similarity("counter", "countr") > 0.9);
        assert!(identifier_similarity("roll", "rol") > 0.9);
    }

    #[test]
    fn renamings_clear_a_relaxed_threshold() {
        assert!(identifier_similarity("compte", "count") >= 0.8);
    }

    #[test]
    fn dissimilar_names_score_low() {
        assert!(identifier_similarity("foo", "barbaz") < 0.5);
        assert!(identifier_similarity("roll", "accumulator") < 0.5);
    }

    #[test]
    fn below_threshold_yields_no_match() {
        let matcher = SimilarityMatcher::new(0.9);
        let columns = [MatchCandidate::plain("accumulator")];
        assert_eq!(matcher.best_match("roll", &columns), None);
    }

    #[test]
    fn aliases_score_as_the_candidate() {
        let aliases = vec!["dice".to_owned()];
        let columns = [MatchCandidate {
            name: "randomSource",
            aliases: &aliases,
        }];
        let matcher = SimilarityMatcher::new(0.9);
        let (index, score) = matcher.best_match("dice", &columns).unwrap();
        assert_eq!(index, 0);
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_targets_keep_the_better_row() {
        // `count` is an exact match; `countr` also points at `count` but
        // loses and gets no mapping at all.
        let matcher = SimilarityMatcher::new(0.8);
        let columns = [MatchCandidate::plain("count"), MatchCandidate::plain("reset")];
        let matches = matcher.match_sets(&["countr", "count"], &columns);
        assert_eq!(matches.get(&1), Some(&0));
        assert_eq!(matches.get(&0), None);
    }

    #[test]
    fn equal_scores_keep_the_earlier_row() {
        let matcher = SimilarityMatcher::new(0.8);
        let columns = [MatchCandidate::plain("count")];
        let matches = matcher.match_sets(&["Count", "coUnt"], &columns);
        assert_eq!(matches.get(&0), Some(&0));
        assert_eq!(matches.get(&1), None);
    }

    proptest! {
        #[test]
        fn metric_is_symmetric_and_bounded(a in "[a-zA-Z]{0,12}", b in "[a-zA-Z]{0,12}") {
            let ab = identifier_similarity(&a, &b);
            let ba = identifier_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&ab));
        }
    }
}
