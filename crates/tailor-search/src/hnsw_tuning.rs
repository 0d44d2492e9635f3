//! HNSW `ef_search` selection.
//!
//! Larger `ef_search` widens the candidate list pgvector keeps while walking
//! the graph: better recall, slower queries. The value grows with the recall
//! target and logarithmically with corpus size.

use serde::{Deserialize, Serialize};

/// Recall level requested for an ANN query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallTarget {
    /// Interactive suggestions (~85% recall).
    Fast,
    /// Default matching (~92% recall).
    #[default]
    Balanced,
    /// Final artifact selection for a CV (~96% recall).
    High,
    /// Offline evaluation (~99% recall).
    Exhaustive,
}

impl RecallTarget {
    /// `ef_search` for a corpus at or below [`SCALE_PIVOT`] vectors.
    pub fn base_ef(&self) -> i32 {
        match self {
            Self::Fast => 20,
            Self::Balanced => 40,
            Self::High => 100,
            Self::Exhaustive => 200,
        }
    }

    /// Smallest target that meets `recall` (a fraction in [0, 1]).
    pub fn for_recall(recall: f64) -> Self {
        if recall <= 0.85 {
            Self::Fast
        } else if recall <= 0.92 {
            Self::Balanced
        } else if recall <= 0.96 {
            Self::High
        } else {
            Self::Exhaustive
        }
    }
}

/// Corpus size above which `ef_search` starts to grow.
pub const SCALE_PIVOT: usize = 10_000;

/// pgvector's default `hnsw.ef_search`.
pub const MIN_EF: i32 = 10;

/// Upper bound; pgvector rejects values above 1000.
pub const MAX_EF: i32 = 1000;

/// `ef_search` for `target` over `corpus_size` vectors.
///
/// `ef = base * (1 + log2(corpus_size / SCALE_PIVOT))`, clamped to
/// [`MIN_EF`, `MAX_EF`]. Corpora at or below the pivot use the base value.
pub fn compute_ef(target: RecallTarget, corpus_size: usize) -> i32 {
    let base = f64::from(target.base_ef());
    let ratio = corpus_size as f64 / SCALE_PIVOT as f64;
    let growth = if ratio > 1.0 { ratio.log2() } else { 0.0 };
    let ef = (base * (1.0 + growth)).round();
    (ef.min(f64::from(MAX_EF)) as i32).clamp(MIN_EF, MAX_EF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_ef_for_small_corpus() {
        assert_eq!(compute_ef(RecallTarget::Fast, 0), 20);
        assert_eq!(compute_ef(RecallTarget::Balanced, 5_000), 40);
        assert_eq!(compute_ef(RecallTarget::High, SCALE_PIVOT), 100);
    }

    #[test]
    fn test_ef_grows_with_corpus() {
        // 40_000 / 10_000 = 4, log2(4) = 2, 40 * 3 = 120
        assert_eq!(compute_ef(RecallTarget::Balanced, 40_000), 120);
        assert!(
            compute_ef(RecallTarget::Balanced, 1_000_000)
                > compute_ef(RecallTarget::Balanced, 100_000)
        );
    }

    #[test]
    fn test_ef_is_capped() {
        assert_eq!(compute_ef(RecallTarget::Exhaustive, usize::MAX), MAX_EF);
    }

    #[test]
    fn test_for_recall() {
        assert_eq!(RecallTarget::for_recall(0.5), RecallTarget::Fast);
        assert_eq!(RecallTarget::for_recall(0.9), RecallTarget::Balanced);
        assert_eq!(RecallTarget::for_recall(0.95), RecallTarget::High);
        assert_eq!(RecallTarget::for_recall(0.99), RecallTarget::Exhaustive);
    }

    #[test]
    fn test_default_target() {
        assert_eq!(RecallTarget::default(), RecallTarget::Balanced);
    }
}
