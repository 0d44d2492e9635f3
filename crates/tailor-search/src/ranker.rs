//! In-process similarity ranking.
//!
//! Production queries rank inside Postgres with pgvector; this ranker gives
//! the same ordering for small candidate sets and for stores without an
//! index. Scores are raw method values: cosine distance, Euclidean distance,
//! or inner product.

use tracing::trace;

use tailor_core::{DistanceMethod, Error, RankedCandidate, Result};

/// Cosine distance `1 - cos(a, b)`. A zero-norm vector has similarity 0,
/// so its distance to anything is 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Euclidean distance.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Raw inner product.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum::<f64>() as f32
}

/// Score of `candidate` against `query` under `method`.
pub fn score(method: DistanceMethod, query: &[f32], candidate: &[f32]) -> f32 {
    match method {
        DistanceMethod::Cosine => cosine_distance(query, candidate),
        DistanceMethod::L2 => l2_distance(query, candidate),
        DistanceMethod::InnerProduct => inner_product(query, candidate),
    }
}

/// Rank `candidates` against `query` and keep the best `top_k`.
///
/// Cosine and L2 rank ascending, inner product descending. The sort is
/// stable, so equal scores keep their input order. Every candidate must have
/// the query's dimension.
pub fn rank_candidates<K, V, I>(
    query: &[f32],
    candidates: I,
    method: DistanceMethod,
    top_k: usize,
) -> Result<Vec<RankedCandidate<K>>>
where
    I: IntoIterator<Item = (K, V)>,
    V: AsRef<[f32]>,
{
    let expected = query.len();
    let mut ranked = Vec::new();
    for (id, vector) in candidates {
        let vector = vector.as_ref();
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        ranked.push(RankedCandidate {
            id,
            score: score(method, query, vector),
        });
    }

    if method.ascending() {
        ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
    } else {
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    }
    ranked.truncate(top_k);

    trace!(
        subsystem = "search",
        op = "rank",
        method = ?method,
        result_count = ranked.len(),
        "Ranked candidates"
    );
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<K: Clone>(ranked: &[RankedCandidate<K>]) -> Vec<K> {
        ranked.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_has_distance_one() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_l2_and_inner_product() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert!((inner_product(&[1.0f32, 2.0], &[3.0, 4.0]) - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_ranks_ascending() {
        let query = [1.0f32, 0.0];
        let candidates = vec![
            ("orthogonal", vec![0.0f32, 1.0]),
            ("same", vec![1.0f32, 0.0]),
            ("diagonal", vec![1.0f32, 1.0]),
        ];
        let ranked = rank_candidates(&query, candidates, DistanceMethod::Cosine, 10).unwrap();
        assert_eq!(ids(&ranked), vec!["same", "diagonal", "orthogonal"]);
        assert!(ranked[0].score.abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_ranks_descending() {
        let query = [1.0f32, 1.0];
        let candidates = vec![
            ("small", [0.1f32, 0.1]),
            ("big", [2.0f32, 3.0]),
            ("mid", [1.0f32, 0.0]),
        ];
        let ranked =
            rank_candidates(&query, candidates, DistanceMethod::InnerProduct, 10).unwrap();
        assert_eq!(ids(&ranked), vec!["big", "mid", "small"]);
        assert!((ranked[0].score - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let query = [1.0f32, 0.0];
        let candidates = vec![
            (3, vec![0.0f32, 1.0]),
            (1, vec![0.0f32, 2.0]),
            (2, vec![0.0f32, 5.0]),
        ];
        for method in [DistanceMethod::Cosine, DistanceMethod::InnerProduct] {
            let ranked = rank_candidates(&query, candidates.clone(), method, 10).unwrap();
            assert_eq!(ids(&ranked), vec![3, 1, 2], "{:?}", method);
        }
    }

    #[test]
    fn test_truncates_to_top_k() {
        let query = [0.0f32];
        let candidates = (0..20).map(|i| (i, vec![i as f32]));
        let ranked = rank_candidates(&query, candidates, DistanceMethod::L2, 3).unwrap();
        assert_eq!(ids(&ranked), vec![0, 1, 2]);

        let ranked =
            rank_candidates(&query, vec![(0, vec![1.0f32])], DistanceMethod::L2, 0).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let query = vec![0.1f32; 1536];
        let candidates = vec![("a", vec![0.1f32; 1536]), ("b", vec![0.1f32; 3072])];
        let err = rank_candidates(&query, candidates, DistanceMethod::Cosine, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 1536,
                actual: 3072
            }
        ));
    }

    #[test]
    fn test_empty_candidates() {
        let ranked = rank_candidates::<u32, Vec<f32>, _>(
            &[1.0f32, 2.0],
            Vec::new(),
            DistanceMethod::Cosine,
            5,
        )
        .unwrap();
        assert!(ranked.is_empty());
    }
}
