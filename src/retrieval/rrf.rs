//! Reciprocal Rank Fusion (RRF).
//!
//! Combines the BM25 and dense rankings into one fused ranking.
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods"

use std::collections::HashMap;

/// The k parameter from the original paper. Higher values flatten the
/// contribution of top ranks.
pub const RRF_K: u32 = 60;

/// Fuses ranked lists of chunk ids.
///
/// The RRF score for each item is `score(d) = Σ 1 / (k + rank(d))`,
/// summed over every list containing the item; ranks are 1-indexed.
///
/// # Examples
///
/// ```
/// use openfda_agent::retrieval::{reciprocal_rank_fusion, RRF_K};
///
/// let bm25 = vec![1, 2, 3];
/// let dense = vec![3, 1, 2];
/// let fused = reciprocal_rank_fusion(&[&bm25, &dense], RRF_K);
/// assert_eq!(fused.len(), 3);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn reciprocal_rank_fusion(ranked_lists: &[&[i64]], k: u32) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for list in ranked_lists {
        for (rank, &item_id) in list.iter().enumerate() {
            // rank is 0-indexed; the formula wants 1-indexed
            let rrf_score = 1.0 / f64::from(k + (rank as u32) + 1);
            *scores.entry(item_id).or_insert(0.0) += rrf_score;
        }
    }

    let mut results: Vec<(i64, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}
