//! Rank fusion for hybrid search.
//!
//! Fuses a dense and a sparse result list into one ranking. Both
//! strategies operate on `(id, score)` pairs already sorted by
//! descending score; backends map the fused ids back to documents.

use std::collections::HashMap;

/// Reciprocal-rank fusion: each list contributes `1 / (k + rank + 1)`
/// per id. Robust to incomparable score scales.
#[must_use]
pub fn reciprocal_rank_fusion(
    dense: &[(String, f32)],
    sparse: &[(String, f32)],
    k: f32,
) -> Vec<(String, f32)> {
    let mut fused: HashMap<String, f32> = HashMap::new();
    for (rank, (id, _)) in dense.iter().enumerate() {
        *fused.entry(id.clone()).or_default() += 1.0 / (k + rank as f32 + 1.0);
    }
    for (rank, (id, _)) in sparse.iter().enumerate() {
        *fused.entry(id.clone()).or_default() += 1.0 / (k + rank as f32 + 1.0);
    }
    sorted_desc(fused)
}

/// Weighted sum over per-list max-normalized scores.
///
/// Negative scores are clamped to zero before normalization so a list
/// of all-negative cosines cannot invert the ranking.
#[must_use]
pub fn weighted_sum(
    dense: &[(String, f32)],
    sparse: &[(String, f32)],
    dense_weight: f32,
    sparse_weight: f32,
) -> Vec<(String, f32)> {
    let mut fused: HashMap<String, f32> = HashMap::new();
    for (id, score) in normalize(dense) {
        *fused.entry(id).or_default() += dense_weight * score;
    }
    for (id, score) in normalize(sparse) {
        *fused.entry(id).or_default() += sparse_weight * score;
    }
    sorted_desc(fused)
}

fn normalize(list: &[(String, f32)]) -> Vec<(String, f32)> {
    let max = list.iter().map(|(_, s)| s.max(0.0)).fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    list.iter()
        .map(|(id, s)| (id.clone(), s.max(0.0) / max))
        .collect()
}

fn sorted_desc(fused: HashMap<String, f32>) -> Vec<(String, f32)> {
    let mut out: Vec<(String, f32)> = fused.into_iter().collect();
    out.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    out
}
