// Utility functions for recommender-service

use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Returned by [`recall`] when no user has a non-empty ground truth.
pub const RECALL_UNDEFINED: f64 = -1.0;

/// Score assigned to already-interacted items before top-k selection.
pub const MASKED_SCORE: f32 = -1e9;

/// Mean per-user recall, skipping users whose ground truth is empty.
///
/// Returns [`RECALL_UNDEFINED`] when every ground-truth list is empty.
pub fn recall<T: AsRef<[usize]>, P: AsRef<[usize]>>(truth: &[T], predicted: &[P]) -> f64 {
    let mut total = 0.0;
    let mut nonempty = 0usize;

    for (t, p) in truth.iter().zip(predicted.iter()) {
        let t = t.as_ref();
        if t.is_empty() {
            continue;
        }
        let truth_set: HashSet<usize> = t.iter().copied().collect();
        let pred_set: HashSet<usize> = p.as_ref().iter().copied().collect();
        total += truth_set.intersection(&pred_set).count() as f64 / t.len() as f64;
        nonempty += 1;
    }

    if nonempty == 0 {
        RECALL_UNDEFINED
    } else {
        total / nonempty as f64
    }
}

/// Indices of a vector sorted by descending score. NaN sorts last; ties keep index order.
pub fn argsort_desc(scores: ArrayView1<f32>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| compare_desc(scores[a], scores[b]));
    indices
}

/// The `k` highest-scoring column indices of every row. Entries at or below
/// [`MASKED_SCORE`] are never returned, so a row comes back shorter than `k`
/// when it has fewer unmasked columns.
pub fn top_k_rows(scores: ArrayView2<f32>, k: usize) -> Vec<Vec<usize>> {
    scores
        .outer_iter()
        .map(|row| {
            argsort_desc(row)
                .into_iter()
                .filter(|&col| row[col] > MASKED_SCORE)
                .take(k)
                .collect()
        })
        .collect()
}

fn compare_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Cosine similarity; zero vectors have similarity 0 with everything.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    const EPS: f32 = 1e-8;
    let denom = (a.dot(&a).sqrt() * b.dot(&b).sqrt()).max(EPS);
    a.dot(&b) / denom
}
