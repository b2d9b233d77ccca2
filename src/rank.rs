//! Ordering variants by score.
//!
//! Scores are sorted descending with `f64::total_cmp`. Exactly-equal scores
//! are ordered by [`tie_break_key`] of the decision's noise value, so ties are
//! resolved the same way every time for one decision but differently across
//! decisions.

use crate::error::{Error, Result};
use crate::hash::tie_break_key;

/// Indices of `scores`, best first.
#[must_use]
pub fn rank_indices(scores: &[f64], noise: f64) -> Vec<usize> {
    let mut idx: Vec<(usize, u64)> = (0..scores.len())
        .map(|i| (i, tie_break_key(noise, i)))
        .collect();
    idx.sort_by(|a, b| {
        scores[b.0]
            .total_cmp(&scores[a.0])
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.0.cmp(&b.0))
    });
    idx.into_iter().map(|(i, _)| i).collect()
}

/// Rank `items` by `scores` (same length, non-empty).
pub fn rank_with_scores<T: Clone>(items: &[T], scores: &[f64], noise: f64) -> Result<Vec<T>> {
    if items.is_empty() || scores.is_empty() {
        return Err(Error::invalid_argument("variants and scores can't be empty"));
    }
    if items.len() != scores.len() {
        return Err(Error::invalid_argument(format!(
            "variants.len() ({}) must equal scores.len() ({})",
            items.len(),
            scores.len()
        )));
    }
    Ok(rank_indices(scores, noise)
        .into_iter()
        .map(|i| items[i].clone())
        .collect())
}
