//! Monte Carlo propensity of a decision's best variant.
//!
//! Each trial draws fresh noise and checks whether the best variant still
//! ranks first. Decisions scored by a model re-encode and re-score the same
//! variants and givens every trial; decisions built from caller-supplied
//! scores re-rank those scores, so only the noise-keyed tie-break moves.
//! Trials share only read-only inputs. With the `parallel` feature they run
//! on rayon's pool.

use crate::error::{Error, Result};
use crate::model::{DecisionModel, ScoringState};
use crate::rank::rank_indices;
use crate::variant::{Givens, Variant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fraction of `trials` in which `variants[best_index]` ranks first after
/// re-scoring through `state` (or the fallback scores when unloaded).
pub(crate) fn estimate_propensity(
    model: &DecisionModel,
    state: Option<&ScoringState>,
    variants: &[Variant],
    givens: Option<&Givens>,
    best_index: usize,
    trials: usize,
) -> Result<f64> {
    check_inputs(variants.len(), best_index, trials)?;
    if variants.len() == 1 {
        return Ok(1.0);
    }
    success_rate(trials, |_| {
        let noise = model.draw_noise();
        let scores = model.score_with(state, variants, givens, noise)?;
        Ok(rank_indices(&scores, noise).first() == Some(&best_index))
    })
}

/// Fraction of `trials` in which `scores[best_index]` ranks first when the
/// fixed `scores` are re-ranked under a fresh noise draw.
pub(crate) fn estimate_propensity_from_scores(
    model: &DecisionModel,
    scores: &[f64],
    best_index: usize,
    trials: usize,
) -> Result<f64> {
    check_inputs(scores.len(), best_index, trials)?;
    if scores.len() == 1 {
        return Ok(1.0);
    }
    success_rate(trials, |_| {
        Ok(rank_indices(scores, model.draw_noise()).first() == Some(&best_index))
    })
}

fn check_inputs(len: usize, best_index: usize, trials: usize) -> Result<()> {
    if trials == 0 {
        return Err(Error::invalid_argument("trials must be > 0"));
    }
    if best_index >= len {
        return Err(Error::invalid_argument(format!(
            "best_index {best_index} out of range for {len} variants"
        )));
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn success_rate<F>(trials: usize, trial: F) -> Result<f64>
where
    F: Fn(usize) -> Result<bool> + Sync + Send,
{
    let wins = (0..trials)
        .into_par_iter()
        .map(trial)
        .collect::<Result<Vec<bool>>>()?;
    Ok(wins.into_iter().filter(|&w| w).count() as f64 / trials as f64)
}

#[cfg(not(feature = "parallel"))]
fn success_rate<F>(trials: usize, trial: F) -> Result<f64>
where
    F: Fn(usize) -> Result<bool>,
{
    let wins = (0..trials).map(trial).collect::<Result<Vec<bool>>>()?;
    Ok(wins.into_iter().filter(|&w| w).count() as f64 / trials as f64)
}
