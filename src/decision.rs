//! One decision over a fixed list of variants.
//!
//! A [`Decision`] is created by [`DecisionModel::decide`](crate::DecisionModel::decide)
//! and moves through `created -> scored -> ranked -> tracked`. Scores and the
//! ranking are computed on first use and memoized; the noise value and the
//! scorer are fixed when the decision is created, so repeated reads always
//! agree. Tracking happens at most once: concurrent `track` calls block
//! until the first one finishes and then all return the same id.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::ksuid::Ksuid;
use crate::model::{DecisionModel, ScoringState};
use crate::propensity::{estimate_propensity, estimate_propensity_from_scores};
use crate::rank::rank_indices;
use crate::variant::{Givens, Variant};

/// A ranking over one set of variants, tracked at most once.
pub struct Decision {
    model: Arc<DecisionModel>,
    variants: Vec<Variant>,
    givens: Option<Givens>,
    noise: f64,
    scoring: Option<Arc<ScoringState>>,
    // Scores came from the caller rather than the scorer.
    supplied: bool,
    scores: OnceCell<Vec<f64>>,
    order: OnceCell<Vec<usize>>,
    ranked: OnceCell<Vec<Variant>>,
    id: OnceCell<Ksuid>,
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("model", &self.model.name())
            .field("variants", &self.variants.len())
            .field("noise", &self.noise)
            .field("scored", &self.scores.get().is_some())
            .field("id", &self.id.get())
            .finish_non_exhaustive()
    }
}

impl Decision {
    pub(crate) fn new(
        model: Arc<DecisionModel>,
        variants: Vec<Variant>,
        givens: Option<Givens>,
        noise: f64,
        scoring: Option<Arc<ScoringState>>,
        scores: Option<Vec<f64>>,
    ) -> Self {
        Self {
            model,
            variants,
            givens,
            noise,
            scoring,
            supplied: scores.is_some(),
            scores: scores.map_or_else(OnceCell::new, OnceCell::with_value),
            order: OnceCell::new(),
            ranked: OnceCell::new(),
            id: OnceCell::new(),
        }
    }

    /// The model that made this decision.
    pub fn model(&self) -> &Arc<DecisionModel> {
        &self.model
    }

    /// Variants in the order they were given.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Givens after the model's givens provider ran.
    pub fn givens(&self) -> Option<&Givens> {
        self.givens.as_ref()
    }

    /// The noise value drawn for this decision.
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// Scores in variant order.
    pub fn scores(&self) -> Result<&[f64]> {
        self.scores
            .get_or_try_init(|| {
                self.model
                    .score_with(self.scoring.as_deref(), &self.variants, self.givens.as_ref(), self.noise)
            })
            .map(Vec::as_slice)
    }

    /// Variant indices, best first.
    pub fn ranked_indices(&self) -> Result<&[usize]> {
        self.order
            .get_or_try_init(|| {
                if self.variants.len() == 1 {
                    return Ok(vec![0]);
                }
                Ok(rank_indices(self.scores()?, self.noise))
            })
            .map(Vec::as_slice)
    }

    /// Variants, best first.
    pub fn ranked(&self) -> Result<&[Variant]> {
        self.ranked
            .get_or_try_init(|| {
                Ok(self
                    .ranked_indices()?
                    .iter()
                    .map(|&i| self.variants[i].clone())
                    .collect())
            })
            .map(Vec::as_slice)
    }

    /// The top-ranked variant.
    pub fn best(&self) -> Result<&Variant> {
        self.ranked()?
            .first()
            .ok_or_else(|| Error::illegal_state("decision has no variants"))
    }

    /// The decision id, once tracked.
    pub fn id(&self) -> Option<Ksuid> {
        self.id.get().copied()
    }

    /// Whether an event was sent for this decision.
    pub fn is_tracked(&self) -> bool {
        self.id.get().is_some()
    }

    /// Track the decision and return its id.
    ///
    /// Only the first successful call sends an event; later calls return the
    /// same id. A failed attempt (no track URL, scorer error) leaves the
    /// decision untracked.
    pub fn track(&self) -> Result<Ksuid> {
        self.id.get_or_try_init(|| self.send()).copied()
    }

    /// Like [`Decision::track`], but a decision that is already tracked is an error.
    pub fn track_strict(&self) -> Result<Ksuid> {
        let mut first = false;
        let id = *self.id.get_or_try_init(|| {
            first = true;
            self.send()
        })?;
        if first {
            Ok(id)
        } else {
            Err(Error::illegal_state("the decision is already tracked"))
        }
    }

    fn send(&self) -> Result<Ksuid> {
        let endpoint = self.model.endpoint()?;
        let ranked = self.ranked()?;
        self.model
            .tracker()
            .track(&endpoint, self.model.name(), ranked, self.givens.as_ref())
    }

    /// Reward this decision. It must have been tracked.
    pub fn add_reward(&self, reward: f64) -> Result<Ksuid> {
        let id = self
            .id()
            .ok_or_else(|| Error::illegal_state("the decision has not been tracked yet"))?;
        self.model.add_reward_to_id(reward, id)
    }

    /// Fraction of `trials` re-draws of the noise in which the current best
    /// variant still ranks first.
    ///
    /// Caller-supplied scores are re-ranked as given; otherwise every trial
    /// re-scores through the scorer captured at creation.
    pub fn propensity(&self, trials: usize) -> Result<f64> {
        let best = self.ranked_indices()?[0];
        if self.supplied {
            return estimate_propensity_from_scores(&self.model, self.scores()?, best, trials);
        }
        estimate_propensity(
            &self.model,
            self.scoring.as_deref(),
            &self.variants,
            self.givens.as_ref(),
            best,
            trials,
        )
    }
}
