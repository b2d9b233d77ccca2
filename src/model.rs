//! Named decision models.
//!
//! A [`DecisionModel`] ties together a scorer (optional: without one, ranking
//! keeps the caller's order), a givens provider, a noise source, and the
//! tracking endpoint. Every property is swapped as a whole value under a
//! `RwLock`, so a model can be reconfigured while other threads decide with
//! it; decisions already created keep the scorer they started with.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::decision::Decision;
use crate::encoder::FeatureEncoder;
use crate::error::{Error, Result};
use crate::factorial::expand_full_factorial_map;
use crate::givens::GivensProvider;
use crate::ksuid::Ksuid;
use crate::noise::NoiseSource;
use crate::scorer::{random_descending_scores, LoadedModel, ModelLoader};
use crate::tracker::DecisionTracker;
use crate::transport::Endpoint;
use crate::variant::{Givens, Variant};

const MAX_NAME_LENGTH: usize = 64;

/// A validated model name: 1-64 characters, starting with an ASCII
/// alphanumeric, followed by alphanumerics, `_`, `-` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelName(String);

impl ModelName {
    /// Validated model name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(Error::invalid_argument(format!("invalid model name `{name}`")))
        }
    }

    /// Whether `name` is a legal model name.
    pub fn is_valid(name: &str) -> bool {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        name.len() <= MAX_NAME_LENGTH
            && first.is_ascii_alphanumeric()
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A loaded scorer with its encoder, shared by the decisions that use it.
pub(crate) struct ScoringState {
    pub(crate) loaded: LoadedModel,
    pub(crate) encoder: FeatureEncoder,
}

impl ScoringState {
    fn new(loaded: LoadedModel) -> Result<Self> {
        let encoder = FeatureEncoder::new(loaded.encoder.clone())?;
        Ok(Self { loaded, encoder })
    }

    fn score(&self, variants: &[Variant], givens: Option<&Givens>, noise: f64) -> Result<Vec<f64>> {
        let features = self.encoder.encode_variants(variants, givens, noise)?;
        let raw = self.loaded.scorer.score(&features)?;
        if raw.len() != variants.len() {
            return Err(Error::Scorer(format!(
                "expected {} scores, got {}",
                variants.len(),
                raw.len()
            )));
        }
        if let Some(i) = raw.iter().position(|s| !s.is_finite()) {
            return Err(Error::Scorer(format!("score {i} is not finite ({})", raw[i])));
        }
        let calibration = self.loaded.calibration;
        Ok(raw.into_iter().map(|s| calibration.apply(s)).collect())
    }
}

/// A named model: scorer, noise, givens provider and track settings.
pub struct DecisionModel {
    name: ModelName,
    tracker: Arc<DecisionTracker>,
    track_url: RwLock<Option<String>>,
    api_key: RwLock<Option<String>>,
    givens_provider: RwLock<Option<Arc<dyn GivensProvider>>>,
    scoring: RwLock<Option<Arc<ScoringState>>>,
    noise: RwLock<Arc<NoiseSource>>,
    warned_unloaded: AtomicBool,
}

impl fmt::Debug for DecisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionModel")
            .field("name", &self.name)
            .field("track_url", &*self.track_url.read())
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl DecisionModel {
    /// Unloaded model using `tracker`.
    pub fn new(name: impl Into<String>, tracker: Arc<DecisionTracker>) -> Result<Self> {
        Ok(Self {
            name: ModelName::new(name)?,
            tracker,
            track_url: RwLock::new(None),
            api_key: RwLock::new(None),
            givens_provider: RwLock::new(None),
            scoring: RwLock::new(None),
            noise: RwLock::new(Arc::new(NoiseSource::default())),
            warned_unloaded: AtomicBool::new(false),
        })
    }

    /// The model name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Tracker used for decisions and rewards.
    pub fn tracker(&self) -> &Arc<DecisionTracker> {
        &self.tracker
    }

    /// Where events are sent; `None` disables tracking.
    pub fn track_url(&self) -> Option<String> {
        self.track_url.read().clone()
    }

    /// Set or clear the track URL.
    pub fn set_track_url(&self, url: Option<String>) {
        *self.track_url.write() = url;
    }

    /// API key sent with events.
    pub fn api_key(&self) -> Option<String> {
        self.api_key.read().clone()
    }

    /// Set or clear the API key.
    pub fn set_api_key(&self, key: Option<String>) {
        *self.api_key.write() = key;
    }

    /// Provider that augments caller givens.
    pub fn givens_provider(&self) -> Option<Arc<dyn GivensProvider>> {
        self.givens_provider.read().clone()
    }

    /// Install or remove the givens provider.
    pub fn set_givens_provider(&self, provider: Option<Arc<dyn GivensProvider>>) {
        *self.givens_provider.write() = provider;
    }

    /// Replace the noise source for later decisions.
    pub fn set_noise(&self, noise: NoiseSource) {
        *self.noise.write() = Arc::new(noise);
    }

    /// Install a scorer. Fails if its encoder parameters are invalid.
    pub fn set_scorer(&self, loaded: LoadedModel) -> Result<()> {
        let state = ScoringState::new(loaded)?;
        *self.scoring.write() = Some(Arc::new(state));
        self.warned_unloaded.store(false, Ordering::Relaxed);
        debug!(model = %self.name, "scorer installed");
        Ok(())
    }

    /// Drop the scorer; later decisions use fallback scores.
    pub fn clear_scorer(&self) {
        *self.scoring.write() = None;
    }

    /// Whether a scorer is installed.
    pub fn is_loaded(&self) -> bool {
        self.scoring.read().is_some()
    }

    /// Resolve `source` with `loader` and install the result.
    pub fn load(&self, loader: &dyn ModelLoader, source: &str) -> Result<()> {
        let loaded = loader.load(source)?;
        self.set_scorer(loaded)
    }

    /// Where this model's events go. Fails when no track URL is set.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let url = self
            .track_url()
            .ok_or_else(|| Error::illegal_state(format!("trackURL of model `{}` is not set", self.name)))?;
        Ok(Endpoint {
            track_url: url,
            api_key: self.api_key(),
        })
    }

    pub(crate) fn draw_noise(&self) -> f64 {
        self.noise.read().draw()
    }

    pub(crate) fn scoring_state(&self) -> Option<Arc<ScoringState>> {
        self.scoring.read().clone()
    }

    /// Caller givens passed through the givens provider, if one is set.
    pub(crate) fn resolve_givens(&self, givens: Option<&Givens>) -> Option<Givens> {
        match self.givens_provider() {
            Some(provider) => Some(provider.givens(self.name(), givens)),
            None => givens.cloned(),
        }
    }

    /// Score with an explicit scoring state and noise value.
    pub(crate) fn score_with(
        &self,
        state: Option<&ScoringState>,
        variants: &[Variant],
        givens: Option<&Givens>,
        noise: f64,
    ) -> Result<Vec<f64>> {
        if variants.is_empty() {
            return Err(Error::invalid_argument("variants can't be empty"));
        }
        match state {
            Some(state) => {
                debug!(model = %self.name, variants = variants.len(), noise, "scoring");
                state.score(variants, givens, noise)
            }
            None => {
                if !self.warned_unloaded.swap(true, Ordering::Relaxed) {
                    warn!(model = %self.name, "no scorer loaded; keeping the given variant order");
                }
                Ok(random_descending_scores(variants.len(), &mut rand::rng()))
            }
        }
    }

    /// Scores for `variants` in input order (calibrated, with fresh noise).
    pub fn score(&self, variants: &[Variant], givens: Option<&Givens>) -> Result<Vec<f64>> {
        let givens = self.resolve_givens(givens);
        let state = self.scoring_state();
        self.score_with(state.as_deref(), variants, givens.as_ref(), self.draw_noise())
    }

    /// Create an untracked decision over `variants`.
    pub fn decide(self: &Arc<Self>, variants: Vec<Variant>, givens: Option<&Givens>) -> Result<Decision> {
        if variants.is_empty() {
            return Err(Error::invalid_argument("variants can't be empty"));
        }
        let givens = self.resolve_givens(givens);
        Ok(Decision::new(
            Arc::clone(self),
            variants,
            givens,
            self.draw_noise(),
            self.scoring_state(),
            None,
        ))
    }

    /// Create a decision whose ranking uses `scores` instead of the scorer.
    pub fn decide_with_scores(
        self: &Arc<Self>,
        variants: Vec<Variant>,
        givens: Option<&Givens>,
        scores: Vec<f64>,
    ) -> Result<Decision> {
        if variants.is_empty() || scores.is_empty() {
            return Err(Error::invalid_argument("variants and scores can't be empty"));
        }
        if variants.len() != scores.len() {
            return Err(Error::invalid_argument(format!(
                "variants.len() ({}) must equal scores.len() ({})",
                variants.len(),
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
            return Err(Error::invalid_argument(format!(
                "score {} at index {bad} is not finite",
                scores[bad]
            )));
        }
        let givens = self.resolve_givens(givens);
        Ok(Decision::new(
            Arc::clone(self),
            variants,
            givens,
            self.draw_noise(),
            self.scoring_state(),
            Some(scores),
        ))
    }

    /// Ranked copy of `variants`. Nothing is tracked.
    pub fn rank(self: &Arc<Self>, variants: Vec<Variant>, givens: Option<&Givens>) -> Result<Vec<Variant>> {
        let decision = self.decide(variants, givens)?;
        decision.ranked().map(<[Variant]>::to_vec)
    }

    /// Best of `variants`. The decision is tracked when a track URL is set.
    pub fn which(self: &Arc<Self>, variants: Vec<Variant>, givens: Option<&Givens>) -> Result<Variant> {
        let decision = self.decide(variants, givens)?;
        self.track_if_configured(&decision)?;
        decision.best().cloned()
    }

    /// Best full-factorial combination of `variant_map`.
    pub fn optimize(self: &Arc<Self>, variant_map: &Variant, givens: Option<&Givens>) -> Result<Variant> {
        let variants = expand_full_factorial_map(variant_map)?;
        self.which(variants, givens)
    }

    fn track_if_configured(&self, decision: &Decision) -> Result<()> {
        if self.track_url.read().is_none() {
            debug!(model = %self.name, "trackURL not set; decision not tracked");
            return Ok(());
        }
        decision.track().map(|_| ())
    }

    /// Reward the most recent decision tracked under this model's name.
    pub fn add_reward(&self, reward: f64) -> Result<Ksuid> {
        check_reward(reward)?;
        let endpoint = self.endpoint()?;
        let id = self.tracker.add_reward_to_latest(&endpoint, self.name(), reward)?;
        self.notify_reward(reward);
        Ok(id)
    }

    /// Reward the decision with id `decision_id`.
    pub fn add_reward_to(&self, reward: f64, decision_id: &str) -> Result<Ksuid> {
        check_reward(reward)?;
        if decision_id.is_empty() {
            return Err(Error::invalid_argument("decision id can't be empty"));
        }
        let decision_id: Ksuid = decision_id.parse()?;
        self.add_reward_to_id(reward, decision_id)
    }

    pub(crate) fn add_reward_to_id(&self, reward: f64, decision_id: Ksuid) -> Result<Ksuid> {
        check_reward(reward)?;
        let endpoint = self.endpoint()?;
        let id = self.tracker.add_reward(&endpoint, self.name(), reward, decision_id)?;
        self.notify_reward(reward);
        Ok(id)
    }

    fn notify_reward(&self, reward: f64) {
        if let Some(provider) = self.givens_provider() {
            provider.record_reward(self.name(), reward);
        }
    }
}

fn check_reward(reward: f64) -> Result<()> {
    if reward.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("reward must be finite, got {reward}")))
    }
}
