//! Scoring boundary: the [`Scorer`] trait, calibration, and model loading.
//!
//! Inference runtimes live outside this crate. A scorer receives a batch of
//! feature vectors and returns one raw score per vector, in order. The crate
//! ships a sparse [`LinearScorer`] (and a JSON loader for it) so decisions
//! can be made without an external runtime.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoder::{EncoderConfig, FeatureVector, DEFAULT_NUMBER_OF_FEATURES};
use crate::error::{Error, Result};

/// Scores a batch of feature vectors.
///
/// Implementations must return exactly one finite score per input vector,
/// in input order.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &[FeatureVector]) -> Result<Vec<f64>>;
}

/// Adapter turning a closure into a [`Scorer`].
pub struct FnScorer<F>(pub F);

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&[FeatureVector]) -> Result<Vec<f64>> + Send + Sync,
{
    fn score(&self, features: &[FeatureVector]) -> Result<Vec<f64>> {
        (self.0)(features)
    }
}

impl<F> fmt::Debug for FnScorer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnScorer(..)")
    }
}

/// Post-processing applied to raw scorer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    /// The scorer already emits calibrated scores.
    #[default]
    Identity,
    /// Raw margins (booster-style models) mapped through `1 / (1 + e^(0.5 - x))`.
    Logistic,
}

impl Calibration {
    /// Map a raw score.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Calibration::Identity => x,
            Calibration::Logistic => calibrate(x),
        }
    }
}

/// Logistic calibration of a raw margin.
#[must_use]
pub fn calibrate(x: f64) -> f64 {
    1.0 / (1.0 + (0.5 - x).exp())
}

/// Sparse linear model: `bias + Σ wᵢ·xᵢ + noise_weight·noise`.
#[derive(Debug, Clone, Default)]
pub struct LinearScorer {
    bias: f64,
    weights: HashMap<u32, f64>,
    noise_weight: f64,
}

impl LinearScorer {
    /// Scorer with `bias` plus sparse `weights`.
    pub fn new(bias: f64, weights: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            bias,
            weights: weights.into_iter().collect(),
            noise_weight: 0.0,
        }
    }

    /// Weight applied to the per-decision noise value.
    pub fn with_noise_weight(mut self, w: f64) -> Self {
        self.noise_weight = w;
        self
    }

    /// Raw score of one vector.
    pub fn score_one(&self, fv: &FeatureVector) -> f64 {
        let dot: f64 = fv
            .iter()
            .filter_map(|(c, v)| self.weights.get(&c).map(|w| w * v))
            .sum();
        self.bias + dot + self.noise_weight * fv.noise()
    }
}

impl Scorer for LinearScorer {
    fn score(&self, features: &[FeatureVector]) -> Result<Vec<f64>> {
        Ok(features.iter().map(|fv| self.score_one(fv)).collect())
    }
}

/// A scorer together with the encoding parameters it was trained with.
#[derive(Clone)]
pub struct LoadedModel {
    pub scorer: Arc<dyn Scorer>,
    pub encoder: EncoderConfig,
    pub calibration: Calibration,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("encoder", &self.encoder)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

/// Resolves a model identifier (path, URL, bundle name, ...) to a scorer.
pub trait ModelLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<LoadedModel>;
}

/// On-disk form of a [`LinearScorer`] model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelSpec {
    pub seed: u32,
    #[serde(default = "default_number_of_features")]
    pub number_of_features: u32,
    #[serde(default)]
    pub alternate_sign: bool,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub noise_weight: f64,
    pub weights: BTreeMap<u32, f64>,
}

fn default_number_of_features() -> u32 {
    DEFAULT_NUMBER_OF_FEATURES
}

impl LinearModelSpec {
    /// Build the scorer and encoder config described by these fields.
    pub fn into_loaded(self) -> Result<LoadedModel> {
        if let Some((c, _)) = self.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(Error::Load(format!("weight for column {c} is not finite")));
        }
        if let Some((&c, _)) = self
            .weights
            .iter()
            .find(|(&c, _)| c >= self.number_of_features)
        {
            return Err(Error::Load(format!(
                "column {c} out of range for {} features",
                self.number_of_features
            )));
        }
        let scorer = LinearScorer::new(self.bias, self.weights).with_noise_weight(self.noise_weight);
        Ok(LoadedModel {
            scorer: Arc::new(scorer),
            encoder: EncoderConfig {
                seed: self.seed,
                number_of_features: self.number_of_features,
                alternate_sign: self.alternate_sign,
                ..EncoderConfig::default()
            },
            calibration: self.calibration,
        })
    }
}

/// Loads [`LinearModelSpec`] JSON files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelLoader;

impl JsonModelLoader {
    /// Parse a JSON linear model.
    pub fn parse(json: &str) -> Result<LoadedModel> {
        let spec: LinearModelSpec = serde_json::from_str(json)?;
        spec.into_loaded()
    }
}

impl ModelLoader for JsonModelLoader {
    fn load(&self, source: &str) -> Result<LoadedModel> {
        let raw = std::fs::read_to_string(Path::new(source))?;
        Self::parse(&raw)
    }
}

/// Random scores sorted descending.
///
/// Used when a model has no scorer yet: ranking then preserves the caller's
/// order, so the first variant acts as the default.
pub fn random_descending_scores<R: Rng>(n: usize, rng: &mut R) -> Vec<f64> {
    let mut scores: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn logistic_calibration_is_centered_at_half() {
        assert!((calibrate(0.5) - 0.5).abs() < 1e-12);
        assert!(calibrate(10.0) > 0.99);
        assert!(calibrate(-10.0) < 0.01);
        assert_eq!(Calibration::Identity.apply(3.0), 3.0);
    }

    #[test]
    fn linear_scorer_dot_product() {
        let mut fv = FeatureVector::new(0.25);
        fv.add(1, 2.0);
        fv.add(7, 1.0);
        let s = LinearScorer::new(0.5, [(1, 3.0), (9, 100.0)]).with_noise_weight(4.0);
        assert_eq!(s.score(&[fv]).unwrap(), vec![0.5 + 6.0 + 1.0]);
    }

    #[test]
    fn json_spec_loads_and_validates() {
        let m = JsonModelLoader::parse(
            r#"{"seed":7,"number_of_features":16,"calibration":"logistic","weights":{"3":1.5}}"#,
        )
        .unwrap();
        assert_eq!(m.encoder.seed, 7);
        assert_eq!(m.encoder.number_of_features, 16);
        assert_eq!(m.calibration, Calibration::Logistic);

        let err = JsonModelLoader::parse(r#"{"seed":7,"number_of_features":16,"weights":{"16":1.0}}"#);
        assert!(matches!(err, Err(Error::Load(_))));
    }

    #[test]
    fn fallback_scores_descend() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = random_descending_scores(20, &mut rng);
        assert!(s.windows(2).all(|w| w[0] >= w[1]));
    }
}
