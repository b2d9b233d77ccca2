//! Exploration noise drawn once per decision.
//!
//! A [`NoiseSource`] produces the single value shared by all variants of one
//! encoding call. Unseeded sources draw from the thread RNG; seeded sources
//! own a `StdRng` so a sequence of decisions is reproducible; fixed sources
//! always return the same value (tests, replay).

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shape of the noise distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    /// Uniform on `[0, 1)`.
    #[default]
    Uniform,
    /// Zero-mean normal.
    Gaussian { std_dev: f64 },
    /// Always the same value.
    Fixed(f64),
}

/// Thread-safe noise generator.
#[derive(Debug)]
pub struct NoiseSource {
    kind: NoiseKind,
    rng: Option<Mutex<StdRng>>,
}

impl NoiseSource {
    /// Uniform draws in `[0, 1)`.
    pub fn uniform() -> Self {
        Self {
            kind: NoiseKind::Uniform,
            rng: None,
        }
    }

    /// Normal draws with mean 0.
    pub fn gaussian(std_dev: f64) -> Result<Self> {
        if !(std_dev.is_finite() && std_dev > 0.0) {
            return Err(Error::invalid_argument(format!(
                "gaussian std_dev must be finite and > 0, got {std_dev}"
            )));
        }
        Ok(Self {
            kind: NoiseKind::Gaussian { std_dev },
            rng: None,
        })
    }

    /// Always `value`.
    pub fn fixed(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::invalid_argument("fixed noise must be finite"));
        }
        Ok(Self {
            kind: NoiseKind::Fixed(value),
            rng: None,
        })
    }

    /// Source for a configured kind.
    pub fn from_kind(kind: NoiseKind) -> Result<Self> {
        match kind {
            NoiseKind::Uniform => Ok(Self::uniform()),
            NoiseKind::Gaussian { std_dev } => Self::gaussian(std_dev),
            NoiseKind::Fixed(v) => Self::fixed(v),
        }
    }

    /// Draw from a private `StdRng` seeded with `seed` instead of the thread RNG.
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Distribution of this source.
    pub fn kind(&self) -> NoiseKind {
        self.kind
    }

    /// Next noise value.
    pub fn draw(&self) -> f64 {
        match &self.rng {
            Some(rng) => self.sample(&mut *rng.lock()),
            None => self.sample(&mut rand::rng()),
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self.kind {
            NoiseKind::Fixed(v) => v,
            NoiseKind::Uniform => rng.random::<f64>(),
            NoiseKind::Gaussian { std_dev } => match Normal::new(0.0, std_dev) {
                Ok(dist) => dist.sample(rng),
                Err(_) => 0.0,
            },
        }
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::uniform()
    }
}
