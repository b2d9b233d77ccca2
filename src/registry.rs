//! Explicitly constructed model registry.
//!
//! There is no process-global state: a [`ModelRegistry`] owns the shared
//! tracker (and with it the ledger and transport), the defaults applied to
//! new models, and the name -> model map. `get` creates models lazily.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::givens::GivensProvider;
use crate::ledger::DecisionLedger;
use crate::model::DecisionModel;
use crate::noise::{NoiseKind, NoiseSource};
use crate::tracker::{DecisionTracker, TrackerConfig};
use crate::transport::Transport;

/// Environment variable read for the default track URL.
pub const TRACK_URL_ENV: &str = "IMPROVE_TRACK_URL";
/// Environment variable read for the default track API key.
pub const TRACK_API_KEY_ENV: &str = "IMPROVE_TRACK_API_KEY";

/// Defaults for every model the registry creates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub default_track_url: Option<String>,
    pub default_track_api_key: Option<String>,
    pub noise: NoiseKind,
    pub tracker: TrackerConfig,
}

impl RegistryConfig {
    /// Defaults overridden by `IMPROVE_TRACK_URL` / `IMPROVE_TRACK_API_KEY`.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override the track URL and API key from the environment when set.
    pub fn with_env(mut self) -> Self {
        if let Ok(val) = env::var(TRACK_URL_ENV) {
            if !val.is_empty() {
                self.default_track_url = Some(val);
            }
        }
        if let Ok(val) = env::var(TRACK_API_KEY_ENV) {
            if !val.is_empty() {
                self.default_track_api_key = Some(val);
            }
        }
        self
    }
}

/// Named models sharing one tracker, ledger and default configuration.
pub struct ModelRegistry {
    cfg: RegistryConfig,
    tracker: Arc<DecisionTracker>,
    default_givens: RwLock<Option<Arc<dyn GivensProvider>>>,
    models: RwLock<HashMap<String, Arc<DecisionModel>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("cfg", &self.cfg)
            .field("models", &self.models.read().len())
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Registry with its own in-memory ledger.
    pub fn new(cfg: RegistryConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_ledger(cfg, transport, Arc::new(DecisionLedger::new()))
    }

    /// Use an existing ledger, such as a file-backed one from [`DecisionLedger::open`].
    pub fn with_ledger(cfg: RegistryConfig, transport: Arc<dyn Transport>, ledger: Arc<DecisionLedger>) -> Self {
        let tracker = DecisionTracker::new(cfg.tracker, transport, ledger);
        Self::with_tracker(cfg, Arc::new(tracker))
    }

    /// Registry around an existing tracker.
    pub fn with_tracker(cfg: RegistryConfig, tracker: Arc<DecisionTracker>) -> Self {
        Self {
            cfg,
            tracker,
            default_givens: RwLock::new(None),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Defaults applied to models this registry creates.
    pub fn config(&self) -> &RegistryConfig {
        &self.cfg
    }

    /// Tracker shared by every model.
    pub fn tracker(&self) -> &Arc<DecisionTracker> {
        &self.tracker
    }

    /// Ledger holding each model's latest decision id.
    pub fn ledger(&self) -> &Arc<DecisionLedger> {
        self.tracker.ledger()
    }

    /// Givens provider installed on models created from now on.
    pub fn set_default_givens_provider(&self, provider: Option<Arc<dyn GivensProvider>>) {
        *self.default_givens.write() = provider;
    }

    /// A new model with the registry defaults. It is not registered.
    pub fn create(&self, name: &str) -> Result<Arc<DecisionModel>> {
        let model = DecisionModel::new(name, Arc::clone(&self.tracker))?;
        model.set_track_url(self.cfg.default_track_url.clone());
        model.set_api_key(self.cfg.default_track_api_key.clone());
        model.set_givens_provider(self.default_givens.read().clone());
        model.set_noise(NoiseSource::from_kind(self.cfg.noise)?);
        Ok(Arc::new(model))
    }

    /// The model registered under `name`, created on first use.
    pub fn get(&self, name: &str) -> Result<Arc<DecisionModel>> {
        if let Some(model) = self.models.read().get(name) {
            return Ok(Arc::clone(model));
        }
        let mut models = self.models.write();
        if let Some(model) = models.get(name) {
            return Ok(Arc::clone(model));
        }
        let model = self.create(name)?;
        models.insert(name.to_string(), Arc::clone(&model));
        debug!(model = name, "model created");
        Ok(model)
    }

    /// Register `model` under `name`, or evict `name` when `model` is `None`.
    pub fn set(&self, name: &str, model: Option<Arc<DecisionModel>>) -> Result<()> {
        match model {
            Some(model) => {
                if model.name() != name {
                    return Err(Error::invalid_argument(format!(
                        "model name `{}` does not match key `{name}`",
                        model.name()
                    )));
                }
                self.models.write().insert(name.to_string(), model);
            }
            None => {
                if self.models.write().remove(name).is_some() {
                    debug!(model = name, "model evicted");
                }
            }
        }
        Ok(())
    }

    /// Whether a model named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// True when no model is registered.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
