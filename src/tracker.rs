//! Decision and reward events.
//!
//! A decision event carries the chosen variant plus a bounded view of the
//! alternatives: every runner-up when there are few enough, otherwise one
//! uniformly drawn non-best variant. The full count is always reported so a
//! trainer can reweight the sample.
//!
//! ```text
//! n == 1                       -> count only
//! 1 <= n-1 <= max_runners_up   -> runners_up = ranked[1..]
//! otherwise                    -> sample ~ Uniform(ranked[1..])
//! ```
//!
//! # Wire keys
//!
//! Events serialize flat, tagged by `type`. A few JSON keys differ from the
//! Rust field names:
//!
//! | JSON key | field | notes |
//! |---|---|---|
//! | `message_id` | [`TrackedEvent::id`] | for a decision, also the decision id |
//! | `model`, `timestamp` | same | timestamp is RFC 3339 UTC |
//! | `type` | [`EventBody`] variant | `decision` or `reward` |
//! | `item` | `Decision::variant` | best variant |
//! | `givens` | `Decision::givens` | resolved givens; older trainers read `context` |
//! | `runners_up`, `sample`, `count` | same | `sample` may be `null` |
//! | `reward`, `decision_id` | `Reward::reward`, `Reward::decision_id` | |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ksuid::Ksuid;
use crate::ledger::DecisionLedger;
use crate::transport::{Endpoint, Envelope, Transport};
use crate::variant::{Givens, Variant};

/// Runners-up limit used when none is configured.
pub const DEFAULT_MAX_RUNNERS_UP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Largest number of non-best variants reported in full. `0` always samples.
    pub max_runners_up: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_runners_up: DEFAULT_MAX_RUNNERS_UP,
        }
    }
}

/// One tracked event as sent to the track endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Message id. For decisions this is also the decision id.
    #[serde(rename = "message_id")]
    pub id: Ksuid,
    /// Name of the model that made the decision.
    pub model: String,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Event payload, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Decision {
        /// The best variant. May be `null`.
        #[serde(rename = "item")]
        variant: Variant,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        givens: Option<Givens>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runners_up: Option<Vec<Variant>>,
        /// Present (possibly as `null`) only when runners-up were sampled.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present"
        )]
        sample: Option<Variant>,
        count: usize,
    },
    Reward {
        reward: f64,
        decision_id: Ksuid,
    },
}

// A present `"sample": null` is a sampled null variant, not an absent sample.
fn present<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Variant>, D::Error> {
    Variant::deserialize(d).map(Some)
}

/// Alternatives reported with a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Counterfactuals {
    None,
    RunnersUp(Vec<Variant>),
    Sample(Variant),
}

/// Pick what to report besides the best of `ranked`.
///
/// `ranked` must be non-empty and ordered best first.
pub fn counterfactuals<R: Rng>(ranked: &[Variant], max_runners_up: usize, rng: &mut R) -> Counterfactuals {
    let rest = ranked.get(1..).unwrap_or(&[]);
    if rest.is_empty() {
        Counterfactuals::None
    } else if max_runners_up > 0 && rest.len() <= max_runners_up {
        Counterfactuals::RunnersUp(rest.to_vec())
    } else {
        Counterfactuals::Sample(rest[rng.random_range(0..rest.len())].clone())
    }
}

/// Builds events, records decision ids, and hands events to the transport.
///
/// One tracker is shared by every model of a registry.
pub struct DecisionTracker {
    cfg: TrackerConfig,
    transport: Arc<dyn Transport>,
    ledger: Arc<DecisionLedger>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for DecisionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionTracker")
            .field("cfg", &self.cfg)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl DecisionTracker {
    /// Tracker with an OS-seeded sampling RNG.
    pub fn new(cfg: TrackerConfig, transport: Arc<dyn Transport>, ledger: Arc<DecisionLedger>) -> Self {
        Self {
            cfg,
            transport,
            ledger,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Make runners-up sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Runners-up settings.
    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    /// Ledger updated by every tracked decision.
    pub fn ledger(&self) -> &Arc<DecisionLedger> {
        &self.ledger
    }

    /// Track a ranked decision and return its id.
    ///
    /// The id is recorded as the model's latest decision before the event is
    /// dispatched. If a file-backed ledger can't be written, nothing is sent.
    pub fn track(
        &self,
        endpoint: &Endpoint,
        model: &str,
        ranked: &[Variant],
        givens: Option<&Givens>,
    ) -> Result<Ksuid> {
        let Some(best) = ranked.first() else {
            return Err(Error::invalid_argument("variants can't be empty"));
        };
        let extra = counterfactuals(ranked, self.cfg.max_runners_up, &mut *self.rng.lock());
        let (runners_up, sample) = match extra {
            Counterfactuals::None => (None, None),
            Counterfactuals::RunnersUp(v) => (Some(v), None),
            Counterfactuals::Sample(s) => (None, Some(s)),
        };

        let id = Ksuid::generate()?;
        debug!(
            model,
            %id,
            count = ranked.len(),
            runners_up = runners_up.as_ref().map_or(0, Vec::len),
            sampled = sample.is_some(),
            "decision tracked"
        );
        let event = TrackedEvent {
            id,
            model: model.to_string(),
            timestamp: Utc::now(),
            body: EventBody::Decision {
                variant: best.clone(),
                givens: givens.cloned(),
                runners_up,
                sample,
                count: ranked.len(),
            },
        };
        self.ledger.record(model, id)?;
        self.transport.dispatch(Envelope {
            endpoint: endpoint.clone(),
            event,
        });
        Ok(id)
    }

    /// Send a reward for `decision_id`. Returns the reward's message id.
    pub fn add_reward(&self, endpoint: &Endpoint, model: &str, reward: f64, decision_id: Ksuid) -> Result<Ksuid> {
        if !reward.is_finite() {
            return Err(Error::invalid_argument(format!("reward must be finite, got {reward}")));
        }
        let id = Ksuid::generate()?;
        debug!(model, %decision_id, reward, "reward dispatched");
        self.transport.dispatch(Envelope {
            endpoint: endpoint.clone(),
            event: TrackedEvent {
                id,
                model: model.to_string(),
                timestamp: Utc::now(),
                body: EventBody::Reward { reward, decision_id },
            },
        });
        Ok(id)
    }

    /// Send a reward for the most recent decision tracked under `model`.
    pub fn add_reward_to_latest(&self, endpoint: &Endpoint, model: &str, reward: f64) -> Result<Ksuid> {
        let decision_id = self
            .ledger
            .latest(model)
            .ok_or_else(|| Error::illegal_state(format!("no decision tracked for model `{model}`")))?;
        self.add_reward(endpoint, model, reward, decision_id)
    }
}
