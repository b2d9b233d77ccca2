//! `improve`: contextual decisions with feature hashing, scored ranking, and
//! bounded decision/reward tracking.
//!
//! You have a list of candidate **variants** (any JSON-shaped value) and
//! optional **givens** (context). A [`DecisionModel`] encodes each
//! `(variant, givens)` pair into a sparse hashed feature vector, scores the
//! batch with a pluggable [`Scorer`], ranks best first, and can track the
//! decision so a later reward can be attributed to it.
//!
//! ```text
//!  variants, givens ──► GivensProvider ──► FeatureEncoder ──► Scorer ──► rank
//!                                              ▲ noise                  │
//!                                                                       ▼
//!                             Transport ◄── DecisionTracker ◄── Decision::track
//!                                                 │
//!                                           DecisionLedger (latest id per model)
//! ```
//!
//! **Pieces:**
//! - [`flatten`] / [`FlattenConfig`]: nested values to path-keyed scalars.
//! - [`FeatureEncoder`] / [`FeatureVector`]: MurmurHash3 feature hashing into a
//!   fixed power-of-two width, with the `givens` and `variant` namespaces kept apart.
//! - [`NoiseSource`]: one exploration noise value per decision (uniform,
//!   Gaussian, or fixed; optionally seeded).
//! - [`Scorer`], [`LinearScorer`], [`ModelLoader`], [`JsonModelLoader`]: the
//!   inference boundary. Without a scorer, ranking keeps the caller's order.
//! - [`rank_with_scores`]: descending sort with noise-keyed tie-breaks.
//! - [`Decision`]: memoized scores/ranking, exactly-once [`Decision::track`].
//! - [`DecisionTracker`]: decision events with all runners-up when there are at
//!   most [`TrackerConfig::max_runners_up`], otherwise one uniform sample.
//! - [`Ksuid`]: time-ordered 27-character ids for decisions and rewards.
//! - [`Transport`]: fire-and-forget delivery ([`MemoryTransport`],
//!   [`ChannelTransport`], [`LogTransport`]).
//! - [`expand_full_factorial`]: every combination of a variant map.
//! - [`ModelRegistry`]: explicitly constructed name -> model map; no globals.
//!
//! **Non-goals:** training, model download/caching, HTTP, UI glue.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use improve::{MemoryTransport, ModelRegistry, RegistryConfig, Variant};
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let registry = ModelRegistry::new(
//!     RegistryConfig {
//!         default_track_url: Some("https://track.example.com".into()),
//!         ..RegistryConfig::default()
//!     },
//!     transport.clone(),
//! );
//! let greetings = registry.get("greetings").unwrap();
//!
//! let decision = greetings
//!     .decide(vec!["Hello".into(), "Hi".into(), "Hey".into()], None)
//!     .unwrap();
//! let best: Variant = decision.best().unwrap().clone();
//! decision.track().unwrap();
//! greetings.add_reward(1.0).unwrap();
//!
//! // No scorer loaded: the first variant wins.
//! assert_eq!(best, Variant::from("Hello"));
//! assert_eq!(transport.len(), 2);
//! ```
//!
//! # Logging
//!
//! The crate emits `tracing` events (`debug` for scoring, tracking, rewards and
//! registry changes; `warn` for delivery failures and unscored fallbacks) and
//! never installs a subscriber.

mod error;
pub use error::*;

mod variant;
pub use variant::*;

mod flatten;
pub use flatten::*;

mod hash;
pub use hash::*;

mod simhash;
pub use simhash::*;

mod encoder;
pub use encoder::*;

mod noise;
pub use noise::*;

mod scorer;
pub use scorer::*;

mod ksuid;
pub use ksuid::*;

mod rank;
pub use rank::*;

mod ledger;
pub use ledger::*;

mod transport;
pub use transport::*;

mod tracker;
pub use tracker::*;

mod givens;
pub use givens::*;

mod factorial;
pub use factorial::*;

mod model;
pub use model::*;

mod decision;
pub use decision::*;

mod propensity;

mod registry;
pub use registry::*;
