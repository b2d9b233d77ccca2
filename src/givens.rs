//! Givens providers: extra context attached to every decision of a model.
//!
//! A provider receives the caller's givens (if any) and returns the givens
//! that are actually encoded and tracked. Numeric session values are rounded
//! to six decimals so they serialize compactly and identically everywhere.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike};
use parking_lot::Mutex;

use crate::variant::{Givens, Variant};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Caller givens, nested under one key.
pub const CONTEXT_KEY: &str = "context";
/// ISO weekday plus fraction of the day elapsed.
pub const WEEKDAY_KEY: &str = "weekday";
/// Fraction of the local day elapsed.
pub const TIME_KEY: &str = "time";
/// UTC offset in hours.
pub const TZ_KEY: &str = "tz";
/// Seconds since the session started.
pub const RUNTIME_KEY: &str = "runtime";
/// Decisions made by this model in the session.
pub const DECISIONS_KEY: &str = "d";
/// Total reward recorded for this model in the session.
pub const REWARDS_KEY: &str = "r";
/// Reward per decision for this model in the session.
pub const REWARD_PER_DECISION_KEY: &str = "r/d";

/// Adds givens to each decision before encoding.
pub trait GivensProvider: Send + Sync {
    /// Givens for one decision of `model`. Called once per decision.
    fn givens(&self, model: &str, context: Option<&Givens>) -> Givens;

    /// Notified of every reward sent for `model`.
    fn record_reward(&self, _model: &str, _reward: f64) {}
}

/// Round to six decimals.
pub fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Fixed givens merged under the caller's (caller keys win).
#[derive(Debug, Clone, Default)]
pub struct StaticGivensProvider {
    fixed: Givens,
}

impl StaticGivensProvider {
    /// Provider returning `fixed` merged under the caller's givens.
    pub fn new(fixed: Givens) -> Self {
        Self { fixed }
    }
}

impl GivensProvider for StaticGivensProvider {
    fn givens(&self, _model: &str, context: Option<&Givens>) -> Givens {
        let mut out = self.fixed.clone();
        if let Some(ctx) = context {
            out.extend(ctx.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ModelCounters {
    decisions: u64,
    rewards: f64,
}

/// Session-level givens.
///
/// | key | value |
/// |---|---|
/// | `context` | caller givens, when present |
/// | `weekday` | ISO weekday (Monday = 1) plus fraction of the day |
/// | `time` | fraction of the day since local midnight |
/// | `tz` | whole hours east of UTC |
/// | `runtime` | days since the provider was created |
/// | `d` | decisions already requested for this model |
/// | `r` | rewards recorded for this model |
/// | `r/d` | `r / d`, or 0 before the first decision |
#[derive(Debug)]
pub struct SessionGivensProvider {
    session_start: DateTime<FixedOffset>,
    counters: Mutex<HashMap<String, ModelCounters>>,
}

impl Default for SessionGivensProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGivensProvider {
    /// Session starting now in the local time zone.
    pub fn new() -> Self {
        Self::started_at(Local::now().fixed_offset())
    }

    /// Session starting at `session_start`.
    pub fn started_at(session_start: DateTime<FixedOffset>) -> Self {
        Self {
            session_start,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Givens as of `now`. Increments the model's decision count.
    pub fn givens_at(&self, model: &str, context: Option<&Givens>, now: DateTime<FixedOffset>) -> Givens {
        let counters = {
            let mut all = self.counters.lock();
            let slot = all.entry(model.to_string()).or_default();
            let before = *slot;
            slot.decisions += 1;
            before
        };

        let fraction_of_day = f64::from(now.num_seconds_from_midnight()) / SECONDS_PER_DAY;
        let weekday = f64::from(now.weekday().number_from_monday()) + fraction_of_day;
        let runtime = (now - self.session_start).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
        let reward_per_decision = if counters.decisions == 0 {
            0.0
        } else {
            counters.rewards / counters.decisions as f64
        };

        let mut out = Givens::new();
        if let Some(ctx) = context {
            out.insert(CONTEXT_KEY.to_string(), Variant::from(ctx.clone()));
        }
        out.insert(WEEKDAY_KEY.to_string(), Variant::from(round6(weekday)));
        out.insert(TIME_KEY.to_string(), Variant::from(round6(fraction_of_day)));
        out.insert(
            TZ_KEY.to_string(),
            Variant::from(i64::from(now.offset().local_minus_utc() / 3600)),
        );
        out.insert(RUNTIME_KEY.to_string(), Variant::from(round6(runtime.max(0.0))));
        out.insert(DECISIONS_KEY.to_string(), Variant::from(counters.decisions as f64));
        out.insert(REWARDS_KEY.to_string(), Variant::from(round6(counters.rewards)));
        out.insert(
            REWARD_PER_DECISION_KEY.to_string(),
            Variant::from(round6(reward_per_decision)),
        );
        out
    }
}

impl GivensProvider for SessionGivensProvider {
    fn givens(&self, model: &str, context: Option<&Givens>) -> Givens {
        self.givens_at(model, context, Local::now().fixed_offset())
    }

    fn record_reward(&self, model: &str, reward: f64) {
        self.counters
            .lock()
            .entry(model.to_string())
            .or_default()
            .rewards += reward;
    }
}
