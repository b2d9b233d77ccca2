//! Property tests for decision events and runners-up sampling.

use std::collections::HashMap;
use std::sync::Arc;

use improve::{
    counterfactuals, Counterfactuals, DecisionLedger, DecisionTracker, Endpoint, EventBody,
    MemoryTransport, TrackerConfig, Variant,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn variants(n: usize) -> Vec<Variant> {
    (0..n).map(|i| Variant::from(format!("v{i}"))).collect()
}

fn tracker(max_runners_up: usize, seed: u64) -> (DecisionTracker, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let tracker = DecisionTracker::new(
        TrackerConfig { max_runners_up },
        transport.clone(),
        Arc::new(DecisionLedger::new()),
    )
    .with_seed(seed);
    (tracker, transport)
}

proptest! {
    /// Every decision event reports the full count and exactly one of
    /// nothing / all runners-up / one sample, by the size rule.
    #[test]
    fn payload_follows_the_size_rule(n in 1usize..80, max in 0usize..60, seed in any::<u64>()) {
        let (tracker, transport) = tracker(max, seed);
        let ranked = variants(n);
        tracker.track(&Endpoint::new("u"), "m", &ranked, None).unwrap();
        let sent = transport.take();
        prop_assert_eq!(sent.len(), 1);
        let EventBody::Decision { variant, runners_up, sample, count, .. } = sent[0].event.body.clone() else {
            return Err(TestCaseError::fail("not a decision event"));
        };
        prop_assert_eq!(count, n);
        prop_assert_eq!(&variant, &ranked[0]);
        if n == 1 {
            prop_assert!(runners_up.is_none() && sample.is_none());
        } else if max > 0 && n - 1 <= max {
            prop_assert_eq!(runners_up, Some(ranked[1..].to_vec()));
            prop_assert!(sample.is_none());
        } else {
            prop_assert!(runners_up.is_none());
            let s = sample.unwrap();
            prop_assert!(ranked[1..].contains(&s));
        }
    }

    /// The JSON form always carries the fields a trainer needs.
    #[test]
    fn json_payload_has_required_keys(n in 1usize..10) {
        let (tracker, transport) = tracker(50, 1);
        let id = tracker.track(&Endpoint::new("u"), "model-1", &variants(n), None).unwrap();
        let json: serde_json::Value = serde_json::from_str(&transport.take()[0].to_json().unwrap()).unwrap();
        prop_assert_eq!(json["type"].as_str(), Some("decision"));
        prop_assert_eq!(json["model"].as_str(), Some("model-1"));
        prop_assert_eq!(json["message_id"].as_str().map(str::to_string), Some(id.to_string()));
        prop_assert_eq!(json["count"].as_u64(), Some(n as u64));
        prop_assert!(json.get("timestamp").is_some());
    }
}

#[test]
fn sampled_runner_up_is_uniform() {
    let ranked = variants(5);
    let mut rng = StdRng::seed_from_u64(2024);
    let trials = 8_000;
    let mut hits: HashMap<String, usize> = HashMap::new();
    for _ in 0..trials {
        match counterfactuals(&ranked, 2, &mut rng) {
            Counterfactuals::Sample(v) => *hits.entry(v.to_string()).or_default() += 1,
            other => panic!("expected a sample, got {other:?}"),
        }
    }
    assert_eq!(hits.len(), 4, "best variant must never be sampled: {hits:?}");
    let expected = trials / 4;
    for (v, &h) in &hits {
        assert!(h.abs_diff(expected) < expected / 10, "{v}: {h} vs {expected}");
    }
}

#[test]
fn decision_ids_are_unique_and_time_ordered() {
    let (tracker, _) = tracker(50, 3);
    let ids: Vec<_> = (0..200)
        .map(|_| tracker.track(&Endpoint::new("u"), "m", &variants(2), None).unwrap())
        .collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    assert_eq!(tracker.ledger().latest("m"), ids.last().copied());
}
