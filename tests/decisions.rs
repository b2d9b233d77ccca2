//! End-to-end decision scenarios: decide, rank, track, reward.

use std::sync::Arc;

use improve::{
    EncoderConfig, Error, EventBody, FeatureEncoder, FeatureVector, FnScorer, Givens,
    JsonModelLoader, LinearScorer, LoadedModel, MemoryTransport, ModelLoader, ModelRegistry,
    NoiseSource, RegistryConfig, Result, SessionGivensProvider, Variant,
};

const TRACK_URL: &str = "https://track.example.invalid";

fn registry() -> (ModelRegistry, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let registry = ModelRegistry::new(
        RegistryConfig {
            default_track_url: Some(TRACK_URL.into()),
            default_track_api_key: Some("secret".into()),
            ..RegistryConfig::default()
        },
        transport.clone(),
    );
    (registry, transport)
}

fn scripted(scores: Vec<f64>) -> LoadedModel {
    LoadedModel {
        scorer: Arc::new(FnScorer(move |_: &[FeatureVector]| -> Result<Vec<f64>> {
            Ok(scores.clone())
        })),
        encoder: EncoderConfig::default(),
        calibration: Default::default(),
    }
}

fn strings(xs: &[&str]) -> Vec<Variant> {
    xs.iter().map(|&s| Variant::from(s)).collect()
}

#[test]
fn ranked_decision_is_tracked_once_with_runners_up() {
    let (registry, transport) = registry();
    let model = registry.get("greetings").unwrap();
    model.set_scorer(scripted(vec![0.1, 0.9, 0.5])).unwrap();

    let decision = model.decide(strings(&["A", "B", "C"]), None).unwrap();
    assert_eq!(decision.ranked().unwrap().to_vec(), strings(&["B", "C", "A"]));

    let id = decision.track().unwrap();
    assert_eq!(decision.track().unwrap(), id);

    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].endpoint.track_url, TRACK_URL);
    assert_eq!(sent[0].endpoint.api_key.as_deref(), Some("secret"));
    assert_eq!(sent[0].event.id, id);
    match &sent[0].event.body {
        EventBody::Decision {
            variant,
            runners_up,
            sample,
            count,
            ..
        } => {
            assert_eq!(variant, &Variant::from("B"));
            assert_eq!(runners_up.as_deref(), Some(&strings(&["C", "A"])[..]));
            assert!(sample.is_none());
            assert_eq!(*count, 3);
        }
        other => panic!("expected a decision event, got {other:?}"),
    }
}

#[test]
fn reward_before_any_decision_is_illegal_state() {
    let (registry, transport) = registry();
    let model = registry.get("fresh").unwrap();
    assert!(matches!(model.add_reward(1.0), Err(Error::IllegalState(_))));
    assert!(transport.is_empty());
}

#[test]
fn rewards_attach_to_the_latest_decision() {
    let (registry, transport) = registry();
    let model = registry.get("theme").unwrap();
    let first = model.decide(strings(&["dark", "light"]), None).unwrap();
    first.track().unwrap();
    let second = model.decide(strings(&["dark", "light"]), None).unwrap();
    let second_id = second.track().unwrap();

    model.add_reward(0.25).unwrap();
    assert!(matches!(model.add_reward(f64::NAN), Err(Error::InvalidArgument(_))));

    let events = transport.take();
    assert_eq!(events.len(), 3);
    match &events[2].event.body {
        EventBody::Reward { reward, decision_id } => {
            assert_eq!(*reward, 0.25);
            assert_eq!(*decision_id, second_id);
        }
        other => panic!("expected a reward event, got {other:?}"),
    }
    assert_eq!(events[2].event.model, "theme");
}

#[test]
fn rank_and_which_without_track_url_do_not_track() {
    let transport = Arc::new(MemoryTransport::new());
    let registry = ModelRegistry::new(RegistryConfig::default(), transport.clone());
    let model = registry.get("silent").unwrap();

    assert_eq!(
        model.rank(strings(&["x", "y", "z"]), None).unwrap(),
        strings(&["x", "y", "z"])
    );
    assert_eq!(model.which(strings(&["x", "y"]), None).unwrap(), Variant::from("x"));
    assert!(transport.is_empty());

    let d = model.decide(strings(&["x"]), None).unwrap();
    assert!(matches!(d.track(), Err(Error::IllegalState(_))));
    assert!(!d.is_tracked());
}

#[test]
fn which_tracks_when_configured() {
    let (registry, transport) = registry();
    let model = registry.get("cta").unwrap();
    assert_eq!(model.which(strings(&["buy", "later"]), None).unwrap(), Variant::from("buy"));
    assert_eq!(transport.len(), 1);
}

#[test]
fn optimize_picks_best_combination() {
    let (registry, transport) = registry();
    let model = registry.get("layout").unwrap();
    model.set_noise(NoiseSource::fixed(0.0).unwrap());

    let cfg = EncoderConfig::default();
    let encoder = FeatureEncoder::new(cfg.clone()).unwrap();
    let weights = [encoder.column("variant.a").0, encoder.column("variant.b").0].map(|c| (c, 1.0));
    model
        .set_scorer(LoadedModel {
            scorer: Arc::new(LinearScorer::new(0.0, weights)),
            encoder: cfg,
            calibration: Default::default(),
        })
        .unwrap();

    let variant_map: Variant = serde_json::json!({"a": [1, 2], "b": [3, 4]}).into();
    let best = model.optimize(&variant_map, None).unwrap();
    assert_eq!(best, Variant::mapping([("a", 2i64), ("b", 4i64)]));

    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    match &sent[0].event.body {
        EventBody::Decision { count, runners_up, .. } => {
            assert_eq!(*count, 4);
            assert_eq!(runners_up.as_ref().map(Vec::len), Some(3));
        }
        other => panic!("expected a decision event, got {other:?}"),
    }
}

#[test]
fn json_model_file_drives_ranking() {
    let cfg = EncoderConfig {
        seed: 7,
        ..EncoderConfig::default()
    };
    let column = FeatureEncoder::new(cfg.clone()).unwrap().column("variant=Hi").0;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greetings.json");
    std::fs::write(
        &path,
        format!(r#"{{"seed":7,"weights":{{"{column}":5.0}},"calibration":"logistic"}}"#),
    )
    .unwrap();

    let (registry, _) = registry();
    let model = registry.get("greetings").unwrap();
    model.load(&JsonModelLoader, path.to_str().unwrap()).unwrap();
    assert!(model.is_loaded());

    let scores = model.score(&strings(&["Hello", "Hi", "Hey"]), None).unwrap();
    assert!(scores[1] > scores[0] && scores[1] > scores[2]);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert_eq!(model.which(strings(&["Hello", "Hi", "Hey"]), None).unwrap(), Variant::from("Hi"));

    assert!(matches!(
        JsonModelLoader.load(dir.path().join("missing.json").to_str().unwrap()),
        Err(Error::Io(_))
    ));
}

#[test]
fn session_givens_are_tracked_with_the_decision() {
    let (registry, transport) = registry();
    registry.set_default_givens_provider(Some(Arc::new(SessionGivensProvider::new())));
    let model = registry.get("songs").unwrap();

    let caller: Givens = [("mood".to_string(), Variant::from("calm"))].into_iter().collect();
    model.decide(strings(&["a", "b"]), Some(&caller)).unwrap().track().unwrap();
    model.decide(strings(&["a", "b"]), None).unwrap().track().unwrap();

    let sent = transport.take();
    let givens_of = |i: usize| match &sent[i].event.body {
        EventBody::Decision { givens, .. } => givens.clone().unwrap(),
        other => panic!("expected a decision event, got {other:?}"),
    };
    let first = givens_of(0);
    assert_eq!(first["context"].as_mapping().unwrap()["mood"], Variant::from("calm"));
    assert_eq!(first["d"], Variant::from(0i64));
    assert_eq!(givens_of(1)["d"], Variant::from(1i64));
}
