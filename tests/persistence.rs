//! Reward attribution across restarts, and background delivery.

use std::sync::{Arc, Mutex};

use improve::{
    ChannelTransport, DecisionLedger, DispatchStats, Envelope, EventBody, MemoryTransport,
    ModelRegistry, RegistryConfig, Variant,
};

fn config() -> RegistryConfig {
    RegistryConfig {
        default_track_url: Some("https://track.example.invalid".into()),
        ..RegistryConfig::default()
    }
}

#[test]
fn restored_ledger_attributes_rewards_to_earlier_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let decision_id = {
        let registry = ModelRegistry::new(config(), Arc::new(MemoryTransport::new()));
        let model = registry.get("onboarding").unwrap();
        let id = model
            .decide(vec!["short".into(), "long".into()], None)
            .unwrap()
            .track()
            .unwrap();
        registry.ledger().save(&path).unwrap();
        id
    };

    let transport = Arc::new(MemoryTransport::new());
    let ledger = Arc::new(DecisionLedger::load(&path).unwrap());
    let registry = ModelRegistry::with_ledger(config(), transport.clone(), ledger);
    registry.get("onboarding").unwrap().add_reward(1.0).unwrap();

    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    match &sent[0].event.body {
        EventBody::Reward { decision_id: got, .. } => assert_eq!(*got, decision_id),
        other => panic!("expected a reward event, got {other:?}"),
    }
}

#[test]
fn opened_ledger_survives_restart_without_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let decision_id = {
        let ledger = Arc::new(DecisionLedger::open(&path).unwrap());
        let registry = ModelRegistry::with_ledger(config(), Arc::new(MemoryTransport::new()), ledger);
        let model = registry.get("onboarding").unwrap();
        model.decide(vec!["a".into(), "b".into()], None).unwrap().track().unwrap();
        model
            .decide(vec!["c".into(), "d".into()], None)
            .unwrap()
            .track()
            .unwrap()
    };

    let transport = Arc::new(MemoryTransport::new());
    let ledger = Arc::new(DecisionLedger::open(&path).unwrap());
    let registry = ModelRegistry::with_ledger(config(), transport.clone(), ledger);
    registry.get("onboarding").unwrap().add_reward(2.0).unwrap();

    match &transport.take()[0].event.body {
        EventBody::Reward { decision_id: got, .. } => assert_eq!(*got, decision_id),
        other => panic!("expected a reward event, got {other:?}"),
    }
}

#[test]
fn corrupt_ledger_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, r#"{"latest":{"m":"not-a-ksuid"}}"#).unwrap();
    assert!(DecisionLedger::load(&path).is_err());
    assert!(DecisionLedger::load(dir.path().join("absent.json")).is_err());
    assert!(DecisionLedger::open(&path).is_err());
}

#[test]
fn channel_transport_delivers_every_event() {
    let delivered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let transport = Arc::new(
        ChannelTransport::spawn(move |e: &Envelope| -> Result<(), String> {
            let body = e.to_json().map_err(|err| err.to_string())?;
            sink.lock().map_err(|err| err.to_string())?.push(body);
            Ok(())
        })
        .unwrap(),
    );
    let registry = ModelRegistry::new(config(), transport.clone());

    let model = registry.get("banner").unwrap();
    for _ in 0..10 {
        let d = model
            .decide(vec![Variant::from(1i64), Variant::from(2i64)], None)
            .unwrap();
        d.track().unwrap();
        d.add_reward(0.5).unwrap();
    }

    let stats = transport.shutdown();
    assert_eq!(stats, DispatchStats { delivered: 20, failed: 0 });

    let bodies = delivered.lock().unwrap();
    assert_eq!(bodies.len(), 20);
    let decisions = bodies.iter().filter(|b| b.contains(r#""type":"decision""#)).count();
    assert_eq!(decisions, 10);
}
