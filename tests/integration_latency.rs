mod common;

use anyhow::Result;
use common::{quick_config, run_federation};
use rti_perf::{CallbackMode, TestMode};

fn run_latency(mode: CallbackMode, federation: &str) -> Result<()> {
    let mut config = quick_config(&["alpha", "beta", "gamma"], mode);
    config.mode = TestMode::Latency;
    config.loop_count = 20;
    config.payload_size = 64;
    config.federation = federation.to_string();

    let reports = run_federation(&config)?;
    assert_eq!(reports.len(), 3);

    let sender = &reports[0];
    assert_eq!(sender.name, "alpha");
    let latency = sender.latency.as_ref().expect("sender has a latency report");
    assert_eq!(latency.rounds, 20);
    assert_eq!(latency.complete_rounds, 20);

    let responders: Vec<&String> = latency.peers.keys().collect();
    assert_eq!(responders, vec!["beta", "gamma"]);
    for stats in latency.peers.values() {
        assert_eq!(stats.samples, 20);
        assert!(stats.min_ns <= stats.median_ns as u64);
        assert!(stats.median_ns as u64 <= stats.max_ns);
    }

    let serials: Vec<u64> = sender.rounds.iter().map(|r| r.serial).collect();
    assert_eq!(serials, (1..=20).collect::<Vec<_>>());

    for responder in &reports[1..] {
        assert!(responder.latency.is_none());
        assert!(responder.rounds.is_empty());
    }
    Ok(())
}

#[test]
fn latency_rounds_immediate_callbacks() -> Result<()> {
    run_latency(CallbackMode::Immediate, "latency-immediate")
}

#[test]
fn latency_rounds_evoked_callbacks() -> Result<()> {
    run_latency(CallbackMode::Evoked, "latency-evoked")
}

#[test]
fn latency_with_single_responder() -> Result<()> {
    let mut config = quick_config(&["beta", "alpha"], CallbackMode::Immediate);
    config.mode = TestMode::Latency;
    config.loop_count = 5;

    let reports = run_federation(&config)?;
    let sender = reports.iter().find(|r| r.name == "beta").unwrap();
    let latency = sender.latency.as_ref().unwrap();
    assert_eq!(latency.complete_rounds, 5);
    assert_eq!(latency.peers.len(), 1);
    assert!(latency.peers.contains_key("alpha"));
    Ok(())
}
