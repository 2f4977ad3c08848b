mod common;

use anyhow::Result;
use common::{quick_config, SyncOnly};
use rti_perf::federate::{FINISH_POINT, READY_POINT};
use rti_perf::rti::AttributeMap;
use rti_perf::schema::{encode_name, Schema};
use rti_perf::{
    BarrierCoordinator, CallbackMode, EventAccumulator, Federate, LocalRtiHub, PeerRegistry,
    PerfConfig, Rti, RtiError, SyncPointRegistry, TestMode,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A federate that shows up and takes part in every barrier but never
/// answers a ping.
fn silent_responder(hub: &LocalRtiHub, name: &str, config: &PerfConfig) -> Result<()> {
    let rti: Arc<dyn Rti> = Arc::new(hub.connect(config.callback_mode));
    match rti.create_federation(&config.federation) {
        Ok(()) | Err(RtiError::FederationExists(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let sync = Arc::new(SyncPointRegistry::new());
    rti.join(name, &config.federation, Arc::new(SyncOnly(Arc::clone(&sync))))?;

    let schema = Schema::resolve(rti.as_ref())?;
    schema.publish_and_subscribe(rti.as_ref())?;
    let own = rti.register_object(schema.federate.class, name)?;
    rti.update_attributes(
        own,
        AttributeMap::from([(schema.federate.federate_name, encode_name(name))]),
    )?;

    let waiter = rti_perf::barrier::wait_strategy_for(config.callback_mode, &rti);
    let barrier = BarrierCoordinator::new(
        Arc::clone(&rti),
        sync,
        Arc::new(PeerRegistry::new(Arc::new(EventAccumulator::new(false)))),
        waiter,
        config.wait_settings(),
    );
    barrier.synchronize(READY_POINT)?;
    barrier.synchronize(FINISH_POINT)?;

    rti.resign()?;
    Ok(())
}

fn rounds_time_out_without_all_answers(mode: CallbackMode, federation: &str) -> Result<()> {
    let mut config = quick_config(&["alpha", "beta", "gamma"], mode);
    config.mode = TestMode::Latency;
    config.federation = federation.to_string();
    config.loop_count = 4;
    config.round_timeout = Duration::from_millis(100);

    let hub = LocalRtiHub::new();
    let started = Instant::now();
    let federates: Vec<_> = ["alpha", "beta"]
        .iter()
        .map(|name| {
            let rti: Arc<dyn Rti> = Arc::new(hub.connect(mode));
            let federate = Federate::new(name, config.clone(), rti);
            thread::spawn(move || federate.run())
        })
        .collect();
    let gamma = {
        let hub = hub.clone();
        let config = config.clone();
        thread::spawn(move || silent_responder(&hub, "gamma", &config))
    };

    let mut reports = Vec::new();
    for handle in federates {
        reports.push(handle.join().expect("federate thread panicked")?);
    }
    gamma.join().expect("silent responder panicked")?;
    let elapsed = started.elapsed();

    let sender = reports.iter().find(|r| r.name == "alpha").unwrap();
    let latency = sender.latency.as_ref().expect("sender has a latency report");
    assert_eq!(latency.rounds, 4);
    assert_eq!(latency.complete_rounds, 0);
    assert!(latency.complete_rounds < latency.rounds);
    assert!(elapsed >= 4 * config.round_timeout, "rounds retired before timing out");

    let serials: Vec<u64> = sender.rounds.iter().map(|r| r.serial).collect();
    assert_eq!(serials, vec![1, 2, 3, 4]);
    for round in &sender.rounds {
        assert_eq!(round.expected_responses, 2);
        assert!(round.responses.contains_key("beta"));
        assert!(!round.responses.contains_key("gamma"));
    }

    let responders: Vec<&String> = latency.peers.keys().collect();
    assert_eq!(responders, vec!["beta"]);
    assert_eq!(latency.peers["beta"].samples, 4);
    Ok(())
}

#[test]
fn silent_responder_rounds_time_out_immediate() -> Result<()> {
    rounds_time_out_without_all_answers(CallbackMode::Immediate, "timeout-immediate")
}

#[test]
fn silent_responder_rounds_time_out_evoked() -> Result<()> {
    rounds_time_out_without_all_answers(CallbackMode::Evoked, "timeout-evoked")
}
