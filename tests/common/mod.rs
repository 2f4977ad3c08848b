#![allow(dead_code)]

use anyhow::Result;
use rti_perf::rti::{
    AttributeMap, InteractionClassHandle, ObjectClassHandle, ObjectHandle, ParameterMap,
};
use rti_perf::{
    CallbackMode, Federate, FederateAmbassador, FederateReport, LocalRtiHub, PerfConfig, Rti,
    SyncPointRegistry,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A short run that fails instead of hanging if a peer goes missing.
pub fn quick_config(peers: &[&str], mode: CallbackMode) -> PerfConfig {
    PerfConfig {
        federation: "integration".to_string(),
        peers: peers.iter().map(|p| p.to_string()).collect(),
        sender: peers[0].to_string(),
        object_count: 5,
        interaction_count: 5,
        loop_count: 10,
        payload_size: 100,
        validate_data: true,
        callback_mode: mode,
        loop_wait: Duration::from_millis(1),
        round_timeout: Duration::from_secs(5),
        wait_timeout: Some(Duration::from_secs(30)),
        poll_interval: Duration::from_millis(1),
        progress_interval: Duration::from_secs(5),
        ..PerfConfig::default()
    }
}

/// Run every configured peer on its own thread against one in-process hub
/// and return the reports sorted by federate name.
pub fn run_federation(config: &PerfConfig) -> Result<Vec<FederateReport>> {
    let hub = LocalRtiHub::new();
    let handles: Vec<_> = config
        .peers
        .iter()
        .map(|name| {
            let rti: Arc<dyn Rti> = Arc::new(hub.connect(config.callback_mode));
            let federate = Federate::new(name, config.clone(), rti);
            thread::spawn(move || federate.run())
        })
        .collect();

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.join().expect("federate thread panicked")?);
    }
    reports.sort_by(|a, b| a.name.cmp(&b.name));

    assert!(
        hub.joined_federates(&config.federation).is_empty(),
        "every federate should have resigned"
    );
    Ok(reports)
}

/// Ambassador that only tracks synchronization points and drops everything else
pub struct SyncOnly(pub Arc<SyncPointRegistry>);

impl FederateAmbassador for SyncOnly {
    fn on_discover(&self, _: ObjectHandle, _: ObjectClassHandle, _: &str) {}
    fn on_attribute_update(&self, _: ObjectHandle, _: &AttributeMap) {}
    fn on_interaction(&self, _: InteractionClassHandle, _: &ParameterMap) {}
    fn on_object_removed(&self, _: ObjectHandle) {}
    fn on_sync_point_announced(&self, label: &str) {
        self.0.note_announced(label);
    }
    fn on_sync_point_achieved(&self, label: &str) {
        self.0.note_achieved(label);
    }
    fn on_time_advance(&self, _: f64) {}
}
