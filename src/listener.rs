//! # Notification Listener
//!
//! [`PerfListener`] is the federate's only [`FederateAmbassador`]. It turns
//! middleware notifications into registry accounting, synchronization-point
//! state, latency acknowledgements and time grants. It never blocks on the
//! driver thread and never fails: anything it cannot attribute is logged and
//! dropped.

use crate::barrier::SyncPointRegistry;
use crate::latency::LatencyTracker;
use crate::payload;
use crate::registry::PeerRegistry;
use crate::rti::{
    AttributeMap, FederateAmbassador, InteractionClassHandle, ObjectClassHandle, ObjectHandle,
    ParameterMap, Rti,
};
use crate::schema::{decode_name, Schema};
use crate::utils::monotonic_ns;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, trace, warn};

/// Latest federation time granted to this federate
#[derive(Debug, Default)]
pub struct TimeGrant {
    bits: AtomicU64,
}

impl TimeGrant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::Release);
    }

    pub fn granted(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// What the listener needs to check received payloads
#[derive(Debug, Clone, Copy)]
pub struct PayloadCheck {
    pub enabled: bool,
    pub expected_size: usize,
}

/// Routes notifications for one federate
pub struct PerfListener {
    name: String,
    latency_sender: bool,
    payload_check: PayloadCheck,
    schema: OnceLock<Schema>,
    rti: Weak<dyn Rti>,
    registry: Arc<PeerRegistry>,
    sync: Arc<SyncPointRegistry>,
    latency: Arc<LatencyTracker>,
    time: Arc<TimeGrant>,
}

impl PerfListener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        latency_sender: bool,
        payload_check: PayloadCheck,
        rti: Weak<dyn Rti>,
        registry: Arc<PeerRegistry>,
        sync: Arc<SyncPointRegistry>,
        latency: Arc<LatencyTracker>,
        time: Arc<TimeGrant>,
    ) -> Self {
        Self {
            name: name.to_string(),
            latency_sender,
            payload_check,
            schema: OnceLock::new(),
            rti,
            registry,
            sync,
            latency,
            time,
        }
    }

    /// Install the resolved handles; object and interaction notifications
    /// that arrive earlier are ignored.
    pub fn attach(&self, schema: Schema) {
        if self.schema.set(schema).is_err() {
            debug!("Schema already attached");
        }
    }

    fn schema(&self) -> Option<&Schema> {
        let schema = self.schema.get();
        if schema.is_none() {
            debug!("Notification before schema was resolved, ignored");
        }
        schema
    }

    fn check_payload(&self, payload: Option<&Vec<u8>>, origin: &str) {
        if !self.payload_check.enabled {
            return;
        }
        match payload {
            Some(buffer) => {
                payload::validate(buffer, self.payload_check.expected_size, origin);
            }
            None => error!("Missing payload from {}", origin),
        }
    }

    fn echo_ping(&self, schema: &Schema, parameters: &ParameterMap) {
        let Some((serial, sender)) = schema.ping.decode(parameters) else {
            error!("Malformed ping, missing serial or sender");
            return;
        };
        self.check_payload(parameters.get(&schema.ping.payload), &sender);

        let Some(rti) = self.rti.upgrade() else {
            debug!("Connection closed, not answering ping {}", serial);
            return;
        };
        let body = parameters
            .get(&schema.ping.payload)
            .cloned()
            .unwrap_or_default();
        if let Err(e) = rti.send_interaction(
            schema.ping_ack.class,
            schema.ping_ack.encode(serial, &self.name, body),
        ) {
            warn!("Failed to acknowledge ping {} from {}: {}", serial, sender, e);
        } else {
            trace!("Acknowledged ping {} from {}", serial, sender);
        }
    }
}

impl FederateAmbassador for PerfListener {
    fn on_discover(&self, object: ObjectHandle, class: ObjectClassHandle, name: &str) {
        let Some(schema) = self.schema() else { return };

        if class == schema.federate.class {
            self.registry.add_peer(name, false, Some(object));
        } else if class == schema.test_object.class {
            self.registry.note_object(object, name);
        } else {
            debug!("Discovered object {} of unused class {}", object, class);
        }
    }

    fn on_attribute_update(&self, object: ObjectHandle, attributes: &AttributeMap) {
        let Some(schema) = self.schema() else { return };

        if let Some(bytes) = attributes.get(&schema.federate.federate_name) {
            match decode_name(bytes) {
                Some(name) => {
                    let known = self
                        .registry
                        .get_peer(&name)
                        .map(|peer| peer.object == Some(object))
                        .unwrap_or(false);
                    if !known {
                        self.registry.add_peer(&name, false, Some(object));
                    }
                }
                None => error!("Federate name on object {} is not valid UTF-8", object),
            }
            return;
        }

        let payload = attributes.get(&schema.test_object.payload);
        if let Some(bytes) = attributes.get(&schema.test_object.creator) {
            let Some(creator) = decode_name(bytes) else {
                error!("Creator of object {} is not valid UTF-8", object);
                return;
            };
            self.check_payload(payload, &creator);
            self.registry.record_discover(object, &creator);
        } else if payload.is_some() {
            if self.payload_check.enabled {
                let origin = self
                    .registry
                    .owner_of(object)
                    .unwrap_or_else(|| format!("object {}", object));
                self.check_payload(payload, &origin);
            }
            self.registry.record_reflect(object);
        }
    }

    fn on_interaction(&self, class: InteractionClassHandle, parameters: &ParameterMap) {
        let received_ns = monotonic_ns();
        let Some(schema) = self.schema() else { return };

        if class == schema.test_interaction.class {
            let sender = parameters
                .get(&schema.test_interaction.sender)
                .and_then(|b| decode_name(b));
            match sender {
                Some(sender) => {
                    self.check_payload(parameters.get(&schema.test_interaction.payload), &sender);
                    self.registry.record_interaction(&sender);
                }
                None => error!("Interaction without a readable sender, dropped"),
            }
        } else if class == schema.ping.class {
            if !self.latency_sender {
                self.echo_ping(schema, parameters);
            }
        } else if class == schema.ping_ack.class {
            if !self.latency_sender {
                return;
            }
            match schema.ping_ack.decode(parameters) {
                Some((serial, responder)) => {
                    self.check_payload(parameters.get(&schema.ping_ack.payload), &responder);
                    self.latency.record_ack(serial, &responder, received_ns);
                }
                None => error!("Malformed ping acknowledgement, dropped"),
            }
        } else {
            debug!("Interaction of unused class {}", class);
        }
    }

    fn on_object_removed(&self, object: ObjectHandle) {
        self.registry.record_delete(object);
    }

    fn on_sync_point_announced(&self, label: &str) {
        self.sync.note_announced(label);
    }

    fn on_sync_point_achieved(&self, label: &str) {
        self.sync.note_achieved(label);
    }

    fn on_time_advance(&self, time: f64) {
        trace!("Granted time {}", time);
        self.time.grant(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::EventAccumulator;
    use crate::rti::{CallbackMode, LocalRtiHub};
    use crate::schema::encode_name;

    struct Harness {
        listener: PerfListener,
        schema: Schema,
        registry: Arc<PeerRegistry>,
        latency: Arc<LatencyTracker>,
    }

    fn harness(latency_sender: bool, validate: bool) -> Harness {
        let hub = LocalRtiHub::new();
        let rti = hub.connect(CallbackMode::Evoked);
        let schema = Schema::resolve(&rti).unwrap();
        let registry = Arc::new(PeerRegistry::new(Arc::new(EventAccumulator::new(false))));
        let latency = Arc::new(LatencyTracker::new());
        let dangling: Weak<dyn Rti> = Weak::<crate::rti::LocalRti>::new();

        let listener = PerfListener::new(
            "alpha",
            latency_sender,
            PayloadCheck {
                enabled: validate,
                expected_size: 10,
            },
            dangling,
            Arc::clone(&registry),
            Arc::new(SyncPointRegistry::new()),
            Arc::clone(&latency),
            Arc::new(TimeGrant::new()),
        );
        listener.attach(schema);
        Harness {
            listener,
            schema,
            registry,
            latency,
        }
    }

    #[test]
    fn test_federate_discovery_registers_peer() {
        let h = harness(false, false);
        h.listener
            .on_discover(ObjectHandle(1), h.schema.federate.class, "beta");
        assert_eq!(h.registry.get_peer("beta").unwrap().object, Some(ObjectHandle(1)));
    }

    #[test]
    fn test_creator_update_then_reflects_are_counted() {
        let h = harness(false, true);
        h.listener
            .on_discover(ObjectHandle(1), h.schema.federate.class, "beta");
        h.listener
            .on_discover(ObjectHandle(2), h.schema.test_object.class, "beta-obj-0");

        let body = payload::generate(10);
        h.listener.on_attribute_update(
            ObjectHandle(2),
            &AttributeMap::from([
                (h.schema.test_object.creator, encode_name("beta")),
                (h.schema.test_object.payload, body.clone()),
            ]),
        );
        for _ in 0..3 {
            h.listener.on_attribute_update(
                ObjectHandle(2),
                &AttributeMap::from([(h.schema.test_object.payload, body.clone())]),
            );
        }

        let peer = h.registry.get_peer("beta").unwrap();
        assert_eq!(peer.counters.discover, 1);
        assert_eq!(peer.counters.reflect, 3);
        assert_eq!(peer.owned_objects, 1);
    }

    #[test]
    fn test_corrupt_payload_is_still_counted() {
        let h = harness(false, true);
        h.registry.add_peer("beta", false, None);
        let mut body = payload::generate(10);
        body[4] = 0xAA;

        h.listener.on_interaction(
            h.schema.test_interaction.class,
            &ParameterMap::from([
                (h.schema.test_interaction.sender, encode_name("beta")),
                (h.schema.test_interaction.payload, body),
            ]),
        );
        assert_eq!(h.registry.get_peer("beta").unwrap().counters.interaction, 1);
    }

    #[test]
    fn test_ack_reaches_tracker_only_on_sender() {
        let h = harness(true, false);
        h.latency.begin(1, &["beta".to_string()]);
        h.listener.on_interaction(
            h.schema.ping_ack.class,
            &h.schema.ping_ack.encode(1, "beta", vec![]),
        );
        assert!(h.latency.is_complete());

        let h = harness(false, false);
        h.latency.begin(1, &["beta".to_string()]);
        h.listener.on_interaction(
            h.schema.ping_ack.class,
            &h.schema.ping_ack.encode(1, "beta", vec![]),
        );
        assert!(!h.latency.is_complete());
    }

    #[test]
    fn test_ping_without_connection_is_dropped_quietly() {
        let h = harness(false, false);
        h.listener
            .on_interaction(h.schema.ping.class, &h.schema.ping.encode(3, "beta", vec![]));
    }

    #[test]
    fn test_removal_of_federate_object_evicts_peer() {
        let h = harness(false, false);
        h.listener
            .on_discover(ObjectHandle(9), h.schema.federate.class, "gamma");
        h.listener.on_object_removed(ObjectHandle(9));
        assert!(!h.registry.contains("gamma"));
    }

    #[test]
    fn test_time_grant() {
        let time = TimeGrant::new();
        assert_eq!(time.granted(), 0.0);
        time.grant(3.0);
        assert_eq!(time.granted(), 3.0);
    }
}
