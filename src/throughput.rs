//! # Throughput Test
//!
//! Every federate registers the same number of test objects and, once the
//! whole federation has discovered them, runs the same number of loop
//! iterations. Each iteration updates every owned object and sends the
//! configured number of interactions, then yields so incoming notifications
//! can be processed (or, time-stepped, advances federation time by one).
//!
//! The run ends when every remote peer has delivered
//! `objects + loops * (objects + interactions)` events to this federate. The
//! report compares what arrived against that expectation per peer and marks
//! every difference with `(!!)`.

use crate::accumulator::CounterSnapshot;
use crate::config::PerfConfig;
use crate::federate::{FederateContext, FINISH_POINT, START_POINT};
use crate::payload;
use crate::registry::PeerSnapshot;
use crate::rti::{AttributeMap, ObjectHandle, ParameterMap};
use crate::schema::encode_name;
use crate::utils::{format_bytes, format_duration_ns, format_event_rate, format_rate, per_second};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::info;

/// What one remote peer should have delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedCounts {
    pub discover: u64,
    pub reflect: u64,
    pub interaction: u64,
}

impl ExpectedCounts {
    pub fn for_config(config: &PerfConfig) -> Self {
        let loops = config.loop_count as u64;
        Self {
            discover: config.object_count as u64,
            reflect: loops * config.object_count as u64,
            interaction: loops * config.interaction_count as u64,
        }
    }

    pub fn total(&self) -> u64 {
        self.discover + self.reflect + self.interaction
    }
}

/// Received versus expected for one remote peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerThroughput {
    pub name: String,
    pub received: CounterSnapshot,
    pub expected: ExpectedCounts,
    /// First to last non-initial event from this peer
    pub receive_window_ns: u64,
}

impl PeerThroughput {
    pub fn from_snapshot(peer: &PeerSnapshot, expected: ExpectedCounts) -> Self {
        Self {
            name: peer.name.clone(),
            received: peer.counters,
            expected,
            receive_window_ns: peer.receive_window_ns(),
        }
    }

    pub fn mismatches(&self) -> usize {
        [
            self.received.discover != self.expected.discover,
            self.received.reflect != self.expected.reflect,
            self.received.interaction != self.expected.interaction,
        ]
        .iter()
        .filter(|&&differs| differs)
        .count()
    }

    /// Loop events per second over this peer's receive window
    pub fn events_per_second(&self) -> f64 {
        per_second(
            (self.received.reflect + self.received.interaction) as f64,
            self.receive_window_ns,
        )
    }
}

/// Outcome of the throughput test on one federate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    pub object_count: usize,
    pub interaction_count: usize,
    pub loop_count: usize,
    pub payload_size: usize,
    /// Time spent in the send loop
    pub loop_window_ns: u64,
    /// Loop start until every peer's events had arrived
    pub receive_window_ns: u64,
    pub totals: CounterSnapshot,
    pub peers: Vec<PeerThroughput>,
}

impl ThroughputReport {
    pub fn mismatches(&self) -> usize {
        self.peers.iter().map(PeerThroughput::mismatches).sum()
    }

    /// Received discover + reflect + interaction events per second
    pub fn events_per_second(&self) -> f64 {
        per_second(self.totals.total() as f64, self.receive_window_ns)
    }

    /// Received payload bytes per second
    pub fn bytes_per_second(&self) -> f64 {
        let messages = self.totals.reflect + self.totals.interaction;
        per_second(
            messages as f64 * self.payload_size as f64,
            self.receive_window_ns,
        )
    }
}

fn marked(received: u64, expected: u64) -> String {
    if received == expected {
        received.to_string()
    } else {
        format!("{} (!!)", received)
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Throughput: {} loops x ({} objects + {} interactions), {} payload",
            self.loop_count,
            self.object_count,
            self.interaction_count,
            format_bytes(self.payload_size)
        )?;
        writeln!(
            f,
            "  Loop time {}, all events after {}: {} ({})",
            format_duration_ns(self.loop_window_ns),
            format_duration_ns(self.receive_window_ns),
            format_event_rate(self.events_per_second()),
            format_rate(self.bytes_per_second()),
        )?;
        writeln!(
            f,
            "  {:<16} {:>14} {:>14} {:>14} {:>16}",
            "Peer", "Discover", "Reflect", "Interaction", "Rate"
        )?;
        for peer in &self.peers {
            writeln!(
                f,
                "  {:<16} {:>14} {:>14} {:>14} {:>16}",
                peer.name,
                marked(peer.received.discover, peer.expected.discover),
                marked(peer.received.reflect, peer.expected.reflect),
                marked(peer.received.interaction, peer.expected.interaction),
                format_event_rate(peer.events_per_second()),
            )?;
        }
        Ok(())
    }
}

/// Drives the update/interaction loop for one federate
pub struct ThroughputDriver<'a> {
    ctx: &'a FederateContext,
}

impl<'a> ThroughputDriver<'a> {
    pub fn new(ctx: &'a FederateContext) -> Self {
        Self { ctx }
    }

    pub fn run(&self) -> Result<ThroughputReport> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let body = payload::generate(config.payload_size);

        let objects = self.register_objects(&body)?;

        if config.time_stepped {
            ctx.rti
                .enable_time_management()
                .context("Failed to enable time management")?;
        }

        // Discoveries can trail the start confirmation, so drain on both sides.
        ctx.barrier.wait_for_all_discoveries(config.object_count)?;
        ctx.barrier.synchronize(START_POINT)?;
        ctx.barrier.wait_for_all_discoveries(config.object_count)?;

        let loop_start = Instant::now();
        self.send_loop(&objects, &body)?;
        let loop_window = loop_start.elapsed();
        info!("Send loop finished in {:?}, waiting for peers", loop_window);

        let expected: BTreeMap<String, u64> = ctx
            .remote_peer_names()
            .into_iter()
            .map(|name| (name, config.expected_events_per_peer()))
            .collect();
        ctx.barrier.wait_for_expected_event_counts(&expected)?;
        let receive_window = loop_start.elapsed();

        // Peers are evicted as they resign, so snapshot before finishing.
        let per_peer = ExpectedCounts::for_config(config);
        let report = ThroughputReport {
            object_count: config.object_count,
            interaction_count: config.interaction_count,
            loop_count: config.loop_count,
            payload_size: config.payload_size,
            loop_window_ns: loop_window.as_nanos() as u64,
            receive_window_ns: receive_window.as_nanos() as u64,
            totals: ctx.accumulator.totals(),
            peers: ctx
                .registry
                .remote_peers()
                .iter()
                .map(|peer| PeerThroughput::from_snapshot(peer, per_peer))
                .collect(),
        };

        ctx.barrier.synchronize(FINISH_POINT)?;
        Ok(report)
    }

    /// Register the test objects and send each one's creator update
    fn register_objects(&self, body: &[u8]) -> Result<Vec<ObjectHandle>> {
        let ctx = self.ctx;
        let class = ctx.schema.test_object;

        let mut objects = Vec::with_capacity(ctx.config.object_count);
        for i in 0..ctx.config.object_count {
            let name = format!("{}-obj-{}", ctx.name, i);
            let handle = ctx
                .rti
                .register_object(class.class, &name)
                .with_context(|| format!("Failed to register test object {}", name))?;
            objects.push(handle);
        }

        for &object in &objects {
            ctx.rti
                .update_attributes(
                    object,
                    AttributeMap::from([
                        (class.creator, encode_name(&ctx.name)),
                        (class.payload, body.to_vec()),
                    ]),
                )
                .context("Failed to send creator update")?;
        }

        info!("Registered {} test objects", objects.len());
        Ok(objects)
    }

    fn send_loop(&self, objects: &[ObjectHandle], body: &[u8]) -> Result<()> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let object_class = ctx.schema.test_object;
        let interaction = ctx.schema.test_interaction;
        let sender = encode_name(&ctx.name);
        let batch = config.batch_size();

        info!(
            "Starting {} loops of {} updates and {} interactions",
            config.loop_count,
            objects.len(),
            config.interaction_count
        );

        let start = Instant::now();
        let mut batch_start = start;
        let mut batch_received = ctx.accumulator.current_total();

        for i in 0..config.loop_count {
            for &object in objects {
                ctx.rti
                    .update_attributes(
                        object,
                        AttributeMap::from([(object_class.payload, body.to_vec())]),
                    )
                    .context("Failed to update test object")?;
            }

            for _ in 0..config.interaction_count {
                ctx.rti
                    .send_interaction(
                        interaction.class,
                        ParameterMap::from([
                            (interaction.sender, sender.clone()),
                            (interaction.payload, body.to_vec()),
                        ]),
                    )
                    .context("Failed to send test interaction")?;
            }

            if config.time_stepped {
                self.advance_time((i + 1) as f64)?;
            } else {
                ctx.barrier.waiter().wait_quantum(config.loop_wait)?;
            }

            let done = i + 1;
            if done % batch == 0 || done == config.loop_count {
                let received = ctx.accumulator.current_total();
                let window = batch_start.elapsed();
                info!(
                    "Loop {}/{}: {} events received, {} in the last {:?}",
                    done,
                    config.loop_count,
                    received,
                    format_event_rate(per_second(
                        received.saturating_sub(batch_received) as f64,
                        window.as_nanos() as u64,
                    )),
                    window
                );
                batch_start = Instant::now();
                batch_received = received;
            }
        }
        Ok(())
    }

    /// Request `time` and block until the federation grants it
    fn advance_time(&self, time: f64) -> Result<()> {
        let ctx = self.ctx;
        ctx.rti
            .request_time_advance(time)
            .with_context(|| format!("Failed to request time {}", time))?;

        let what = format!("time advance to {}", time);
        ctx.barrier.poll_until(
            &what,
            ctx.config.loop_wait,
            || ctx.time.granted() >= time,
            |waited| info!("Still waiting for {} ({:?})", what, waited),
        )
    }
}
