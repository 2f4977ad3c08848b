//! # Latency Test
//!
//! A single designated sender issues serially numbered pings, one at a time.
//! Every other federate echoes each ping back as an acknowledgement carrying
//! the serial and its own name. The sender keeps one [`LatencyEvent`] per
//! serial and only moves to the next serial once every responder has answered
//! or the round timeout expires.

use crate::federate::FederateContext;
use crate::payload;
use crate::stats::LatencyReport;
use crate::utils::monotonic_ns;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One ping round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyEvent {
    pub serial: u64,
    pub sent_ns: u64,
    pub expected_responses: usize,
    /// Responder name -> time its acknowledgement was received
    pub responses: HashMap<String, u64>,
}

impl LatencyEvent {
    pub fn new(serial: u64, sent_ns: u64, expected_responses: usize) -> Self {
        Self {
            serial,
            sent_ns,
            expected_responses,
            responses: HashMap::new(),
        }
    }

    /// Record a responder's acknowledgement; a repeat overwrites the earlier one
    pub fn add_response(&mut self, responder: &str, received_ns: u64) {
        self.responses.insert(responder.to_string(), received_ns);
    }

    pub fn is_complete(&self) -> bool {
        self.responses.len() == self.expected_responses
    }

    /// Round-trip time per responder
    pub fn latencies(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.responses
            .iter()
            .map(|(peer, received)| (peer.as_str(), received.saturating_sub(self.sent_ns)))
    }
}

/// The sender's single in-flight round, shared with the notification path
#[derive(Debug, Default)]
pub struct LatencyTracker {
    pending: Mutex<Option<PendingRound>>,
}

#[derive(Debug)]
struct PendingRound {
    round: LatencyEvent,
    responders: BTreeSet<String>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round expecting one acknowledgement from each of `responders`
    ///
    /// The send timestamp is taken here, so call it with the ping already
    /// encoded, right before it goes out.
    pub fn begin(&self, serial: u64, responders: &[String]) -> u64 {
        let responders: BTreeSet<String> = responders.iter().cloned().collect();
        let sent_ns = monotonic_ns();
        *self.pending.lock() = Some(PendingRound {
            round: LatencyEvent::new(serial, sent_ns, responders.len()),
            responders,
        });
        sent_ns
    }

    /// Attach an acknowledgement to the pending round
    ///
    /// Acknowledgements for any other serial, arriving with no round open, or
    /// from a federate the round does not expect, are ignored.
    pub fn record_ack(&self, serial: u64, responder: &str, received_ns: u64) -> bool {
        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(p) if p.round.serial == serial && p.responders.contains(responder) => {
                p.round.add_response(responder, received_ns);
                true
            }
            Some(p) if p.round.serial == serial => {
                warn!("Ignoring ack for serial {} from unexpected {}", serial, responder);
                false
            }
            _ => {
                debug!("Ignoring ack for serial {} from {}", serial, responder);
                false
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|p| p.round.is_complete())
            .unwrap_or(false)
    }

    /// Names in `responders` that have not answered the pending round
    pub fn missing<'a>(&self, responders: &'a [String]) -> Vec<&'a str> {
        let pending = self.pending.lock();
        responders
            .iter()
            .filter(|name| {
                pending
                    .as_ref()
                    .map(|p| !p.round.responses.contains_key(name.as_str()))
                    .unwrap_or(true)
            })
            .map(String::as_str)
            .collect()
    }

    /// Close the pending round and hand it back
    pub fn retire(&self) -> Option<LatencyEvent> {
        self.pending.lock().take().map(|p| p.round)
    }
}

/// Result of the latency test on the sender
#[derive(Debug, Clone)]
pub struct LatencyOutcome {
    pub report: LatencyReport,
    pub rounds: Vec<LatencyEvent>,
}

/// Drives the ping/ack exchange for one federate
pub struct LatencyDriver<'a> {
    ctx: &'a FederateContext,
}

impl<'a> LatencyDriver<'a> {
    pub fn new(ctx: &'a FederateContext) -> Self {
        Self { ctx }
    }

    /// Run the test; only the sender returns an outcome
    pub fn run(&self) -> Result<Option<LatencyOutcome>> {
        let ctx = self.ctx;
        ctx.barrier.synchronize(crate::federate::READY_POINT)?;

        let outcome = if ctx.is_latency_sender() {
            Some(self.run_sender()?)
        } else {
            info!("Responding to pings from {}", ctx.config.sender);
            None
        };

        ctx.barrier.synchronize(crate::federate::FINISH_POINT)?;
        Ok(outcome)
    }

    fn run_sender(&self) -> Result<LatencyOutcome> {
        let ctx = self.ctx;
        let responders = ctx.remote_peer_names();
        let body = payload::generate(ctx.config.payload_size);
        let batch = ctx.config.batch_size();
        let waiter = ctx.barrier.waiter();
        let ping = ctx.schema.ping;

        info!(
            "Sending {} pings of {} bytes to {} responders",
            ctx.config.loop_count,
            ctx.config.payload_size,
            responders.len()
        );

        let start = Instant::now();
        let mut timeouts = 0usize;
        for serial in 1..=ctx.config.loop_count as u64 {
            let parameters = ping.encode(serial, &ctx.name, body.clone());
            ctx.latency.begin(serial, &responders);
            ctx.rti
                .send_interaction(ping.class, parameters)
                .context("Failed to send ping")?;

            let round_start = Instant::now();
            while !ctx.latency.is_complete() {
                if round_start.elapsed() >= ctx.config.round_timeout {
                    timeouts += 1;
                    warn!(
                        "Ping {} timed out after {:?}, no answer from {}",
                        serial,
                        ctx.config.round_timeout,
                        ctx.latency.missing(&responders).join(", ")
                    );
                    break;
                }
                waiter.wait_quantum(crate::defaults::LATENCY_POLL_INTERVAL)?;
            }

            if let Some(round) = ctx.latency.retire() {
                ctx.accumulator.push_round(round);
            }

            if serial % batch as u64 == 0 {
                info!(
                    "Completed {}/{} rounds ({:?} elapsed)",
                    serial,
                    ctx.config.loop_count,
                    start.elapsed()
                );
            }
        }

        if timeouts > 0 {
            warn!("{} of {} rounds timed out", timeouts, ctx.config.loop_count);
        }

        let rounds = ctx.accumulator.take_rounds();
        let report = LatencyReport::from_rounds(&rounds);
        Ok(LatencyOutcome { report, rounds })
    }
}
