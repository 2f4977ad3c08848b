//! # Federate Lifecycle
//!
//! One [`Federate`] is one participant in the benchmark. Running it:
//!
//! 1. creates the federation execution, or joins the one a peer already made
//! 2. joins with a [`PerfListener`] and resolves the [`Schema`]
//! 3. declares publications and subscriptions, then registers its own
//!    `PerfFederate` object so peers can discover it
//! 4. waits until every other configured peer is present
//! 5. runs the throughput or latency driver
//! 6. resigns and tries to destroy the execution
//!
//! Subscribing before registering the federate object matters: a peer that
//! sees this federate is guaranteed to receive its test-object registrations
//! and creator updates.

use crate::accumulator::{EventAccumulator, EventRecord};
use crate::barrier::{wait_strategy_for, BarrierCoordinator, SyncPointRegistry};
use crate::cli::TestMode;
use crate::config::PerfConfig;
use crate::error::RtiError;
use crate::latency::{LatencyDriver, LatencyEvent, LatencyTracker};
use crate::listener::{PayloadCheck, PerfListener, TimeGrant};
use crate::registry::PeerRegistry;
use crate::rti::{AttributeMap, Rti};
use crate::schema::{encode_name, Schema};
use crate::stats::LatencyReport;
use crate::throughput::{ThroughputDriver, ThroughputReport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, info_span, warn};

pub const READY_POINT: &str = "ready";
pub const START_POINT: &str = "start";
pub const FINISH_POINT: &str = "finish";

/// Everything the drivers share while a federate is joined
pub struct FederateContext {
    pub name: String,
    pub config: PerfConfig,
    pub schema: Schema,
    pub rti: Arc<dyn Rti>,
    pub registry: Arc<PeerRegistry>,
    pub accumulator: Arc<EventAccumulator>,
    pub sync: Arc<SyncPointRegistry>,
    pub latency: Arc<LatencyTracker>,
    pub time: Arc<TimeGrant>,
    pub barrier: BarrierCoordinator,
}

impl FederateContext {
    pub fn is_latency_sender(&self) -> bool {
        self.name == self.config.sender
    }

    /// Configured peers other than this federate, in configuration order
    pub fn remote_peer_names(&self) -> Vec<String> {
        self.config.remote_peers_of(&self.name)
    }
}

/// What one federate measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederateReport {
    pub name: String,
    pub mode: TestMode,
    pub throughput: Option<ThroughputReport>,
    pub latency: Option<LatencyReport>,
    #[serde(skip)]
    pub events: Vec<EventRecord>,
    #[serde(skip)]
    pub rounds: Vec<LatencyEvent>,
}

impl FederateReport {
    fn new(name: &str, mode: TestMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            throughput: None,
            latency: None,
            events: Vec::new(),
            rounds: Vec::new(),
        }
    }

    /// Counts that differ from what the run should have delivered
    pub fn mismatches(&self) -> usize {
        self.throughput
            .as_ref()
            .map(ThroughputReport::mismatches)
            .unwrap_or(0)
    }
}

impl fmt::Display for FederateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ({}) ===", self.name, self.mode)?;
        if let Some(throughput) = &self.throughput {
            write!(f, "{}", throughput)?;
        }
        if let Some(latency) = &self.latency {
            write!(f, "{}", latency)?;
        }
        if self.throughput.is_none() && self.latency.is_none() {
            writeln!(f, "  (responder, no local measurements)")?;
        }
        Ok(())
    }
}

/// One benchmark participant bound to a middleware connection
pub struct Federate {
    name: String,
    config: PerfConfig,
    rti: Arc<dyn Rti>,
}

impl Federate {
    pub fn new(name: &str, config: PerfConfig, rti: Arc<dyn Rti>) -> Self {
        Self {
            name: name.to_string(),
            config,
            rti,
        }
    }

    /// Run the configured test from join to resign
    pub fn run(self) -> Result<FederateReport> {
        let span = info_span!("federate", name = %self.name);
        let _enter = span.enter();

        let federation = self.config.federation.clone();
        match self.rti.create_federation(&federation) {
            Ok(()) => info!("Created federation '{}'", federation),
            Err(RtiError::FederationExists(_)) => {
                info!("Federation '{}' already exists, joining it", federation)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create federation '{}'", federation))
            }
        }

        let accumulator = Arc::new(EventAccumulator::new(self.config.record_events));
        let registry = Arc::new(PeerRegistry::new(Arc::clone(&accumulator)));
        let sync = Arc::new(SyncPointRegistry::new());
        let latency = Arc::new(LatencyTracker::new());
        let time = Arc::new(TimeGrant::new());

        let listener = Arc::new(PerfListener::new(
            &self.name,
            self.name == self.config.sender && self.config.mode == TestMode::Latency,
            PayloadCheck {
                enabled: self.config.validate_data,
                expected_size: self.config.payload_size,
            },
            Arc::downgrade(&self.rti),
            Arc::clone(&registry),
            Arc::clone(&sync),
            Arc::clone(&latency),
            Arc::clone(&time),
        ));

        self.rti
            .join(&self.name, &federation, listener.clone())
            .with_context(|| format!("Failed to join federation '{}'", federation))?;
        info!("Joined federation '{}' ({} callbacks)", federation, self.config.callback_mode);

        let waiter = wait_strategy_for(self.config.callback_mode, &self.rti);
        let barrier = BarrierCoordinator::new(
            Arc::clone(&self.rti),
            Arc::clone(&sync),
            Arc::clone(&registry),
            waiter,
            self.config.wait_settings(),
        );

        let outcome = Schema::resolve(self.rti.as_ref())
            .context("Failed to resolve object model handles")
            .and_then(|schema| {
                listener.attach(schema);
                let ctx = FederateContext {
                    name: self.name.clone(),
                    config: self.config.clone(),
                    schema,
                    rti: Arc::clone(&self.rti),
                    registry,
                    accumulator,
                    sync,
                    latency,
                    time,
                    barrier,
                };
                Self::run_joined(&ctx)
            });

        if let Err(e) = self.rti.resign() {
            warn!("Resign failed: {}", e);
        } else {
            info!("Resigned from '{}'", federation);
        }

        match self.rti.destroy_federation(&federation) {
            Ok(()) => info!("Destroyed federation '{}'", federation),
            Err(RtiError::FederatesStillJoined(_)) => {
                info!("Federation '{}' still in use by other federates", federation)
            }
            Err(RtiError::FederationNotFound(_)) => {
                info!("Federation '{}' already destroyed", federation)
            }
            Err(e) => warn!("Failed to destroy federation '{}': {}", federation, e),
        }

        outcome
    }

    fn run_joined(ctx: &FederateContext) -> Result<FederateReport> {
        ctx.schema
            .publish_and_subscribe(ctx.rti.as_ref())
            .context("Failed to declare publications and subscriptions")?;

        let own = ctx
            .rti
            .register_object(ctx.schema.federate.class, &ctx.name)
            .context("Failed to register federate object")?;
        ctx.rti
            .update_attributes(
                own,
                AttributeMap::from([(ctx.schema.federate.federate_name, encode_name(&ctx.name))]),
            )
            .context("Failed to publish federate name")?;
        ctx.registry.add_peer(&ctx.name, true, Some(own));

        ctx.barrier.wait_for_peer_presence(&ctx.remote_peer_names())?;

        let mut report = FederateReport::new(&ctx.name, ctx.config.mode);
        match ctx.config.mode {
            TestMode::Throughput => {
                report.throughput = Some(ThroughputDriver::new(ctx).run()?);
                report.events = ctx.accumulator.take_events();
            }
            TestMode::Latency => {
                if let Some(outcome) = LatencyDriver::new(ctx).run()? {
                    report.latency = Some(outcome.report);
                    report.rounds = outcome.rounds;
                }
            }
        }
        Ok(report)
    }
}
