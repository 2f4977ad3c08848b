//! # Barrier Coordination
//!
//! Aligns test phases across every federate using the middleware's
//! synchronization points, and provides the poll loops that wait on
//! asynchronously delivered state (peer presence, discoveries, event counts).
//!
//! ## Waiting
//!
//! Every wait is an explicit poll loop. Between checks the loop hands one
//! quantum to a [`WaitStrategy`]:
//!
//! - [`SleepWait`] sleeps, letting an immediate-mode delivery thread update
//!   state in the background
//! - [`EvokeWait`] pumps the middleware's callback queue for the quantum, which
//!   is the only way notifications arrive in evoked mode
//!
//! Waits have no deadline unless one is configured; a run's length is up to
//! the operator, but tests always set one so a missing peer fails the test
//! instead of hanging it.
//!
//! ## Ordering hazard
//!
//! Synchronization confirmations are not ordered relative to discoveries. A
//! federate can see "start" achieved before it has processed every peer's
//! object discoveries, so drivers drain [`BarrierCoordinator::wait_for_all_discoveries`]
//! on both sides of the start barrier.
//!
//! The coordinator is meant to be driven from a single thread.

use crate::error::{PerfError, RtiError};
use crate::registry::PeerRegistry;
use crate::rti::{CallbackMode, Rti};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gives up one poll quantum so notifications can be processed
pub trait WaitStrategy: Send + Sync {
    fn wait_quantum(&self, quantum: Duration) -> Result<()>;
}

/// Sleep through the quantum (immediate delivery mode)
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepWait;

impl WaitStrategy for SleepWait {
    fn wait_quantum(&self, quantum: Duration) -> Result<()> {
        if quantum.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(quantum);
        }
        Ok(())
    }
}

/// Pump middleware callbacks for the quantum (evoked delivery mode)
pub struct EvokeWait {
    rti: Arc<dyn Rti>,
}

impl EvokeWait {
    pub fn new(rti: Arc<dyn Rti>) -> Self {
        Self { rti }
    }
}

impl WaitStrategy for EvokeWait {
    fn wait_quantum(&self, quantum: Duration) -> Result<()> {
        self.rti
            .evoke_callbacks(quantum, quantum)
            .context("Failed to evoke callbacks")?;
        Ok(())
    }
}

/// Pick the wait strategy matching a delivery mode
pub fn wait_strategy_for(mode: CallbackMode, rti: &Arc<dyn Rti>) -> Arc<dyn WaitStrategy> {
    match mode {
        CallbackMode::Immediate => Arc::new(SleepWait),
        CallbackMode::Evoked => Arc::new(EvokeWait::new(Arc::clone(rti))),
    }
}

/// Synchronization points seen by this federate
///
/// A label only ever moves forward: unknown, then announced, then achieved.
/// Achieving implies announced, so a confirmation that overtakes its
/// announcement still leaves a consistent state.
#[derive(Debug, Default)]
pub struct SyncPointRegistry {
    state: Mutex<SyncPoints>,
}

#[derive(Debug, Default)]
struct SyncPoints {
    announced: HashSet<String>,
    achieved: HashSet<String>,
}

impl SyncPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_announced(&self, label: &str) {
        let mut state = self.state.lock();
        if state.announced.insert(label.to_string()) {
            debug!("Synchronization point '{}' announced", label);
        }
    }

    pub fn note_achieved(&self, label: &str) {
        let mut state = self.state.lock();
        state.announced.insert(label.to_string());
        if state.achieved.insert(label.to_string()) {
            debug!("Synchronization point '{}' achieved by all", label);
        }
    }

    pub fn is_announced(&self, label: &str) -> bool {
        self.state.lock().announced.contains(label)
    }

    pub fn is_achieved(&self, label: &str) -> bool {
        self.state.lock().achieved.contains(label)
    }
}

/// Poll timing shared by every wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Quantum handed to the wait strategy between checks
    pub poll_interval: Duration,
    /// How often long waits log what they are still waiting for
    pub progress_interval: Duration,
    /// Optional upper bound for any single wait
    pub deadline: Option<Duration>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: crate::defaults::POLL_INTERVAL,
            progress_interval: crate::defaults::PROGRESS_INTERVAL,
            deadline: None,
        }
    }
}

/// Distributed rendezvous and wait loops for one federate
pub struct BarrierCoordinator {
    rti: Arc<dyn Rti>,
    sync: Arc<SyncPointRegistry>,
    registry: Arc<PeerRegistry>,
    waiter: Arc<dyn WaitStrategy>,
    settings: WaitSettings,
}

impl BarrierCoordinator {
    pub fn new(
        rti: Arc<dyn Rti>,
        sync: Arc<SyncPointRegistry>,
        registry: Arc<PeerRegistry>,
        waiter: Arc<dyn WaitStrategy>,
        settings: WaitSettings,
    ) -> Self {
        Self {
            rti,
            sync,
            registry,
            waiter,
            settings,
        }
    }

    pub fn waiter(&self) -> &Arc<dyn WaitStrategy> {
        &self.waiter
    }

    /// Poll `condition` until it holds, handing `quantum` to the wait strategy
    /// between checks and calling `progress` every progress interval.
    pub fn poll_until(
        &self,
        what: &str,
        quantum: Duration,
        mut condition: impl FnMut() -> bool,
        mut progress: impl FnMut(Duration),
    ) -> Result<()> {
        let start = Instant::now();
        let mut last_progress = start;

        loop {
            if condition() {
                return Ok(());
            }

            let waited = start.elapsed();
            if let Some(deadline) = self.settings.deadline {
                if waited >= deadline {
                    return Err(PerfError::WaitTimeout {
                        what: what.to_string(),
                        waited,
                    }
                    .into());
                }
            }

            if last_progress.elapsed() >= self.settings.progress_interval {
                progress(waited);
                last_progress = Instant::now();
            }

            self.waiter.wait_quantum(quantum)?;
        }
    }

    /// Register a synchronization point, tolerating a registration by another
    /// federate having won the race.
    pub fn announce(&self, label: &str) {
        match self.rti.register_sync_point(label) {
            Ok(()) => debug!("Registered synchronization point '{}'", label),
            Err(RtiError::SyncPointExists(_)) => {
                debug!("Synchronization point '{}' already registered", label)
            }
            Err(e) => warn!(
                "Could not register synchronization point '{}': {}",
                label, e
            ),
        }
    }

    pub fn wait_until_announced(&self, label: &str) -> Result<()> {
        let what = format!("announcement of '{}'", label);
        self.poll_until(
            &what,
            self.settings.poll_interval,
            || self.sync.is_announced(label),
            |waited| info!("Still waiting for {} ({:?})", what, waited),
        )
    }

    /// Tell the federation this federate has reached `label`
    pub fn mark_achieved_locally(&self, label: &str) -> Result<()> {
        self.rti
            .achieve_sync_point(label)
            .with_context(|| format!("Failed to achieve synchronization point '{}'", label))
    }

    /// Block until every participant, this one included, has achieved `label`
    pub fn wait_until_globally_achieved(&self, label: &str) -> Result<()> {
        let what = format!("synchronization point '{}'", label);
        self.poll_until(
            &what,
            self.settings.poll_interval,
            || self.sync.is_achieved(label),
            |waited| info!("Still waiting for federation to reach '{}' ({:?})", label, waited),
        )
    }

    /// Announce, achieve and wait for `label` in one step
    pub fn synchronize(&self, label: &str) -> Result<()> {
        info!("Waiting for all federates at '{}'", label);
        self.announce(label);
        self.wait_until_announced(label)?;
        self.mark_achieved_locally(label)?;
        self.wait_until_globally_achieved(label)?;
        info!("Federation synchronized at '{}'", label);
        Ok(())
    }

    /// Block until every name in `expected` is a known peer
    pub fn wait_for_peer_presence(&self, expected: &[String]) -> Result<()> {
        info!("Waiting for peers: {}", expected.join(", "));
        let missing = || -> Vec<&str> {
            expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .map(String::as_str)
                .collect()
        };
        self.poll_until(
            "peer presence",
            self.settings.poll_interval,
            || missing().is_empty(),
            |waited| {
                info!(
                    "Still waiting for peers after {:?}: {}",
                    waited,
                    missing().join(", ")
                )
            },
        )?;
        info!("All {} peers present", expected.len());
        Ok(())
    }

    /// Block until every remote peer owns at least `expected_per_peer` objects
    pub fn wait_for_all_discoveries(&self, expected_per_peer: usize) -> Result<()> {
        let short = || -> Vec<(String, usize)> {
            self.registry
                .remote_peers()
                .into_iter()
                .filter(|peer| peer.owned_objects < expected_per_peer)
                .map(|peer| (peer.name, peer.owned_objects))
                .collect()
        };
        self.poll_until(
            "object discoveries",
            self.settings.poll_interval,
            || short().is_empty(),
            |waited| {
                for (name, owned) in short() {
                    info!(
                        "Still waiting for discoveries from {} after {:?}: {}/{}",
                        name, waited, owned, expected_per_peer
                    );
                }
            },
        )
    }

    /// Block until every listed peer has delivered its expected event count
    ///
    /// Peers leave the outstanding set as soon as they are satisfied. A peer
    /// that departs the federation mid-wait is dropped with a warning, since
    /// its count can no longer change.
    pub fn wait_for_expected_event_counts(&self, expected: &BTreeMap<String, u64>) -> Result<()> {
        let outstanding = Mutex::new(expected.clone());

        let satisfied = || {
            let mut outstanding = outstanding.lock();
            outstanding.retain(|name, target| match self.registry.get_peer(name) {
                Some(peer) => peer.counters.total() < *target,
                None => {
                    warn!("Peer {} left before delivering all events", name);
                    false
                }
            });
            outstanding.is_empty()
        };

        let report = |waited: Duration| {
            let outstanding = outstanding.lock();
            for (name, target) in outstanding.iter() {
                let have = self
                    .registry
                    .get_peer(name)
                    .map(|peer| peer.counters.total())
                    .unwrap_or(0);
                info!(
                    "Waiting on {} after {:?}: {}/{} events ({} outstanding)",
                    name,
                    waited,
                    have,
                    target,
                    target.saturating_sub(have)
                );
            }
        };

        self.poll_until(
            "expected event counts",
            self.settings.poll_interval,
            satisfied,
            report,
        )
    }
}
