//! # Peer Registry
//!
//! Tracks every participant this federate knows about, the test objects each
//! one created, and per-peer event counters. All received events are
//! attributed here before they count toward any total.
//!
//! ## Concurrency
//!
//! Structural changes (new peers, object attribution, deletes) take the write
//! lock. The hot paths, reflects and interactions, only take the read lock and
//! bump atomics, so concurrent delivery threads do not serialize on each other.
//!
//! ## Invariants
//!
//! - An object id maps to at most one owner, and that owner's owned set
//!   contains it; every id in an owned set maps back to that owner.
//! - The federation-level counters in the [`EventAccumulator`] only move
//!   together with a peer counter, so while no peer has been evicted the
//!   aggregate always equals the sum over peers.

use crate::accumulator::{CounterSnapshot, EventAccumulator, EventCounters, EventKind, EventRecord};
use crate::rti::ObjectHandle;
use crate::utils::monotonic_ns;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const UNSET: u64 = u64::MAX;

/// Counters and receive window of one peer
#[derive(Debug)]
pub struct Peer {
    name: String,
    counters: EventCounters,
    first_event_ns: AtomicU64,
    last_event_ns: AtomicU64,
}

impl Peer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counters: EventCounters::default(),
            first_event_ns: AtomicU64::new(UNSET),
            last_event_ns: AtomicU64::new(UNSET),
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    fn touch(&self, timestamp_ns: u64) {
        let _ = self.first_event_ns.compare_exchange(
            UNSET,
            timestamp_ns,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        let _ = self
            .last_event_ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                (last == UNSET || timestamp_ns > last).then_some(timestamp_ns)
            });
    }

    fn load(slot: &AtomicU64) -> Option<u64> {
        match slot.load(Ordering::Relaxed) {
            UNSET => None,
            ts => Some(ts),
        }
    }
}

/// Read-only view of a peer for waits and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub name: String,
    pub local: bool,
    pub object: Option<ObjectHandle>,
    pub counters: CounterSnapshot,
    pub owned_objects: usize,
    pub first_event_ns: Option<u64>,
    pub last_event_ns: Option<u64>,
}

impl PeerSnapshot {
    /// Length of the window between the first and last non-initial event
    pub fn receive_window_ns(&self) -> u64 {
        match (self.first_event_ns, self.last_event_ns) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }
}

/// A throughput test object as seen by this federate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestObject {
    pub handle: ObjectHandle,
    pub name: String,
    /// Set exactly once, by the initial update carrying the creator's name
    pub creator: Option<String>,
}

impl TestObject {
    /// Only attributed objects count toward throughput totals
    pub fn is_valid(&self) -> bool {
        self.creator.is_some()
    }
}

struct PeerEntry {
    peer: Arc<Peer>,
    local: bool,
    object: Option<ObjectHandle>,
    owned: BTreeSet<ObjectHandle>,
}

#[derive(Default)]
struct RegistryState {
    peers: HashMap<String, PeerEntry>,
    objects: HashMap<ObjectHandle, TestObject>,
    /// Objects that stand for a peer (its federate object)
    representing: HashMap<ObjectHandle, String>,
}

/// Known participants and the objects they own
pub struct PeerRegistry {
    state: RwLock<RegistryState>,
    accumulator: Arc<EventAccumulator>,
}

impl PeerRegistry {
    pub fn new(accumulator: Arc<EventAccumulator>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            accumulator,
        }
    }

    pub fn accumulator(&self) -> &Arc<EventAccumulator> {
        &self.accumulator
    }

    /// Insert a peer, or update an existing one's identity
    ///
    /// Re-registering a known name keeps its counters and owned objects; only
    /// the local flag and representing object are replaced.
    pub fn add_peer(&self, name: &str, local: bool, object: Option<ObjectHandle>) {
        let mut state = self.state.write();
        let state = &mut *state;

        if let Some(old) = state.peers.get(name).and_then(|entry| entry.object) {
            state.representing.remove(&old);
        }
        if let Some(object) = object {
            state.representing.insert(object, name.to_string());
        }

        match state.peers.get_mut(name) {
            Some(entry) => {
                debug!("Peer {} registered again, keeping its counters", name);
                entry.local = local;
                entry.object = object;
            }
            None => {
                info!(
                    "Discovered {} peer {}",
                    if local { "local" } else { "remote" },
                    name
                );
                state.peers.insert(
                    name.to_string(),
                    PeerEntry {
                        peer: Arc::new(Peer::new(name)),
                        local,
                        object,
                        owned: BTreeSet::new(),
                    },
                );
            }
        }
    }

    pub fn get_peer(&self, name: &str) -> Option<PeerSnapshot> {
        let state = self.state.read();
        state.peers.get(name).map(Self::snapshot_entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().peers.contains_key(name)
    }

    /// All peers, sorted by name
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let state = self.state.read();
        let mut peers: Vec<PeerSnapshot> = state.peers.values().map(Self::snapshot_entry).collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    /// Remote peers only, sorted by name
    pub fn remote_peers(&self) -> Vec<PeerSnapshot> {
        self.snapshot().into_iter().filter(|p| !p.local).collect()
    }

    fn snapshot_entry(entry: &PeerEntry) -> PeerSnapshot {
        PeerSnapshot {
            name: entry.peer.name.clone(),
            local: entry.local,
            object: entry.object,
            counters: entry.peer.counters(),
            owned_objects: entry.owned.len(),
            first_event_ns: Peer::load(&entry.peer.first_event_ns),
            last_event_ns: Peer::load(&entry.peer.last_event_ns),
        }
    }

    /// Note a discovered test object that has no creator yet
    pub fn note_object(&self, object: ObjectHandle, name: &str) {
        let mut state = self.state.write();
        state.objects.entry(object).or_insert_with(|| TestObject {
            handle: object,
            name: name.to_string(),
            creator: None,
        });
    }

    pub fn test_object(&self, object: ObjectHandle) -> Option<TestObject> {
        self.state.read().objects.get(&object).cloned()
    }

    /// Attribute `object` to `owner` and count one discover for it
    ///
    /// Returns `false`, counting nothing, when the owner is unknown or the
    /// object already has a creator.
    pub fn record_discover(&self, object: ObjectHandle, owner: &str) -> bool {
        let now = monotonic_ns();
        let mut state = self.state.write();
        let state = &mut *state;

        let Some(entry) = state.peers.get_mut(owner) else {
            error!(
                "Peer not found: {} claims object {} but has not been discovered",
                owner, object
            );
            return false;
        };

        let record = state.objects.entry(object).or_insert_with(|| TestObject {
            handle: object,
            name: format!("object-{}", object),
            creator: None,
        });
        if let Some(existing) = &record.creator {
            warn!(
                "Object {} already attributed to {}, ignoring creator {}",
                object, existing, owner
            );
            return false;
        }

        record.creator = Some(owner.to_string());
        entry.owned.insert(object);
        entry.peer.counters.increment(EventKind::Discover);
        self.accumulator.increment(EventKind::Discover);
        self.accumulator.log_event(EventRecord {
            timestamp_ns: now,
            kind: EventKind::Discover,
            peer: owner.to_string(),
            object: Some(object),
        });
        true
    }

    /// Count one non-initial update of an attributed object
    pub fn record_reflect(&self, object: ObjectHandle) -> bool {
        let now = monotonic_ns();
        let state = self.state.read();

        let owner = match state.objects.get(&object) {
            None => {
                error!("Reflect for unknown object {}, discovery lost or out of order", object);
                return false;
            }
            Some(TestObject { creator: None, .. }) => {
                error!("Reflect for object {} before its creator is known, discarded", object);
                return false;
            }
            Some(TestObject {
                creator: Some(owner),
                ..
            }) => owner,
        };

        let Some(entry) = state.peers.get(owner) else {
            error!("Peer not found: {} (owner of object {})", owner, object);
            return false;
        };

        entry.peer.counters.increment(EventKind::Reflect);
        entry.peer.touch(now);
        self.accumulator.increment(EventKind::Reflect);
        self.accumulator.log_event(EventRecord {
            timestamp_ns: now,
            kind: EventKind::Reflect,
            peer: owner.clone(),
            object: Some(object),
        });
        true
    }

    /// Count one interaction sent by `sender`
    pub fn record_interaction(&self, sender: &str) -> bool {
        let now = monotonic_ns();
        let state = self.state.read();

        let Some(entry) = state.peers.get(sender) else {
            error!("Peer not found: interaction from unknown sender {}", sender);
            return false;
        };

        entry.peer.counters.increment(EventKind::Interaction);
        entry.peer.touch(now);
        self.accumulator.increment(EventKind::Interaction);
        self.accumulator.log_event(EventRecord {
            timestamp_ns: now,
            kind: EventKind::Interaction,
            peer: sender.to_string(),
            object: None,
        });
        true
    }

    /// Forget a removed object; if it stood for a peer, evict that peer
    pub fn record_delete(&self, object: ObjectHandle) -> bool {
        let now = monotonic_ns();
        let mut state = self.state.write();
        let state = &mut *state;
        let mut removed = false;
        let mut attributed_to = None;

        if let Some(record) = state.objects.remove(&object) {
            removed = true;
            if let Some(owner) = record.creator {
                if let Some(entry) = state.peers.get_mut(&owner) {
                    entry.owned.remove(&object);
                }
                attributed_to = Some(owner);
            }
        }

        if let Some(name) = state.representing.remove(&object) {
            removed = true;
            if let Some(entry) = state.peers.remove(&name) {
                for owned in &entry.owned {
                    state.objects.remove(owned);
                }
                info!("Peer {} left the federation", name);
            }
            attributed_to = Some(name);
        }

        if removed {
            self.accumulator.increment(EventKind::Delete);
            self.accumulator.log_event(EventRecord {
                timestamp_ns: now,
                kind: EventKind::Delete,
                peer: attributed_to.unwrap_or_default(),
                object: Some(object),
            });
        } else {
            debug!("Removal of untracked object {}", object);
        }
        removed
    }

    pub fn owner_of(&self, object: ObjectHandle) -> Option<String> {
        self.state
            .read()
            .objects
            .get(&object)
            .and_then(|record| record.creator.clone())
    }

    pub fn owned_objects(&self, name: &str) -> Vec<ObjectHandle> {
        self.state
            .read()
            .peers
            .get(name)
            .map(|entry| entry.owned.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The object -> owner mapping, for reports and consistency checks
    pub fn owner_map(&self) -> BTreeMap<ObjectHandle, String> {
        self.state
            .read()
            .objects
            .iter()
            .filter_map(|(handle, record)| record.creator.clone().map(|owner| (*handle, owner)))
            .collect()
    }
}
