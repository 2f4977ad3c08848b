//! # Event Accumulator
//!
//! Federation-level event accounting, safe to update from any number of
//! notification-delivery threads while the driver thread reads totals.
//!
//! Counters are plain atomics: an increment never blocks a reader and a read
//! never blocks a writer, which keeps periodic progress logging off the hot
//! path. Completed latency rounds and (optionally) every received event are
//! kept in lock-free queues for the report and the CSV export.

use crate::latency::LatencyEvent;
use crate::rti::ObjectHandle;
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of received events the harness accounts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Discover,
    Reflect,
    Interaction,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Discover => write!(f, "discover"),
            EventKind::Reflect => write!(f, "reflect"),
            EventKind::Interaction => write!(f, "interaction"),
            EventKind::Delete => write!(f, "delete"),
        }
    }
}

/// Point-in-time copy of a set of counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub discover: u64,
    pub reflect: u64,
    pub interaction: u64,
    pub delete: u64,
}

impl CounterSnapshot {
    /// Events that count toward throughput: discovers, reflects, interactions
    pub fn total(&self) -> u64 {
        self.discover + self.reflect + self.interaction
    }
}

/// Monotonic counters, one per event kind
#[derive(Debug, Default)]
pub struct EventCounters {
    discover: AtomicU64,
    reflect: AtomicU64,
    interaction: AtomicU64,
    delete: AtomicU64,
}

impl EventCounters {
    fn slot(&self, kind: EventKind) -> &AtomicU64 {
        match kind {
            EventKind::Discover => &self.discover,
            EventKind::Reflect => &self.reflect,
            EventKind::Interaction => &self.interaction,
            EventKind::Delete => &self.delete,
        }
    }

    /// Increment and return the new value
    pub fn increment(&self, kind: EventKind) -> u64 {
        self.slot(kind).fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        self.slot(kind).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            discover: self.get(EventKind::Discover),
            reflect: self.get(EventKind::Reflect),
            interaction: self.get(EventKind::Interaction),
            delete: self.get(EventKind::Delete),
        }
    }

    /// Discovers + reflects + interactions
    pub fn total(&self) -> u64 {
        self.get(EventKind::Discover) + self.get(EventKind::Reflect) + self.get(EventKind::Interaction)
    }
}

/// One received event, as exported to CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_ns: u64,
    pub kind: EventKind,
    pub peer: String,
    pub object: Option<ObjectHandle>,
}

/// Single source of truth for how much this federate has received
#[derive(Debug, Default)]
pub struct EventAccumulator {
    totals: EventCounters,
    record_events: bool,
    events: SegQueue<EventRecord>,
    rounds: SegQueue<LatencyEvent>,
}

impl EventAccumulator {
    /// `record_events` keeps a log entry per event for export
    pub fn new(record_events: bool) -> Self {
        Self {
            record_events,
            ..Self::default()
        }
    }

    pub fn increment(&self, kind: EventKind) -> u64 {
        self.totals.increment(kind)
    }

    pub fn totals(&self) -> CounterSnapshot {
        self.totals.snapshot()
    }

    /// Current discover + reflect + interaction total, without locking
    pub fn current_total(&self) -> u64 {
        self.totals.total()
    }

    pub fn log_event(&self, record: EventRecord) {
        if self.record_events {
            self.events.push(record);
        }
    }

    pub fn push_round(&self, round: LatencyEvent) {
        self.rounds.push(round);
    }

    /// Remove and return every logged event, ordered by timestamp
    pub fn take_events(&self) -> Vec<EventRecord> {
        let mut events = Vec::with_capacity(self.events.len());
        while let Some(event) = self.events.pop() {
            events.push(event);
        }
        events.sort_by_key(|e| e.timestamp_ns);
        events
    }

    /// Remove and return every retired latency round, ordered by serial
    pub fn take_rounds(&self) -> Vec<LatencyEvent> {
        let mut rounds = Vec::with_capacity(self.rounds.len());
        while let Some(round) = self.rounds.pop() {
            rounds.push(round);
        }
        rounds.sort_by_key(|r| r.serial);
        rounds
    }
}
