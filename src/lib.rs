//! # RTI Performance Harness Library
//!
//! Throughput and latency benchmarks for HLA-style federations. A run puts a
//! set of named federates into one federation execution, aligns them with
//! synchronization points, streams object updates and interactions (or
//! ping/ack rounds) between them, and reports what every federate received
//! against what it should have received.
//!
//! ## Architecture Overview
//!
//! - `rti`: the middleware boundary (`Rti`, `FederateAmbassador`) and an
//!   in-process simulated federation (`rti::local`)
//! - `federate`: one participant's lifecycle from create/join to resign
//! - `listener`: routes middleware notifications into the accounting state
//! - `registry` / `accumulator`: per-peer and federation-level event counts
//! - `barrier`: synchronization points and the poll loops behind every wait
//! - `throughput` / `latency`: the two test drivers
//! - `stats`: latency summary figures
//! - `payload`: the fixed-pattern padding buffers carried by every message
//! - `results`: JSON summary and CSV export
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rti_perf::{Federate, LocalRtiHub, PerfConfig, Rti};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PerfConfig {
//!         peers: vec!["alpha".into(), "beta".into()],
//!         ..PerfConfig::default()
//!     };
//!     let hub = LocalRtiHub::new();
//!
//!     let handles: Vec<_> = config
//!         .peers
//!         .clone()
//!         .into_iter()
//!         .map(|name| {
//!             let rti: Arc<dyn Rti> = Arc::new(hub.connect(config.callback_mode));
//!             let federate = Federate::new(&name, config.clone(), rti);
//!             std::thread::spawn(move || federate.run())
//!         })
//!         .collect();
//!
//!     for handle in handles {
//!         let report = handle.join().expect("federate thread panicked")?;
//!         println!("{}", report);
//!     }
//!     Ok(())
//! }
//! ```

/// Per-kind event counters and the append-only event and round logs
pub mod accumulator;

/// Synchronization points, wait strategies and the coordinator's poll loops
pub mod barrier;

/// Command-line interface
///
/// Argument parsing with clap, including size and duration parsers with
/// human-readable suffixes (e.g. "4K", "10ms").
pub mod cli;

/// Validated run configuration shared by every federate
pub mod config;

pub mod error;

/// Federate lifecycle and the context shared by the drivers
pub mod federate;

/// Latency driver and round tracking
pub mod latency;

/// The federate's notification handler
pub mod listener;

pub mod logging;

/// Payload generation and verification
pub mod payload;

/// Peers, their objects and their counters
pub mod registry;

/// Result collection and output
///
/// Writes the JSON run summary with system metadata and exports raw events
/// or latency rounds as CSV.
pub mod results;

/// Middleware boundary and the simulated in-process RTI
pub mod rti;

/// Object model handles resolved once per federate
pub mod schema;

/// Latency statistics
pub mod stats;

/// Throughput driver and report
pub mod throughput;

pub mod utils;

pub use accumulator::{CounterSnapshot, EventAccumulator, EventKind};
pub use barrier::{BarrierCoordinator, SyncPointRegistry, WaitSettings, WaitStrategy};
pub use cli::{Args, TestMode};
pub use config::PerfConfig;
pub use error::{PayloadError, PerfError, RtiError};
pub use federate::{Federate, FederateReport};
pub use latency::{LatencyEvent, LatencyTracker};
pub use registry::PeerRegistry;
pub use results::{ResultsManager, RunResults};
pub use rti::{CallbackMode, FederateAmbassador, LocalRti, LocalRtiHub, Rti};
pub use stats::{LatencyReport, LatencyStats};
pub use throughput::ThroughputReport;

/// The current version of the harness
///
/// Populated from Cargo.toml and recorded in every result document.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Federation execution joined when none is named
    pub const FEDERATION_NAME: &str = "rti-perf";

    /// Test objects registered by each federate
    pub const OBJECT_COUNT: usize = 100;

    /// Loop iterations (throughput) or rounds (latency)
    pub const LOOP_COUNT: usize = 1000;

    /// Payload size in bytes
    pub const PAYLOAD_SIZE: usize = 1024;

    /// Quantum handed to the wait strategy by barrier and discovery waits
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// How often long waits report what is still outstanding
    pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

    /// Quantum used while the latency sender waits for acknowledgements
    ///
    /// Kept far below the expected round-trip time so polling does not show
    /// up in the measured latency.
    pub const LATENCY_POLL_INTERVAL: Duration = Duration::from_micros(20);

    /// Time yielded after each throughput loop iteration
    pub const LOOP_WAIT: Duration = Duration::from_millis(1);

    /// Give up on a ping round after this long
    pub const ROUND_TIMEOUT: Duration = Duration::from_secs(1);
}
