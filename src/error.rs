//! # Error Types
//!
//! Typed failures for the pieces of the harness where callers need to match on
//! the cause. Orchestration code (federate lifecycle, drivers, the binary)
//! wraps these in `anyhow::Error` with context, the same way the rest of the
//! crate reports failures.
//!
//! ## Taxonomy
//!
//! - [`RtiError`]: anything the middleware boundary reports. A few variants are
//!   expected coordination races (`FederationExists`, `FederatesStillJoined`,
//!   `SyncPointExists`) and are logged by callers instead of propagated.
//! - [`PayloadError`]: data corruption detected in a received payload. Always
//!   logged, never affects control flow.
//! - [`PerfError`]: failures of the measurement core itself (wait deadlines,
//!   configuration validation).

use std::time::Duration;
use thiserror::Error;

/// Failures reported by the middleware boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtiError {
    #[error("federation execution '{0}' already exists")]
    FederationExists(String),

    #[error("federation execution '{0}' does not exist")]
    FederationNotFound(String),

    #[error("federation execution '{0}' still has joined federates")]
    FederatesStillJoined(String),

    #[error("federate is not joined to a federation execution")]
    NotJoined,

    #[error("federate is already joined to a federation execution")]
    AlreadyJoined,

    #[error("federate name '{0}' is already in use")]
    NameInUse(String),

    #[error("synchronization point '{0}' is already registered")]
    SyncPointExists(String),

    #[error("synchronization point '{0}' is not announced")]
    UnknownSyncPoint(String),

    #[error("object instance {0} is not known")]
    UnknownObject(u64),

    #[error("object instance {0} is not owned by this federate")]
    NotOwner(u64),

    #[error("time management is not enabled for this federate")]
    TimeManagementDisabled,

    #[error("connection to the RTI was lost")]
    Disconnected,
}

/// Corruption detected in a received validation/padding buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload size mismatch: expected {expected} bytes, received {actual} bytes")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("payload content mismatch at index {index}: expected {expected}, received {actual}")]
    ByteMismatch { index: usize, expected: u8, actual: u8 },
}

/// Failures of the measurement core.
#[derive(Debug, Error)]
pub enum PerfError {
    #[error("gave up waiting for {what} after {waited:?}")]
    WaitTimeout { what: String, waited: Duration },

    #[error("invalid configuration: {0}")]
    Config(String),
}
