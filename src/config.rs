//! # Run Configuration
//!
//! [`PerfConfig`] is the validated, immutable view of the command line that
//! every federate and driver works from. Parsing problems are reported by
//! clap; the checks here cover combinations clap cannot see, such as a
//! latency sender that is not one of the peers.

use crate::barrier::WaitSettings;
use crate::cli::{Args, TestMode};
use crate::error::PerfError;
use crate::rti::CallbackMode;
use crate::utils::format_bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Everything a federate needs to know about the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfConfig {
    pub mode: TestMode,
    pub federation: String,
    /// Every federate taking part, including this process's own
    pub peers: Vec<String>,
    pub object_count: usize,
    pub interaction_count: usize,
    pub loop_count: usize,
    pub payload_size: usize,
    /// Designated latency sender
    pub sender: String,
    pub validate_data: bool,
    pub callback_mode: CallbackMode,
    pub print_interval: Option<usize>,
    pub loop_wait: Duration,
    pub time_stepped: bool,
    pub round_timeout: Duration,
    pub wait_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    /// Keep a log entry per received event for CSV export
    pub record_events: bool,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            mode: TestMode::Throughput,
            federation: crate::defaults::FEDERATION_NAME.to_string(),
            peers: vec!["alpha".to_string(), "beta".to_string()],
            object_count: crate::defaults::OBJECT_COUNT,
            interaction_count: crate::defaults::OBJECT_COUNT,
            loop_count: crate::defaults::LOOP_COUNT,
            payload_size: crate::defaults::PAYLOAD_SIZE,
            sender: "alpha".to_string(),
            validate_data: false,
            callback_mode: CallbackMode::Immediate,
            print_interval: None,
            loop_wait: crate::defaults::LOOP_WAIT,
            time_stepped: false,
            round_timeout: crate::defaults::ROUND_TIMEOUT,
            wait_timeout: None,
            poll_interval: crate::defaults::POLL_INTERVAL,
            progress_interval: crate::defaults::PROGRESS_INTERVAL,
            record_events: false,
        }
    }
}

impl PerfConfig {
    /// Build and validate a configuration from parsed arguments
    pub fn from_args(args: &Args) -> Result<Self, PerfError> {
        let peers: Vec<String> = args
            .peers
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let sender = match &args.sender {
            Some(sender) => sender.clone(),
            None => peers.first().cloned().unwrap_or_default(),
        };

        let config = Self {
            mode: args.mode,
            federation: args.federation.clone(),
            peers,
            object_count: args.objects,
            interaction_count: args.interactions.unwrap_or(args.objects),
            loop_count: args.loops,
            payload_size: args.size,
            sender,
            validate_data: args.validate_data,
            callback_mode: args.callback_mode.into(),
            print_interval: args.print_interval,
            loop_wait: args.loop_wait,
            time_stepped: args.time_stepped,
            round_timeout: args.round_timeout,
            wait_timeout: args.wait_timeout,
            poll_interval: args.poll_interval,
            progress_interval: args.progress_interval,
            record_events: args.export_csv.is_some() && args.mode == TestMode::Throughput,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the combinations clap cannot express
    pub fn validate(&self) -> Result<(), PerfError> {
        if self.peers.is_empty() {
            return Err(PerfError::Config("at least one peer name is required".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.as_str()) {
                return Err(PerfError::Config(format!("peer '{}' listed twice", peer)));
            }
        }

        if self.loop_count == 0 {
            return Err(PerfError::Config("loop count must be at least 1".into()));
        }

        if self.federation.trim().is_empty() {
            return Err(PerfError::Config("federation name cannot be empty".into()));
        }

        if self.mode == TestMode::Latency && !self.peers.contains(&self.sender) {
            return Err(PerfError::Config(format!(
                "latency sender '{}' is not one of the peers ({})",
                self.sender,
                self.peers.join(", ")
            )));
        }

        if self.print_interval == Some(0) {
            return Err(PerfError::Config("print interval must be at least 1".into()));
        }

        Ok(())
    }

    /// Iterations between progress lines
    pub fn batch_size(&self) -> usize {
        match self.print_interval {
            Some(interval) => interval.max(1),
            None if self.loop_count > 100_000 => 10_000,
            None => (self.loop_count / 10).max(1),
        }
    }

    /// Events every remote peer should deliver during a throughput run
    pub fn expected_events_per_peer(&self) -> u64 {
        let objects = self.object_count as u64;
        let per_loop = (self.object_count + self.interaction_count) as u64;
        objects + self.loop_count as u64 * per_loop
    }

    pub fn wait_settings(&self) -> WaitSettings {
        WaitSettings {
            poll_interval: self.poll_interval,
            progress_interval: self.progress_interval,
            deadline: self.wait_timeout,
        }
    }

    /// Every peer except `name`
    pub fn remote_peers_of(&self, name: &str) -> Vec<String> {
        self.peers.iter().filter(|p| *p != name).cloned().collect()
    }
}

impl fmt::Display for PerfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} test in '{}' with peers [{}]: ",
            self.mode,
            self.federation,
            self.peers.join(", ")
        )?;
        match self.mode {
            TestMode::Throughput => write!(
                f,
                "{} objects, {} interactions, {} loops",
                self.object_count, self.interaction_count, self.loop_count
            )?,
            TestMode::Latency => write!(
                f,
                "{} rounds from {}",
                self.loop_count, self.sender
            )?,
        }
        write!(
            f,
            ", {} payload, {} callbacks{}",
            format_bytes(self.payload_size),
            self.callback_mode,
            if self.time_stepped { ", time-stepped" } else { "" }
        )
    }
}
