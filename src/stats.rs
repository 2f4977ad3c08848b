//! # Latency Statistics
//!
//! Summary figures computed from raw per-round latency samples (nanoseconds).
//! The conventions here are chosen for parity with reports produced by other
//! implementations of the same benchmark:
//!
//! - **Median** is the element at index `n / 2` of the sorted samples, which
//!   for even `n` is the upper of the two middle values
//! - **Standard deviation** is the population figure (divide by `n`)
//! - **95%M** is the mean of the samples inside `[mean - 2σ, mean + 2σ]`
//!
//! `p99` comes from an HDR histogram with three significant figures, the same
//! way the rest of the crate records latency distributions.

use crate::latency::LatencyEvent;
use crate::utils::format_duration_f64;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Summary of one peer's latency samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: f64,
    pub std_dev_ns: f64,
    /// Mean of the samples within two standard deviations of the mean
    pub trimmed_mean_ns: f64,
    pub p99_ns: u64,
}

impl LatencyStats {
    /// Returns `None` for an empty sample set
    pub fn compute(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();

        let mean = mean(&sorted);
        let variance = sorted
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let std_dev = variance.sqrt();

        Some(Self {
            samples: n,
            min_ns: sorted[0],
            max_ns: sorted[n - 1],
            mean_ns: mean,
            median_ns: sorted[n / 2] as f64,
            std_dev_ns: std_dev,
            trimmed_mean_ns: trimmed_mean(&sorted, mean, std_dev),
            p99_ns: percentile(&sorted, 99.0),
        })
    }
}

fn mean(samples: &[u64]) -> f64 {
    let sum: u128 = samples.iter().map(|&x| x as u128).sum();
    sum as f64 / samples.len() as f64
}

/// Mean over `[mean - 2σ, mean + 2σ]`, falling back to the plain mean if
/// rounding leaves that range empty.
fn trimmed_mean(samples: &[u64], mean: f64, std_dev: f64) -> f64 {
    let low = mean - 2.0 * std_dev;
    let high = mean + 2.0 * std_dev;
    let kept: Vec<u64> = samples
        .iter()
        .copied()
        .filter(|&x| (x as f64) >= low && (x as f64) <= high)
        .collect();

    if kept.is_empty() {
        mean
    } else {
        self::mean(&kept)
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let recorded = Histogram::<u64>::new(3).ok().and_then(|mut histogram| {
        for &value in sorted {
            histogram.record(value).ok()?;
        }
        Some(histogram)
    });

    match recorded {
        Some(histogram) => histogram.value_at_percentile(p),
        None => {
            let index = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[index.min(sorted.len() - 1)]
        }
    }
}

/// Per-peer latency figures, ordered by peer name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub rounds: usize,
    pub complete_rounds: usize,
    pub peers: BTreeMap<String, LatencyStats>,
}

impl LatencyReport {
    pub fn from_rounds(rounds: &[LatencyEvent]) -> Self {
        let mut samples: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for round in rounds {
            for (peer, latency) in round.latencies() {
                samples.entry(peer.to_string()).or_default().push(latency);
            }
        }

        Self {
            rounds: rounds.len(),
            complete_rounds: rounds.iter().filter(|r| r.is_complete()).count(),
            peers: samples
                .into_iter()
                .filter_map(|(peer, values)| LatencyStats::compute(&values).map(|s| (peer, s)))
                .collect(),
        }
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Latency: {} rounds, {} complete",
            self.rounds, self.complete_rounds
        )?;
        writeln!(
            f,
            "  {:<16} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "Peer", "Samples", "Mean", "Median", "StdDev", "95%M", "P99"
        )?;
        for (peer, stats) in &self.peers {
            writeln!(
                f,
                "  {:<16} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12}",
                peer,
                stats.samples,
                format_duration_f64(stats.mean_ns),
                format_duration_f64(stats.median_ns),
                format_duration_f64(stats.std_dev_ns),
                format_duration_f64(stats.trimmed_mean_ns),
                format_duration_f64(stats.p99_ns as f64),
            )?;
        }
        Ok(())
    }
}
