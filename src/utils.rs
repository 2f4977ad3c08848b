//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the drivers and the report code.
//!
//! ## Key Functionality Categories
//!
//! - **Timing**: a process-wide monotonic nanosecond clock used for every
//!   event timestamp, so timestamps taken on callback threads and on the driver
//!   thread are directly comparable
//! - **Formatting**: human-readable display of durations, byte counts and rates
//! - **Identification**: unique run identifiers for result files
//!
//! ## Usage Examples
//!
//! ```rust
//! use rti_perf::utils::*;
//!
//! assert_eq!(format_duration_ns(1_500_000), "1.50ms");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//! ```

use std::sync::OnceLock;
use std::time::Instant;
use uuid::Uuid;

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Generate a unique identifier for a benchmark run
///
/// Used to tag result documents so runs sharing an output directory can be
/// told apart.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Monotonic timestamp in nanoseconds
///
/// Measured from the first call in this process. Unlike wall-clock time this
/// never goes backwards, which matters because send and receive timestamps
/// for latency rounds are taken on different threads.
pub fn monotonic_ns() -> u64 {
    let epoch = CLOCK_EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Format a nanosecond value using the most readable unit
///
/// ## Examples
///
/// ```rust
/// # use rti_perf::utils::format_duration_ns;
/// assert_eq!(format_duration_ns(500), "500ns");
/// assert_eq!(format_duration_ns(1_500), "1.50μs");
/// ```
pub fn format_duration_ns(ns: u64) -> String {
    format_duration_f64(ns as f64)
}

/// Same as [`format_duration_ns`] for fractional values such as means
pub fn format_duration_f64(ns: f64) -> String {
    if ns < 1_000.0 {
        format!("{:.0}ns", ns)
    } else if ns < 1_000_000.0 {
        format!("{:.2}μs", ns / 1_000.0)
    } else if ns < 1_000_000_000.0 {
        format!("{:.2}ms", ns / 1_000_000.0)
    } else {
        format!("{:.2}s", ns / 1_000_000_000.0)
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Format a data rate in bytes per second
pub fn format_rate(bytes_per_second: f64) -> String {
    if bytes_per_second < 1024.0 {
        format!("{:.2} B/s", bytes_per_second)
    } else if bytes_per_second < 1024.0 * 1024.0 {
        format!("{:.2} KB/s", bytes_per_second / 1024.0)
    } else if bytes_per_second < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB/s", bytes_per_second / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB/s", bytes_per_second / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an event rate
pub fn format_event_rate(events_per_second: f64) -> String {
    if events_per_second < 1_000.0 {
        format!("{:.0} evt/s", events_per_second)
    } else if events_per_second < 1_000_000.0 {
        format!("{:.2}K evt/s", events_per_second / 1_000.0)
    } else {
        format!("{:.2}M evt/s", events_per_second / 1_000_000.0)
    }
}

/// Rate helper that treats an empty window as zero instead of dividing by it
pub fn per_second(count: f64, window_ns: u64) -> f64 {
    if window_ns == 0 {
        0.0
    } else {
        count / (window_ns as f64 / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ns_never_goes_backwards() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_format_duration_ns() {
        assert_eq!(format_duration_ns(500), "500ns");
        assert_eq!(format_duration_ns(1_500), "1.50μs");
        assert_eq!(format_duration_ns(1_500_000), "1.50ms");
        assert_eq!(format_duration_ns(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.50 MB");
    }

    #[test]
    fn test_format_rates() {
        assert_eq!(format_rate(500.0), "500.00 B/s");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
        assert_eq!(format_event_rate(999.0), "999 evt/s");
        assert_eq!(format_event_rate(2_500.0), "2.50K evt/s");
    }

    #[test]
    fn test_per_second_handles_empty_window() {
        assert_eq!(per_second(10.0, 0), 0.0);
        assert_eq!(per_second(10.0, 2_000_000_000), 5.0);
    }
}
