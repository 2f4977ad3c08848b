use crate::rti::CallbackMode;
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// RTI Performance Harness - throughput and latency benchmarks for HLA federations
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Test to run
    #[clap(short = 'm', long, value_enum, default_value_t = TestMode::Throughput, help_heading = "Core Options")]
    pub mode: TestMode,

    /// Federate names taking part, comma-separated; one in-process federate is run per name
    #[clap(short = 'p', long, value_delimiter = ',', default_values_t = vec!["alpha".to_string(), "beta".to_string()], help_heading = "Core Options")]
    pub peers: Vec<String>,

    /// Federation execution name
    #[clap(short = 'f', long, default_value = crate::defaults::FEDERATION_NAME, help_heading = "Core Options")]
    pub federation: String,

    /// Number of test objects each federate registers
    #[clap(short = 'o', long, default_value_t = crate::defaults::OBJECT_COUNT)]
    pub objects: usize,

    /// Interactions sent per loop (defaults to the object count)
    #[clap(short = 'n', long)]
    pub interactions: Option<usize>,

    /// Number of loop iterations (throughput) or ping rounds (latency)
    #[clap(short = 'l', long, default_value_t = crate::defaults::LOOP_COUNT)]
    pub loops: usize,

    /// Payload size per message, e.g. 100, 100B, 4K, 1M
    #[clap(short = 's', long, value_parser = parse_size, default_value = "1K")]
    pub size: usize,

    /// Latency test sender (defaults to the first peer)
    #[clap(long)]
    pub sender: Option<String>,

    /// Check every received payload against the expected pattern and size
    #[clap(long, default_value_t = false)]
    pub validate_data: bool,

    /// How middleware notifications are delivered
    #[clap(short = 'c', long, value_enum, default_value_t = CallbackArg::Immediate)]
    pub callback_mode: CallbackArg,

    /// Progress print interval in loop iterations (defaults to 10% of loops)
    #[clap(long)]
    pub print_interval: Option<usize>,

    /// Time yielded for incoming events after each throughput loop iteration
    #[clap(long, value_parser = parse_duration, default_value = "1ms")]
    pub loop_wait: Duration,

    /// Advance federation time after every loop iteration instead of sleeping
    #[clap(long, default_value_t = false)]
    pub time_stepped: bool,

    /// Give up on a ping round after this long
    #[clap(long, value_parser = parse_duration, default_value = "1s")]
    pub round_timeout: Duration,

    /// Upper bound on any single wait (peers, barriers, event counts)
    #[clap(long, value_parser = parse_duration)]
    pub wait_timeout: Option<Duration>,

    /// Poll interval used by wait loops
    #[clap(long, value_parser = parse_duration, default_value = "10ms")]
    pub poll_interval: Duration,

    /// How often long waits report outstanding peers
    #[clap(long, value_parser = parse_duration, default_value = "5s")]
    pub progress_interval: Duration,

    /// Export every received event (throughput) or round (latency) to CSV
    #[clap(long)]
    pub export_csv: Option<PathBuf>,

    /// Write the JSON run summary to this file
    #[clap(long)]
    pub output: Option<PathBuf>,

    /// Also write log output to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[clap(short = 'q', long, default_value_t = false)]
    pub quiet: bool,
}

/// Benchmark scenario
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum TestMode {
    /// Objects and interactions streamed in a loop
    #[clap(name = "throughput")]
    Throughput,

    /// Serial ping/ack round trips from one sender
    #[clap(name = "latency")]
    Latency,
}

impl std::fmt::Display for TestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestMode::Throughput => write!(f, "Throughput"),
            TestMode::Latency => write!(f, "Latency"),
        }
    }
}

/// Callback delivery mode as accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CallbackArg {
    #[clap(name = "immediate")]
    Immediate,

    #[clap(name = "evoked")]
    Evoked,
}

impl From<CallbackArg> for CallbackMode {
    fn from(arg: CallbackArg) -> Self {
        match arg {
            CallbackArg::Immediate => CallbackMode::Immediate,
            CallbackArg::Evoked => CallbackMode::Evoked,
        }
    }
}

impl Args {
    /// Log filter directive implied by `-v`/`--quiet`
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Parse a size with an optional B, K/KB or M/MB suffix (1024-based)
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let upper = s.to_ascii_uppercase();
    let (num_str, multiplier) = if let Some(stripped) = upper.strip_suffix("KB") {
        (stripped, 1024)
    } else if let Some(stripped) = upper.strip_suffix("MB") {
        (stripped, 1024 * 1024)
    } else if let Some(stripped) = upper.strip_suffix('K') {
        (stripped, 1024)
    } else if let Some(stripped) = upper.strip_suffix('M') {
        (stripped, 1024 * 1024)
    } else if let Some(stripped) = upper.strip_suffix('B') {
        (stripped, 1)
    } else {
        (upper.as_str(), 1)
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in size: {}", s))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", s))
}

/// Parse duration from string (e.g., "10ms", "10s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("us") {
        (stripped, "us")
    } else if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() {
        return Err(format!("Duration must be a finite number: {}", s));
    }
    if num < 0.0 {
        return Err(format!("Duration cannot be negative: {}", s));
    }

    let seconds = match unit {
        "us" => num / 1_000_000.0,
        "ms" => num / 1_000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("Duration out of range: {} ({})", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("4kb").unwrap(), 4096);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("0").unwrap(), 0);

        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1K").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5ms").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_non_finite_and_overflow() {
        for input in ["inf", "infs", "nanms", "NaN", "1e30s", "1e300h", "1e30us"] {
            assert!(parse_duration(input).is_err(), "{} should be rejected", input);
        }

        let err = Args::try_parse_from(["rti-perf", "--round-timeout", "inf"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Args::try_parse_from(["rti-perf", "--loop-wait", "1e30s"]).is_err());
    }

    #[test]
    fn test_peer_list_is_comma_separated() {
        let args = Args::parse_from(["rti-perf", "--peers", "alpha,beta,gamma"]);
        assert_eq!(args.peers, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["rti-perf"]);
        assert_eq!(args.mode, TestMode::Throughput);
        assert_eq!(args.peers, vec!["alpha", "beta"]);
        assert_eq!(args.size, 1024);
        assert_eq!(args.interactions, None);
        assert_eq!(args.callback_mode, CallbackArg::Immediate);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_unknown_flag_and_missing_value_are_rejected() {
        assert!(Args::try_parse_from(["rti-perf", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["rti-perf", "--loops"]).is_err());
        assert!(Args::try_parse_from(["rti-perf", "--size", "12Q"]).is_err());
    }

    #[test]
    fn test_verbosity_flags() {
        let args = Args::parse_from(["rti-perf", "-vv"]);
        assert_eq!(args.log_level(), "trace");
        let args = Args::parse_from(["rti-perf", "--quiet", "-v"]);
        assert_eq!(args.log_level(), "warn");
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(TestMode::Throughput.to_string(), "Throughput");
        assert_eq!(TestMode::Latency.to_string(), "Latency");
    }
}
