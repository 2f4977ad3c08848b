use crate::cli::TestMode;
use crate::config::PerfConfig;
use crate::federate::FederateReport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Complete results of one run, as written to the JSON summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub metadata: RunMetadata,
    pub config: PerfConfig,
    pub federates: Vec<FederateReport>,
    pub summary: RunSummary,
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub rust_version: String,
    pub harness_version: String,
}

/// Figures across every federate in the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub federates: usize,
    /// Counts that differ from their expectation, over all throughput reports
    pub mismatches: usize,
    pub total_events: u64,
    pub latency_rounds: usize,
    pub complete_latency_rounds: usize,
}

/// Collects federate reports and writes the JSON and CSV outputs
pub struct ResultsManager {
    output_file: Option<PathBuf>,
    csv_file: Option<PathBuf>,
    config: PerfConfig,
    reports: Vec<FederateReport>,
}

impl ResultsManager {
    pub fn new(output_file: Option<&Path>, csv_file: Option<&Path>, config: PerfConfig) -> Self {
        Self {
            output_file: output_file.map(Path::to_path_buf),
            csv_file: csv_file.map(Path::to_path_buf),
            config,
            reports: Vec::new(),
        }
    }

    pub fn add_report(&mut self, report: FederateReport) {
        debug!("Adding report for federate {}", report.name);
        self.reports.push(report);
    }

    /// Write every configured output and return the assembled results
    pub fn finalize(&mut self) -> Result<RunResults> {
        info!("Finalizing results for {} federates", self.reports.len());
        self.reports.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(path) = &self.csv_file {
            let rows = self.write_csv(path)?;
            info!("Exported {} rows to {:?}", rows, path);
        }

        let results = RunResults {
            metadata: RunMetadata {
                version: crate::VERSION.to_string(),
                run_id: crate::utils::generate_run_id(),
                timestamp: chrono::Utc::now(),
                system_info: SystemInfo::default(),
            },
            config: self.config.clone(),
            federates: self.reports.clone(),
            summary: self.calculate_summary(),
        };

        if let Some(path) = &self.output_file {
            let json = serde_json::to_string_pretty(&results)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write results to {:?}", path))?;
            info!("Results written to: {:?}", path);
        }

        Ok(results)
    }

    fn calculate_summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            federates: self.reports.len(),
            ..RunSummary::default()
        };
        for report in &self.reports {
            summary.mismatches += report.mismatches();
            if let Some(throughput) = &report.throughput {
                summary.total_events += throughput.totals.total();
            }
            if let Some(latency) = &report.latency {
                summary.latency_rounds += latency.rounds;
                summary.complete_latency_rounds += latency.complete_rounds;
            }
        }
        summary
    }

    /// Throughput: one row per received event. Latency: one row per
    /// (round, responder) on the sender.
    fn write_csv(&self, path: &Path) -> Result<usize> {
        let file =
            File::create(path).with_context(|| format!("Failed to create CSV file {:?}", path))?;
        let mut out = BufWriter::new(file);
        let mut rows = 0;

        match self.config.mode {
            TestMode::Throughput => {
                writeln!(out, "federate,timestamp_ns,kind,peer,object")?;
                for report in &self.reports {
                    for event in &report.events {
                        let object = event.object.map(|o| o.to_string()).unwrap_or_default();
                        writeln!(
                            out,
                            "{},{},{},{},{}",
                            report.name, event.timestamp_ns, event.kind, event.peer, object
                        )?;
                        rows += 1;
                    }
                }
            }
            TestMode::Latency => {
                writeln!(out, "serial,responder,sent_ns,received_ns,latency_ns")?;
                for report in &self.reports {
                    for round in &report.rounds {
                        let mut responses: Vec<(&String, &u64)> = round.responses.iter().collect();
                        responses.sort();
                        for (responder, received) in responses {
                            writeln!(
                                out,
                                "{},{},{},{},{}",
                                round.serial,
                                responder,
                                round.sent_ns,
                                received,
                                received.saturating_sub(round.sent_ns)
                            )?;
                            rows += 1;
                        }
                    }
                }
            }
        }

        out.flush()?;
        Ok(rows)
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            harness_version: crate::VERSION.to_string(),
        }
    }
}
