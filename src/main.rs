//! # RTI Performance Harness - Main Entry Point
//!
//! Runs one in-process federate per configured peer name against the
//! simulated RTI, then prints each federate's report and writes the optional
//! JSON summary and CSV export.
//!
//! ## Error Handling
//!
//! Argument errors are fatal before any federation interaction. A federate
//! whose run fails is logged; the process exits non-zero once every federate
//! has finished, so the other reports are still produced.

use anyhow::{bail, Result};
use clap::Parser;
use rti_perf::{
    cli::Args, config::PerfConfig, federate::Federate, logging::init_logging,
    results::ResultsManager, rti::LocalRtiHub, Rti,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_level(), args.log_file.as_deref())?;

    let config = PerfConfig::from_args(&args)?;
    info!("Starting RTI Performance Harness v{}", rti_perf::VERSION);
    info!("{}", config);

    let mut results_manager =
        ResultsManager::new(args.output.as_deref(), args.export_csv.as_deref(), config.clone());

    let hub = LocalRtiHub::new();
    let mut tasks = Vec::with_capacity(config.peers.len());
    for name in &config.peers {
        let rti: Arc<dyn Rti> = Arc::new(hub.connect(config.callback_mode));
        let federate = Federate::new(name, config.clone(), rti);
        let name = name.clone();
        tasks.push((name, tokio::task::spawn_blocking(move || federate.run())));
    }

    let mut failures = 0usize;
    for (name, task) in tasks {
        match task.await {
            Ok(Ok(report)) => results_manager.add_report(report),
            Ok(Err(e)) => {
                error!("Federate {} failed: {:#}", name, e);
                failures += 1;
            }
            Err(e) => {
                error!("Federate {} task did not complete: {}", name, e);
                failures += 1;
            }
        }
    }

    let results = results_manager.finalize()?;
    for report in &results.federates {
        println!("{}", report);
    }
    if results.summary.mismatches > 0 {
        warn!(
            "{} counts differ from their expectation (marked (!!))",
            results.summary.mismatches
        );
    }

    if failures > 0 {
        bail!("{} of {} federates failed", failures, config.peers.len());
    }

    info!("RTI Performance Harness completed successfully");
    Ok(())
}
