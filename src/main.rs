//! # Photo Benchmark - Main Entry Point
//!
//! Runs the fixed scenario sequence:
//! 1. **Initialize logging**: colorized console output, optional log file
//! 2. **Parse arguments**: every flag has a default
//! 3. **Print system info**: once, before the first scenario
//! 4. **Run scenarios**: each through the measurement harness
//! 5. **Report**: summary table and optional JSON file
//!
//! ## Error Handling
//!
//! Scenarios the host cannot run (core pinning without affinity support) are
//! skipped. Any other failure stops the run with a non-zero exit code unless
//! `--continue-on-error` is given, in which case the exit code is still
//! non-zero if any scenario failed.

use anyhow::Result;
use clap::Parser;
use photo_bench::{
    alloc_tracking::TrackingAllocator,
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    cli::Args,
    host::SystemHost,
    logging,
    results::ResultsManager,
};
use std::sync::Arc;
use tracing::{error, info};

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init_logging(args.verbose, args.log_file.as_deref())?;

    info!("Starting Photo Benchmark");
    info!("Configuration: {:?}", args);

    let config = BenchmarkConfig::from_args(&args)?;
    let mut results_manager = ResultsManager::new(args.output_file.as_deref());
    println!("{}", results_manager.system_info());

    let runner = BenchmarkRunner::new(config, Arc::new(SystemHost::new()));
    let failed = runner.run_all(|outcome| {
        results_manager.add_outcome(outcome);
        Ok(())
    });

    let failed = match failed {
        Ok(failed) => failed,
        Err(e) => {
            error!("{:#}", e);
            // Still report what completed before the failure.
            results_manager.print_summary();
            results_manager.record_failures(1);
            results_manager.finalize()?;
            return Err(e);
        }
    };

    results_manager.record_failures(failed);
    results_manager.print_summary();
    results_manager.finalize()?;

    if failed > 0 {
        anyhow::bail!("{} scenario(s) failed", failed);
    }
    info!("Photo Benchmark completed successfully");
    Ok(())
}
