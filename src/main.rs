//! pfsck - parallel block consistency checker
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pfsck::config::{CheckConfig, CliArgs};
use pfsck::progress::{print_header, print_summary, ProgressReporter};
use pfsck::walker::FsckCoordinator;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = CheckConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(&config.meta_url.redacted(), &config.path, config.worker_count);
    }

    let show_progress = config.show_progress;
    let fail_record = config.fail_record.clone();

    let coordinator = FsckCoordinator::open(config).context("Failed to open volume")?;
    let block_size = coordinator
        .format()
        .block_size_bytes()
        .context("Unusable volume format")?;

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = if show_progress {
        let reporter = Arc::new(ProgressReporter::new());
        reporter.set_status("Resolving start path...");

        let updates = Arc::clone(&reporter);
        let result = coordinator.run_with_progress(move |progress| updates.update(&progress));

        match &result {
            Ok(r) if r.completed => reporter.finish("Check completed"),
            Ok(_) => reporter.finish("Check interrupted"),
            Err(_) => reporter.finish_and_clear(),
        }
        result
    } else {
        coordinator.run()
    }
    .context("Check failed")?;

    print_summary(&result, block_size, &fail_record);

    if !result.completed {
        info!("Check was interrupted before completion");
    }
    if result.errors > 0 {
        warn!(errors = result.errors, "Check completed with errors");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pfsck=debug,warn")
    } else {
        EnvFilter::new("pfsck=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install log subscriber")?;

    Ok(())
}
