//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `site_audit` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use site_audit::initialization::init_logger_with;
use site_audit::{run_replay, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    let log_level = opt.log_level.clone();
    let log_format = opt.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    match run_replay(&opt).await {
        Ok(summary) => {
            println!(
                "✅ Audited {} of {} page{} ({} failed, {} finding{}) in {:.1}s",
                summary.audited,
                summary.pages,
                if summary.pages == 1 { "" } else { "s" },
                summary.failed,
                summary.findings,
                if summary.findings == 1 { "" } else { "s" },
                summary.elapsed_seconds
            );
            println!("Results saved in {}", summary.db_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("site_audit error: {:#}", e);
            process::exit(1);
        }
    }
}
