//! ndplog - poll ARP & ND caches and store to a database
//!
//! Reads a list of devices from the config file, pulls each one's neighbour
//! tables through the matching backend, and records the observed
//! `(ip, mac)` bindings with first/last-seen timestamps. Rows older than
//! the retention window are removed at the end of a clean run.
//!
//! Exit codes: 0 on success, 1 when one or more hosts could not be polled
//! (retention cleanup is skipped), 2 on configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ndplog_core::{config::Config, poll, store::ArpLogStore};

const EXIT_HOSTS_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "ndplog")]
#[command(version)]
#[command(about = "Poll neighbour caches across a fleet and log IP-to-MAC bindings")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = ndplog_core::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Show more detail about operations
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ndplog={log_level},ndplog_core={log_level}").into()),
        )
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_HOSTS_FAILED)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
        }
    };

    let mut store = match ArpLogStore::open(&cfg.db) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Cannot open database {:?}: {}", cfg.db.path, e);
            return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
        }
    };

    let report = poll::run(&cfg, &mut store).context("failed to write to the database")?;

    if report.clean() {
        tracing::info!("Finished");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(
            "{} of {} hosts failed to poll",
            report.hosts_failed,
            report.hosts_polled
        );
        Ok(ExitCode::from(EXIT_HOSTS_FAILED))
    }
}
