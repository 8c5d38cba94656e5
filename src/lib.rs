// src/lib.rs

pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod guard;
pub mod health;
pub mod logging;
pub mod sched;
pub mod watch;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::ConfigFile;
use crate::daemon::Daemon;
use crate::workflow::{LoggingInvoker, SharedInvoker};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the daemon (scheduler, watcher, router, guards, health)
/// - Ctrl-C handling
///
/// The standalone binary uses a [`LoggingInvoker`]; embedding applications
/// call [`run_with_invoker`] with their own workflow implementation.
pub async fn run(args: CliArgs) -> Result<()> {
    run_with_invoker(args, Arc::new(LoggingInvoker)).await
}

pub async fn run_with_invoker(args: CliArgs, invoker: SharedInvoker) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.check {
        println!("noteflow: config OK ({})", config_path.display());
        return Ok(());
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut daemon = Daemon::new(cfg, invoker);
    daemon.start()?;

    // Ctrl-C → graceful shutdown.
    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    daemon.stop();

    Ok(())
}

/// Simple dry-run output: print the effective watch, budget, resource and
/// job configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("noteflow dry-run");
    println!("  watch.enabled = {}", cfg.watch.enabled);
    println!("  watch.path = {}", cfg.watch.path);
    println!("  watch.patterns = {:?}", cfg.watch.patterns);
    if !cfg.watch.ignore.is_empty() {
        println!("  watch.ignore = {:?}", cfg.watch.ignore);
    }
    println!("  watch.debounce_seconds = {}", cfg.watch.debounce_seconds);
    println!("  watch.extensions = {:?}", cfg.watch.extensions);
    println!();

    println!(
        "  budget: daily_limit = {}, alert at {}%, shutdown at {}%",
        cfg.budget.daily_limit, cfg.budget.alert_at_percent, cfg.budget.shutdown_at_percent
    );
    println!();

    println!("resources ({}):", cfg.resource.len());
    for (name, limits) in cfg.resource.iter() {
        println!(
            "  - {name}: {}/hour, {}/day, open {}s",
            limits.max_requests_per_hour, limits.max_requests_per_day, limits.circuit_open_seconds
        );
    }
    println!();

    println!("jobs ({}):", cfg.job.len());
    for (id, job) in cfg.job.iter() {
        println!(
            "  - {id}: schedule = {:?}{}",
            job.schedule,
            if job.enabled { "" } else { " (disabled)" }
        );
    }
}
