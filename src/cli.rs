// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `noteflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "noteflow",
    version,
    about = "Automation daemon for a markdown note vault: scheduled jobs, \
             debounced file-change processing, rate/budget protection.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Noteflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Noteflow.toml")]
    pub config: String,

    /// Parse + validate the config, print a summary, then exit.
    #[arg(long)]
    pub check: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NOTEFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the effective configuration, but don't start
    /// the daemon.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
