// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// path = "vault"
/// patterns = ["**/*.md"]
/// ignore = [".obsidian/**", "**/.trash/**"]
/// debounce_seconds = 2.0
///
/// [budget]
/// daily_limit = 10.0
/// alert_at_percent = 50.0
/// shutdown_at_percent = 80.0
///
/// [resource.tagger]
/// max_requests_per_hour = 60
/// max_requests_per_day = 500
/// circuit_open_seconds = 300
///
/// [job.nightly-reindex]
/// schedule = "0 0 3 * * * *"
/// enabled = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// File watching config from `[watch]`.
    #[serde(default)]
    pub watch: WatchSection,

    /// Global spend budget from `[budget]`.
    #[serde(default)]
    pub budget: BudgetSection,

    /// Per-protected-resource circuit limits from `[resource.<name>]`.
    #[serde(default)]
    pub resource: BTreeMap<String, ResourceLimits>,

    /// Scheduled jobs from `[job.<id>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// Validated configuration.
///
/// Constructed via `ConfigFile::try_from(raw)`, which is implemented in
/// `config::validate`. Field meanings are identical to [`RawConfigFile`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub budget: BudgetSection,
    pub resource: BTreeMap<String, ResourceLimits>,
    pub job: BTreeMap<String, JobConfig>,
}

impl ConfigFile {
    /// Construct without re-validating. Only `config::validate` should call
    /// this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            watch: raw.watch,
            budget: raw.budget,
            resource: raw.resource,
            job: raw.job,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Whether file watching is enabled at all. The scheduler and guards
    /// still run when this is false.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory to watch recursively.
    #[serde(default = "default_watch_path")]
    pub path: String,

    /// Include glob patterns, evaluated relative to `path`.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Ignore glob patterns. Checked *before* include patterns: an ignored
    /// path never produces an event even if it also matches an include.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Quiet period before a burst of events for one path is dispatched.
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: f64,

    /// File extensions the router considers processable. Events for other
    /// extensions are dropped before any timer is created.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_watch_path() -> String {
    ".".to_string()
}

fn default_patterns() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

fn default_debounce_seconds() -> f64 {
    2.0
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_watch_path(),
            patterns: default_patterns(),
            ignore: Vec::new(),
            debounce_seconds: default_debounce_seconds(),
            extensions: default_extensions(),
        }
    }
}

/// `[budget]` section.
///
/// The budget is a trailing-24h spend ceiling shared by every protected
/// resource.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSection {
    /// Total spend allowed within any trailing 24h window.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: f64,

    /// Crossing this percentage of `daily_limit` logs an alert but keeps
    /// accepting cost.
    #[serde(default = "default_alert_at_percent")]
    pub alert_at_percent: f64,

    /// Reaching this percentage of `daily_limit` sets the sticky shutdown
    /// flag; further calls are rejected until manually cleared.
    #[serde(default = "default_shutdown_at_percent")]
    pub shutdown_at_percent: f64,
}

fn default_daily_limit() -> f64 {
    10.0
}

fn default_alert_at_percent() -> f64 {
    50.0
}

fn default_shutdown_at_percent() -> f64 {
    80.0
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            alert_at_percent: default_alert_at_percent(),
            shutdown_at_percent: default_shutdown_at_percent(),
        }
    }
}

/// `[resource.<name>]` section: circuit-breaker limits for one protected
/// external resource (e.g. one API).
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceLimits {
    /// Max call attempts within any trailing hour before the circuit opens.
    #[serde(default = "default_max_per_hour")]
    pub max_requests_per_hour: u32,

    /// Max call attempts within any trailing day before the circuit opens.
    #[serde(default = "default_max_per_day")]
    pub max_requests_per_day: u32,

    /// How long an opened circuit stays open before a half-open trial.
    #[serde(default = "default_circuit_open_seconds")]
    pub circuit_open_seconds: u64,

    /// Minimum pause between consecutive calls. Advisory: surfaced through
    /// circuit snapshots for workflow implementations to honor; the breaker
    /// does not enforce it.
    #[serde(default)]
    pub cooldown_seconds: u64,
}

fn default_max_per_hour() -> u32 {
    60
}

fn default_max_per_day() -> u32 {
    500
}

fn default_circuit_open_seconds() -> u64 {
    300
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_requests_per_hour: default_max_per_hour(),
            max_requests_per_day: default_max_per_day(),
            circuit_open_seconds: default_circuit_open_seconds(),
            cooldown_seconds: 0,
        }
    }
}

/// `[job.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Either `"every Ns|Nm|Nh"` or a cron expression
    /// (e.g. `"0 0 3 * * * *"`).
    pub schedule: String,

    /// Disabled jobs are kept in the registry but never fire.
    #[serde(default = "default_true")]
    pub enabled: bool,
}
