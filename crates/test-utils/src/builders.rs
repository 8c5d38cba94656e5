#![allow(dead_code)]

use std::collections::BTreeMap;

use noteflow::config::{
    BudgetSection, ConfigFile, JobConfig, RawConfigFile, ResourceLimits, WatchSection,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watch: WatchSection::default(),
                budget: BudgetSection::default(),
                resource: BTreeMap::new(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn watch_path(mut self, path: &str) -> Self {
        self.config.watch.path = path.to_string();
        self
    }

    pub fn watch_enabled(mut self, enabled: bool) -> Self {
        self.config.watch.enabled = enabled;
        self
    }

    pub fn watch_pattern(mut self, pattern: &str) -> Self {
        self.config.watch.patterns = vec![pattern.to_string()];
        self
    }

    pub fn ignore_pattern(mut self, pattern: &str) -> Self {
        self.config.watch.ignore.push(pattern.to_string());
        self
    }

    pub fn debounce_seconds(mut self, secs: f64) -> Self {
        self.config.watch.debounce_seconds = secs;
        self
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.config.watch.extensions = exts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn daily_budget(mut self, limit: f64) -> Self {
        self.config.budget.daily_limit = limit;
        self
    }

    pub fn budget_thresholds(mut self, alert_pct: f64, shutdown_pct: f64) -> Self {
        self.config.budget.alert_at_percent = alert_pct;
        self.config.budget.shutdown_at_percent = shutdown_pct;
        self
    }

    pub fn with_resource(mut self, name: &str, limits: ResourceLimits) -> Self {
        self.config.resource.insert(name.to_string(), limits);
        self
    }

    pub fn with_job(mut self, id: &str, schedule: &str) -> Self {
        self.config.job.insert(
            id.to_string(),
            JobConfig {
                schedule: schedule.to_string(),
                enabled: true,
            },
        );
        self
    }

    pub fn with_disabled_job(mut self, id: &str, schedule: &str) -> Self {
        self.config.job.insert(
            id.to_string(),
            JobConfig {
                schedule: schedule.to_string(),
                enabled: false,
            },
        );
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ResourceLimits`.
pub struct ResourceLimitsBuilder {
    limits: ResourceLimits,
}

impl ResourceLimitsBuilder {
    pub fn new() -> Self {
        Self {
            limits: ResourceLimits::default(),
        }
    }

    pub fn per_hour(mut self, n: u32) -> Self {
        self.limits.max_requests_per_hour = n;
        self
    }

    pub fn per_day(mut self, n: u32) -> Self {
        self.limits.max_requests_per_day = n;
        self
    }

    pub fn open_seconds(mut self, secs: u64) -> Self {
        self.limits.circuit_open_seconds = secs;
        self
    }

    pub fn cooldown(mut self, secs: u64) -> Self {
        self.limits.cooldown_seconds = secs;
        self
    }

    pub fn build(self) -> ResourceLimits {
        self.limits
    }
}

impl Default for ResourceLimitsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
