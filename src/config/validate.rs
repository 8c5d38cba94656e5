// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{NoteflowError, Result};
use crate::sched::Schedule;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::NoteflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watch(cfg)?;
    validate_budget(cfg)?;
    validate_resources(cfg)?;
    validate_jobs(cfg)?;
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    let watch = &cfg.watch;

    if !(watch.debounce_seconds > 0.0) {
        return Err(NoteflowError::ConfigError(format!(
            "[watch].debounce_seconds must be > 0 (got {})",
            watch.debounce_seconds
        )));
    }

    for pat in watch.patterns.iter().chain(watch.ignore.iter()) {
        if let Err(err) = Glob::new(pat) {
            return Err(NoteflowError::ConfigError(format!(
                "invalid glob pattern '{pat}': {err}"
            )));
        }
    }

    if watch.enabled && watch.patterns.is_empty() {
        return Err(NoteflowError::ConfigError(
            "[watch].patterns must not be empty when watching is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_budget(cfg: &RawConfigFile) -> Result<()> {
    let budget = &cfg.budget;

    if !(budget.daily_limit > 0.0) {
        return Err(NoteflowError::ConfigError(format!(
            "[budget].daily_limit must be > 0 (got {})",
            budget.daily_limit
        )));
    }

    for (name, pct) in [
        ("alert_at_percent", budget.alert_at_percent),
        ("shutdown_at_percent", budget.shutdown_at_percent),
    ] {
        if !(0.0..=100.0).contains(&pct) {
            return Err(NoteflowError::ConfigError(format!(
                "[budget].{name} must be in 0..=100 (got {pct})"
            )));
        }
    }

    if budget.alert_at_percent >= budget.shutdown_at_percent {
        return Err(NoteflowError::ConfigError(format!(
            "[budget].alert_at_percent ({}) must be below shutdown_at_percent ({})",
            budget.alert_at_percent, budget.shutdown_at_percent
        )));
    }

    Ok(())
}

fn validate_resources(cfg: &RawConfigFile) -> Result<()> {
    for (name, limits) in cfg.resource.iter() {
        if limits.max_requests_per_hour == 0 {
            return Err(NoteflowError::ConfigError(format!(
                "[resource.{name}].max_requests_per_hour must be >= 1"
            )));
        }
        if limits.max_requests_per_day < limits.max_requests_per_hour {
            return Err(NoteflowError::ConfigError(format!(
                "[resource.{name}].max_requests_per_day ({}) must be >= max_requests_per_hour ({})",
                limits.max_requests_per_day, limits.max_requests_per_hour
            )));
        }
        if limits.circuit_open_seconds == 0 {
            return Err(NoteflowError::ConfigError(format!(
                "[resource.{name}].circuit_open_seconds must be >= 1"
            )));
        }
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    for (id, job) in cfg.job.iter() {
        // Parse failures here are configuration errors, fatal at load time
        // rather than at first fire.
        Schedule::parse(&job.schedule).map_err(|err| {
            NoteflowError::ConfigError(format!("[job.{id}].schedule: {err}"))
        })?;
    }
    Ok(())
}
