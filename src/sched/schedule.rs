// src/sched/schedule.rs

//! Schedule expression parsing and next-fire computation.
//!
//! Two forms are accepted:
//!
//! - `"every Ns"` / `"every Nm"` / `"every Nh"` — fixed intervals.
//! - Anything else is treated as a cron expression and handed to the `cron`
//!   crate (seconds-resolution, e.g. `"0 0 3 * * * *"` for 03:00 daily).

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::{NoteflowError, Result};

/// A parsed job schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval between firings.
    Every(Duration),
    /// Cron expression (UTC).
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a schedule expression. Fails at registration/config time, never
    /// at fire time.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();

        if let Some(interval) = trimmed.strip_prefix("every ") {
            let duration = parse_interval(interval.trim()).map_err(|msg| {
                NoteflowError::ScheduleError(expr.to_string(), msg)
            })?;
            return Ok(Schedule::Every(duration));
        }

        let cron = cron::Schedule::from_str(trimmed).map_err(|err| {
            NoteflowError::ScheduleError(expr.to_string(), err.to_string())
        })?;
        Ok(Schedule::Cron(Box::new(cron)))
    }

    /// The next time this schedule fires strictly after `after`.
    ///
    /// `None` means the schedule will never fire again (possible for cron
    /// expressions with a bounded year field).
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(dur) => {
                let delta = chrono::Duration::from_std(*dur).ok()?;
                after.checked_add_signed(delta)
            }
            Schedule::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

/// Parse `"30s"`, `"5m"`, `"2h"` into a duration.
fn parse_interval(s: &str) -> std::result::Result<Duration, String> {
    if s.len() < 2 {
        return Err(format!("interval '{s}' too short (expected e.g. \"30s\")"));
    }
    let (num, unit) = s.split_at(s.len() - 1);
    let n: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid interval count '{num}'"))?;
    if n == 0 {
        return Err("interval must be > 0".to_string());
    }
    match unit {
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("unknown interval unit '{other}' (expected s, m or h)")),
    }
}
