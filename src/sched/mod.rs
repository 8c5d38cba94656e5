// src/sched/mod.rs

//! Scheduled job execution, independent of file events.
//!
//! - [`schedule`] parses schedule expressions (`"every 30s"` shorthand or
//!   cron) and computes fire times.
//! - [`scheduler`] owns the job registry and the tick loop that fires due
//!   jobs on their own tasks.

pub mod schedule;
pub mod scheduler;

pub use schedule::Schedule;
pub use scheduler::{JobSpec, Scheduler, SchedulerMetrics};
