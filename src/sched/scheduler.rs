// src/sched/scheduler.rs

//! Job registry and tick loop.
//!
//! Each due job fires on its own spawned task; a failing job is logged and
//! counted but stays registered, and the next scheduled firing still occurs.
//! Overlapping firings of the *same* job are skipped with a logged warning
//! (the previous run is still in flight), never run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{NoteflowError, Result};
use crate::sched::Schedule;
use crate::workflow::{SharedInvoker, WorkflowRequest};

/// One registered job. Immutable after registration; removed only by
/// [`Scheduler::unregister`] or shutdown.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub schedule: Schedule,
    pub enabled: bool,
}

struct JobEntry {
    spec: JobSpec,
    next_due: Option<DateTime<Utc>>,
    /// Set while a firing of this job is executing; used to skip overlaps.
    in_flight: Arc<AtomicBool>,
}

/// Running counters, exposed via [`Scheduler::metrics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub fired: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub overlap_skips: u64,
}

struct SchedulerInner {
    invoker: SharedInvoker,
    jobs: Mutex<HashMap<String, JobEntry>>,
    active: AtomicBool,
    tick_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    counters: Mutex<SchedulerMetrics>,
}

/// Runs periodic/cron jobs against the workflow invoker.
///
/// Cloning is cheap and shares state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(invoker: SharedInvoker) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                invoker,
                jobs: Mutex::new(HashMap::new()),
                active: AtomicBool::new(false),
                tick_task: Mutex::new(None),
                counters: Mutex::new(SchedulerMetrics::default()),
            }),
        }
    }

    /// Register a job. Fails on duplicate ids and on schedules that can
    /// never fire.
    pub fn register(&self, spec: JobSpec) -> Result<()> {
        let next_due = if spec.enabled {
            let next = spec.schedule.next_fire(Utc::now());
            if next.is_none() {
                return Err(NoteflowError::ConfigError(format!(
                    "job '{}' has a schedule that never fires",
                    spec.id
                )));
            }
            next
        } else {
            None
        };

        let mut jobs = self.inner.jobs.lock().unwrap_or_else(|p| p.into_inner());
        if jobs.contains_key(&spec.id) {
            return Err(NoteflowError::ConfigError(format!(
                "duplicate job id '{}'",
                spec.id
            )));
        }

        debug!(job = %spec.id, enabled = spec.enabled, "job registered");
        jobs.insert(
            spec.id.clone(),
            JobEntry {
                spec,
                next_due,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<()> {
        let mut jobs = self.inner.jobs.lock().unwrap_or_else(|p| p.into_inner());
        match jobs.remove(id) {
            Some(_) => {
                debug!(job = %id, "job unregistered");
                Ok(())
            }
            None => Err(NoteflowError::JobNotFound(id.to_string())),
        }
    }

    /// Start the tick loop. Calling twice is a no-op.
    pub fn start(&self) {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !inner.active.load(Ordering::SeqCst) {
                    break;
                }
                fire_due_jobs(&inner);
            }
            debug!("scheduler tick loop finished");
        });

        let mut slot = self.inner.tick_task.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(handle);
        info!("scheduler started");
    }

    /// Stop the tick loop. Idempotent; in-flight job firings are left to
    /// finish on their own tasks rather than awaited.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = {
            let mut slot = self.inner.tick_task.lock().unwrap_or_else(|p| p.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        info!("scheduler stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Number of enabled jobs currently registered.
    pub fn active_job_count(&self) -> usize {
        let jobs = self.inner.jobs.lock().unwrap_or_else(|p| p.into_inner());
        jobs.values().filter(|j| j.spec.enabled).count()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let counters = self.inner.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.clone()
    }
}

/// One pass over the registry: fire everything whose deadline has passed.
fn fire_due_jobs(inner: &Arc<SchedulerInner>) {
    let now = Utc::now();
    let mut to_fire: Vec<(String, Arc<AtomicBool>)> = Vec::new();

    {
        let mut jobs = inner.jobs.lock().unwrap_or_else(|p| p.into_inner());
        for entry in jobs.values_mut() {
            if !entry.spec.enabled {
                continue;
            }
            let due = match entry.next_due {
                Some(t) if t <= now => true,
                _ => false,
            };
            if !due {
                continue;
            }

            // Advance the deadline whether we fire or skip, so a skipped
            // overlap does not immediately re-fire on the next tick.
            entry.next_due = entry.spec.schedule.next_fire(now);

            if entry.in_flight.load(Ordering::SeqCst) {
                warn!(
                    job = %entry.spec.id,
                    "previous firing still running; skipping this firing"
                );
                let mut counters = inner.counters.lock().unwrap_or_else(|p| p.into_inner());
                counters.overlap_skips += 1;
                continue;
            }

            entry.in_flight.store(true, Ordering::SeqCst);
            to_fire.push((entry.spec.id.clone(), Arc::clone(&entry.in_flight)));
        }
    }

    for (id, in_flight) in to_fire {
        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            // Clears the in-flight flag even if the invoker panics, so the
            // job is not wedged forever.
            let _guard = InFlightGuard(in_flight);

            debug!(job = %id, "job firing");
            {
                let mut counters = task_inner
                    .counters
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                counters.fired += 1;
            }

            let outcome = task_inner
                .invoker
                .invoke(WorkflowRequest::Job { id: id.clone() })
                .await;

            let mut counters = task_inner
                .counters
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            if outcome.success {
                counters.succeeded += 1;
            } else {
                counters.failed += 1;
                warn!(
                    job = %id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "job firing failed"
                );
            }
        });
    }
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
