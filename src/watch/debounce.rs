// src/watch/debounce.rs

//! Debounced routing of file events into workflow invocations.
//!
//! [`DebouncedEventRouter::handle`] is called for every watcher event and
//! never blocks the caller. Eligible events arm (or re-arm) a per-path timer;
//! each new event for a path atomically cancels-and-replaces the previous
//! timer, so only the *last* event within the debounce window is ever
//! dispatched. On expiry, the timer task invokes the workflow exactly once
//! for that path and records success/failure and timing into counters.
//!
//! Shutdown cancels outstanding timers instead of flushing them: coalesced
//! events pending at stop time are dropped. That trade (fast, predictable
//! shutdown over completeness) is deliberate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::watch::patterns::has_matching_extension;
use crate::watch::{FileEvent, FileEventKind};
use crate::workflow::{SharedInvoker, WorkflowRequest};

/// Router tuning, derived from `[watch]` config.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Quiet period before a path's latest event is dispatched.
    pub debounce: Duration,
    /// Extensions considered processable; events for anything else are
    /// dropped before a timer is created.
    pub extensions: Vec<String>,
}

/// Running counters, exposed via [`DebouncedEventRouter::metrics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_processing_ms: u64,
    pub avg_processing_ms: f64,
}

/// Health view, exposed via [`DebouncedEventRouter::health_status`].
#[derive(Debug, Clone, Serialize)]
pub struct RouterHealth {
    pub is_healthy: bool,
    /// Paths currently waiting out their debounce window.
    pub queue_depth: usize,
    /// Workflow invocations currently in flight.
    pub processing_count: usize,
}

/// A pending per-path debounce entry: the armed timer plus a generation tag
/// so a superseded timer that already woke up can tell it lost the race.
struct PendingDebounce {
    generation: u64,
    timer: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    succeeded: u64,
    failed: u64,
    total_processing_ms: u64,
}

struct RouterInner {
    config: RouterConfig,
    invoker: SharedInvoker,
    pending: Mutex<HashMap<PathBuf, PendingDebounce>>,
    counters: Mutex<Counters>,
    processing: AtomicUsize,
    stopped: AtomicBool,
    next_generation: AtomicU64,
}

/// Coalesces raw file events per path into a single workflow call after a
/// quiet period.
///
/// Cloning is cheap and shares state; distinct paths dispatch concurrently,
/// while same-path events are serialized by construction (one active timer
/// per path).
#[derive(Clone)]
pub struct DebouncedEventRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for DebouncedEventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedEventRouter")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl DebouncedEventRouter {
    pub fn new(config: RouterConfig, invoker: SharedInvoker) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                config,
                invoker,
                pending: Mutex::new(HashMap::new()),
                counters: Mutex::new(Counters::default()),
                processing: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Handle one raw watcher event.
    ///
    /// Synchronous and non-blocking: timer scheduling is fire-and-forget.
    /// Deleted events and non-matching extensions are dropped immediately
    /// with no timer created.
    pub fn handle(&self, event: FileEvent) {
        let inner = &self.inner;

        if inner.stopped.load(Ordering::Relaxed) {
            trace!(?event.path, "router stopped; dropping event");
            return;
        }

        if event.kind == FileEventKind::Deleted {
            debug!(path = ?event.path, "dropping deleted event");
            return;
        }

        if !has_matching_extension(&event.path, &inner.config.extensions) {
            trace!(path = ?event.path, "dropping event for non-matching extension");
            return;
        }

        let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let path = event.path.clone();
        let kind = event.kind;

        // Cancel-and-replace under the pending lock. The timer task's first
        // action after its sleep is taking this same lock and checking its
        // generation, so an old timer can never dispatch after being
        // superseded here.
        let mut pending = inner.pending.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(prev) = pending.remove(&path) {
            prev.timer.abort();
            trace!(path = ?path, "debounce timer reset");
        }

        let timer = tokio::spawn(run_timer(
            Arc::clone(inner),
            path.clone(),
            kind,
            generation,
        ));

        pending.insert(path, PendingDebounce { generation, timer });
    }

    pub fn metrics(&self) -> RouterMetrics {
        let counters = self
            .inner
            .counters
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        let avg = if counters.total > 0 {
            counters.total_processing_ms as f64 / counters.total as f64
        } else {
            0.0
        };
        RouterMetrics {
            total: counters.total,
            succeeded: counters.succeeded,
            failed: counters.failed,
            total_processing_ms: counters.total_processing_ms,
            avg_processing_ms: avg,
        }
    }

    pub fn health_status(&self) -> RouterHealth {
        let queue_depth = {
            let pending = self.inner.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.len()
        };
        RouterHealth {
            is_healthy: !self.inner.stopped.load(Ordering::Relaxed),
            queue_depth,
            processing_count: self.inner.processing.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting events and cancel (not flush) all pending timers.
    ///
    /// Idempotent; outstanding coalesced events are dropped by design.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::Relaxed) {
            return;
        }

        let mut pending = self.inner.pending.lock().unwrap_or_else(|p| p.into_inner());
        let cancelled = pending.len();
        for (_, entry) in pending.drain() {
            entry.timer.abort();
        }
        if cancelled > 0 {
            info!(cancelled, "router stopped; pending debounce timers cancelled");
        } else {
            info!("router stopped");
        }
    }
}

/// Body of one per-path debounce timer.
async fn run_timer(
    inner: Arc<RouterInner>,
    path: PathBuf,
    kind: FileEventKind,
    generation: u64,
) {
    tokio::time::sleep(inner.config.debounce).await;

    // Claim the pending entry. If a newer event replaced us, or stop()
    // drained the map, the generation won't match and we silently lose.
    let claimed = {
        let mut pending = inner.pending.lock().unwrap_or_else(|p| p.into_inner());
        match pending.get(&path) {
            Some(entry) if entry.generation == generation => {
                pending.remove(&path);
                true
            }
            _ => false,
        }
    };

    if !claimed || inner.stopped.load(Ordering::Relaxed) {
        return;
    }

    inner.processing.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let outcome = inner
        .invoker
        .invoke(WorkflowRequest::FileChanged {
            path: path.clone(),
            kind,
        })
        .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    inner.processing.fetch_sub(1, Ordering::Relaxed);

    {
        let mut counters = inner.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.total += 1;
        counters.total_processing_ms += elapsed_ms;
        if outcome.success {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
    }

    if outcome.success {
        debug!(path = ?path, elapsed_ms, "workflow invocation succeeded");
    } else {
        // Invoker failures are recorded, never propagated: a broken workflow
        // must not destabilize the timer/event subsystem.
        warn!(
            path = ?path,
            elapsed_ms,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "workflow invocation failed"
        );
    }
}
