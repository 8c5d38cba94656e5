// src/daemon.rs

//! Top-level lifecycle owner.
//!
//! The daemon exclusively owns the scheduler, the file watcher and the
//! debounced router (created at `start()`, destroyed at `stop()`), and shares
//! the circuit breaker and budget enforcer by reference with every call site
//! that performs a protected external call (their lifetime is the process,
//! not any single request).
//!
//! Start order: scheduler, then file watcher, then router wiring. Stop order
//! is the exact reverse — the router stops accepting events first (pending
//! debounce timers are cancelled, not flushed), then the watcher, then the
//! scheduler — so the watcher can never deliver into a router that has
//! already torn down. Both operations are idempotent.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, ResourceLimits};
use crate::errors::{NoteflowError, Result};
use crate::guard::{BudgetEnforcer, CircuitBreaker};
use crate::health::{HealthAggregator, HealthReport, WatcherProbe};
use crate::sched::{JobSpec, Schedule, Scheduler};
use crate::watch::{
    build_watch_profile, spawn_watcher, DebouncedEventRouter, RouterConfig, WatcherHandle,
};
use crate::workflow::SharedInvoker;

/// Sentinel file checked at startup; its presence in the vault root forces
/// the budget into shutdown before anything runs (manual incident response).
pub const HALT_SENTINEL: &str = ".noteflow-halt";

/// Size of the watcher → router event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where the daemon is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Snapshot of the daemon, recomputed on demand from live component state.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub scheduler_active: bool,
    pub watcher_active: bool,
    pub active_job_count: usize,
    pub uptime_secs: u64,
}

/// Long-running automation orchestrator.
pub struct Daemon {
    config: ConfigFile,
    invoker: SharedInvoker,
    budget: Arc<BudgetEnforcer>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthAggregator>,

    state: DaemonState,
    started_at: Option<Instant>,
    scheduler: Option<Scheduler>,
    router: Option<DebouncedEventRouter>,
    router_loop: Option<tokio::task::JoinHandle<()>>,
    watcher: Option<WatcherHandle>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    pub fn new(config: ConfigFile, invoker: SharedInvoker) -> Self {
        let budget = Arc::new(BudgetEnforcer::new(config.budget.clone()));
        let breaker = Arc::new(CircuitBreaker::new(
            config.resource.clone(),
            ResourceLimits::default(),
        ));

        Self {
            config,
            invoker,
            budget,
            breaker,
            health: Arc::new(HealthAggregator::new()),
            state: DaemonState::Stopped,
            started_at: None,
            scheduler: None,
            router: None,
            router_loop: None,
            watcher: None,
        }
    }

    /// Start all components.
    ///
    /// A configuration error in one component (bad watch path, unparseable
    /// job schedule) is fatal to that component only: the others still come
    /// up, and the first such error is returned to the caller afterwards.
    /// Calling `start` on a running daemon is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state == DaemonState::Running || self.state == DaemonState::Starting {
            debug!("daemon already started; ignoring");
            return Ok(());
        }
        self.state = DaemonState::Starting;
        info!("daemon starting");

        // Fresh aggregator per start so probes from a previous run don't
        // linger. The guards live for the whole process and re-register.
        let health = Arc::new(HealthAggregator::new());
        health.register(self.budget.clone());
        health.register(self.breaker.clone());

        self.check_halt_sentinel();

        let mut first_error: Option<NoteflowError> = None;

        // 1) Scheduler.
        let scheduler = Scheduler::new(self.invoker.clone());
        for (id, job) in self.config.job.iter() {
            let registered = Schedule::parse(&job.schedule).and_then(|schedule| {
                scheduler.register(JobSpec {
                    id: id.clone(),
                    schedule,
                    enabled: job.enabled,
                })
            });
            if let Err(err) = registered {
                warn!(job = %id, error = %err, "job registration failed");
                first_error.get_or_insert(err);
            }
        }
        scheduler.start();
        health.register(Arc::new(scheduler.clone()));
        self.scheduler = Some(scheduler);

        // 2) File watcher + 3) router wiring.
        if self.config.watch.enabled {
            match self.start_watch_pipeline(&health) {
                Ok(()) => {}
                Err(err) => {
                    warn!(error = %err, "file watching failed to start; continuing without it");
                    first_error.get_or_insert(err);
                }
            }
        } else {
            info!("file watching disabled by config");
        }

        self.health = health;
        self.state = DaemonState::Running;
        self.started_at = Some(Instant::now());
        info!("daemon running");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn start_watch_pipeline(&mut self, health: &Arc<HealthAggregator>) -> Result<()> {
        let watch = &self.config.watch;

        let profile = build_watch_profile(&watch.patterns, &watch.ignore)
            .map_err(|err| NoteflowError::ConfigError(err.to_string()))?;

        let root = Path::new(&watch.path);
        if !root.is_dir() {
            return Err(NoteflowError::ConfigError(format!(
                "watch path '{}' is not a directory",
                watch.path
            )));
        }

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let router = DebouncedEventRouter::new(
            RouterConfig {
                debounce: Duration::from_secs_f64(watch.debounce_seconds),
                extensions: watch.extensions.clone(),
            },
            self.invoker.clone(),
        );

        let watcher = spawn_watcher(root, profile, event_tx)
            .map_err(|err| NoteflowError::WatchError(err.to_string()))?;

        // Router subscribes to the watcher's event stream last, completing
        // the pipeline.
        let loop_router = router.clone();
        let router_loop = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                loop_router.handle(event);
            }
            debug!("router event loop finished");
        });

        health.register(Arc::new(router.clone()));
        health.register(Arc::new(WatcherProbe::new(watcher.degraded_flag())));

        self.router = Some(router);
        self.router_loop = Some(router_loop);
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop all components in reverse start order. Idempotent: a second call
    /// is a no-op and leaves the same end state.
    pub fn stop(&mut self) {
        if self.state == DaemonState::Stopped {
            debug!("daemon already stopped; ignoring");
            return;
        }
        self.state = DaemonState::Stopping;
        info!("daemon stopping");

        // Router first: stop accepting events, cancel (don't flush) pending
        // debounce timers.
        if let Some(router) = self.router.take() {
            router.stop();
        }
        if let Some(task) = self.router_loop.take() {
            task.abort();
        }

        // Then the watcher, so nothing new is produced.
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        // Scheduler last.
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }

        self.started_at = None;
        self.state = DaemonState::Stopped;
        info!("daemon stopped");
    }

    /// Live lifecycle snapshot.
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            state: self.state,
            scheduler_active: self
                .scheduler
                .as_ref()
                .map(Scheduler::is_active)
                .unwrap_or(false),
            watcher_active: self
                .watcher
                .as_ref()
                .map(|w| !w.is_degraded())
                .unwrap_or(false),
            active_job_count: self
                .scheduler
                .as_ref()
                .map(Scheduler::active_job_count)
                .unwrap_or(0),
            uptime_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs())
                .unwrap_or(0),
        }
    }

    /// Aggregate health across all live components. Always succeeds.
    ///
    /// Also re-checks the halt sentinel, so a sentinel dropped into the vault
    /// while the daemon is running takes effect on the next poll.
    pub fn health(&self) -> HealthReport {
        if self.state == DaemonState::Running {
            self.check_halt_sentinel();
        }
        self.health.report()
    }

    /// Shared budget gate for protected external calls.
    pub fn budget(&self) -> Arc<BudgetEnforcer> {
        Arc::clone(&self.budget)
    }

    /// Shared circuit breaker for protected external calls.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Scheduler access for runtime job management, when running.
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Router access (metrics, health) when the watch pipeline is up.
    pub fn router(&self) -> Option<&DebouncedEventRouter> {
        self.router.as_ref()
    }

    /// Per-resource circuit snapshots, for external status surfaces.
    pub fn circuit_snapshots(&self) -> BTreeMap<String, crate::guard::CircuitSnapshot> {
        self.breaker.snapshot()
    }

    fn check_halt_sentinel(&self) {
        if self.budget.shutdown_active() {
            return;
        }
        let sentinel = Path::new(&self.config.watch.path).join(HALT_SENTINEL);
        if sentinel.exists() {
            warn!(
                path = ?sentinel,
                "halt sentinel present; forcing budget shutdown"
            );
            self.budget.force_shutdown();
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop();
    }
}
