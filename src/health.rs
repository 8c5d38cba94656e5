// src/health.rs

//! Unified liveness/metrics reporting across subsystems.
//!
//! The aggregator holds cheap shared handles to each component and recomputes
//! a [`HealthReport`] on every query — no caching, so each call reflects live
//! state. Components that were never registered simply don't appear in the
//! per-component map; an empty aggregator reports healthy. Health queries
//! never fail: a degraded component yields a truthful `false`, not an error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;

use crate::guard::{BudgetEnforcer, CircuitBreaker, CircuitState};
use crate::sched::Scheduler;
use crate::watch::DebouncedEventRouter;

/// Point-in-time aggregate across all registered probes.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall_healthy: bool,
    pub checks: BTreeMap<String, bool>,
    pub detail: BTreeMap<String, serde_json::Value>,
}

/// A single component's view into the health surface.
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    fn healthy(&self) -> bool;
    fn detail(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Polls registered probes and aggregates them into one report.
#[derive(Default)]
pub struct HealthAggregator {
    probes: Mutex<Vec<Arc<dyn HealthProbe>>>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.probes.lock().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("HealthAggregator")
            .field("probes", &count)
            .finish()
    }
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, probe: Arc<dyn HealthProbe>) {
        let mut probes = self.probes.lock().unwrap_or_else(|p| p.into_inner());
        probes.push(probe);
    }

    /// Recompute the full report from live component state.
    pub fn report(&self) -> HealthReport {
        let probes = {
            let guard = self.probes.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };

        let mut checks = BTreeMap::new();
        let mut detail = BTreeMap::new();
        let mut overall = true;

        for probe in probes {
            let healthy = probe.healthy();
            overall &= healthy;
            checks.insert(probe.name().to_string(), healthy);
            let d = probe.detail();
            if !d.is_null() {
                detail.insert(probe.name().to_string(), d);
            }
        }

        HealthReport {
            overall_healthy: overall,
            checks,
            detail,
        }
    }
}

// Probe implementations for the owned components. These live here rather
// than in the component modules so the components stay unaware of the health
// surface.

impl HealthProbe for DebouncedEventRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn healthy(&self) -> bool {
        self.health_status().is_healthy
    }

    fn detail(&self) -> serde_json::Value {
        let health = self.health_status();
        let metrics = self.metrics();
        json!({
            "queue_depth": health.queue_depth,
            "processing_count": health.processing_count,
            "metrics": metrics,
        })
    }
}

impl HealthProbe for Scheduler {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn healthy(&self) -> bool {
        self.is_active()
    }

    fn detail(&self) -> serde_json::Value {
        json!({
            "active_jobs": self.active_job_count(),
            "metrics": self.metrics(),
        })
    }
}

impl HealthProbe for BudgetEnforcer {
    fn name(&self) -> &str {
        "budget"
    }

    fn healthy(&self) -> bool {
        !self.shutdown_active()
    }

    fn detail(&self) -> serde_json::Value {
        json!(self.status())
    }
}

impl HealthProbe for CircuitBreaker {
    fn name(&self) -> &str {
        "circuits"
    }

    /// An open circuit means a protected resource is being refused; surface
    /// that as degraded.
    fn healthy(&self) -> bool {
        self.snapshot()
            .values()
            .all(|s| s.state != CircuitState::Open)
    }

    fn detail(&self) -> serde_json::Value {
        json!(self.snapshot())
    }
}

/// Probe over the watcher's shared degraded flag.
///
/// The watcher handle itself is owned mutably by the daemon, so health reads
/// go through this cheap clone of its flag instead.
pub struct WatcherProbe {
    degraded: Arc<AtomicBool>,
}

impl WatcherProbe {
    pub fn new(degraded: Arc<AtomicBool>) -> Self {
        Self { degraded }
    }
}

impl HealthProbe for WatcherProbe {
    fn name(&self) -> &str {
        "watcher"
    }

    fn healthy(&self) -> bool {
        !self.degraded.load(Ordering::Relaxed)
    }
}
