// src/guard/budget.rs

//! Global trailing-24h spend ceiling shared across all protected resources.
//!
//! The enforcer keeps an ordered ledger of `{timestamp, resource, cost}`
//! entries. Entries older than the window stop counting toward the spend sum
//! (they are pruned lazily on every touch). The rejection is advisory for the
//! *next* call: the cost that crosses the shutdown threshold still returns
//! `true` (it has already been incurred), and the first call made with the
//! window spend already at or past the threshold returns `false` and sets a
//! sticky flag that rejects everything until manually cleared.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BudgetSection;

const WINDOW: Duration = Duration::from_secs(86_400);

#[derive(Debug)]
struct LedgerEntry {
    at: Instant,
    #[allow(dead_code)]
    resource: String,
    cost: f64,
}

#[derive(Debug)]
struct Ledger {
    entries: VecDeque<LedgerEntry>,
    spent_in_window: f64,
    shutdown_active: bool,
    /// Tracks whether the alert threshold crossing has already been logged,
    /// so a burst of calls above the threshold produces one alert, not one
    /// per call. Cleared when spend drops back below the threshold.
    alert_raised: bool,
}

impl Ledger {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.at) > WINDOW {
                let expired = self.entries.pop_front();
                if let Some(entry) = expired {
                    self.spent_in_window -= entry.cost;
                }
            } else {
                break;
            }
        }
        if self.spent_in_window < 0.0 {
            // Floating-point drift from repeated add/subtract; clamp.
            self.spent_in_window = 0.0;
        }
    }
}

/// Point-in-time budget status for the health/status surface.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub daily_budget: f64,
    pub current_spend: f64,
    pub remaining: f64,
    pub usage_pct: f64,
    pub shutdown_active: bool,
}

/// The global cumulative-cost gate.
///
/// Shared by reference across every call site that invokes a protected
/// resource; one instance per process (tests construct isolated instances).
pub struct BudgetEnforcer {
    config: BudgetSection,
    ledger: Mutex<Ledger>,
}

impl std::fmt::Debug for BudgetEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetEnforcer")
            .field("daily_limit", &self.config.daily_limit)
            .finish_non_exhaustive()
    }
}

impl BudgetEnforcer {
    pub fn new(config: BudgetSection) -> Self {
        Self {
            config,
            ledger: Mutex::new(Ledger {
                entries: VecDeque::new(),
                spent_in_window: 0.0,
                shutdown_active: false,
                alert_raised: false,
            }),
        }
    }

    fn alert_threshold(&self) -> f64 {
        self.config.daily_limit * self.config.alert_at_percent / 100.0
    }

    fn shutdown_threshold(&self) -> f64 {
        self.config.daily_limit * self.config.shutdown_at_percent / 100.0
    }

    /// Record the cost of a call that has already happened.
    ///
    /// Returns `false` once the trailing-24h spend *going into this call* has
    /// reached the shutdown threshold — callers should treat that as "stop
    /// making further calls". The cost that crosses the threshold is itself
    /// still accepted; its money is already spent.
    pub fn record_cost(&self, resource: &str, cost: f64) -> bool {
        self.record_cost_at(resource, cost, Instant::now())
    }

    /// Deterministic variant of [`record_cost`](Self::record_cost) taking an
    /// explicit clock reading.
    pub fn record_cost_at(&self, resource: &str, cost: f64, now: Instant) -> bool {
        let mut ledger = self.ledger.lock().unwrap_or_else(|p| p.into_inner());

        if ledger.shutdown_active {
            // Fail fast: nothing is appended while shut down.
            debug!(resource, cost, "budget shutdown active; rejecting");
            return false;
        }

        ledger.entries.push_back(LedgerEntry {
            at: now,
            resource: resource.to_string(),
            cost,
        });
        ledger.spent_in_window += cost;
        ledger.prune(now);

        let spend = ledger.spent_in_window;
        // Spend excluding the cost just appended: the shutdown decision is
        // advisory for the next call, so the crossing cost itself passes.
        let spend_before = spend - cost;

        if spend_before >= self.shutdown_threshold() {
            ledger.shutdown_active = true;
            warn!(
                spend,
                threshold = self.shutdown_threshold(),
                daily_limit = self.config.daily_limit,
                "budget shutdown threshold reached; rejecting further calls"
            );
            return false;
        }

        if spend >= self.alert_threshold() {
            if !ledger.alert_raised {
                ledger.alert_raised = true;
                warn!(
                    spend,
                    threshold = self.alert_threshold(),
                    daily_limit = self.config.daily_limit,
                    "budget alert threshold crossed"
                );
            }
        } else {
            ledger.alert_raised = false;
        }

        true
    }

    /// Operator override: set the sticky shutdown flag immediately.
    pub fn force_shutdown(&self) {
        let mut ledger = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        ledger.shutdown_active = true;
        warn!("budget shutdown forced by operator override");
    }

    /// Operator override: clear the sticky shutdown flag. The ledger itself
    /// is untouched, so if the window spend is still above the threshold the
    /// very next `record_cost` re-activates the shutdown.
    pub fn clear_shutdown(&self) {
        let mut ledger = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        ledger.shutdown_active = false;
        warn!("budget shutdown flag cleared by operator override");
    }

    pub fn shutdown_active(&self) -> bool {
        let ledger = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        ledger.shutdown_active
    }

    pub fn status(&self) -> BudgetStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> BudgetStatus {
        let mut ledger = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        ledger.prune(now);

        let spend = ledger.spent_in_window;
        let limit = self.config.daily_limit;
        BudgetStatus {
            daily_budget: limit,
            current_spend: spend,
            remaining: (limit - spend).max(0.0),
            usage_pct: if limit > 0.0 { spend / limit * 100.0 } else { 0.0 },
            shutdown_active: ledger.shutdown_active,
        }
    }
}
