// src/guard/circuit.rs

//! Per-resource circuit breaker with sliding-window rate limits.
//!
//! Each protected resource name gets its own state machine:
//!
//! - `Closed` (initial): calls allowed. Attempts are timestamped; breaching
//!   the trailing-hour or trailing-day limit opens the circuit and rejects
//!   the breaching call.
//! - `Open`: calls rejected until `open_until` passes; the next attempt
//!   after that flips to `HalfOpen` and is allowed through as a trial.
//! - `HalfOpen`: exactly one trial in flight. Trial success closes the
//!   circuit and resets the windows; trial failure re-opens it with a fresh
//!   deadline.
//!
//! Windows are true trailing windows: an attempt at `t` counts toward the
//! hourly window until `t + 3600s`, not until the next calendar hour.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResourceLimits;

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

/// Current position in the breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of [`CircuitBreaker::allow_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allowed => None,
            Decision::Rejected { reason } => Some(reason),
        }
    }
}

/// Point-in-time view of one resource's circuit, for health/status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub attempts_last_hour: usize,
    pub attempts_last_day: usize,
    pub open_remaining_secs: Option<u64>,
    /// Advisory minimum pause between calls, from the resource's config.
    /// The breaker does not enforce it; workflow implementations read it
    /// from here.
    pub cooldown_seconds: u64,
}

/// State for a single protected resource.
///
/// Unrelated resources never share one of these, so they never contend on
/// each other's lock.
#[derive(Debug)]
struct ResourceCircuit {
    limits: ResourceLimits,
    state: CircuitState,
    /// Timestamps of recorded attempts within the trailing day. Older
    /// entries are pruned on every touch.
    attempts: VecDeque<Instant>,
    open_until: Option<Instant>,
    /// In `HalfOpen`, whether the single trial has been handed out and not
    /// yet reported back.
    trial_in_flight: bool,
}

impl ResourceCircuit {
    fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            state: CircuitState::Closed,
            attempts: VecDeque::new(),
            open_until: None,
            trial_in_flight: false,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.attempts.front() {
            if now.duration_since(*front) > DAY {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn attempts_last_hour(&self, now: Instant) -> usize {
        self.attempts
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) <= HOUR)
            .count()
    }

    fn allow(&mut self, name: &str, now: Instant) -> Decision {
        self.prune(now);

        match self.state {
            CircuitState::Open => {
                let open_until = match self.open_until {
                    Some(t) => t,
                    None => {
                        // Forced open without a deadline (operator override);
                        // stays open until reset.
                        return Decision::Rejected {
                            reason: "circuit forced open".to_string(),
                        };
                    }
                };
                if now >= open_until {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    self.open_until = None;
                    info!(resource = %name, "circuit half-open; allowing trial call");
                    Decision::Allowed
                } else {
                    let remaining = open_until.duration_since(now);
                    Decision::Rejected {
                        reason: format!(
                            "circuit open, retry after {}s",
                            remaining.as_secs().max(1)
                        ),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    Decision::Rejected {
                        reason: "circuit half-open, trial in progress".to_string(),
                    }
                } else {
                    self.trial_in_flight = true;
                    Decision::Allowed
                }
            }
            CircuitState::Closed => {
                let hour_count = self.attempts_last_hour(now);
                if hour_count >= self.limits.max_requests_per_hour as usize {
                    self.trip(name, now);
                    return Decision::Rejected {
                        reason: format!(
                            "Hourly limit ({}) exceeded",
                            self.limits.max_requests_per_hour
                        ),
                    };
                }
                if self.attempts.len() >= self.limits.max_requests_per_day as usize {
                    self.trip(name, now);
                    return Decision::Rejected {
                        reason: format!(
                            "Daily limit ({}) exceeded",
                            self.limits.max_requests_per_day
                        ),
                    };
                }
                Decision::Allowed
            }
        }
    }

    fn trip(&mut self, name: &str, now: Instant) {
        let open_for = Duration::from_secs(self.limits.circuit_open_seconds);
        self.state = CircuitState::Open;
        self.open_until = Some(now + open_for);
        self.trial_in_flight = false;
        warn!(
            resource = %name,
            open_secs = self.limits.circuit_open_seconds,
            "circuit opened"
        );
    }

    fn record(&mut self, name: &str, success: bool, now: Instant) {
        self.prune(now);
        self.attempts.push_back(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                if success {
                    self.state = CircuitState::Closed;
                    self.attempts.clear();
                    self.open_until = None;
                    info!(resource = %name, "trial succeeded; circuit closed, counters reset");
                } else {
                    self.trip(name, now);
                }
            }
            CircuitState::Closed | CircuitState::Open => {
                debug!(resource = %name, success, "recorded request outcome");
            }
        }
    }

    fn snapshot(&mut self, now: Instant) -> CircuitSnapshot {
        self.prune(now);
        CircuitSnapshot {
            state: self.state,
            attempts_last_hour: self.attempts_last_hour(now),
            attempts_last_day: self.attempts.len(),
            open_remaining_secs: self.open_until.and_then(|t| {
                (t > now).then(|| t.duration_since(now).as_secs())
            }),
            cooldown_seconds: self.limits.cooldown_seconds,
        }
    }
}

/// Registry of per-resource circuits.
///
/// The outer map lock is held only long enough to look up (or create) a
/// resource's entry; all state transitions happen under the per-resource
/// lock, so unrelated resources do not contend.
pub struct CircuitBreaker {
    configured: BTreeMap<String, ResourceLimits>,
    default_limits: ResourceLimits,
    circuits: Mutex<HashMap<String, Arc<Mutex<ResourceCircuit>>>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("configured", &self.configured.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a breaker from per-resource limits. Unknown resource names get
    /// `default_limits`.
    pub fn new(
        configured: BTreeMap<String, ResourceLimits>,
        default_limits: ResourceLimits,
    ) -> Self {
        Self {
            configured,
            default_limits,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn circuit_for(&self, resource: &str) -> Arc<Mutex<ResourceCircuit>> {
        let mut map = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(resource.to_string())
            .or_insert_with(|| {
                let limits = self
                    .configured
                    .get(resource)
                    .cloned()
                    .unwrap_or_else(|| self.default_limits.clone());
                Arc::new(Mutex::new(ResourceCircuit::new(limits)))
            })
            .clone()
    }

    /// Must be called before every attempt against `resource`.
    pub fn allow_request(&self, resource: &str) -> Decision {
        self.allow_request_at(resource, Instant::now())
    }

    /// Deterministic variant of [`allow_request`](Self::allow_request) taking
    /// an explicit clock reading.
    pub fn allow_request_at(&self, resource: &str, now: Instant) -> Decision {
        let circuit = self.circuit_for(resource);
        let mut guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
        guard.allow(resource, now)
    }

    /// Must be called exactly once after every attempt against `resource`.
    pub fn record_request(&self, resource: &str, success: bool) {
        self.record_request_at(resource, success, Instant::now());
    }

    /// Deterministic variant of [`record_request`](Self::record_request).
    pub fn record_request_at(&self, resource: &str, success: bool, now: Instant) {
        let circuit = self.circuit_for(resource);
        let mut guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
        guard.record(resource, success, now);
    }

    /// Operator override: force the circuit open with no expiry. Only a
    /// [`reset`](Self::reset) brings it back.
    pub fn force_open(&self, resource: &str) {
        let circuit = self.circuit_for(resource);
        let mut guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
        guard.state = CircuitState::Open;
        guard.open_until = None;
        guard.trial_in_flight = false;
        warn!(resource, "circuit forced open by operator override");
    }

    /// Operator override: force the circuit closed and clear its windows,
    /// regardless of timers.
    pub fn reset(&self, resource: &str) {
        let circuit = self.circuit_for(resource);
        let mut guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
        guard.state = CircuitState::Closed;
        guard.attempts.clear();
        guard.open_until = None;
        guard.trial_in_flight = false;
        info!(resource, "circuit reset to closed by operator override");
    }

    /// Current state of a resource's circuit. Resources never seen before
    /// report `Closed`.
    pub fn state_of(&self, resource: &str) -> CircuitState {
        let circuit = self.circuit_for(resource);
        let guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
        guard.state
    }

    /// Snapshot every known resource for the health surface.
    pub fn snapshot(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> BTreeMap<String, CircuitSnapshot> {
        let entries: Vec<(String, Arc<Mutex<ResourceCircuit>>)> = {
            let map = self.circuits.lock().unwrap_or_else(|p| p.into_inner());
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        entries
            .into_iter()
            .map(|(name, circuit)| {
                let mut guard = circuit.lock().unwrap_or_else(|p| p.into_inner());
                (name, guard.snapshot(now))
            })
            .collect()
    }
}
