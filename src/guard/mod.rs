// src/guard/mod.rs

//! Protection for cost- and rate-limited external calls.
//!
//! Every protected external call funnels through two gates before execution:
//!
//! - [`circuit::CircuitBreaker`] — per-resource sliding-window rate limits
//!   with a CLOSED / OPEN / HALF_OPEN state machine.
//! - [`budget::BudgetEnforcer`] — one global trailing-24h spend ceiling
//!   shared across all resources.
//!
//! Both are shared by reference across call sites and internally
//! synchronized; their public methods use wall-clock time, while the
//! `*_at` variants take an explicit `Instant` so tests stay deterministic
//! without sleeping.

pub mod budget;
pub mod circuit;

pub use budget::{BudgetEnforcer, BudgetStatus};
pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState, Decision};
