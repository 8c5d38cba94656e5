// src/watch/mod.rs

//! File watching and debounced event routing.
//!
//! This module is responsible for:
//! - Compiling include / ignore glob patterns for the vault.
//! - Wiring up a cross-platform filesystem watcher (`notify`) that turns raw
//!   OS notifications into [`FileEvent`]s on a bounded channel.
//! - Coalescing bursts of events per path into a single workflow invocation
//!   after a quiet period ([`debounce::DebouncedEventRouter`]).
//!
//! It does **not** know about note processing; it only turns filesystem
//! changes into debounced workflow requests.

pub mod debounce;
pub mod patterns;
pub mod watcher;

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

pub use debounce::{DebouncedEventRouter, RouterConfig, RouterHealth, RouterMetrics};
pub use patterns::{build_watch_profile, has_matching_extension, WatchProfile};
pub use watcher::{spawn_watcher, WatcherHandle};

/// Kind of a raw filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

/// One raw filesystem change, as delivered by the watcher.
///
/// Ephemeral: consumed immediately by the router, never persisted. Duplicate
/// OS notifications are passed through unfiltered — coalescing them is the
/// router's job.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub observed_at: Instant,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Instant::now(),
        }
    }
}
