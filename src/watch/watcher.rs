// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::patterns::{relative_str, WatchProfile};
use crate::watch::{FileEvent, FileEventKind};

/// Handle for the filesystem watcher.
///
/// Owns the underlying `RecommendedWatcher` so OS resources stay alive for
/// as long as needed, plus the bridge task forwarding notify events into the
/// async world. [`WatcherHandle::stop`] (or dropping the handle) releases
/// both; `stop()` is idempotent.
pub struct WatcherHandle {
    inner: Option<RecommendedWatcher>,
    forward_task: Option<tokio::task::JoinHandle<()>>,
    degraded: Arc<AtomicBool>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    /// Whether the watcher has observed a condition it cannot recover from
    /// (root deleted/unmounted, backend error). Degraded watchers keep the
    /// process alive and are surfaced via health; no automatic remount is
    /// attempted.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Shared flag for the health aggregator.
    pub fn degraded_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.degraded)
    }

    /// Stop watching and release OS resources. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.inner.take() {
            drop(watcher);
            info!("file watcher stopped");
        }
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a filesystem watcher that observes `root` recursively and forwards
/// matching [`FileEvent`]s into `event_tx`.
///
/// - `root` is the vault root against which all glob patterns are evaluated.
/// - `profile` is the compiled include/ignore pattern set; ignore patterns
///   win over include patterns.
/// - `event_tx` is the bounded channel into the router. Forwarding awaits
///   channel capacity on the bridge task, never in the notify callback, so
///   the OS delivery context is never blocked by router processing.
///
/// Callbacks fire at-least-once per underlying OS notification; duplicates
/// are passed through unfiltered.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    profile: WatchProfile,
    event_tx: mpsc::Sender<FileEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or_else(|_| root.clone());

    let degraded = Arc::new(AtomicBool::new(false));

    // Channel from the blocking notify callback into the async world.
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

    // Closure called synchronously by notify whenever an event arrives.
    let callback_degraded = Arc::clone(&degraded);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if raw_tx.send(event).is_err() {
                    // Bridge task gone; nothing to forward to. We can't log
                    // via tracing here easily, so fall back to stderr.
                    eprintln!("noteflow: failed to forward notify event (bridge closed)");
                }
            }
            Err(err) => {
                callback_degraded.store(true, Ordering::Relaxed);
                eprintln!("noteflow: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!("file watcher started on {:?}", root);

    // Bridge task: consume raw notify events, filter, and forward FileEvents.
    let bridge_root = root.clone();
    let bridge_degraded = Arc::clone(&degraded);
    let forward_task = tokio::spawn(async move {
        while let Some(event) = raw_rx.recv().await {
            debug!(?event, "received notify event");

            let kind = match translate_kind(&event.kind) {
                Some(k) => k,
                None => continue,
            };

            for path in event.paths {
                // The root itself disappearing is unrecoverable; flag it and
                // keep the loop alive so health can report the degradation.
                if kind == FileEventKind::Deleted && path == bridge_root {
                    warn!(root = ?bridge_root, "watch root removed; watcher degraded");
                    bridge_degraded.store(true, Ordering::Relaxed);
                    continue;
                }

                let rel = match relative_str(&bridge_root, &path) {
                    Some(s) => s,
                    None => {
                        warn!(?path, root = ?bridge_root, "could not relativize event path");
                        continue;
                    }
                };

                // Ignore patterns are evaluated before include patterns
                // inside `matches`.
                if !profile.matches(&rel) {
                    continue;
                }

                let file_event = FileEvent::new(path, kind);
                if event_tx.send(file_event).await.is_err() {
                    // Router channel closed; no point keeping the bridge alive.
                    debug!("event channel closed; watcher bridge exiting");
                    return;
                }
            }
        }
        debug!("watcher bridge loop finished");
    });

    Ok(WatcherHandle {
        inner: Some(watcher),
        forward_task: Some(forward_task),
        degraded,
    })
}

/// Map a notify event kind onto our three-way event model.
///
/// Access events carry no content change and are dropped here; everything
/// else is passed through for the router to coalesce.
fn translate_kind(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        EventKind::Remove(_) => Some(FileEventKind::Deleted),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(FileEventKind::Modified),
    }
}
