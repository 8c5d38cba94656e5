mod common;
use crate::common::{init_tracing, FakeInvoker};

use std::sync::Arc;
use std::time::Duration;

use noteflow::watch::{
    DebouncedEventRouter, FileEvent, FileEventKind, RouterConfig,
};
use noteflow::workflow::WorkflowRequest;

fn make_router(debounce_ms: u64) -> (DebouncedEventRouter, Arc<FakeInvoker>) {
    let invoker = Arc::new(FakeInvoker::new());
    let router = DebouncedEventRouter::new(
        RouterConfig {
            debounce: Duration::from_millis(debounce_ms),
            extensions: vec!["md".to_string()],
        },
        invoker.clone(),
    );
    (router, invoker)
}

#[tokio::test]
async fn test_burst_coalesces_to_single_invocation_with_last_kind() {
    init_tracing();

    let (router, invoker) = make_router(100);

    // Three events for the same path inside one debounce window. Only the
    // last one should survive.
    router.handle(FileEvent::new("a.md", FileEventKind::Modified));
    tokio::time::sleep(Duration::from_millis(20)).await;
    router.handle(FileEvent::new("a.md", FileEventKind::Modified));
    tokio::time::sleep(Duration::from_millis(30)).await;
    router.handle(FileEvent::new("a.md", FileEventKind::Created));

    invoker.wait_for_invocations(1).await;
    // Give any (buggy) extra timers a chance to fire before we count.
    tokio::time::sleep(Duration::from_millis(250)).await;

    let invocations = invoker.invocations();
    assert_eq!(invocations.len(), 1);
    match &invocations[0] {
        WorkflowRequest::FileChanged { path, kind } => {
            assert_eq!(path.to_str(), Some("a.md"));
            assert_eq!(*kind, FileEventKind::Created);
        }
        other => panic!("unexpected request: {other:?}"),
    }

    let metrics = router.metrics();
    assert_eq!(metrics.total, 1);
    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn test_deleted_events_are_dropped_without_timer() {
    init_tracing();

    let (router, invoker) = make_router(50);

    router.handle(FileEvent::new("gone.md", FileEventKind::Deleted));

    // No timer must have been created at all.
    assert_eq!(router.health_status().queue_depth, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(invoker.invocation_count(), 0);
}

#[tokio::test]
async fn test_non_matching_extension_dropped_without_timer() {
    init_tracing();

    let (router, invoker) = make_router(50);

    router.handle(FileEvent::new("notes.txt", FileEventKind::Created));
    router.handle(FileEvent::new("no_extension", FileEventKind::Modified));

    assert_eq!(router.health_status().queue_depth, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(invoker.invocation_count(), 0);
}

#[tokio::test]
async fn test_distinct_paths_dispatch_independently() {
    init_tracing();

    let (router, invoker) = make_router(50);

    router.handle(FileEvent::new("a.md", FileEventKind::Modified));
    router.handle(FileEvent::new("b.md", FileEventKind::Modified));

    invoker.wait_for_invocations(2).await;

    let paths: Vec<_> = invoker
        .invocations()
        .iter()
        .map(|req| match req {
            WorkflowRequest::FileChanged { path, .. } => path.clone(),
            other => panic!("unexpected request: {other:?}"),
        })
        .collect();
    assert!(paths.iter().any(|p| p.to_str() == Some("a.md")));
    assert!(paths.iter().any(|p| p.to_str() == Some("b.md")));
}

#[tokio::test]
async fn test_invoker_failure_is_recorded_not_propagated() {
    init_tracing();

    let (router, invoker) = make_router(30);
    invoker.fail_when(|req| match req {
        WorkflowRequest::FileChanged { path, .. } => {
            path.to_str().is_some_and(|p| p.contains("bad"))
        }
        _ => false,
    });

    router.handle(FileEvent::new("bad.md", FileEventKind::Modified));
    invoker.wait_for_invocations(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let metrics = router.metrics();
    assert_eq!(metrics.total, 1);
    assert_eq!(metrics.failed, 1);

    // The router must still be alive and able to process further events.
    assert!(router.health_status().is_healthy);
    router.handle(FileEvent::new("good.md", FileEventKind::Modified));
    invoker.wait_for_invocations(2).await;

    let metrics = router.metrics();
    assert_eq!(metrics.total, 2);
    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.failed, 1);
}

#[tokio::test]
async fn test_stop_cancels_pending_timers_and_is_idempotent() {
    init_tracing();

    let (router, invoker) = make_router(200);

    router.handle(FileEvent::new("pending.md", FileEventKind::Modified));
    assert_eq!(router.health_status().queue_depth, 1);

    router.stop();
    // Second stop must be a no-op, not an error.
    router.stop();

    assert!(!router.health_status().is_healthy);
    assert_eq!(router.health_status().queue_depth, 0);

    // The cancelled timer must never dispatch.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(invoker.invocation_count(), 0);

    // Events after stop are dropped.
    router.handle(FileEvent::new("late.md", FileEventKind::Modified));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(invoker.invocation_count(), 0);
}

#[tokio::test]
async fn test_event_after_window_triggers_again() {
    init_tracing();

    let (router, invoker) = make_router(40);

    router.handle(FileEvent::new("a.md", FileEventKind::Modified));
    invoker.wait_for_invocations(1).await;

    // Well past the first window: a new event arms a fresh timer.
    router.handle(FileEvent::new("a.md", FileEventKind::Modified));
    invoker.wait_for_invocations(2).await;

    assert_eq!(invoker.invocation_count(), 2);
    assert_eq!(router.metrics().total, 2);
}
