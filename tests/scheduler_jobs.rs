mod common;
use crate::common::{init_tracing, FakeInvoker};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use noteflow::errors::NoteflowError;
use noteflow::sched::{JobSpec, Schedule, Scheduler};
use noteflow::workflow::{WorkflowInvoker, WorkflowOutcome, WorkflowRequest};

fn job(id: &str, expr: &str, enabled: bool) -> JobSpec {
    JobSpec {
        id: id.to_string(),
        schedule: Schedule::parse(expr).expect("valid schedule"),
        enabled,
    }
}

#[tokio::test]
async fn test_interval_job_fires_with_job_request() {
    init_tracing();

    let invoker = Arc::new(FakeInvoker::new());
    let scheduler = Scheduler::new(invoker.clone());
    scheduler.register(job("daily-digest", "every 1s", true)).unwrap();

    scheduler.start();
    invoker.wait_for_invocations(1).await;
    scheduler.stop();

    let invocations = invoker.invocations();
    assert!(matches!(
        &invocations[0],
        WorkflowRequest::Job { id } if id == "daily-digest"
    ));
}

#[tokio::test]
async fn test_failing_job_stays_registered_and_fires_again() {
    init_tracing();

    let invoker = Arc::new(FakeInvoker::new());
    invoker.fail_when(|req| matches!(req, WorkflowRequest::Job { .. }));

    let scheduler = Scheduler::new(invoker.clone());
    scheduler.register(job("flaky", "every 1s", true)).unwrap();

    scheduler.start();
    invoker.wait_for_invocations(2).await;
    scheduler.stop();

    assert_eq!(scheduler.active_job_count(), 1);
    let metrics = scheduler.metrics();
    assert!(metrics.fired >= 2);
    assert!(metrics.failed >= 2);
    assert_eq!(metrics.succeeded, 0);
}

#[tokio::test]
async fn test_disabled_job_never_fires() {
    init_tracing();

    let invoker = Arc::new(FakeInvoker::new());
    let scheduler = Scheduler::new(invoker.clone());
    scheduler.register(job("paused", "every 1s", false)).unwrap();

    assert_eq!(scheduler.active_job_count(), 0);

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop();

    assert_eq!(invoker.invocation_count(), 0);
}

/// Invoker whose jobs take longer than the schedule interval, to provoke
/// overlapping firings.
struct SlowInvoker {
    delay: Duration,
}

impl WorkflowInvoker for SlowInvoker {
    fn invoke(
        &self,
        _request: WorkflowRequest,
    ) -> Pin<Box<dyn Future<Output = WorkflowOutcome> + Send + '_>> {
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            WorkflowOutcome::ok()
        })
    }
}

#[tokio::test]
async fn test_overlapping_firing_is_skipped_not_run_concurrently() {
    init_tracing();

    let scheduler = Scheduler::new(Arc::new(SlowInvoker {
        delay: Duration::from_secs(10),
    }));
    scheduler.register(job("slow", "every 1s", true)).unwrap();

    scheduler.start();
    // The first firing is still running for the whole test, so every later
    // deadline must be skipped, not fired.
    tokio::time::sleep(Duration::from_millis(4500)).await;
    scheduler.stop();

    let metrics = scheduler.metrics();
    assert_eq!(metrics.fired, 1);
    assert!(metrics.overlap_skips >= 1, "metrics: {metrics:?}");
}

#[tokio::test]
async fn test_duplicate_job_id_rejected() {
    init_tracing();

    let scheduler = Scheduler::new(Arc::new(FakeInvoker::new()));
    scheduler.register(job("digest", "every 1h", true)).unwrap();

    let err = scheduler.register(job("digest", "every 5m", true)).unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(_)), "got: {err:?}");
}

#[tokio::test]
async fn test_unregister_unknown_job_fails() {
    init_tracing();

    let scheduler = Scheduler::new(Arc::new(FakeInvoker::new()));
    let err = scheduler.unregister("missing").unwrap_err();
    assert!(matches!(err, NoteflowError::JobNotFound(id) if id == "missing"));
}

#[tokio::test]
async fn test_unregister_removes_job() {
    init_tracing();

    let invoker = Arc::new(FakeInvoker::new());
    let scheduler = Scheduler::new(invoker.clone());
    scheduler.register(job("digest", "every 1s", true)).unwrap();
    assert_eq!(scheduler.active_job_count(), 1);

    scheduler.unregister("digest").unwrap();
    assert_eq!(scheduler.active_job_count(), 0);

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop();

    assert_eq!(invoker.invocation_count(), 0);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    init_tracing();

    let scheduler = Scheduler::new(Arc::new(FakeInvoker::new()));

    scheduler.start();
    scheduler.start();
    assert!(scheduler.is_active());

    scheduler.stop();
    assert!(!scheduler.is_active());
    scheduler.stop();
    assert!(!scheduler.is_active());
}
