mod common;
use crate::common::{builders::ConfigFileBuilder, init_tracing, FakeInvoker};

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use noteflow::daemon::{Daemon, DaemonState, HALT_SENTINEL};
use noteflow::workflow::WorkflowRequest;

#[tokio::test]
async fn test_full_pipeline_file_change_reaches_invoker() {
    init_tracing();

    let vault = tempdir().unwrap();
    let config = ConfigFileBuilder::new()
        .watch_path(vault.path().to_str().unwrap())
        .debounce_seconds(0.1)
        .build();

    let invoker = Arc::new(FakeInvoker::new());
    let mut daemon = Daemon::new(config, invoker.clone());
    daemon.start().unwrap();

    let status = daemon.status();
    assert_eq!(status.state, DaemonState::Running);
    assert!(status.scheduler_active);
    assert!(status.watcher_active);

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(vault.path().join("note.md"), "# hello").unwrap();

    invoker.wait_for_invocations(1).await;
    match &invoker.invocations()[0] {
        WorkflowRequest::FileChanged { path, .. } => {
            assert!(path.to_string_lossy().ends_with("note.md"));
        }
        other => panic!("unexpected request: {other:?}"),
    }

    let report = daemon.health();
    assert!(report.overall_healthy, "report: {report:?}");
    for name in ["budget", "circuits", "router", "scheduler", "watcher"] {
        assert_eq!(report.checks.get(name), Some(&true), "missing check {name}");
    }

    daemon.stop();
    assert_eq!(daemon.status().state, DaemonState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    init_tracing();

    let vault = tempdir().unwrap();
    let config = ConfigFileBuilder::new()
        .watch_path(vault.path().to_str().unwrap())
        .build();

    let mut daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));
    daemon.start().unwrap();

    daemon.stop();
    let after_first = daemon.status();
    daemon.stop();
    let after_second = daemon.status();

    assert_eq!(after_first.state, DaemonState::Stopped);
    assert_eq!(after_second.state, DaemonState::Stopped);
    assert!(!after_second.scheduler_active);
    assert!(!after_second.watcher_active);
}

#[tokio::test]
async fn test_start_twice_is_a_noop() {
    init_tracing();

    let vault = tempdir().unwrap();
    let config = ConfigFileBuilder::new()
        .watch_path(vault.path().to_str().unwrap())
        .build();

    let mut daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));
    daemon.start().unwrap();
    daemon.start().unwrap();
    assert_eq!(daemon.status().state, DaemonState::Running);
    daemon.stop();
}

#[tokio::test]
async fn test_bad_watch_path_degrades_but_scheduler_runs() {
    init_tracing();

    let config = ConfigFileBuilder::new()
        .watch_path("/nonexistent/noteflow-vault")
        .with_job("heartbeat", "every 1h")
        .build();

    let mut daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));
    let err = daemon.start().unwrap_err();
    assert!(err.to_string().contains("not a directory"), "got: {err}");

    // The failure is contained: everything else came up.
    let status = daemon.status();
    assert_eq!(status.state, DaemonState::Running);
    assert!(status.scheduler_active);
    assert!(!status.watcher_active);
    assert_eq!(status.active_job_count, 1);

    daemon.stop();
}

#[tokio::test]
async fn test_watching_disabled_runs_without_router() {
    init_tracing();

    let config = ConfigFileBuilder::new()
        .watch_enabled(false)
        .with_job("digest", "every 1h")
        .build();

    let invoker = Arc::new(FakeInvoker::new());
    let mut daemon = Daemon::new(config, invoker);
    daemon.start().unwrap();

    let status = daemon.status();
    assert_eq!(status.state, DaemonState::Running);
    assert!(status.scheduler_active);
    assert!(!status.watcher_active);
    assert!(daemon.router().is_none());

    let report = daemon.health();
    assert!(report.overall_healthy);
    assert!(!report.checks.contains_key("router"));
    assert!(!report.checks.contains_key("watcher"));

    daemon.stop();
}

#[tokio::test]
async fn test_configured_job_fires_through_daemon() {
    init_tracing();

    let config = ConfigFileBuilder::new()
        .watch_enabled(false)
        .with_job("tick", "every 1s")
        .build();

    let invoker = Arc::new(FakeInvoker::new());
    let mut daemon = Daemon::new(config, invoker.clone());
    daemon.start().unwrap();

    invoker.wait_for_invocations(1).await;
    assert!(matches!(
        &invoker.invocations()[0],
        WorkflowRequest::Job { id } if id == "tick"
    ));

    daemon.stop();
}

#[tokio::test]
async fn test_halt_sentinel_forces_budget_shutdown() {
    init_tracing();

    let vault = tempdir().unwrap();
    std::fs::write(vault.path().join(HALT_SENTINEL), "").unwrap();

    let config = ConfigFileBuilder::new()
        .watch_path(vault.path().to_str().unwrap())
        .build();

    let mut daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));
    daemon.start().unwrap();

    assert!(daemon.budget().shutdown_active());
    assert!(!daemon.budget().record_cost("llm", 0.01));

    let report = daemon.health();
    assert_eq!(report.checks.get("budget"), Some(&false));
    assert!(!report.overall_healthy);

    daemon.stop();
}

#[tokio::test]
async fn test_guards_are_shared_across_restart() {
    init_tracing();

    let config = ConfigFileBuilder::new().watch_enabled(false).build();
    let mut daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));

    daemon.start().unwrap();
    daemon.budget().record_cost("llm", 3.0);
    daemon.breaker().record_request("llm", true);
    daemon.stop();

    // Guards outlive the start/stop cycle; their state carries over.
    daemon.start().unwrap();
    let status = daemon.budget().status();
    assert!((status.current_spend - 3.0).abs() < 1e-9);
    let snapshots = daemon.circuit_snapshots();
    assert_eq!(snapshots["llm"].attempts_last_day, 1);
    daemon.stop();
}

#[tokio::test]
async fn test_status_before_start() {
    init_tracing();

    let config = ConfigFileBuilder::new().watch_enabled(false).build();
    let daemon = Daemon::new(config, Arc::new(FakeInvoker::new()));

    let status = daemon.status();
    assert_eq!(status.state, DaemonState::Stopped);
    assert!(!status.scheduler_active);
    assert!(!status.watcher_active);
    assert_eq!(status.active_job_count, 0);
    assert_eq!(status.uptime_secs, 0);
}
