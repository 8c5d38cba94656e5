// src/workflow.rs

//! Pluggable workflow invocation abstraction.
//!
//! The router and the scheduler talk to a `WorkflowInvoker` instead of
//! calling note-processing code directly. The actual business logic (note
//! parsing, tag generation, markdown rewriting) lives outside this crate;
//! tests can provide a fake invoker that records requests and returns
//! scripted outcomes.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::watch::FileEventKind;

/// What a workflow invocation is being asked to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowRequest {
    /// A debounced file change for one vault path.
    FileChanged { path: PathBuf, kind: FileEventKind },
    /// A scheduled job firing.
    Job { id: String },
}

/// Result of a workflow invocation.
///
/// The orchestration core does not interpret `data`; it only records
/// `success` and timing.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub error: Option<String>,
}

impl WorkflowOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Map::new(),
            error: Some(error.into()),
        }
    }
}

/// Trait abstracting the note-processing callback.
///
/// Invocations may come from any task: a debounce timer, a scheduler firing.
/// Implementations must therefore be `Send + Sync` and internally
/// synchronized.
pub trait WorkflowInvoker: Send + Sync + 'static {
    fn invoke(
        &self,
        request: WorkflowRequest,
    ) -> Pin<Box<dyn Future<Output = WorkflowOutcome> + Send + '_>>;
}

/// Shared handle to an invoker, cloneable across components.
pub type SharedInvoker = Arc<dyn WorkflowInvoker>;

/// Default invoker used by the standalone binary: logs the request and
/// reports success. Embedding applications supply their own implementation
/// that carries the actual note-processing logic.
#[derive(Debug, Default)]
pub struct LoggingInvoker;

impl WorkflowInvoker for LoggingInvoker {
    fn invoke(
        &self,
        request: WorkflowRequest,
    ) -> Pin<Box<dyn Future<Output = WorkflowOutcome> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(?request, "workflow invoked (logging invoker)");
            WorkflowOutcome::ok()
        })
    }
}

impl<F, Fut> WorkflowInvoker for F
where
    F: Fn(WorkflowRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkflowOutcome> + Send + 'static,
{
    fn invoke(
        &self,
        request: WorkflowRequest,
    ) -> Pin<Box<dyn Future<Output = WorkflowOutcome> + Send + '_>> {
        Box::pin(self(request))
    }
}
