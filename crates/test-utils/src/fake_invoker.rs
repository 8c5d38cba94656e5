use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use noteflow::workflow::{WorkflowInvoker, WorkflowOutcome, WorkflowRequest};

/// A fake workflow invoker that:
/// - records every request it receives (with ordering preserved)
/// - returns scripted outcomes (success by default, failure for requests
///   matching a registered predicate)
/// - lets tests await "at least N invocations" with a bounded wait.
pub struct FakeInvoker {
    invocations: Arc<Mutex<Vec<WorkflowRequest>>>,
    fail_when: Arc<Mutex<Option<Box<dyn Fn(&WorkflowRequest) -> bool + Send + Sync>>>>,
}

impl Default for FakeInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self {
            invocations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// All requests seen so far, in invocation order.
    pub fn invocations(&self) -> Vec<WorkflowRequest> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Make invocations matching `pred` return a failed outcome.
    pub fn fail_when<P>(&self, pred: P)
    where
        P: Fn(&WorkflowRequest) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock().unwrap() = Some(Box::new(pred));
    }

    /// Wait until at least `n` invocations have been recorded.
    ///
    /// Panics after 5 seconds so a broken dispatch path fails the test
    /// instead of hanging it.
    pub async fn wait_for_invocations(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.invocation_count() >= n {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {n} invocations, saw {}",
                    self.invocation_count()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl WorkflowInvoker for FakeInvoker {
    fn invoke(
        &self,
        request: WorkflowRequest,
    ) -> Pin<Box<dyn Future<Output = WorkflowOutcome> + Send + '_>> {
        let invocations = Arc::clone(&self.invocations);
        let fail_when = Arc::clone(&self.fail_when);

        Box::pin(async move {
            let should_fail = {
                let guard = fail_when.lock().unwrap();
                guard.as_ref().map(|pred| pred(&request)).unwrap_or(false)
            };

            {
                let mut guard = invocations.lock().unwrap();
                guard.push(request);
            }

            if should_fail {
                WorkflowOutcome::failed("scripted failure")
            } else {
                WorkflowOutcome::ok()
            }
        })
    }
}
