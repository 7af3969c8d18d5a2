//! Handler dispatch with a deadline.
//!
//! Each call runs in its own task, so a panicking handler is contained
//! and a timed-out handler is aborted without affecting sibling packets.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tripwire_core::Action;
use tripwire_tool::{ServiceFault, ServiceHandler};

/// Result of dispatching one call
#[derive(Debug)]
pub enum DispatchResult {
    /// Handler returned a value
    Completed(Value),
    /// Handler returned a fault
    Faulted(ServiceFault),
    /// Handler panicked
    Panicked {
        /// Panic payload, if it was a string
        message: String,
    },
    /// Handler task was cancelled before finishing
    Cancelled,
    /// Deadline passed; the task was aborted
    TimedOut {
        /// Deadline that was exceeded
        deadline: Duration,
    },
}

/// Dispatches calls to service handlers
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    default_timeout: Duration,
    max_timeout: Duration,
}

impl Executor {
    /// Create an executor
    #[must_use]
    pub const fn new(default_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            default_timeout,
            max_timeout,
        }
    }

    /// Effective deadline: the requested or default timeout, capped at the ceiling
    #[must_use]
    pub fn deadline(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default_timeout).min(self.max_timeout)
    }

    /// Run one handler call under `deadline`
    ///
    /// Returns the result and the time spent waiting on it.
    pub async fn dispatch(
        &self,
        handler: Arc<dyn ServiceHandler>,
        action: Action,
        payload: Map<String, Value>,
        item_type: Option<String>,
        deadline: Duration,
    ) -> (DispatchResult, Duration) {
        let started = Instant::now();
        let task = tokio::spawn(async move {
            handler
                .execute(action, &payload, item_type.as_deref())
                .await
        });
        let abort = task.abort_handle();

        let result = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(value))) => DispatchResult::Completed(value),
            Ok(Ok(Err(fault))) => DispatchResult::Faulted(fault),
            Ok(Err(join_error)) => from_join_error(join_error),
            Err(_) => {
                abort.abort();
                DispatchResult::TimedOut { deadline }
            }
        };
        (result, started.elapsed())
    }
}

fn from_join_error(error: JoinError) -> DispatchResult {
    if !error.is_panic() {
        return DispatchResult::Cancelled;
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    DispatchResult::Panicked { message }
}
