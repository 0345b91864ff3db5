//! Error types for serialized execution.

use std::fmt;

use crate::executor::Runnable;

/// Errors surfaced synchronously to callers submitting work.
///
/// Everything that happens after a job is accepted (executor rejection,
/// task-body failure) is recovered inside the engine and never shows up here.
#[derive(Debug, thiserror::Error)]
pub enum SerialExecutionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SerialExecutionError {
    pub(crate) fn no_task_given() -> Self {
        SerialExecutionError::InvalidArgument("no task given".to_string())
    }
}

/// Why an executor refused a runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("executor is shut down or shutting down")]
    Shutdown,

    #[error("executor capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },
}

/// Returned by [`Executor::try_submit`](crate::Executor::try_submit) when the
/// executor cannot accept more work.
///
/// Carries the refused runnable so the caller can run it some other way.
pub struct RejectedExecution {
    reason: RejectReason,
    runnable: Runnable,
}

impl RejectedExecution {
    pub fn new(reason: RejectReason, runnable: Runnable) -> Self {
        Self { reason, runnable }
    }

    pub fn shutdown(runnable: Runnable) -> Self {
        Self::new(RejectReason::Shutdown, runnable)
    }

    pub fn capacity_exceeded(limit: usize, runnable: Runnable) -> Self {
        Self::new(RejectReason::CapacityExceeded { limit }, runnable)
    }

    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// Take back the runnable the executor refused.
    pub fn into_runnable(self) -> Runnable {
        self.runnable
    }
}

impl fmt::Debug for RejectedExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedExecution")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RejectedExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rejected execution: {}", self.reason)
    }
}

impl std::error::Error for RejectedExecution {}

/// Error type a task body may return.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a task body returns. `Err` counts as a task failure.
pub type TaskResult = Result<(), TaskError>;
