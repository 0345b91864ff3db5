//! Executor — abstraction for where submitted work actually runs.
//!
//! Separates *ordering* (owned by [`SerializedExecution`](crate::SerializedExecution))
//! from *execution* (owned by whatever implements [`Executor`]).
//! Bundled: [`ImmediateExecutor`](crate::ImmediateExecutor) (inline) and
//! `TokioExecutor` (tokio blocking pool, behind the `tokio` feature).

use std::time::Duration;

use crate::error::RejectedExecution;

/// Zero-argument unit of work handed to an executor.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Minimal capability the serialization engine needs from an executor.
pub trait Executor: Send + Sync {
    /// Accept a runnable for (possibly asynchronous) execution.
    ///
    /// Must return [`RejectedExecution`] instead of panicking when no more
    /// work can be accepted. The rejected runnable travels back inside the error.
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution>;

    /// Whether the executor is currently accepting work.
    fn is_running(&self) -> bool;
}

/// Full lifecycle surface of an executor.
///
/// [`SerializedExecutor`](crate::SerializedExecutor) forwards every method here
/// to the executor it wraps.
pub trait ExecutorService: Executor {
    /// Stop accepting new work. Work already accepted still runs.
    fn shutdown(&self);

    /// Stop accepting new work and move straight to the shut down state.
    fn kill(&self);

    fn is_shutting_down(&self) -> bool;

    fn is_shutdown(&self) -> bool;

    /// Block until the executor is shut down, or until `timeout` elapses.
    ///
    /// Returns `true` if the executor reached the shut down state.
    fn wait_for_termination(&self, timeout: Option<Duration>) -> bool;

    /// Whether `try_submit` may reject work because of capacity limits.
    fn can_overflow(&self) -> bool {
        false
    }

    /// Whether accepted work is guaranteed to run one at a time, in order.
    fn is_serialized(&self) -> bool {
        false
    }
}
