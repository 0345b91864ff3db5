//! Inline executor — runs every runnable on the submitting thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::error::RejectedExecution;
use crate::executor::{Executor, ExecutorService, Runnable};

/// Executor that runs each runnable immediately, before `try_submit` returns.
///
/// Useful for tests and for callers that want serialized semantics without a
/// worker pool. Rejects everything once shut down.
#[derive(Debug, Default)]
pub struct ImmediateExecutor {
    stopped: AtomicBool,
}

impl ImmediateExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for ImmediateExecutor {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(RejectedExecution::shutdown(runnable));
        }
        runnable();
        Ok(())
    }

    fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }
}

impl ExecutorService for ImmediateExecutor {
    fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Immediate executor shut down");
        }
    }

    fn kill(&self) {
        self.shutdown();
    }

    // Nothing is ever in flight, so shutdown completes immediately.
    fn is_shutting_down(&self) -> bool {
        false
    }

    fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn wait_for_termination(&self, _timeout: Option<Duration>) -> bool {
        self.is_shutdown()
    }

    fn is_serialized(&self) -> bool {
        true
    }
}
