//! Drop-in executor wrapper that serializes everything submitted through it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::engine::SerializedExecution;
use crate::error::{RejectedExecution, SerialExecutionError, TaskResult};
use crate::executor::{Executor, ExecutorService, Runnable};
use crate::job::Job;

/// Wraps any [`ExecutorService`] so that tasks submitted through the wrapper
/// run one at a time, in submission order.
///
/// Only submission changes. Lifecycle calls (`shutdown`, `is_running`, ...)
/// go straight to the wrapped executor, which may still be used directly by
/// other callers without serialization.
pub struct SerializedExecutor<E: ExecutorService + 'static> {
    executor: Arc<E>,
    serializer: SerializedExecution,
}

impl<E: ExecutorService + 'static> SerializedExecutor<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            serializer: SerializedExecution::new(),
        }
    }

    /// Submit `task(args)` for serialized execution.
    ///
    /// Returns `Ok(false)` without queuing anything when the wrapped executor
    /// is not running.
    pub fn submit<A, F>(&self, args: A, task: Option<F>) -> Result<bool, SerialExecutionError>
    where
        A: Send + 'static,
        F: FnOnce(A) -> TaskResult + Send + 'static,
    {
        let task = task.ok_or_else(SerialExecutionError::no_task_given)?;
        if !self.executor.is_running() {
            trace!(
                domain = %self.serializer.name(),
                "Wrapped executor not running, submission refused"
            );
            return Ok(false);
        }
        self.serializer.submit(self.target(), args, Some(task))
    }

    /// The wrapped executor.
    pub fn inner(&self) -> &Arc<E> {
        &self.executor
    }

    /// The serialization domain backing this wrapper.
    pub fn serializer(&self) -> &SerializedExecution {
        &self.serializer
    }

    fn target(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }
}

impl<E: ExecutorService + 'static> Executor for SerializedExecutor<E> {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        if !self.executor.is_running() {
            return Err(RejectedExecution::shutdown(runnable));
        }
        let job = Job::from_fn(self.target(), move || {
            runnable();
            Ok(())
        });
        self.serializer.submit_batch(vec![job]);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.executor.is_running()
    }
}

impl<E: ExecutorService + 'static> ExecutorService for SerializedExecutor<E> {
    fn shutdown(&self) {
        self.executor.shutdown()
    }

    fn kill(&self) {
        self.executor.kill()
    }

    fn is_shutting_down(&self) -> bool {
        self.executor.is_shutting_down()
    }

    fn is_shutdown(&self) -> bool {
        self.executor.is_shutdown()
    }

    fn wait_for_termination(&self, timeout: Option<Duration>) -> bool {
        self.executor.wait_for_termination(timeout)
    }

    fn can_overflow(&self) -> bool {
        self.executor.can_overflow()
    }

    fn is_serialized(&self) -> bool {
        true
    }
}

impl<E: ExecutorService + 'static> fmt::Debug for SerializedExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedExecutor")
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}
