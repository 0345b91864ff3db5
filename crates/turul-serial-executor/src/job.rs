//! Work items queued by the serialization engine.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::{SerialExecutionError, TaskError, TaskResult};
use crate::executor::Executor;

type TaskBody = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// One unit of serialized work: the executor it should run on, plus its
/// task body with the arguments already bound.
///
/// Immutable once built. Owned by the engine's pending queue until dispatched.
pub struct Job {
    executor: Arc<dyn Executor>,
    body: TaskBody,
}

impl Job {
    /// Build a job that calls `task(args)` on `executor`.
    ///
    /// Fails with [`SerialExecutionError::InvalidArgument`] when no task is given.
    pub fn new<A, F>(
        executor: Arc<dyn Executor>,
        args: A,
        task: Option<F>,
    ) -> Result<Self, SerialExecutionError>
    where
        A: Send + 'static,
        F: FnOnce(A) -> TaskResult + Send + 'static,
    {
        let task = task.ok_or_else(SerialExecutionError::no_task_given)?;
        Ok(Self::from_fn(executor, move || task(args)))
    }

    /// Build a job from a closure that needs no separate arguments.
    pub fn from_fn<F>(executor: Arc<dyn Executor>, task: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self {
            executor,
            body: Box::new(task),
        }
    }

    /// The executor this job will be handed to.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Run the body, turning both `Err` returns and panics into a [`TaskFailure`].
    pub(crate) fn run(self) -> Result<(), TaskFailure> {
        match catch_unwind(AssertUnwindSafe(self.body)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TaskFailure::Error(err)),
            Err(payload) => Err(TaskFailure::Panic(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

/// How a task body ended when it did not succeed.
#[derive(Debug)]
pub(crate) enum TaskFailure {
    Error(TaskError),
    Panic(String),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(err) => write!(f, "{}", err),
            TaskFailure::Panic(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immediate::ImmediateExecutor;

    fn executor() -> Arc<dyn Executor> {
        Arc::new(ImmediateExecutor::new())
    }

    #[test]
    fn test_missing_task_is_invalid_argument() {
        let result = Job::new(executor(), 1u32, None::<fn(u32) -> TaskResult>);
        assert!(matches!(
            result,
            Err(SerialExecutionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_args_are_passed_to_body() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let job = Job::new(
            executor(),
            (2u32, "two"),
            Some(move |(n, label): (u32, &'static str)| {
                *sink.lock() = Some(format!("{}={}", label, n));
                Ok(())
            }),
        )
        .unwrap();

        assert!(job.run().is_ok());
        assert_eq!(seen.lock().as_deref(), Some("two=2"));
    }

    #[test]
    fn test_error_return_is_failure() {
        let job = Job::from_fn(executor(), || Err("boom".into()));
        match job.run() {
            Err(TaskFailure::Error(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("Expected TaskFailure::Error, got: {:?}", other),
        }
    }

    #[test]
    fn test_panic_is_failure() {
        let job = Job::from_fn(executor(), || panic!("kaboom"));
        match job.run() {
            Err(failure @ TaskFailure::Panic(_)) => {
                assert_eq!(failure.to_string(), "panicked: kaboom");
            }
            other => panic!("Expected TaskFailure::Panic, got: {:?}", other),
        }
    }
}
