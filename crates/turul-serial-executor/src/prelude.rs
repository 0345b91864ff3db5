//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use turul_serial_executor::prelude::*;
//! ```

pub use crate::engine::{SerialStats, SerializedExecution, SubmitOutcome};
pub use crate::error::{
    RejectReason, RejectedExecution, SerialExecutionError, TaskError, TaskResult,
};
pub use crate::executor::{Executor, ExecutorService, Runnable};
pub use crate::immediate::ImmediateExecutor;
pub use crate::job::Job;
pub use crate::serialized_executor::SerializedExecutor;
#[cfg(feature = "tokio")]
pub use crate::tokio_executor::{TokioExecutor, TokioExecutorConfig};
