//! # Serialized Execution
//!
//! **Run tasks one at a time, in submission order, on top of any concurrent executor.**
//!
//! Executors such as the tokio blocking pool run submitted work in parallel and
//! in no particular order. [`SerializedExecution`] adds the missing guarantee:
//! every job submitted through one engine runs to completion before the next
//! one starts, and jobs start in exactly the order the engine accepted them.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use turul_serial_executor::prelude::*;
//!
//! # fn example() -> Result<(), SerialExecutionError> {
//! let executor = SerializedExecutor::new(Arc::new(ImmediateExecutor::new()));
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! for n in 0..3 {
//!     let log = log.clone();
//!     executor.submit(n, Some(move |n: u32| {
//!         log.lock().unwrap().push(n);
//!         Ok(())
//!     }))?;
//! }
//!
//! assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`Executor` / `ExecutorService` traits**: where work runs, and its lifecycle
//! - **`SerializedExecution`**: the engine; one instance is one serialization domain
//! - **`SerializedExecutor`**: wraps an `ExecutorService`, forwarding lifecycle calls
//!   and funnelling submissions through a private engine
//! - **`ImmediateExecutor`, `TokioExecutor`**: bundled executors
//!
//! Task failures (an `Err` return or a panic) and executor rejections never
//! break the chain: failures are logged with `tracing` and counted, rejected
//! jobs run inline on the submitting thread.

pub mod engine;
pub mod error;
pub mod executor;
pub mod immediate;
pub mod job;
pub mod prelude;
pub mod serialized_executor;
#[cfg(feature = "tokio")]
pub mod tokio_executor;

// Re-exports for convenience
pub use engine::{SerialStats, SerializedExecution, SubmitOutcome};
pub use error::{RejectReason, RejectedExecution, SerialExecutionError, TaskError, TaskResult};
pub use executor::{Executor, ExecutorService, Runnable};
pub use immediate::ImmediateExecutor;
pub use job::Job;
pub use serialized_executor::SerializedExecutor;
#[cfg(feature = "tokio")]
pub use tokio_executor::{TokioExecutor, TokioExecutorConfig};
