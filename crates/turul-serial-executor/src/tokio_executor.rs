//! Tokio-based executor — runs each runnable on the tokio blocking pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::RejectedExecution;
use crate::executor::{Executor, ExecutorService, Runnable};

/// Configuration for [`TokioExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokioExecutorConfig {
    /// Maximum runnables in flight at once (0 = unlimited). Submissions over
    /// the limit are rejected rather than queued.
    pub max_in_flight: usize,
    /// Name used in log fields
    pub name: String,
}

impl Default for TokioExecutorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 0,
            name: "tokio-executor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    ShuttingDown,
    Shutdown,
}

struct Lifecycle {
    phase: Phase,
    in_flight: usize,
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    terminated: Condvar,
}

impl Shared {
    fn mark_shutdown(&self, lifecycle: &mut Lifecycle) {
        lifecycle.phase = Phase::Shutdown;
        self.terminated.notify_all();
    }
}

/// Decrements the in-flight count when the spawned closure finishes or is
/// dropped without running.
struct InFlight {
    shared: Arc<Shared>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        lifecycle.in_flight -= 1;
        if lifecycle.in_flight == 0 && lifecycle.phase == Phase::ShuttingDown {
            self.shared.mark_shutdown(&mut lifecycle);
        }
    }
}

struct HandoffState {
    runnable: Option<Runnable>,
    /// `spawn_blocking` has returned to `try_submit`
    submitted: bool,
    /// The closure was dropped unrun before `spawn_blocking` returned
    abandoned: bool,
}

/// Moved into the blocking closure. Tokio drops the closure without calling
/// it once its runtime is shutting down; the drop then either reports the
/// runnable back to `try_submit` or, if `try_submit` already returned, runs
/// it on the dropping thread so accepted work is never lost.
struct Handoff {
    state: Arc<Mutex<HandoffState>>,
    _in_flight: InFlight,
}

impl Handoff {
    fn run(self) {
        let runnable = self.state.lock().runnable.take();
        if let Some(runnable) = runnable {
            runnable();
        }
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        let orphan = {
            let mut state = self.state.lock();
            if state.runnable.is_some() && !state.submitted {
                state.abandoned = true;
                None
            } else {
                state.runnable.take()
            }
        };
        if let Some(runnable) = orphan {
            debug!("Blocking pool dropped an accepted runnable, running it on the dropping thread");
            runnable();
        }
    }
}

/// Executor handing runnables to `tokio::task::spawn_blocking`.
///
/// Runnables may run in parallel and in any order; wrap it in a
/// [`SerializedExecutor`](crate::SerializedExecutor) for one-at-a-time semantics.
pub struct TokioExecutor {
    handle: Handle,
    shared: Arc<Shared>,
    config: TokioExecutorConfig,
}

impl TokioExecutor {
    /// Create an executor on the given runtime with default configuration.
    pub fn new(handle: Handle) -> Self {
        Self::with_config(handle, TokioExecutorConfig::default())
    }

    /// Create an executor on the given runtime with custom configuration.
    pub fn with_config(handle: Handle, config: TokioExecutorConfig) -> Self {
        Self {
            handle,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Running,
                    in_flight: 0,
                }),
                terminated: Condvar::new(),
            }),
            config,
        }
    }

    /// Create an executor on the runtime of the current context, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    pub fn config(&self) -> &TokioExecutorConfig {
        &self.config
    }

    /// Number of runnables accepted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.lifecycle.lock().in_flight
    }

    fn phase(&self) -> Phase {
        self.shared.lifecycle.lock().phase
    }

    /// The runtime behind the handle no longer runs blocking work.
    fn runtime_gone(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.phase != Phase::Shutdown {
            self.shared.mark_shutdown(&mut lifecycle);
            debug!(
                executor = %self.config.name,
                "Tokio runtime is shut down, executor no longer accepts work"
            );
        }
    }
}

impl Executor for TokioExecutor {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.phase != Phase::Running {
                return Err(RejectedExecution::shutdown(runnable));
            }
            let limit = self.config.max_in_flight;
            if limit > 0 && lifecycle.in_flight >= limit {
                return Err(RejectedExecution::capacity_exceeded(limit, runnable));
            }
            lifecycle.in_flight += 1;
        }

        let state = Arc::new(Mutex::new(HandoffState {
            runnable: Some(runnable),
            submitted: false,
            abandoned: false,
        }));
        let handoff = Handoff {
            state: Arc::clone(&state),
            _in_flight: InFlight {
                shared: Arc::clone(&self.shared),
            },
        };
        self.handle.spawn_blocking(move || handoff.run());

        let abandoned = {
            let mut state = state.lock();
            state.submitted = true;
            if state.abandoned {
                state.runnable.take()
            } else {
                None
            }
        };
        match abandoned {
            Some(runnable) => {
                self.runtime_gone();
                Err(RejectedExecution::shutdown(runnable))
            }
            None => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }
}

impl ExecutorService for TokioExecutor {
    fn shutdown(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.phase != Phase::Running {
            return;
        }
        if lifecycle.in_flight == 0 {
            self.shared.mark_shutdown(&mut lifecycle);
        } else {
            lifecycle.phase = Phase::ShuttingDown;
        }
        debug!(
            executor = %self.config.name,
            in_flight = lifecycle.in_flight,
            "Executor shutdown requested"
        );
    }

    fn kill(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.phase != Phase::Shutdown {
            self.shared.mark_shutdown(&mut lifecycle);
            debug!(
                executor = %self.config.name,
                in_flight = lifecycle.in_flight,
                "Executor killed"
            );
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.phase() == Phase::ShuttingDown
    }

    fn is_shutdown(&self) -> bool {
        self.phase() == Phase::Shutdown
    }

    /// Blocks the calling thread; do not call from inside an async task.
    fn wait_for_termination(&self, timeout: Option<Duration>) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        while lifecycle.phase != Phase::Shutdown {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .terminated
                        .wait_until(&mut lifecycle, deadline)
                        .timed_out()
                    {
                        return lifecycle.phase == Phase::Shutdown;
                    }
                }
                None => self.shared.terminated.wait(&mut lifecycle),
            }
        }
        true
    }

    fn can_overflow(&self) -> bool {
        self.config.max_in_flight > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use std::sync::mpsc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_runs_on_blocking_pool() {
        let rt = runtime();
        let executor = TokioExecutor::new(rt.handle().clone());
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        executor
            .try_submit(Box::new(move || {
                tx.send(std::thread::current().id()).unwrap();
            }))
            .unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_rejects_over_capacity() {
        let rt = runtime();
        let executor = TokioExecutor::with_config(
            rt.handle().clone(),
            TokioExecutorConfig {
                max_in_flight: 1,
                ..Default::default()
            },
        );
        assert!(executor.can_overflow());

        let (release_tx, release_rx) = mpsc::channel::<()>();
        executor
            .try_submit(Box::new(move || {
                let _ = release_rx.recv();
            }))
            .unwrap();
        assert_eq!(executor.in_flight(), 1);

        let err = executor.try_submit(Box::new(|| {})).unwrap_err();
        assert_eq!(err.reason(), RejectReason::CapacityExceeded { limit: 1 });

        release_tx.send(()).unwrap();
        executor.shutdown();
        assert!(executor.wait_for_termination(Some(Duration::from_secs(5))));
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_shutdown_waits_for_in_flight_work() {
        let rt = runtime();
        let executor = TokioExecutor::new(rt.handle().clone());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        executor
            .try_submit(Box::new(move || {
                let _ = release_rx.recv();
            }))
            .unwrap();

        executor.shutdown();
        assert!(!executor.is_running());
        assert!(executor.is_shutting_down());
        assert!(!executor.wait_for_termination(Some(Duration::from_millis(20))));

        let err = executor.try_submit(Box::new(|| {})).unwrap_err();
        assert_eq!(err.reason(), RejectReason::Shutdown);

        release_tx.send(()).unwrap();
        assert!(executor.wait_for_termination(Some(Duration::from_secs(5))));
        assert!(executor.is_shutdown());
    }

    #[test]
    fn test_kill_is_immediate() {
        let rt = runtime();
        let executor = TokioExecutor::new(rt.handle().clone());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        executor
            .try_submit(Box::new(move || {
                let _ = release_rx.recv();
            }))
            .unwrap();

        executor.kill();
        assert!(executor.is_shutdown());
        assert!(executor.wait_for_termination(None));
        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TokioExecutorConfig =
            serde_json::from_str(r#"{"max_in_flight": 8}"#).unwrap();
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.name, "tokio-executor");
    }

    #[test]
    fn test_rejects_after_runtime_dropped() {
        let rt = runtime();
        let executor = TokioExecutor::new(rt.handle().clone());
        drop(rt);

        let (tx, rx) = mpsc::channel();
        let err = executor
            .try_submit(Box::new(move || {
                tx.send(()).unwrap();
            }))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::Shutdown);
        assert!(executor.is_shutdown());
        assert!(!executor.is_running());
        assert_eq!(executor.in_flight(), 0);

        // The refused runnable comes back intact
        (err.into_runnable())();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(TokioExecutor::try_current().is_none());
    }

    #[tokio::test]
    async fn test_try_current_inside_runtime() {
        let executor = TokioExecutor::try_current().expect("inside a runtime");
        assert!(executor.is_running());
        assert_eq!(executor.config().name, "tokio-executor");
    }
}
