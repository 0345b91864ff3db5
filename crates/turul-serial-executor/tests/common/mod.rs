//! Test executors shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use turul_serial_executor::prelude::*;

/// Accepts every runnable but only runs it when the test says so.
#[derive(Default)]
pub struct RecordingExecutor {
    queue: Mutex<VecDeque<Runnable>>,
    received: AtomicUsize,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runnables accepted so far, run or not.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Runnables waiting to be run.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn run_next(&self) -> bool {
        let next = self.queue.lock().pop_front();
        match next {
            Some(runnable) => {
                runnable();
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for RecordingExecutor {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        self.received.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().push_back(runnable);
        Ok(())
    }

    fn is_running(&self) -> bool {
        true
    }
}

/// Rejects every runnable, as a saturated or shut down pool would.
#[derive(Default)]
pub struct RejectingExecutor {
    attempts: AtomicUsize,
}

impl RejectingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Executor for RejectingExecutor {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RejectedExecution::capacity_exceeded(0, runnable))
    }

    fn is_running(&self) -> bool {
        true
    }
}

/// Panics inside `try_submit` without running or returning the runnable.
#[derive(Default)]
pub struct PanickingExecutor {
    attempts: AtomicUsize,
}

impl PanickingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Executor for PanickingExecutor {
    fn try_submit(&self, runnable: Runnable) -> Result<(), RejectedExecution> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        drop(runnable);
        panic!("executor refused to take the runnable");
    }

    fn is_running(&self) -> bool {
        true
    }
}

/// Shared log of labels in execution order.
pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn new_log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Task body appending its argument to `log`.
pub fn append_to<T: Send + 'static>(log: &Log<T>) -> impl FnOnce(T) -> TaskResult + Send + 'static {
    let log = log.clone();
    move |value| {
        log.lock().push(value);
        Ok(())
    }
}

pub fn runtime(workers: usize) -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .max_blocking_threads(workers * 4)
        .enable_all()
        .build()
        .expect("tokio runtime")
}
