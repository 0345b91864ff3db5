//! Serialization engine — runs jobs one at a time, in submission order, on
//! top of executors that give no such guarantee.
//!
//! State is a `running` flag plus a FIFO of pending jobs behind one mutex.
//! Decisions are made under the lock; handing work to an executor and running
//! task bodies always happen outside it.
//!
//! ```text
//! submit ──lock──▶ running? ──yes──▶ append to pending
//!                      │
//!                      no ─▶ running = true, dispatch first job (unlocked)
//!
//! job done ──lock──▶ pop pending ──some──▶ dispatch it (unlocked)
//!                         │
//!                         none ─▶ running = false
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{SerialExecutionError, TaskResult};
use crate::executor::Executor;
use crate::job::Job;

/// A dispatch loop running on the current thread for one engine.
struct ActiveLoop {
    engine: Uuid,
    deferred: VecDeque<Job>,
}

thread_local! {
    /// Dispatch loops active on this thread, innermost last.
    static ACTIVE_LOOPS: RefCell<Vec<ActiveLoop>> = const { RefCell::new(Vec::new()) };
}

/// Result of a batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The batch was empty; nothing changed.
    Empty,
    /// Another job was already running; the batch was appended to the queue.
    Queued,
    /// The engine was idle; the first job of the batch was dispatched.
    Dispatched,
}

impl SubmitOutcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, SubmitOutcome::Empty)
    }
}

/// Snapshot of an engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialStats {
    /// Jobs accepted by `submit` / `submit_batch`
    pub submitted: u64,
    /// Hand-off attempts to an executor (accepted or rejected)
    pub dispatched: u64,
    /// Jobs whose body finished, successfully or not
    pub completed: u64,
    /// Jobs whose body returned `Err` or panicked
    pub failed: u64,
    /// Jobs run inline because their executor rejected them
    pub fallback_runs: u64,
}

#[derive(Default)]
struct EngineState {
    running: bool,
    pending: VecDeque<Job>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    fallback_runs: AtomicU64,
}

struct Inner {
    id: Uuid,
    name: String,
    state: Mutex<EngineState>,
    counters: Counters,
}

/// One serialization domain.
///
/// No two jobs submitted through the same `SerializedExecution` ever run at
/// the same time, and they run in the order the engine accepted them, even
/// when they target different executors. Clones share the same domain.
#[derive(Clone)]
pub struct SerializedExecution {
    inner: Arc<Inner>,
}

impl SerializedExecution {
    /// Create a new, idle serialization domain named after its id.
    pub fn new() -> Self {
        let id = Uuid::now_v7();
        Self::build(id, id.to_string())
    }

    /// Create a new, idle serialization domain with a name used in logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(Uuid::now_v7(), name.into())
    }

    fn build(id: Uuid, name: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                name,
                state: Mutex::new(EngineState::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Unique id of this domain (UUID v7).
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Name used in log fields.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submit `task(args)` to run on `executor` once every job accepted before
    /// it has finished.
    ///
    /// Returns `Ok(true)` as soon as the job is queued or dispatched; it does
    /// not wait for the task to run.
    pub fn submit<A, F>(
        &self,
        executor: Arc<dyn Executor>,
        args: A,
        task: Option<F>,
    ) -> Result<bool, SerialExecutionError>
    where
        A: Send + 'static,
        F: FnOnce(A) -> TaskResult + Send + 'static,
    {
        let job = Job::new(executor, args, task)?;
        Ok(self.submit_batch(vec![job]).is_accepted())
    }

    /// Submit several jobs at once.
    ///
    /// The batch lands in the queue as one contiguous run: no job from another
    /// submission can end up between its elements.
    pub fn submit_batch(&self, jobs: Vec<Job>) -> SubmitOutcome {
        if jobs.is_empty() {
            return SubmitOutcome::Empty;
        }

        let to_dispatch = {
            let mut state = self.inner.state.lock();
            self.inner
                .counters
                .submitted
                .fetch_add(jobs.len() as u64, Ordering::Relaxed);

            if state.running {
                state.pending.extend(jobs);
                None
            } else {
                state.running = true;
                let mut jobs = jobs.into_iter();
                let first = jobs.next();
                state.pending.extend(jobs);
                first
            }
        };

        match to_dispatch {
            Some(job) => {
                self.dispatch(job);
                SubmitOutcome::Dispatched
            }
            None => SubmitOutcome::Queued,
        }
    }

    /// Whether a job is currently dispatched or running in this domain.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Number of jobs waiting behind the running one.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Snapshot of the counters kept since this domain was created.
    pub fn stats(&self) -> SerialStats {
        let c = &self.inner.counters;
        SerialStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            fallback_runs: c.fallback_runs.load(Ordering::Relaxed),
        }
    }

    /// Hand `job` to its executor. If this engine is already looping on the
    /// current thread, the job is left for that loop instead, so chains of
    /// inline completions never grow the stack. Other engines are unaffected.
    fn dispatch(&self, job: Job) {
        let id = self.inner.id;
        let job = ACTIVE_LOOPS.with(|cell| {
            let mut loops = cell.borrow_mut();
            match loops.iter().position(|active| active.engine == id) {
                Some(index) => {
                    loops[index].deferred.push_back(job);
                    None
                }
                None => {
                    loops.push(ActiveLoop {
                        engine: id,
                        deferred: VecDeque::new(),
                    });
                    Some(job)
                }
            }
        });
        let Some(mut job) = job else {
            return;
        };

        let _scope = LoopScope { engine: id };
        loop {
            self.hand_off(job);
            let next = ACTIVE_LOOPS.with(|cell| {
                let mut loops = cell.borrow_mut();
                loops
                    .iter_mut()
                    .rfind(|active| active.engine == id)
                    .and_then(|active| active.deferred.pop_front())
            });
            match next {
                Some(next) => job = next,
                None => break,
            }
        }
    }

    fn hand_off(&self, job: Job) {
        let executor = Arc::clone(job.executor());
        self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        // The continuation takes the job out of the slot, so a job the
        // executor lost while panicking can still be recovered here.
        let slot = Arc::new(Mutex::new(Some(job)));
        let continuation = {
            let slot = Arc::clone(&slot);
            let engine = self.clone();
            move || {
                let job = slot.lock().take();
                if let Some(job) = job {
                    engine.work(job);
                }
            }
        };

        match catch_unwind(AssertUnwindSafe(|| executor.try_submit(Box::new(continuation)))) {
            Ok(Ok(())) => {}
            Ok(Err(rejected)) => {
                trace!(
                    domain = %self.inner.name,
                    reason = %rejected.reason(),
                    "Executor rejected serialized task, running it inline"
                );
                self.inner
                    .counters
                    .fallback_runs
                    .fetch_add(1, Ordering::Relaxed);
                (rejected.into_runnable())();
            }
            Err(_) => {
                let job = slot.lock().take();
                if let Some(job) = job {
                    warn!(
                        domain = %self.inner.name,
                        "Executor panicked on submit, running serialized task inline"
                    );
                    self.inner
                        .counters
                        .fallback_runs
                        .fetch_add(1, Ordering::Relaxed);
                    self.work(job);
                }
            }
        }
    }

    /// Body of every continuation: run the job, then chain the next one.
    fn work(&self, job: Job) {
        let outcome = job.run();
        self.inner.counters.completed.fetch_add(1, Ordering::Relaxed);
        if let Err(failure) = outcome {
            self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!(domain = %self.inner.name, error = %failure, "Serialized task failed");
        }

        if let Some(next) = self.complete() {
            self.dispatch(next);
        }
    }

    fn complete(&self) -> Option<Job> {
        let mut state = self.inner.state.lock();
        let next = state.pending.pop_front();
        if next.is_none() {
            state.running = false;
            trace!(domain = %self.inner.name, "Serialized queue drained");
        }
        next
    }
}

impl Default for SerializedExecution {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerializedExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SerializedExecution")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Removes this engine's loop from the thread's active list when it exits.
struct LoopScope {
    engine: Uuid,
}

impl Drop for LoopScope {
    fn drop(&mut self) {
        let finished = ACTIVE_LOOPS.with(|cell| {
            let mut loops = cell.borrow_mut();
            loops
                .iter()
                .rposition(|active| active.engine == self.engine)
                .map(|index| loops.remove(index))
        });
        drop(finished);
    }
}
