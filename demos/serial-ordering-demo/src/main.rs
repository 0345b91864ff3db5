//! # Serialized Ordering Demo
//!
//! Pushes tasks from several producer threads through a `SerializedExecutor`
//! wrapping the tokio blocking pool, then checks that no two tasks overlapped
//! and that every producer's tasks ran in the order it submitted them.
//!
//! ## Usage
//! ```bash
//! RUST_LOG=turul_serial_executor=debug cargo run -p serial-ordering-demo -- \
//!     --tasks 50 --producers 4 --max-in-flight 2 --fail-every 7
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn};
use turul_serial_executor::prelude::*;

#[derive(Parser)]
#[command(name = "serial-ordering-demo")]
#[command(about = "Serialized execution on top of a parallel executor")]
struct Args {
    /// Tasks submitted by each producer
    #[arg(long, default_value = "25")]
    tasks: usize,

    /// Number of producer threads submitting concurrently
    #[arg(long, default_value = "4")]
    producers: usize,

    /// Maximum tasks in flight on the underlying executor (0 = unlimited).
    /// Overflow is rejected and runs inline on the submitting thread.
    #[arg(long, default_value = "0")]
    max_in_flight: usize,

    /// Make every Nth task fail (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: usize,

    /// Seconds to wait for the queue to drain
    #[arg(long, default_value = "30")]
    timeout: u64,
}

#[derive(Default)]
struct Observed {
    active: AtomicUsize,
    max_active: AtomicUsize,
    log: Mutex<Vec<(usize, usize)>>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let pool = Arc::new(TokioExecutor::with_config(
        tokio::runtime::Handle::current(),
        TokioExecutorConfig {
            max_in_flight: args.max_in_flight,
            name: "demo-pool".to_string(),
        },
    ));
    let executor = Arc::new(SerializedExecutor::new(pool));
    let observed = Arc::new(Observed::default());

    info!(
        producers = args.producers,
        tasks = args.tasks,
        max_in_flight = args.max_in_flight,
        "Submitting tasks"
    );

    // Producers block on nothing, but keep them off the async workers anyway
    let submitter = {
        let executor = executor.clone();
        let observed = observed.clone();
        let (producers, tasks, fail_every) = (args.producers, args.tasks, args.fail_every);
        tokio::task::spawn_blocking(move || submit_all(&executor, &observed, producers, tasks, fail_every))
    };
    submitter.await.context("producer threads panicked")??;

    let serializer = executor.serializer().clone();
    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while serializer.is_running() {
        if Instant::now() > deadline {
            bail!("queue did not drain within {}s", args.timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = serializer.stats();
    info!(
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        fallback_runs = stats.fallback_runs,
        "Queue drained"
    );

    verify(&observed, args.producers * args.tasks)?;
    info!(
        max_active = observed.max_active.load(Ordering::SeqCst),
        "No overlap, per-producer order preserved"
    );

    executor.shutdown();
    tokio::task::spawn_blocking(move || executor.wait_for_termination(Some(Duration::from_secs(5))))
        .await?;
    Ok(())
}

fn submit_all(
    executor: &Arc<SerializedExecutor<TokioExecutor>>,
    observed: &Arc<Observed>,
    producers: usize,
    tasks: usize,
    fail_every: usize,
) -> anyhow::Result<()> {
    let handles: Vec<_> = (0..producers)
        .map(|producer| {
            let executor = executor.clone();
            let observed = observed.clone();
            thread::spawn(move || -> anyhow::Result<()> {
                for index in 0..tasks {
                    let observed = observed.clone();
                    let accepted = executor.submit(
                        (producer, index),
                        Some(move |entry: (usize, usize)| -> TaskResult {
                            let now = observed.active.fetch_add(1, Ordering::SeqCst) + 1;
                            observed.max_active.fetch_max(now, Ordering::SeqCst);
                            observed.log.lock().push(entry);
                            observed.active.fetch_sub(1, Ordering::SeqCst);

                            let sequence = entry.0 * tasks + entry.1 + 1;
                            if fail_every > 0 && sequence % fail_every == 0 {
                                return Err(format!("task {:?} failed on purpose", entry).into());
                            }
                            Ok(())
                        }),
                    )?;
                    if !accepted {
                        warn!(producer, index, "Executor not running, task dropped");
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
    }
    Ok(())
}

fn verify(observed: &Observed, expected: usize) -> anyhow::Result<()> {
    let max_active = observed.max_active.load(Ordering::SeqCst);
    if max_active > 1 {
        bail!("{} tasks overlapped", max_active);
    }

    let log = observed.log.lock();
    if log.len() != expected {
        bail!("expected {} tasks to run, saw {}", expected, log.len());
    }

    let mut last_seen: HashMap<usize, usize> = HashMap::new();
    for &(producer, index) in log.iter() {
        if let Some(&previous) = last_seen.get(&producer) {
            if index <= previous {
                bail!("producer {} ran task {} after task {}", producer, index, previous);
            }
        }
        last_seen.insert(producer, index);
        println!("producer {:>2}  task {:>3}", producer, index);
    }
    Ok(())
}
