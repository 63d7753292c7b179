use std::sync::Arc;
use std::time::Duration;

use jobbench_core::LocalExecutorSpec;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{JobResult, Store};

/// Hand-off queue depth when `async-executor-queue-size` is not set.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Embedded async executor: one acquisition loop over the job table feeding a bounded
/// queue drained by `max_threads` workers.
pub(crate) fn spawn(
    store: Arc<Store>,
    spec: LocalExecutorSpec,
    acquire_wait: Duration,
    job_latency: Duration,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let workers = spec.max_threads.max(1);
    let (tx, rx) = mpsc::channel(spec.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE).max(1));
    let rx = Arc::new(Mutex::new(rx));

    let mut tasks = Vec::with_capacity(workers + 1);
    tasks.push(tokio::spawn(acquire_loop(
        store.clone(),
        tx,
        workers,
        acquire_wait,
        shutdown.clone(),
    )));
    for worker in 0..workers {
        tasks.push(tokio::spawn(work_loop(
            worker,
            store.clone(),
            rx.clone(),
            job_latency,
            shutdown.clone(),
        )));
    }
    tasks
}

async fn acquire_loop(
    store: Arc<Store>,
    tx: mpsc::Sender<u64>,
    batch: usize,
    acquire_wait: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let jobs = store.acquire_jobs(batch);
        if jobs.is_empty() {
            tokio::select! {
                () = store.job_ready() => {}
                () = tokio::time::sleep(acquire_wait) => {}
                _ = shutdown.changed() => break,
            }
            continue;
        }

        let mut jobs = jobs.into_iter();
        while let Some(job) = jobs.next() {
            let sent = tokio::select! {
                res = tx.send(job) => res.is_ok(),
                _ = shutdown.changed() => false,
            };
            if !sent {
                store.unlock_job(job);
                jobs.for_each(|rest| store.unlock_job(rest));
                return;
            }
        }
    }
    debug!(store = store.name(), "job acquisition stopped");
}

async fn work_loop(
    worker: usize,
    store: Arc<Store>,
    rx: Arc<Mutex<mpsc::Receiver<u64>>>,
    job_latency: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            job = async { rx.lock().await.recv().await } => job,
            _ = shutdown.changed() => None,
        };
        let Some(job) = job else {
            break;
        };

        if !job_latency.is_zero() {
            tokio::time::sleep(job_latency).await;
        }
        log_job_result(job, store.execute_job(job));
    }

    // Jobs still queued go back to the table for other executors on the same store.
    let mut rx = rx.lock().await;
    rx.close();
    while let Ok(job) = rx.try_recv() {
        store.unlock_job(job);
    }
    debug!(worker, "executor worker stopped");
}

pub(crate) fn log_job_result(job: u64, res: Result<JobResult>) {
    match res {
        Ok(JobResult::Completed { .. }) => {}
        Ok(JobResult::Retry { job, retries_left }) => {
            debug!(job, retries_left, "job failed; will retry");
        }
        Ok(JobResult::DeadLetter { job }) => {
            warn!(job, "job moved to the dead-letter table after exhausting its retries");
        }
        Err(err) => warn!(job, error = %err, "job execution failed"),
    }
}
