use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::log_job_result;
use crate::store::{JobResult, Store};

const JOB_MESSAGE_PREFIX: &str = "job:";

/// One named queue on an in-memory broker. Every message is delivered to exactly one consumer.
#[derive(Debug)]
pub struct Destination {
    broker: String,
    queue: String,
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    published: AtomicU64,
    consumed: AtomicU64,
}

impl Destination {
    pub(crate) fn new(broker: &str, queue: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            broker: broker.to_string(),
            queue: queue.to_string(),
            tx,
            rx: Mutex::new(rx),
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn broker(&self) -> &str {
        &self.broker
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Enqueues a raw message.
    pub fn publish(&self, payload: Bytes) {
        if self.tx.send(payload).is_ok() {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn publish_job(&self, job: u64) {
        self.publish(encode_job(job));
    }

    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    async fn receive(&self) -> Option<Bytes> {
        let msg = self.rx.lock().await.recv().await;
        if msg.is_some() {
            self.consumed.fetch_add(1, Ordering::Relaxed);
        }
        msg
    }
}

pub(crate) fn encode_job(job: u64) -> Bytes {
    Bytes::from(format!("{JOB_MESSAGE_PREFIX}{job}"))
}

pub(crate) fn decode_job(payload: &[u8]) -> Result<u64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.strip_prefix(JOB_MESSAGE_PREFIX))
        .and_then(|s| s.trim().parse().ok())
        .ok_or(Error::MalformedMessage(payload.len()))
}

/// Listener container: `consumers` workers sharing one destination.
pub(crate) fn spawn_listener(
    store: Arc<Store>,
    destination: Arc<Destination>,
    consumers: usize,
    job_latency: Duration,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..consumers.max(1))
        .map(|consumer| {
            tokio::spawn(consume_loop(
                consumer,
                store.clone(),
                destination.clone(),
                job_latency,
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn consume_loop(
    consumer: usize,
    store: Arc<Store>,
    destination: Arc<Destination>,
    job_latency: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let payload = tokio::select! {
            msg = destination.receive() => msg,
            _ = shutdown.changed() => None,
        };
        let Some(payload) = payload else {
            break;
        };

        // A bad message is logged and dropped; the listener keeps consuming.
        let job = match decode_job(&payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(consumer, queue = destination.queue(), error = %err, "dropping job message");
                continue;
            }
        };

        if !job_latency.is_zero() {
            tokio::time::sleep(job_latency).await;
        }

        let res = store.execute_job(job);
        match &res {
            Ok(JobResult::Completed {
                next_job: Some(next),
            }) => destination.publish_job(*next),
            Ok(JobResult::Retry { job, .. }) => destination.publish_job(*job),
            _ => {}
        }
        log_job_result(job, res);
    }
    debug!(consumer, queue = destination.queue(), "queue consumer stopped");
}
