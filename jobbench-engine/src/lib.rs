//! In-memory process engine for running the harness without an external database or broker.
//!
//! A [`MemoryBackend`] owns named stores (`jdbc:memory:<name>`) and broker destinations
//! (`memory://<name>` plus a queue name). Engines bootstrapped from the same backend with the
//! same URLs share state, so a queue producer and a queue consumer can split one run inside a
//! single process.

mod broker;
mod engine;
mod error;
mod executor;
mod store;
mod workload;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobbench_core::{
    ConnectionSpec, EngineBootstrap, EngineError, EngineFuture, EngineSpec, ProcessEngine,
    Topology,
};
use tokio::sync::watch;
use tracing::info;

pub use broker::Destination;
pub use engine::MemoryEngine;
pub use error::{Error, Result};
pub use executor::DEFAULT_QUEUE_SIZE;
pub use store::JOB_RETRIES;
pub use workload::{
    BENCHMARK_ASYNC_STEPS, Delegate, ProcessDefinition, Variables, sum_inputs,
};

use engine::{Catalog, JobDispatch};
use store::Store;

const JDBC_PREFIX: &str = "jdbc:memory:";
const BROKER_PREFIX: &str = "memory://";

/// `schema-update` value that wipes the store on bootstrap.
pub const SCHEMA_DROP_CREATE: &str = "drop-create";

#[derive(Debug, Default)]
struct Inner {
    stores: Mutex<HashMap<String, Arc<Store>>>,
    destinations: Mutex<HashMap<(String, String), Arc<Destination>>>,
    catalog: Arc<Catalog>,
    job_latency: Duration,
}

/// Registry of in-memory stores and queues; the [`EngineBootstrap`] of this crate.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend with the benchmark definition registered and instant job execution.
    pub fn new() -> Self {
        Self::with_job_latency(Duration::ZERO)
    }

    /// Like [`MemoryBackend::new`], sleeping `latency` before each job runs.
    pub fn with_job_latency(latency: Duration) -> Self {
        let inner = Inner {
            job_latency: latency,
            ..Inner::default()
        };
        inner.catalog.register(ProcessDefinition::benchmark());
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Makes `definition` deployable by engines of this backend.
    pub fn register_definition(&self, definition: ProcessDefinition) {
        self.inner.catalog.register(definition);
    }

    /// Looks up (or creates) the destination `queue` on `broker_url`.
    pub fn destination(&self, broker_url: &str, queue: &str) -> Result<Arc<Destination>> {
        let broker = broker_url
            .strip_prefix(BROKER_PREFIX)
            .map(|name| name.trim_end_matches('/'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::UnsupportedBroker(broker_url.to_string()))?;

        let mut destinations = self
            .inner
            .destinations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let dest = destinations
            .entry((broker.to_string(), queue.to_string()))
            .or_insert_with(|| Arc::new(Destination::new(broker_url, queue)));
        Ok(dest.clone())
    }

    fn store(&self, conn: &ConnectionSpec) -> Result<Arc<Store>> {
        let name = conn
            .url
            .strip_prefix(JDBC_PREFIX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::UnsupportedDatabase(conn.url.clone()))?;

        let mut stores = self
            .inner
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Store::new(name, &conn.username, &conn.password)));
        store.authenticate(&conn.username, &conn.password)?;
        Ok(store.clone())
    }

    fn build(&self, spec: &EngineSpec) -> Result<MemoryEngine> {
        let store = self.store(&spec.connection)?;
        if spec.connection.schema_update.as_deref() == Some(SCHEMA_DROP_CREATE) {
            info!(store = store.name(), "dropping and recreating the schema");
            store.reset();
        }

        let latency = self.inner.job_latency;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (dispatch, workers) = match &spec.topology {
            Topology::Embedded {
                acquire_wait,
                executor,
            } => {
                let workers = match executor {
                    Some(exec) => {
                        executor::spawn(store.clone(), *exec, *acquire_wait, latency, &shutdown_rx)
                    }
                    None => Vec::new(),
                };
                (JobDispatch::Table, workers)
            }
            Topology::QueueProducer { destination, .. } => {
                let dest = self.destination(&destination.broker_url, &destination.queue)?;
                (JobDispatch::Queue(dest), Vec::new())
            }
            Topology::QueueConsumer {
                destination,
                concurrent_consumers,
                ..
            } => {
                let dest = self.destination(&destination.broker_url, &destination.queue)?;
                let workers = broker::spawn_listener(
                    store.clone(),
                    dest.clone(),
                    *concurrent_consumers,
                    latency,
                    &shutdown_rx,
                );
                (JobDispatch::Queue(dest), workers)
            }
        };

        info!(
            store = store.name(),
            mode = %spec.mode,
            workers = workers.len(),
            "in-memory engine started"
        );
        Ok(MemoryEngine::new(
            spec.mode,
            store,
            self.inner.catalog.clone(),
            dispatch,
            shutdown,
            workers,
        ))
    }
}

impl EngineBootstrap for MemoryBackend {
    fn bootstrap<'a>(&'a self, spec: &'a EngineSpec) -> EngineFuture<'a, Arc<dyn ProcessEngine>> {
        Box::pin(async move {
            match self.build(spec) {
                Ok(engine) => Ok(Arc::new(engine) as Arc<dyn ProcessEngine>),
                Err(err) => Err(EngineError::from(err)),
            }
        })
    }
}
