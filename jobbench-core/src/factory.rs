use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{DispatchMode, EngineConfig, keys};
use crate::engine::{EngineFuture, EngineHandle, ProcessEngine};
use crate::error::{Error, Result};

/// Validated connection settings handed to the bootstrap.
#[derive(Clone)]
pub struct ConnectionSpec {
    pub url: String,
    pub username: String,
    pub password: String,
    pub driver: Option<String>,
    pub min_idle: Option<u32>,
    pub max_pool_size: u32,
    pub schema_update: Option<String>,
}

impl std::fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("driver", &self.driver)
            .field("min_idle", &self.min_idle)
            .field("max_pool_size", &self.max_pool_size)
            .field("schema_update", &self.schema_update)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSpec {
    pub broker_url: String,
    pub queue: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalExecutorSpec {
    pub max_threads: usize,
    pub queue_size: Option<usize>,
}

/// How jobs reach an executor in the built engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Job table polled locally. `executor: None` creates work without executing it.
    Embedded {
        acquire_wait: Duration,
        executor: Option<LocalExecutorSpec>,
    },

    QueueProducer {
        acquire_wait: Duration,
        destination: DestinationSpec,
    },

    QueueConsumer {
        acquire_wait: Duration,
        destination: DestinationSpec,
        concurrent_consumers: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub mode: DispatchMode,
    pub connection: ConnectionSpec,
    pub topology: Topology,
}

/// Collaborator that turns a validated spec into a running engine.
pub trait EngineBootstrap: Send + Sync {
    fn bootstrap<'a>(&'a self, spec: &'a EngineSpec) -> EngineFuture<'a, Arc<dyn ProcessEngine>>;
}

pub struct EngineFactory {
    bootstrap: Arc<dyn EngineBootstrap>,
}

impl EngineFactory {
    pub fn new(bootstrap: Arc<dyn EngineBootstrap>) -> Self {
        Self { bootstrap }
    }

    /// Validates the settings required by `mode`.
    pub fn spec(mode: DispatchMode, config: &EngineConfig) -> Result<EngineSpec> {
        let conn = &config.connection;
        let connection = ConnectionSpec {
            url: required(conn.url.as_deref(), keys::JDBC_URL)?,
            username: required(conn.username.as_deref(), keys::JDBC_USERNAME)?,
            password: required(conn.password.as_deref(), keys::JDBC_PASSWORD)?,
            driver: conn.driver.clone(),
            min_idle: conn.min_idle,
            max_pool_size: conn.max_pool_size,
            schema_update: conn.schema_update.clone(),
        };

        let acquire_wait = mode.acquire_wait();
        let topology = match mode {
            DispatchMode::Embedded => Topology::Embedded {
                acquire_wait,
                executor: config
                    .executor
                    .max_threads
                    .map(|max_threads| LocalExecutorSpec {
                        max_threads,
                        queue_size: config.executor.queue_size,
                    }),
            },
            DispatchMode::QueueProducer => Topology::QueueProducer {
                acquire_wait,
                destination: destination(config)?,
            },
            DispatchMode::QueueConsumer => Topology::QueueConsumer {
                acquire_wait,
                destination: destination(config)?,
                concurrent_consumers: config
                    .broker
                    .concurrent_consumers
                    .ok_or_else(|| Error::missing(keys::CONCURRENT_CONSUMERS))?,
            },
        };

        Ok(EngineSpec {
            mode,
            connection,
            topology,
        })
    }

    pub async fn build(&self, mode: DispatchMode, config: &EngineConfig) -> Result<EngineHandle> {
        let spec = Self::spec(mode, config)?;
        log_topology(&spec);

        let engine = self
            .bootstrap
            .bootstrap(&spec)
            .await
            .map_err(|source| Error::EngineBuild { mode, source })?;

        info!(mode = %mode, "process engine ready");
        Ok(EngineHandle::new(mode, engine))
    }

    /// Like [`EngineFactory::build`], for a raw `mode` string.
    pub async fn build_from_str(&self, mode: &str, config: &EngineConfig) -> Result<EngineHandle> {
        let mode = DispatchMode::from_config_str(mode)?;
        self.build(mode, config).await
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String> {
    value
        .map(str::to_string)
        .ok_or_else(|| Error::missing(key))
}

fn destination(config: &EngineConfig) -> Result<DestinationSpec> {
    Ok(DestinationSpec {
        broker_url: required(config.broker.url.as_deref(), keys::BROKER_URL)?,
        queue: required(config.broker.queue.as_deref(), keys::QUEUE)?,
    })
}

fn log_topology(spec: &EngineSpec) {
    let conn = &spec.connection;
    info!(
        mode = %spec.mode,
        url = %conn.url,
        username = %conn.username,
        max_pool_size = conn.max_pool_size,
        min_idle = ?conn.min_idle,
        "building process engine"
    );

    match &spec.topology {
        Topology::Embedded {
            acquire_wait,
            executor: Some(exec),
        } => info!(
            max_threads = exec.max_threads,
            queue_size = ?exec.queue_size,
            acquire_wait_ms = acquire_wait.as_millis() as u64,
            "async executor enabled"
        ),
        Topology::Embedded { executor: None, .. } => {
            info!("async executor disabled; jobs are created but not executed locally");
        }
        Topology::QueueProducer { destination, .. } => info!(
            broker_url = %destination.broker_url,
            queue = %destination.queue,
            "message producer mode"
        ),
        Topology::QueueConsumer {
            destination,
            concurrent_consumers,
            ..
        } => info!(
            broker_url = %destination.broker_url,
            queue = %destination.queue,
            concurrent_consumers,
            "message consumer mode"
        ),
    }
}
