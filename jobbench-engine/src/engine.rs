use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use jobbench_core::{
    DispatchMode, EngineCounters, EngineError, EngineFuture, ProcessEngine, StartVariables,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broker::Destination;
use crate::error::Error;
use crate::store::{JobOwner, Store};
use crate::workload::ProcessDefinition;

/// Process definitions known to a backend, deployable by key.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    definitions: Mutex<HashMap<String, Arc<ProcessDefinition>>>,
}

impl Catalog {
    pub(crate) fn register(&self, definition: ProcessDefinition) {
        self.definitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(definition.key().to_string(), Arc::new(definition));
    }

    fn get(&self, key: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

/// Where jobs created by this engine go.
#[derive(Debug, Clone)]
pub(crate) enum JobDispatch {
    Table,
    Queue(Arc<Destination>),
}

impl JobDispatch {
    fn owner(&self) -> JobOwner {
        match self {
            Self::Table => JobOwner::Table,
            Self::Queue(_) => JobOwner::Queue,
        }
    }
}

/// In-memory process engine bound to one store.
pub struct MemoryEngine {
    mode: DispatchMode,
    store: Arc<Store>,
    catalog: Arc<Catalog>,
    dispatch: JobDispatch,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryEngine {
    pub(crate) fn new(
        mode: DispatchMode,
        store: Arc<Store>,
        catalog: Arc<Catalog>,
        dispatch: JobDispatch,
        shutdown: watch::Sender<bool>,
        workers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            mode,
            store,
            catalog,
            dispatch,
            closed: AtomicBool::new(false),
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn deploy_definition(&self, key: &str) -> Result<(), Error> {
        let definition = self
            .catalog
            .get(key)
            .ok_or_else(|| Error::UnknownDefinition(key.to_string()))?;
        self.store.deploy(definition);
        debug!(store = self.store.name(), key, "definition deployed");
        Ok(())
    }

    fn start(&self, key: &str, vars: StartVariables) -> Result<String, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let (id, job) = self.store.start_instance(
            key,
            i64::from(vars.input1),
            i64::from(vars.input2),
            self.dispatch.owner(),
        )?;

        if let (JobDispatch::Queue(destination), Some(job)) = (&self.dispatch, job) {
            destination.publish_job(job);
        }
        Ok(id.to_string())
    }

    fn take_workers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl ProcessEngine for MemoryEngine {
    fn deploy<'a>(&'a self, definition_key: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(async move { self.deploy_definition(definition_key).map_err(EngineError::from) })
    }

    fn start_process_instance<'a>(
        &'a self,
        definition_key: &'a str,
        vars: StartVariables,
    ) -> EngineFuture<'a, String> {
        Box::pin(async move { self.start(definition_key, vars).map_err(EngineError::from) })
    }

    fn counters(&self) -> EngineFuture<'_, EngineCounters> {
        Box::pin(async move { Ok(self.store.counters()) })
    }

    fn first_activity_start(&self) -> EngineFuture<'_, Option<SystemTime>> {
        Box::pin(async move { Ok(self.store.first_activity_start()) })
    }

    fn last_activity_end(&self) -> EngineFuture<'_, Option<SystemTime>> {
        Box::pin(async move { Ok(self.store.last_activity_end()) })
    }

    fn close(&self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            self.shutdown.send_replace(true);

            for worker in self.take_workers() {
                if let Err(err) = worker.await {
                    warn!(error = %err, "engine worker ended abnormally");
                }
            }
            debug!(store = self.store.name(), mode = %self.mode, "engine stopped");
            Ok(())
        })
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("mode", &self.mode)
            .field("store", &self.store.name())
            .field("dispatch", &self.dispatch)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
