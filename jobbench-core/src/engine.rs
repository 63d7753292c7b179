use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use rand::Rng as _;

use crate::config::DispatchMode;
use crate::error::EngineError;

pub type EngineFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, EngineError>> + Send + 'a>>;

/// Live and historic counters published by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineCounters {
    pub process_instances: u64,
    pub executions: u64,
    pub tasks: u64,
    pub async_jobs: u64,
    pub timer_jobs: u64,
    pub dead_letter_jobs: u64,
    pub finished_process_instances: u64,
    pub finished_tasks: u64,
    pub finished_activities: u64,
}

/// Input variables of one benchmark instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartVariables {
    pub input1: u32,
    pub input2: u32,
}

impl StartVariables {
    pub const INPUT1_BOUND: u32 = 1000;
    pub const INPUT2_BOUND: u32 = 5000;

    /// Draws `input1` from `[0, 1000)` and `input2` from `[0, 5000)`.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            input1: rng.gen_range(0..Self::INPUT1_BOUND),
            input2: rng.gen_range(0..Self::INPUT2_BOUND),
        }
    }
}

/// The process engine as seen by the harness. Implementations must be thread-safe.
pub trait ProcessEngine: Send + Sync {
    /// Makes the workload definition available for starting.
    fn deploy<'a>(&'a self, definition_key: &'a str) -> EngineFuture<'a, ()>;

    /// Starts one instance and returns its id.
    fn start_process_instance<'a>(
        &'a self,
        definition_key: &'a str,
        vars: StartVariables,
    ) -> EngineFuture<'a, String>;

    fn counters(&self) -> EngineFuture<'_, EngineCounters>;

    /// Start time of the earliest historic activity, if any.
    fn first_activity_start(&self) -> EngineFuture<'_, Option<SystemTime>>;

    /// End time of the latest finished historic activity, if any.
    fn last_activity_end(&self) -> EngineFuture<'_, Option<SystemTime>>;

    /// Stops background job execution. History stays queryable afterwards.
    fn close(&self) -> EngineFuture<'_, ()>;
}

/// Completion detection seam used by the sampler.
pub trait ProgressObserver: Send + Sync {
    fn observe(&self) -> EngineFuture<'_, EngineCounters>;
}

/// Shared handle to a built engine. Closing goes through the handle so it happens once.
#[derive(Clone)]
pub struct EngineHandle {
    mode: DispatchMode,
    engine: Arc<dyn ProcessEngine>,
    closed: Arc<AtomicBool>,
}

impl EngineHandle {
    pub fn new(mode: DispatchMode, engine: Arc<dyn ProcessEngine>) -> Self {
        Self {
            mode,
            engine,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    #[must_use]
    pub fn engine(&self) -> &dyn ProcessEngine {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the engine. Later calls are no-ops and return `Ok(false)`; a failed close
    /// leaves the handle open so it can be retried.
    pub async fn close(&self) -> std::result::Result<bool, EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        if let Err(err) = self.engine.close().await {
            self.closed.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(true)
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ProgressObserver for EngineHandle {
    fn observe(&self) -> EngineFuture<'_, EngineCounters> {
        self.engine.counters()
    }
}
