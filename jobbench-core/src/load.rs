use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, StartPacing};
use crate::engine::{EngineHandle, StartVariables};
use crate::error::{Error, Result};

/// Failure messages kept in [`LoadOutcome::failures`]; the rest are only counted.
const MAX_RECORDED_FAILURES: usize = 32;

/// Totals of one load generation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub requested: u64,
    pub started: u64,
    pub failed: u64,
    pub failures: Vec<String>,
}

impl LoadOutcome {
    fn record(&mut self, res: Result<()>) {
        match res {
            Ok(()) => self.started += 1,
            Err(err) => {
                self.failed += 1;
                warn!(error = %err, "failed to start process instance");
                if self.failures.len() < MAX_RECORDED_FAILURES {
                    self.failures.push(err.to_string());
                }
            }
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.started + self.failed == self.requested
    }
}

/// Starts `n` process instances through a bounded pool of concurrent start tasks.
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    pool_size: usize,
    delay: Duration,
    pacing: StartPacing,
    definition_key: Arc<str>,
}

impl LoadGenerator {
    pub fn new(
        pool_size: usize,
        delay: Duration,
        pacing: StartPacing,
        definition_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            pool_size: pool_size.max(1),
            delay,
            pacing,
            definition_key: definition_key.into(),
        }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(
            cfg.start_threads,
            cfg.start_delay,
            cfg.start_pacing,
            cfg.process_definition_key.as_str(),
        )
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Submits `n` start tasks and returns immediately. Returns `None` when `n <= 0`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, engine: EngineHandle, n: i64) -> Option<LoadHandle> {
        let n = u64::try_from(n).ok().filter(|n| *n > 0)?;

        info!(
            instances = n,
            pool_size = self.pool_size,
            delay_ms = self.delay.as_millis() as u64,
            pacing = %self.pacing,
            definition = %self.definition_key,
            "starting process instances"
        );

        let progress = Arc::new(Mutex::new(LoadOutcome {
            requested: n,
            ..LoadOutcome::default()
        }));
        let generator = self.clone();
        let shared = progress.clone();
        let task = tokio::spawn(async move { generator.drive(engine, shared).await });
        Some(LoadHandle { task, progress })
    }

    async fn drive(self, engine: EngineHandle, progress: Arc<Mutex<LoadOutcome>>) -> LoadOutcome {
        let origin = Instant::now();
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();
        let n = lock(&progress).requested;

        for i in 0..n {
            if self.pacing == StartPacing::Staggered {
                let offset = self
                    .delay
                    .saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
                tokio::time::sleep_until(origin + offset).await;
            }

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let engine = engine.clone();
            let key = self.definition_key.clone();
            let delay = match self.pacing {
                StartPacing::Burst => self.delay,
                StartPacing::Staggered => Duration::ZERO,
            };
            let shared = progress.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let res = start_one(&engine, &key, i).await;
                lock(&shared).record(res);
            });

            while let Some(res) = tasks.try_join_next() {
                record_join_error(&progress, res);
            }
        }

        while let Some(res) = tasks.join_next().await {
            record_join_error(&progress, res);
        }

        let outcome = lock(&progress).clone();

        info!(
            started = outcome.started,
            failed = outcome.failed,
            elapsed_ms = origin.elapsed().as_millis() as u64,
            "load generation finished"
        );
        outcome
    }
}

fn lock(progress: &Mutex<LoadOutcome>) -> std::sync::MutexGuard<'_, LoadOutcome> {
    progress
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start tasks record their own result; only a task that never finished reaches here.
fn record_join_error(
    progress: &Mutex<LoadOutcome>,
    res: std::result::Result<(), tokio::task::JoinError>,
) {
    if let Err(err) = res {
        lock(progress).record(Err(Error::Join(err)));
    }
}

async fn start_one(engine: &EngineHandle, key: &str, seq: u64) -> Result<()> {
    let vars = StartVariables::random();
    let id = engine
        .engine()
        .start_process_instance(key, vars)
        .await
        .map_err(|source| Error::Dispatch {
            unit: format!("process instance #{seq}"),
            source,
        })?;
    debug!(seq, id = %id, input1 = vars.input1, input2 = vars.input2, "process instance started");
    Ok(())
}

/// Running load generation batch.
#[derive(Debug)]
pub struct LoadHandle {
    task: JoinHandle<LoadOutcome>,
    progress: Arc<Mutex<LoadOutcome>>,
}

impl LoadHandle {
    /// Waits for every start task to finish.
    pub async fn wait(self) -> Result<LoadOutcome> {
        Ok(self.task.await?)
    }

    /// Totals recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> LoadOutcome {
        lock(&self.progress).clone()
    }

    /// Stops submitting new starts and returns the starts that completed before the stop.
    ///
    /// In-flight starts are dropped with the driver task and appear in neither count.
    pub fn abort(self) -> LoadOutcome {
        self.task.abort();
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::SystemTime;

    use super::*;
    use crate::config::DispatchMode;
    use crate::engine::{EngineCounters, EngineFuture, ProcessEngine};
    use crate::error::EngineError;

    #[derive(Default)]
    struct RecordingEngine {
        starts: Mutex<Vec<Instant>>,
        calls: AtomicU64,
        fail_every: u64,
    }

    impl ProcessEngine for RecordingEngine {
        fn deploy<'a>(&'a self, _definition_key: &'a str) -> EngineFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn start_process_instance<'a>(
            &'a self,
            _definition_key: &'a str,
            vars: StartVariables,
        ) -> EngineFuture<'a, String> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            Box::pin(async move {
                assert!(vars.input1 < StartVariables::INPUT1_BOUND);
                if self.fail_every > 0 && call % self.fail_every == 0 {
                    return Err(EngineError::from("optimistic lock"));
                }
                self.starts
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(Instant::now());
                Ok(call.to_string())
            })
        }

        fn counters(&self) -> EngineFuture<'_, EngineCounters> {
            Box::pin(async { Ok(EngineCounters::default()) })
        }

        fn first_activity_start(&self) -> EngineFuture<'_, Option<SystemTime>> {
            Box::pin(async { Ok(None) })
        }

        fn last_activity_end(&self) -> EngineFuture<'_, Option<SystemTime>> {
            Box::pin(async { Ok(None) })
        }

        fn close(&self) -> EngineFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn handle(engine: Arc<RecordingEngine>) -> EngineHandle {
        EngineHandle::new(DispatchMode::Embedded, engine)
    }

    async fn run(generator: &LoadGenerator, engine: Arc<RecordingEngine>, n: i64) -> LoadOutcome {
        let Some(load) = generator.start(handle(engine), n) else {
            panic!("load generation should start for n={n}");
        };
        match load.wait().await {
            Ok(v) => v,
            Err(err) => panic!("load generation failed: {err}"),
        }
    }

    #[tokio::test]
    async fn non_positive_count_starts_nothing() {
        let engine = Arc::new(RecordingEngine::default());
        let generator = LoadGenerator::new(2, Duration::ZERO, StartPacing::Burst, "AsyncProcess");

        assert!(generator.start(handle(engine.clone()), 0).is_none());
        assert!(generator.start(handle(engine.clone()), -1).is_none());
        assert_eq!(engine.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_pacing_runs_in_pool_sized_waves() {
        let engine = Arc::new(RecordingEngine::default());
        let generator = LoadGenerator::new(
            2,
            Duration::from_millis(100),
            StartPacing::Burst,
            "AsyncProcess",
        );

        let origin = Instant::now();
        let outcome = run(&generator, engine.clone(), 6).await;
        assert_eq!(outcome.started, 6);
        assert!(outcome.is_complete());

        let starts = engine
            .starts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let waves: Vec<u128> = starts
            .iter()
            .map(|t| t.duration_since(origin).as_millis() / 100)
            .collect();
        assert_eq!(waves.iter().filter(|w| **w == 1).count(), 2);
        assert_eq!(waves.iter().filter(|w| **w == 2).count(), 2);
        assert_eq!(waves.iter().filter(|w| **w == 3).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_pacing_spaces_starts_by_delay() {
        let engine = Arc::new(RecordingEngine::default());
        let generator = LoadGenerator::new(
            4,
            Duration::from_millis(100),
            StartPacing::Staggered,
            "AsyncProcess",
        );

        let origin = Instant::now();
        let outcome = run(&generator, engine.clone(), 4).await;
        assert_eq!(outcome.started, 4);

        let mut offsets: Vec<u128> = engine
            .starts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|t| t.duration_since(origin).as_millis() / 100)
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_starts_do_not_abort_the_batch() {
        let engine = Arc::new(RecordingEngine {
            fail_every: 3,
            ..RecordingEngine::default()
        });
        let generator = LoadGenerator::new(3, Duration::ZERO, StartPacing::Burst, "AsyncProcess");

        let outcome = run(&generator, engine.clone(), 9).await;
        assert_eq!(outcome.requested, 9);
        assert_eq!(outcome.started, 6);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.failures[0].contains("optimistic lock"));
        assert!(outcome.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_keeps_the_starts_completed_so_far() {
        let engine = Arc::new(RecordingEngine {
            fail_every: 4,
            ..RecordingEngine::default()
        });
        let generator = LoadGenerator::new(
            1,
            Duration::from_millis(100),
            StartPacing::Burst,
            "AsyncProcess",
        );

        let Some(load) = generator.start(handle(engine.clone()), 10) else {
            panic!("load generation should start");
        };
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(load.snapshot().started + load.snapshot().failed, 4);

        let outcome = load.abort();
        assert_eq!(outcome.requested, 10);
        assert_eq!(outcome.started, 3);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.is_complete());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn failure_messages_are_capped() {
        let engine = Arc::new(RecordingEngine {
            fail_every: 1,
            ..RecordingEngine::default()
        });
        let generator = LoadGenerator::new(8, Duration::ZERO, StartPacing::Burst, "AsyncProcess");

        let outcome = run(&generator, engine, 50).await;
        assert_eq!(outcome.failed, 50);
        assert_eq!(outcome.failures.len(), MAX_RECORDED_FAILURES);
    }
}
