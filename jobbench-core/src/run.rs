use std::future::Future;

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::engine::EngineHandle;
use crate::error::{Error, Result};
use crate::load::{LoadGenerator, LoadHandle, LoadOutcome};
use crate::report::{RunResult, ThroughputReporter};
use crate::sampler::{CompletionSampler, SampleFn, SamplerSummary};
use crate::stats::{DelimitedStatsSink, StatsSink};

#[derive(Debug)]
pub struct CompletedRun {
    pub sampler: SamplerSummary,
    pub load: Option<LoadOutcome>,
    /// A failed report leaves the recorded samples valid.
    pub report: Result<RunResult>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(CompletedRun),
    /// The shutdown signal fired before the sampler stopped.
    ///
    /// `load` holds the starts that completed before the batch was aborted.
    Interrupted {
        sampler: SamplerSummary,
        load: Option<LoadOutcome>,
    },
}

/// One harness invocation: load generation, completion sampling and reporting over a
/// built engine.
pub struct Harness {
    cfg: RunConfig,
    engine: EngineHandle,
    sink: Option<Box<dyn StatsSink>>,
    on_sample: Option<SampleFn>,
}

impl Harness {
    pub fn new(cfg: RunConfig, engine: EngineHandle) -> Self {
        Self {
            cfg,
            engine,
            sink: None,
            on_sample: None,
        }
    }

    /// Replaces the stats file named by the config.
    pub fn with_sink(mut self, sink: Box<dyn StatsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, on_sample: SampleFn) -> Self {
        self.on_sample = Some(on_sample);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Number of instances the final report is computed for.
    #[must_use]
    pub fn report_instances(&self) -> i64 {
        self.cfg
            .target_instances()
            .or(self.cfg.expected_instances)
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(self.cfg.instances)
    }

    /// Runs until the sampler stops or `shutdown` resolves. The engine is closed exactly once
    /// on every path that returns.
    pub async fn run<F>(self, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        for warning in self.cfg.warnings() {
            warn!("{warning}");
        }

        let report_instances = self.report_instances();
        let Self {
            cfg,
            engine,
            sink,
            on_sample,
        } = self;

        if let Some(n) = cfg.target_instances() {
            info!(definition = %cfg.process_definition_key, instances = n, "deploying process definition");
            if let Err(source) = engine.engine().deploy(&cfg.process_definition_key).await {
                close_engine(&engine).await;
                return Err(Error::Deploy {
                    key: cfg.process_definition_key.clone(),
                    source,
                });
            }
        }

        let mut sampler = CompletionSampler::for_run(&cfg);
        if cfg.display_stats {
            let sink = match sink {
                Some(sink) => sink,
                None => match DelimitedStatsSink::create(&cfg.stats_file) {
                    Ok(sink) => Box::new(sink) as Box<dyn StatsSink>,
                    Err(err) => {
                        close_engine(&engine).await;
                        return Err(err);
                    }
                },
            };
            sampler = sampler.with_sink(sink);
            info!(path = %cfg.stats_file.display(), "recording samples");
        }
        if let Some(on_sample) = on_sample {
            sampler = sampler.with_progress(on_sample);
        }

        let load = cfg
            .target_instances()
            .and_then(|n| i64::try_from(n).ok())
            .and_then(|n| LoadGenerator::from_config(&cfg).start(engine.clone(), n));

        tokio::pin!(shutdown);
        let sampled = tokio::select! {
            res = sampler.run(&engine) => Some(res),
            () = &mut shutdown => None,
        };

        let summary = match sampled {
            None => {
                info!("shutdown requested; stopping");
                let load = abort_load(load);
                close_engine(&engine).await;
                return Ok(RunOutcome::Interrupted {
                    sampler: sampler.summary(),
                    load,
                });
            }
            Some(Err(err)) => {
                abort_load(load);
                close_engine(&engine).await;
                return Err(err);
            }
            Some(Ok(summary)) => summary,
        };

        close_engine(&engine).await;

        let load = match load {
            Some(load) => Some(load.wait().await?),
            None => None,
        };

        let report = ThroughputReporter::from_config(&cfg)
            .report(&engine, report_instances)
            .await;
        if let Err(err) = &report {
            warn!(error = %err, "throughput report unavailable");
        }

        Ok(RunOutcome::Completed(CompletedRun {
            sampler: summary,
            load,
            report,
        }))
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("cfg", &self.cfg)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn abort_load(load: Option<LoadHandle>) -> Option<LoadOutcome> {
    let outcome = load?.abort();
    if !outcome.is_complete() {
        info!(
            requested = outcome.requested,
            started = outcome.started,
            failed = outcome.failed,
            "load generation aborted"
        );
    }
    Some(outcome)
}

async fn close_engine(engine: &EngineHandle) {
    match engine.close().await {
        Ok(true) => info!(mode = %engine.mode(), "process engine closed"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "failed to close process engine"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::config::DispatchMode;
    use crate::engine::{EngineCounters, EngineFuture, ProcessEngine, StartVariables};
    use crate::error::EngineError;
    use crate::properties::Properties;
    use crate::sampler::SamplerState;
    use crate::stats::Sample;

    /// Every started instance counts as finished immediately; each one adds 100ms of history.
    #[derive(Default)]
    struct InstantEngine {
        started: AtomicU64,
        closed: AtomicBool,
        fail_deploy: bool,
    }

    impl ProcessEngine for InstantEngine {
        fn deploy<'a>(&'a self, _definition_key: &'a str) -> EngineFuture<'a, ()> {
            let fail = self.fail_deploy;
            Box::pin(async move {
                if fail {
                    Err(EngineError::from("definition rejected"))
                } else {
                    Ok(())
                }
            })
        }

        fn start_process_instance<'a>(
            &'a self,
            _definition_key: &'a str,
            _vars: StartVariables,
        ) -> EngineFuture<'a, String> {
            let id = self.started.fetch_add(1, Ordering::Relaxed) + 1;
            Box::pin(async move { Ok(id.to_string()) })
        }

        fn counters(&self) -> EngineFuture<'_, EngineCounters> {
            let finished = self.started.load(Ordering::Relaxed);
            Box::pin(async move {
                Ok(EngineCounters {
                    finished_process_instances: finished,
                    finished_activities: finished * 29,
                    ..EngineCounters::default()
                })
            })
        }

        fn first_activity_start(&self) -> EngineFuture<'_, Option<SystemTime>> {
            Box::pin(async { Ok(Some(SystemTime::UNIX_EPOCH)) })
        }

        fn last_activity_end(&self) -> EngineFuture<'_, Option<SystemTime>> {
            let finished = self.started.load(Ordering::Relaxed);
            Box::pin(async move {
                Ok((finished > 0)
                    .then(|| SystemTime::UNIX_EPOCH + Duration::from_millis(100 * finished)))
            })
        }

        fn close(&self) -> EngineFuture<'_, ()> {
            self.closed.store(true, Ordering::Relaxed);
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink {
        rows: Arc<AtomicU64>,
    }

    impl StatsSink for CountingSink {
        fn append(&mut self, _sample: &Sample) -> Result<()> {
            self.rows.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn run_config(text: &str) -> RunConfig {
        match RunConfig::from_properties(&Properties::parse(text)) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_run_completes_and_reports() {
        let engine = Arc::new(InstantEngine::default());
        let cfg = run_config(
            "display-stats=true\nnr-process-instances=10\nstart-process-instance-threads=2\n",
        );
        let sink = CountingSink::default();
        let harness = Harness::new(cfg, EngineHandle::new(DispatchMode::Embedded, engine.clone()))
            .with_sink(Box::new(sink.clone()));

        let outcome = match harness.run(std::future::pending()).await {
            Ok(v) => v,
            Err(err) => panic!("run failed: {err}"),
        };

        let RunOutcome::Completed(done) = outcome else {
            panic!("run should complete");
        };
        assert_eq!(done.sampler.state, SamplerState::Stopped);
        assert_eq!(sink.rows.load(Ordering::Relaxed), done.sampler.ticks);
        assert_eq!(done.load.map(|l| l.started), Some(10));
        assert!(engine.closed.load(Ordering::Relaxed));

        match done.report {
            Ok(report) => {
                assert_eq!(report.instances, 10);
                assert_eq!(report.jobs_executed, 270);
                assert_eq!(report.elapsed, Duration::from_millis(1000));
            }
            Err(err) => panic!("report failed: {err}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_stats_run_ends_only_on_shutdown() {
        let engine = Arc::new(InstantEngine::default());
        let cfg = run_config("nr-process-instances=3\nstart-process-instance-threads=1\n");
        let harness = Harness::new(cfg, EngineHandle::new(DispatchMode::Embedded, engine.clone()));

        let outcome = harness
            .run(tokio::time::sleep(Duration::from_secs(3600)))
            .await;

        match outcome {
            Ok(RunOutcome::Interrupted { sampler, load }) => {
                assert_eq!(sampler.state, SamplerState::Disabled);
                assert_eq!(sampler.ticks, 0);
                let Some(load) = load else {
                    panic!("load generation should have run");
                };
                assert_eq!((load.requested, load.started), (3, 3));
            }
            other => panic!("expected interruption, got {other:?}"),
        }
        assert!(engine.closed.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_run_keeps_partial_load_counts() {
        let engine = Arc::new(InstantEngine::default());
        let cfg = run_config(
            "nr-process-instances=10\nstart-process-instance-threads=1\n\
             delay-between-process-instance-start=1000\n",
        );
        let harness = Harness::new(cfg, EngineHandle::new(DispatchMode::Embedded, engine.clone()));

        let outcome = harness
            .run(tokio::time::sleep(Duration::from_millis(3500)))
            .await;

        let load = match outcome {
            Ok(RunOutcome::Interrupted { load: Some(load), .. }) => load,
            other => panic!("expected interruption with load counts, got {other:?}"),
        };
        assert_eq!(load.requested, 10);
        assert_eq!(load.started, 3);
        assert_eq!(load.failed, 0);
        assert!(!load.is_complete());
        assert_eq!(engine.started.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn deploy_failure_aborts_before_load() {
        let engine = Arc::new(InstantEngine {
            fail_deploy: true,
            ..InstantEngine::default()
        });
        let cfg = run_config("nr-process-instances=3\nstart-process-instance-threads=1\n");
        let harness = Harness::new(cfg, EngineHandle::new(DispatchMode::Embedded, engine.clone()));

        let res = harness.run(std::future::pending()).await;
        assert!(matches!(res, Err(Error::Deploy { .. })));
        assert_eq!(engine.started.load(Ordering::Relaxed), 0);
        assert!(engine.closed.load(Ordering::Relaxed));
    }

    #[test]
    fn consumer_reports_against_expected_count() {
        let engine = Arc::new(InstantEngine::default());
        let cfg = run_config("mode=queue-consumer\nexpected-process-instances=40\n");
        let harness = Harness::new(
            cfg,
            EngineHandle::new(DispatchMode::QueueConsumer, engine),
        );
        assert_eq!(harness.report_instances(), 40);
    }
}
