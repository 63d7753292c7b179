use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::engine::ProgressObserver;
use crate::error::{Error, Result};
use crate::stats::{Sample, StatsSink};

pub type SampleFn = Arc<dyn Fn(&Sample) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SamplerState {
    Sampling,
    Stopped,
    /// Stats display is off; the sampler idles until the process is terminated.
    Disabled,
}

/// Stops sampling once the finished-instance count equals the expected count exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCondition {
    expected: Option<u64>,
}

impl StopCondition {
    pub fn new(expected: Option<u64>) -> Self {
        Self { expected }
    }

    pub fn never() -> Self {
        Self { expected: None }
    }

    #[must_use]
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    #[must_use]
    pub fn is_met(&self, finished: u64) -> bool {
        self.expected == Some(finished)
    }
}

/// Result of a single sampling tick.
#[derive(Debug)]
pub enum Tick {
    Continue(Sample),
    Stop(Sample),
    /// Counters could not be read; the next tick proceeds as scheduled.
    Skipped(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSummary {
    pub state: SamplerState,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub last_sample: Option<Sample>,
}

/// Periodically polls the engine counters, appends them to the stats sink and detects
/// completion of the run.
pub struct CompletionSampler {
    interval: Duration,
    stop: StopCondition,
    state: SamplerState,
    sink: Option<Box<dyn StatsSink>>,
    on_sample: Option<SampleFn>,
    ticks: u64,
    failed_ticks: u64,
    last_sample: Option<Sample>,
}

impl CompletionSampler {
    pub fn new(interval: Duration, stop: StopCondition) -> Self {
        Self {
            interval,
            stop,
            state: SamplerState::Sampling,
            sink: None,
            on_sample: None,
            ticks: 0,
            failed_ticks: 0,
            last_sample: None,
        }
    }

    pub fn disabled(interval: Duration) -> Self {
        Self {
            state: SamplerState::Disabled,
            ..Self::new(interval, StopCondition::never())
        }
    }

    /// Sampler matching the run settings: disabled unless stats display is on.
    pub fn for_run(cfg: &RunConfig) -> Self {
        if cfg.display_stats {
            Self::new(
                cfg.sampling_interval,
                StopCondition::new(cfg.expected_instances),
            )
        } else {
            Self::disabled(cfg.sampling_interval)
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn StatsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, on_sample: SampleFn) -> Self {
        self.on_sample = Some(on_sample);
        self
    }

    #[must_use]
    pub fn state(&self) -> SamplerState {
        self.state
    }

    #[must_use]
    pub fn summary(&self) -> SamplerSummary {
        SamplerSummary {
            state: self.state,
            ticks: self.ticks,
            failed_ticks: self.failed_ticks,
            last_sample: self.last_sample,
        }
    }

    /// Performs one poll. Counter failures are returned as [`Tick::Skipped`];
    /// a sink write failure is returned as an error and ends sampling.
    pub async fn tick(&mut self, observer: &dyn ProgressObserver) -> Result<Tick> {
        self.ticks += 1;
        let tick = self.ticks;

        let counters = match observer.observe().await {
            Ok(v) => v,
            Err(source) => {
                self.failed_ticks += 1;
                return Ok(Tick::Skipped(Error::Sampling { tick, source }));
            }
        };

        let sample = Sample::new(SystemTime::now(), counters);
        if let Some(sink) = self.sink.as_mut() {
            sink.append(&sample)?;
        }
        if let Some(on_sample) = &self.on_sample {
            on_sample(&sample);
        }
        self.last_sample = Some(sample);

        debug!(
            tick,
            finished = counters.finished_process_instances,
            expected = ?self.stop.expected(),
            async_jobs = counters.async_jobs,
            dead_letter_jobs = counters.dead_letter_jobs,
            "sampled engine counters"
        );

        if self.stop.is_met(counters.finished_process_instances) {
            self.state = SamplerState::Stopped;
            Ok(Tick::Stop(sample))
        } else {
            Ok(Tick::Continue(sample))
        }
    }

    /// Samples until the stop condition holds. A disabled sampler never returns; callers
    /// race it against their shutdown signal.
    pub async fn run(&mut self, observer: &dyn ProgressObserver) -> Result<SamplerSummary> {
        if self.state == SamplerState::Disabled {
            debug!("stats display disabled; idling until terminated");
            return std::future::pending().await;
        }

        while self.state == SamplerState::Sampling {
            match self.tick(observer).await {
                Ok(Tick::Stop(sample)) => {
                    info!(
                        ticks = self.ticks,
                        finished = sample.counters.finished_process_instances,
                        "all expected process instances finished"
                    );
                }
                Ok(Tick::Continue(_)) => tokio::time::sleep(self.interval).await,
                Ok(Tick::Skipped(err)) => {
                    warn!(error = %err, "skipping sampling tick");
                    tokio::time::sleep(self.interval).await;
                }
                Err(err) => {
                    self.state = SamplerState::Stopped;
                    return Err(err);
                }
            }
        }

        Ok(self.summary())
    }
}

impl std::fmt::Debug for CompletionSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSampler")
            .field("interval", &self.interval)
            .field("stop", &self.stop)
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .field("failed_ticks", &self.failed_ticks)
            .finish_non_exhaustive()
    }
}
