use std::time::{Duration, SystemTime};

use tracing::info;

use crate::config::{DEFAULT_JOBS_PER_INSTANCE, RunConfig};
use crate::engine::EngineHandle;
use crate::error::{EngineError, Error, Result};

/// Throughput of a completed run, derived once from the historic activity window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunResult {
    pub first_start: SystemTime,
    pub last_end: SystemTime,
    pub elapsed: Duration,
    pub instances: u64,
    pub avg_ms_per_instance: f64,
    /// Instances per second.
    pub instance_throughput: f64,
    pub jobs_executed: u64,
    /// Jobs per second.
    pub job_throughput: f64,
}

impl RunResult {
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThroughputReporter {
    jobs_per_instance: u64,
}

impl Default for ThroughputReporter {
    fn default() -> Self {
        Self::new(DEFAULT_JOBS_PER_INSTANCE)
    }
}

impl ThroughputReporter {
    pub fn new(jobs_per_instance: u64) -> Self {
        Self { jobs_per_instance }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(cfg.jobs_per_instance)
    }

    pub fn compute(
        &self,
        n: i64,
        first_start: Option<SystemTime>,
        last_end: Option<SystemTime>,
    ) -> Result<RunResult> {
        let instances = u64::try_from(n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| Error::Reporting(format!("instance count must be positive, got {n}")))?;

        let (Some(first_start), Some(last_end)) = (first_start, last_end) else {
            return Err(Error::Reporting(
                "no finished historic activity recorded yet".to_string(),
            ));
        };

        let elapsed = last_end
            .duration_since(first_start)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                Error::Reporting("last activity end is not after the first activity start".into())
            })?;

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let avg_ms_per_instance = elapsed_ms / instances as f64;
        let jobs_executed = instances.saturating_mul(self.jobs_per_instance);

        Ok(RunResult {
            first_start,
            last_end,
            elapsed,
            instances,
            avg_ms_per_instance,
            instance_throughput: 1000.0 / avg_ms_per_instance,
            jobs_executed,
            job_throughput: 1000.0 / (elapsed_ms / jobs_executed as f64),
        })
    }

    /// Queries the historic window and computes the throughput of `n` instances.
    pub async fn report(&self, engine: &EngineHandle, n: i64) -> Result<RunResult> {
        if n <= 0 {
            return self.compute(n, None, None);
        }

        let history = |source: EngineError| {
            Error::Reporting(format!("historic activity query failed: {source}"))
        };
        let first = engine
            .engine()
            .first_activity_start()
            .await
            .map_err(history)?;
        let last = engine
            .engine()
            .last_activity_end()
            .await
            .map_err(history)?;

        let result = self.compute(n, first, last)?;
        info!(
            elapsed_ms = result.elapsed.as_millis() as u64,
            avg_ms_per_instance = result.avg_ms_per_instance,
            instance_throughput = result.instance_throughput,
            jobs_executed = result.jobs_executed,
            job_throughput = result.job_throughput,
            "throughput computed"
        );
        Ok(result)
    }
}
