use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use jobbench_core::{
    EngineCounters, LoadOutcome, RunConfig, RunOutcome, RunResult, Sample, SampleFn,
    SamplerSummary,
};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config_path: &Path, _cfg: &RunConfig) {}

    fn progress(&self, cfg: &RunConfig) -> Option<SampleFn> {
        let expected = cfg.expected_instances;
        Some(Arc::new(move |sample| {
            let line = build_sample_line(sample, expected);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        let line = build_summary_line(outcome);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSampleLine {
    pub kind: &'static str,
    pub timestamp: String,
    pub expected_instances: Option<u64>,
    #[serde(flatten)]
    pub counters: EngineCounters,
}

fn build_sample_line(sample: &Sample, expected_instances: Option<u64>) -> JsonSampleLine {
    JsonSampleLine {
        kind: "sample",
        timestamp: humantime::format_rfc3339_millis(sample.timestamp).to_string(),
        expected_instances,
        counters: sample.counters,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub status: &'static str,
    pub sampler: JsonSampler,
    pub load: Option<JsonLoad>,
    pub result: Option<JsonResult>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSampler {
    pub state: String,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub last_sample: Option<EngineCounters>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLoad {
    pub requested: u64,
    pub started: u64,
    pub failed: u64,
    pub failures: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonResult {
    pub first_start: String,
    pub last_end: String,
    pub elapsed_ms: f64,
    pub instances: u64,
    pub avg_ms_per_instance: f64,
    pub instance_throughput: f64,
    pub jobs_executed: u64,
    pub job_throughput: f64,
}

fn sampler_json(s: &SamplerSummary) -> JsonSampler {
    JsonSampler {
        state: s.state.to_string(),
        ticks: s.ticks,
        failed_ticks: s.failed_ticks,
        last_sample: s.last_sample.map(|sample| sample.counters),
    }
}

fn load_json(load: &LoadOutcome) -> JsonLoad {
    JsonLoad {
        requested: load.requested,
        started: load.started,
        failed: load.failed,
        failures: load.failures.clone(),
    }
}

fn result_json(r: &RunResult) -> JsonResult {
    JsonResult {
        first_start: humantime::format_rfc3339_millis(r.first_start).to_string(),
        last_end: humantime::format_rfc3339_millis(r.last_end).to_string(),
        elapsed_ms: r.elapsed_ms(),
        instances: r.instances,
        avg_ms_per_instance: r.avg_ms_per_instance,
        instance_throughput: r.instance_throughput,
        jobs_executed: r.jobs_executed,
        job_throughput: r.job_throughput,
    }
}

fn build_summary_line(outcome: &RunOutcome) -> JsonSummaryLine {
    match outcome {
        RunOutcome::Completed(done) => {
            let (result, error) = match &done.report {
                Ok(r) => (Some(result_json(r)), None),
                Err(err) => (None, Some(err.to_string())),
            };
            JsonSummaryLine {
                kind: "summary",
                status: "completed",
                sampler: sampler_json(&done.sampler),
                load: done.load.as_ref().map(load_json),
                result,
                error,
            }
        }
        RunOutcome::Interrupted { sampler, load } => JsonSummaryLine {
            kind: "summary",
            status: "interrupted",
            sampler: sampler_json(sampler),
            load: load.as_ref().map(load_json),
            result: None,
            error: None,
        },
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
        let _ = out.flush();
    }
}
