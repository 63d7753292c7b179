use std::fmt::Write as _;

use jobbench_core::{CompletedRun, LoadOutcome, RunOutcome, RunResult, SamplerSummary};

use super::format::{RULE, format_duration, format_rate};

pub(crate) fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    match outcome {
        RunOutcome::Completed(done) => render_completed(&mut out, done),
        RunOutcome::Interrupted { sampler, load } => {
            let _ = writeln!(out);
            let _ = writeln!(out, "Interrupted before the expected instances finished.");
            if let Some(load) = load {
                render_load(&mut out, load);
            }
            render_sampler(&mut out, sampler);
        }
    }
    out
}

fn render_completed(out: &mut String, done: &CompletedRun) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "All process instances finished.");
    match &done.report {
        Ok(result) => render_result(out, result),
        Err(err) => {
            let _ = writeln!(out, "Throughput unavailable: {err}");
        }
    }
    let _ = writeln!(out, "{RULE}");

    if let Some(load) = &done.load {
        render_load(out, load);
    }
    render_sampler(out, &done.sampler);
}

fn render_result(out: &mut String, r: &RunResult) {
    let _ = writeln!(
        out,
        "Time = {:.0} ms ({})",
        r.elapsed_ms(),
        format_duration(r.elapsed)
    );
    let _ = writeln!(out, "Avg time = {} ms", format_rate(r.avg_ms_per_instance));
    let _ = writeln!(
        out,
        "Throughput = {} process instances / second",
        format_rate(r.instance_throughput)
    );
    let _ = writeln!(out, "Number of executed async jobs = {}", r.jobs_executed);
    let _ = writeln!(
        out,
        "Throughput = {} jobs / second",
        format_rate(r.job_throughput)
    );
}

fn render_load(out: &mut String, load: &LoadOutcome) {
    let _ = writeln!(
        out,
        "load: {}/{} started, {} failed",
        load.started, load.requested, load.failed
    );
}

fn render_sampler(out: &mut String, s: &SamplerSummary) {
    let _ = writeln!(
        out,
        "sampling: {} ticks ({} skipped), state={}",
        s.ticks, s.failed_ticks, s.state
    );
    if let Some(sample) = &s.last_sample {
        let _ = writeln!(
            out,
            "last sample: {} finished, {} live, {} jobs pending",
            sample.counters.finished_process_instances,
            sample.counters.process_instances,
            sample.counters.async_jobs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobbench_core::{Error, SamplerState};
    use std::time::{Duration, UNIX_EPOCH};

    fn sampler() -> SamplerSummary {
        SamplerSummary {
            state: SamplerState::Stopped,
            ticks: 4,
            failed_ticks: 1,
            last_sample: None,
        }
    }

    #[test]
    fn completed_run_prints_throughput_and_load() {
        let first = UNIX_EPOCH + Duration::from_secs(1000);
        let result = RunResult {
            first_start: first,
            last_end: first + Duration::from_secs(20),
            elapsed: Duration::from_secs(20),
            instances: 1000,
            avg_ms_per_instance: 20.0,
            instance_throughput: 50.0,
            jobs_executed: 27000,
            job_throughput: 1350.0,
        };
        let outcome = RunOutcome::Completed(CompletedRun {
            sampler: sampler(),
            load: Some(LoadOutcome {
                requested: 1000,
                started: 998,
                failed: 2,
                failures: Vec::new(),
            }),
            report: Ok(result),
        });

        let text = render(&outcome);
        assert!(text.contains("Time = 20000 ms (20s)"));
        assert!(text.contains("Throughput = 50.00 process instances / second"));
        assert!(text.contains("Number of executed async jobs = 27000"));
        assert!(text.contains("Throughput = 1350.00 jobs / second"));
        assert!(text.contains("load: 998/1000 started, 2 failed"));
        assert!(text.contains("sampling: 4 ticks (1 skipped), state=stopped"));
    }

    #[test]
    fn reporting_failure_is_shown_instead_of_numbers() {
        let outcome = RunOutcome::Completed(CompletedRun {
            sampler: sampler(),
            load: None,
            report: Err(Error::Reporting("no finished activity".to_string())),
        });

        let text = render(&outcome);
        assert!(text.contains("Throughput unavailable"));
        assert!(!text.contains("jobs / second"));
        assert!(!text.contains("load:"));
    }

    #[test]
    fn interrupted_run_reports_sampler_state() {
        let outcome = RunOutcome::Interrupted {
            sampler: SamplerSummary {
                state: SamplerState::Sampling,
                ..sampler()
            },
            load: Some(LoadOutcome {
                requested: 500,
                started: 120,
                failed: 1,
                failures: vec!["optimistic lock".to_string()],
            }),
        };
        let text = render(&outcome);
        assert!(text.contains("Interrupted"));
        assert!(text.contains("load: 120/500 started, 1 failed"));
        assert!(text.contains("state=sampling"));
    }
}
