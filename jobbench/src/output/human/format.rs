use std::time::Duration;

use jobbench_core::Sample;

pub(crate) const RULE: &str = "------------------------------------------------";

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0ms".to_string();
    }
    humantime::format_duration(d).to_string()
}

/// Console block printed for every sample.
pub(crate) fn render_sample(sample: &Sample) -> String {
    let c = &sample.counters;
    let mut out = String::new();
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Timestamp: {}\n",
        humantime::format_rfc3339_seconds(sample.timestamp)
    ));
    out.push_str(&format!("Nr of process instances = {}\n", c.process_instances));
    out.push_str(&format!("Nr of executions = {}\n", c.executions));
    out.push_str(&format!("Nr of tasks = {}\n", c.tasks));
    out.push_str(&format!(
        "Nr of async / timer / DL jobs : {} / {} / {}\n",
        c.async_jobs, c.timer_jobs, c.dead_letter_jobs
    ));
    out.push_str(&format!(
        "Nr of finished process instances = {}\n",
        c.finished_process_instances
    ));
    out.push_str(&format!("Nr of finished tasks = {}\n", c.finished_tasks));
    out.push_str(&format!(
        "Nr of finished historic activities = {}\n",
        c.finished_activities
    ));
    out.push_str(RULE);
    out.push('\n');
    out
}
