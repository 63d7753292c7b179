use crate::cli::OutputFormat;
use jobbench_core::{RunConfig, RunOutcome, SampleFn};
use std::path::Path;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, config_path: &Path, cfg: &RunConfig);
    fn progress(&self, cfg: &RunConfig) -> Option<SampleFn>;
    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
