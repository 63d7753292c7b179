use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use jobbench_core::{RunConfig, RunOutcome, SampleFn};

mod format;
mod progress;
mod summary;

use format::{format_duration, render_sample};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config_path: &Path, cfg: &RunConfig) {
        println!("config: {}", config_path.display());
        println!("mode: {}", cfg.mode);

        if cfg.display_stats {
            println!(
                "stats: every {} to {}",
                format_duration(cfg.sampling_interval),
                cfg.stats_file.display()
            );
        } else {
            println!("stats: <display disabled>");
        }

        match cfg.target_instances() {
            Some(n) => println!(
                "load: {n} x {} on {} start threads, {} between starts ({})",
                cfg.process_definition_key,
                cfg.start_threads,
                format_duration(cfg.start_delay),
                cfg.start_pacing
            ),
            None => println!("load: none"),
        }

        match cfg.expected_instances {
            Some(n) => println!("expected finished instances: {n}"),
            None => println!("expected finished instances: none (runs until interrupted)"),
        }
        println!();
    }

    fn progress(&self, cfg: &RunConfig) -> Option<SampleFn> {
        if !cfg.display_stats {
            return None;
        }

        let progress = self.progress.clone();
        let expected = cfg.expected_instances;

        Some(Arc::new(move |sample| {
            let c = &sample.counters;
            progress.suspend(|| {
                let mut out = std::io::stdout().lock();
                let _ = write!(out, "{}", render_sample(sample));
                let _ = out.flush();
            });

            let message = format!(
                "live={} jobs={} dead-letter={}",
                c.process_instances, c.async_jobs, c.dead_letter_jobs
            );
            progress.update(expected, c.finished_process_instances, message);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(outcome));

        if let RunOutcome::Completed(done) = outcome
            && let Some(load) = &done.load
            && !load.failures.is_empty()
        {
            eprintln!("start failures (first {}):", load.failures.len());
            for failure in &load.failures {
                eprintln!("  {failure}");
            }
        }

        Ok(())
    }
}
