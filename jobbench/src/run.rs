use std::sync::Arc;

use anyhow::Context as _;
use jobbench_core::{CompletedRun, EngineFactory, Harness, RunConfig, RunOutcome};
use jobbench_engine::MemoryBackend;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::{ensure_single_process, load_properties};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let props = load_properties(&args.config, &args.set).map_err(RunError::InvalidInput)?;
    let cfg = RunConfig::from_properties(&props)
        .with_context(|| format!("invalid config: {}", args.config.display()))
        .map_err(RunError::InvalidInput)?;
    ensure_single_process(&cfg).map_err(RunError::InvalidInput)?;

    out.print_header(&args.config, &cfg);

    let factory = EngineFactory::new(Arc::new(MemoryBackend::new()));
    let engine = factory
        .build(cfg.mode, &cfg.engine)
        .await
        .map_err(RunError::from_core)?;
    info!(mode = %cfg.mode, "process engine ready");

    let mut harness = Harness::new(cfg, engine);
    if let Some(progress) = out.progress(harness.config()) {
        harness = harness.with_progress(progress);
    }

    let outcome = harness
        .run(shutdown_signal())
        .await
        .map_err(RunError::from_core)?;

    out.print_summary(&outcome)
        .map_err(RunError::EngineError)?;

    match outcome {
        RunOutcome::Completed(CompletedRun { report: Ok(_), .. }) => Ok(ExitCode::Success),
        RunOutcome::Completed(CompletedRun {
            report: Err(err), ..
        }) => Err(RunError::ReportingError(
            anyhow::Error::new(err).context("run completed but throughput is unavailable"),
        )),
        RunOutcome::Interrupted { sampler, .. } => Err(RunError::Interrupted(anyhow::anyhow!(
            "interrupted after {} sampling ticks",
            sampler.ticks
        ))),
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the run only ends on its own.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
