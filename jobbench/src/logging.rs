use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Resolves the log filter: `--log-level` first, then `RUST_LOG`, then `info`.
fn filter(cli_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    match cli_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid --log-level filter: {level}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Installs the global subscriber. Logs go to stderr so NDJSON on stdout stays parseable.
pub(crate) fn init(cli_level: Option<&str>) -> anyhow::Result<()> {
    let filter = filter(cli_level)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}
