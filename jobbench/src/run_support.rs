use std::path::Path;

use anyhow::Context as _;
use jobbench_core::{Properties, RunConfig, keys};

/// Reads the config file and applies `--set` overrides in order.
pub(crate) fn load_properties(path: &Path, overrides: &[String]) -> anyhow::Result<Properties> {
    let mut props = Properties::load(path)
        .with_context(|| format!("failed to load config: {}", path.display()))?;

    let pairs = overrides
        .iter()
        .map(|raw| parse_set_override(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;
    props.apply_overrides(pairs);

    Ok(props)
}

/// The bundled engine keeps its store and queue inside this process, so a second
/// invocation can never see them.
pub(crate) fn ensure_single_process(cfg: &RunConfig) -> anyhow::Result<()> {
    if !cfg.needs_peer_process() {
        return Ok(());
    }
    if cfg.mode.uses_queue() {
        anyhow::bail!(
            "mode `{}` needs a producer and a consumer sharing one store, \
             but the in-memory engine is private to each process; use `embedded`",
            cfg.mode
        );
    }
    anyhow::bail!(
        "`{}` disables the executor, so no job would ever run: \
         no other process can reach the in-memory store",
        keys::EXECUTOR_MAX_THREADS
    )
}

fn parse_set_override(s: &str) -> anyhow::Result<(&str, &str)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --set (expected KEY=VALUE): {s}"))?;
    let k = k.trim();
    if k.is_empty() {
        anyhow::bail!("invalid --set (empty KEY): {s}");
    }
    Ok((k, v))
}
