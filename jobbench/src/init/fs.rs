use anyhow::Context as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Written {
    Created,
    Replaced,
}

/// Writes `contents` to `path`. An existing file is only replaced with `force`.
pub(crate) async fn write_config(
    path: &Path,
    contents: &str,
    force: bool,
) -> anyhow::Result<Written> {
    let exists = tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("failed to check file existence: {}", path.display()))?;
    if exists && !force {
        anyhow::bail!(
            "refusing to overwrite existing config (use --force): {}",
            path.display()
        );
    }

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write config: {}", path.display()))?;

    Ok(if exists {
        Written::Replaced
    } else {
        Written::Created
    })
}
