mod fs;

use fs::Written;

use anyhow::Context as _;
use jobbench_core::{
    DEFAULT_JOBS_PER_INSTANCE, DEFAULT_PROCESS_DEFINITION_KEY, DEFAULT_STATS_FILE, DispatchMode,
};
use tracing::info;

use crate::cli::InitArgs;

const CONFIG_FILE: &str = "config.properties";

pub async fn init(args: InitArgs) -> anyhow::Result<()> {
    let root = &args.dir;
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create dir: {}", root.display()))?;

    let path = root.join(CONFIG_FILE);
    let written = fs::write_config(&path, &config_template(args.mode), args.force).await?;
    info!(path = %path.display(), mode = %args.mode, "config scaffolded");
    match written {
        Written::Created => println!("created {}", path.display()),
        Written::Replaced => println!("replaced {}", path.display()),
    }
    Ok(())
}

fn commented(enabled: bool) -> &'static str {
    if enabled { "" } else { "# " }
}

fn config_template(mode: DispatchMode) -> String {
    let queue = commented(mode.uses_queue());
    let executor = commented(mode == DispatchMode::Embedded);
    let load = commented(mode.starts_instances());

    format!(
        "\
# jobbench run configuration.
# Run with: jobbench run {CONFIG_FILE}

# embedded | queue-producer | queue-consumer
# The queue modes split one benchmark across a producer and a consumer that share
# a store. The bundled in-memory engine cannot be shared, so `jobbench run` only
# accepts embedded configs with the executor enabled.
mode={mode}

# Sample engine counters every 30s into stats-file and stop once
# expected-process-instances have finished.
display-stats=true
stats-file={DEFAULT_STATS_FILE}

# Load generation (ignored by queue-consumer).
{load}nr-process-instances=1000
{load}delay-between-process-instance-start=10
{load}start-process-instance-threads=8
# burst | staggered
{load}start-pacing=burst

# Defaults to nr-process-instances. A consumer reports against this count.
# expected-process-instances=1000

process-definition-key={DEFAULT_PROCESS_DEFINITION_KEY}
jobs-per-instance={DEFAULT_JOBS_PER_INSTANCE}

# Engine database.
jdbc-url=jdbc:memory:bench
jdbc-username=sa
jdbc-password=bench
# jdbc-driver=
# connections-min=
# connections-max=100
# schema-update=drop-create

# Embedded async executor.
{executor}async-executor-max-nr-threads=8
{executor}async-executor-queue-size=100

# Job queue (queue-producer and queue-consumer).
{queue}broker-url=memory://local
{queue}queue=jobbench-jobs
{queue}concurrent-consumers=8
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobbench_core::{Properties, RunConfig};

    #[test]
    fn every_template_resolves_to_its_mode() -> anyhow::Result<()> {
        for mode in [
            DispatchMode::Embedded,
            DispatchMode::QueueProducer,
            DispatchMode::QueueConsumer,
        ] {
            let props = Properties::parse(&config_template(mode));
            let cfg = RunConfig::from_properties(&props)?;
            anyhow::ensure!(cfg.mode == mode, "{mode}: resolved {}", cfg.mode);
            anyhow::ensure!(cfg.display_stats);
            anyhow::ensure!(
                cfg.needs_peer_process() == (mode != DispatchMode::Embedded),
                "{mode}: unexpected topology"
            );
        }
        Ok(())
    }

    #[test]
    fn consumer_template_leaves_load_and_executor_commented() {
        let props = Properties::parse(&config_template(DispatchMode::QueueConsumer));
        assert_eq!(props.get("nr-process-instances"), None);
        assert_eq!(props.get("async-executor-max-nr-threads"), None);
        assert_eq!(props.get("queue"), Some("jobbench-jobs"));
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite_without_force() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let args = |force| InitArgs {
            dir: dir.path().join("bench"),
            force,
            mode: DispatchMode::QueueProducer,
        };

        init(args(false)).await?;
        let path = dir.path().join("bench").join(CONFIG_FILE);
        anyhow::ensure!(std::fs::read_to_string(&path)?.contains("mode=queue-producer"));

        anyhow::ensure!(init(args(false)).await.is_err());
        init(args(true)).await?;

        let again = fs::write_config(&path, "mode=embedded\n", true).await?;
        anyhow::ensure!(again == Written::Replaced);
        Ok(())
    }
}
