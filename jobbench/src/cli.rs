use clap::{Args, Parser, Subcommand};
use jobbench_core::DispatchMode;
use std::path::PathBuf;

fn parse_mode(input: &str) -> Result<DispatchMode, String> {
    DispatchMode::from_config_str(input).map_err(|err| err.to_string())
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar, per-sample blocks and a summary.
    HumanReadable,
    /// Emit one JSON line per sample and a summary line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "jobbench",
    author,
    version,
    about = "Throughput harness for an async-job process engine",
    long_about = "jobbench starts a fixed number of process instances against a process engine, samples the engine's counters until the expected number of instances has finished and reports instance and job throughput.\n\nThe engine runs in one of three topologies: embedded (polling executor), queue-producer (jobs published to a broker destination) or queue-consumer (jobs executed from the destination). A producer and a consumer sharing one store form a single distributed run.",
    after_help = "Examples:\n  jobbench init bench --mode embedded\n  jobbench run bench/config.properties\n  jobbench run config.properties --set nr-process-instances=500 --output json\n  jobbench run consumer.yaml --set mode=queue-consumer --log-level debug"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter (e.g. `info`, `jobbench_core=debug`). Falls back to RUST_LOG, then `info`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the harness against a config file
    #[command(
        long_about = "Load a .properties (or flat .yaml) config, apply --set overrides and run the harness until the completion condition is met or Ctrl-C is pressed."
    )]
    Run(RunArgs),

    /// Scaffold a commented config.properties
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Target directory to initialize (created if missing)
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,

    /// Topology to pre-select in the template
    #[arg(long, value_name = "MODE", value_parser = parse_mode, default_value = "embedded")]
    pub mode: DispatchMode,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the config file (.properties, .yaml or .yml)
    pub config: PathBuf,

    /// Override a config key (repeatable, KEY=VALUE). Later values win.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "jobbench",
            "run",
            "config.properties",
            "--set",
            "nr-process-instances=10",
            "--set",
            "jdbc-password=",
            "--output",
            "json",
            "--log-level",
            "debug",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("config.properties"));
                assert_eq!(
                    args.set,
                    vec![
                        "nr-process-instances=10".to_string(),
                        "jdbc-password=".to_string()
                    ]
                );
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Init(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_init_defaults() {
        let parsed = Cli::try_parse_from(["jobbench", "init"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Init(args) => {
                assert_eq!(args.dir, PathBuf::from("."));
                assert!(!args.force);
                assert_eq!(args.mode, DispatchMode::Embedded);
            }
            Command::Run(_) => panic!("expected init command"),
        }
    }

    #[test]
    fn init_accepts_legacy_mode_names() {
        let parsed = Cli::try_parse_from(["jobbench", "init", "out", "--mode", "message-executor"]);
        match parsed.map(|cli| cli.command) {
            Ok(Command::Init(args)) => assert_eq!(args.mode, DispatchMode::QueueConsumer),
            Ok(Command::Run(_)) => panic!("expected init command"),
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["jobbench", "init", "--mode", "cluster"]).is_err());
    }
}
