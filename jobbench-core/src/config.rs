use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::properties::Properties;

/// Period between two completion samples. Fixed by the measurement protocol.
pub const SAMPLING_INTERVAL: Duration = Duration::from_secs(30);

/// Async steps contributed by one instance of the benchmark workload.
pub const DEFAULT_JOBS_PER_INSTANCE: u64 = 27;

pub const DEFAULT_PROCESS_DEFINITION_KEY: &str = "AsyncProcess";

pub const DEFAULT_STATS_FILE: &str = "output.txt";

pub const DEFAULT_MAX_CONNECTIONS: u32 = 100;

/// Acquisition wait of the embedded executor when the job table came back empty.
pub const EMBEDDED_ACQUIRE_WAIT: Duration = Duration::from_millis(5000);

/// Acquisition wait used by engines whose jobs travel through the message queue.
pub const QUEUE_ACQUIRE_WAIT: Duration = Duration::from_millis(3000);

/// Configuration keys understood by [`RunConfig::from_properties`].
pub mod keys {
    pub const MODE: &str = "mode";
    pub const DISPLAY_STATS: &str = "display-stats";
    pub const NR_PROCESS_INSTANCES: &str = "nr-process-instances";
    pub const START_DELAY: &str = "delay-between-process-instance-start";
    pub const START_THREADS: &str = "start-process-instance-threads";
    pub const START_PACING: &str = "start-pacing";
    pub const EXPECTED_PROCESS_INSTANCES: &str = "expected-process-instances";
    pub const JOBS_PER_INSTANCE: &str = "jobs-per-instance";
    pub const PROCESS_DEFINITION_KEY: &str = "process-definition-key";
    pub const STATS_FILE: &str = "stats-file";

    pub const EXECUTOR_MAX_THREADS: &str = "async-executor-max-nr-threads";
    pub const EXECUTOR_QUEUE_SIZE: &str = "async-executor-queue-size";

    pub const JDBC_URL: &str = "jdbc-url";
    pub const JDBC_USERNAME: &str = "jdbc-username";
    pub const JDBC_PASSWORD: &str = "jdbc-password";
    pub const JDBC_DRIVER: &str = "jdbc-driver";
    pub const CONNECTIONS_MIN: &str = "connections-min";
    pub const CONNECTIONS_MAX: &str = "connections-max";
    pub const SCHEMA_UPDATE: &str = "schema-update";

    pub const BROKER_URL: &str = "broker-url";
    pub const QUEUE: &str = "queue";
    pub const CONCURRENT_CONSUMERS: &str = "concurrent-consumers";
}

/// Execution topology of one harness invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum DispatchMode {
    /// The engine polls its own job table with a local thread pool.
    #[strum(to_string = "embedded", serialize = "executor", serialize = "producer")]
    Embedded,

    /// The engine starts instances and publishes job messages, but executes nothing.
    #[strum(to_string = "queue-producer", serialize = "message-producer")]
    QueueProducer,

    /// The engine only consumes job messages from the queue and executes them.
    #[strum(to_string = "queue-consumer", serialize = "message-executor")]
    QueueConsumer,
}

impl DispatchMode {
    /// Parses a `mode` value, including the legacy aliases.
    pub fn from_config_str(raw: &str) -> Result<Self> {
        raw.trim().parse().map_err(|_| {
            Error::invalid(
                keys::MODE,
                raw,
                "one of `embedded`, `queue-producer`, `queue-consumer`",
            )
        })
    }

    /// Whether this topology may start process instances.
    #[must_use]
    pub fn starts_instances(self) -> bool {
        !matches!(self, Self::QueueConsumer)
    }

    #[must_use]
    pub fn uses_queue(self) -> bool {
        matches!(self, Self::QueueProducer | Self::QueueConsumer)
    }

    #[must_use]
    pub fn acquire_wait(self) -> Duration {
        match self {
            Self::Embedded => EMBEDDED_ACQUIRE_WAIT,
            Self::QueueProducer | Self::QueueConsumer => QUEUE_ACQUIRE_WAIT,
        }
    }
}

/// How start tasks space out their calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
pub enum StartPacing {
    /// Every task sleeps the same delay before starting (bursts bounded by the pool size).
    #[default]
    #[strum(serialize = "burst")]
    Burst,

    /// Task `i` starts `i * delay` after the generator started.
    #[strum(serialize = "staggered")]
    Staggered,
}

#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub driver: Option<String>,
    pub min_idle: Option<u32>,
    pub max_pool_size: u32,
    pub schema_update: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("driver", &self.driver)
            .field("min_idle", &self.min_idle)
            .field("max_pool_size", &self.max_pool_size)
            .field("schema_update", &self.schema_update)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Local executor pool size. `None` disables the embedded executor.
    pub max_threads: Option<usize>,
    pub queue_size: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    pub url: Option<String>,
    pub queue: Option<String>,
    pub concurrent_consumers: Option<usize>,
}

/// Raw engine settings. Validated by [`crate::EngineFactory`] against the selected mode.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub connection: ConnectionConfig,
    pub executor: ExecutorConfig,
    pub broker: BrokerConfig,
}

impl EngineConfig {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let connection = ConnectionConfig {
            url: owned(props.get(keys::JDBC_URL)),
            username: owned(props.get(keys::JDBC_USERNAME)),
            password: owned(props.get(keys::JDBC_PASSWORD)),
            driver: owned(props.get(keys::JDBC_DRIVER)),
            min_idle: non_negative(props, keys::CONNECTIONS_MIN)?
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
            max_pool_size: positive(props, keys::CONNECTIONS_MAX)?
                .map_or(DEFAULT_MAX_CONNECTIONS, |v| u32::try_from(v).unwrap_or(u32::MAX)),
            schema_update: owned(props.get(keys::SCHEMA_UPDATE)),
        };

        // Zero or negative values switch the feature off.
        let executor = ExecutorConfig {
            max_threads: props
                .get_i64(keys::EXECUTOR_MAX_THREADS)?
                .filter(|v| *v > 0)
                .map(to_usize),
            queue_size: props
                .get_i64(keys::EXECUTOR_QUEUE_SIZE)?
                .filter(|v| *v > 0)
                .map(to_usize),
        };

        let broker = BrokerConfig {
            url: owned(props.get(keys::BROKER_URL)),
            queue: owned(props.get(keys::QUEUE)),
            concurrent_consumers: props
                .get_i64(keys::CONCURRENT_CONSUMERS)?
                .filter(|v| *v > 0)
                .map(to_usize),
        };

        Ok(Self {
            connection,
            executor,
            broker,
        })
    }
}

/// Immutable run settings, resolved once at startup and passed to each component.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: DispatchMode,
    pub display_stats: bool,

    /// Instances to start. Zero or negative means no load generation and no target.
    pub instances: i64,
    pub start_delay: Duration,
    pub start_threads: usize,
    pub start_pacing: StartPacing,

    /// Finished-instance count that ends the run. `None` never stops.
    pub expected_instances: Option<u64>,
    pub sampling_interval: Duration,

    pub jobs_per_instance: u64,
    pub process_definition_key: String,
    pub stats_file: PathBuf,

    pub engine: EngineConfig,
}

impl RunConfig {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mode = match props.get(keys::MODE) {
            Some(raw) => DispatchMode::from_config_str(raw)?,
            None => DispatchMode::Embedded,
        };

        let display_stats = props.get_bool(keys::DISPLAY_STATS)?.unwrap_or(false);
        let instances = props.get_i64(keys::NR_PROCESS_INSTANCES)?.unwrap_or(-1);

        let start_delay = match props.get_i64(keys::START_DELAY)? {
            None => Duration::ZERO,
            Some(ms) if ms >= 0 => Duration::from_millis(ms.unsigned_abs()),
            Some(ms) => {
                return Err(Error::invalid(
                    keys::START_DELAY,
                    &ms.to_string(),
                    "a non-negative number of milliseconds",
                ));
            }
        };

        let start_threads = match props.get_i64(keys::START_THREADS)? {
            Some(v) if v > 0 => to_usize(v),
            Some(v) if instances > 0 => {
                return Err(Error::invalid(
                    keys::START_THREADS,
                    &v.to_string(),
                    "a positive pool size",
                ));
            }
            None if instances > 0 => return Err(Error::missing(keys::START_THREADS)),
            _ => 1,
        };

        let start_pacing = match props.get(keys::START_PACING) {
            None => StartPacing::default(),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::invalid(keys::START_PACING, raw, "`burst` or `staggered`"))?,
        };

        let expected_instances = match props.get_i64(keys::EXPECTED_PROCESS_INSTANCES)? {
            Some(v) => u64::try_from(v).ok(),
            // Only a run that starts instances can default to its own count.
            None if mode.starts_instances() => u64::try_from(instances).ok().filter(|n| *n > 0),
            None => None,
        };

        let jobs_per_instance = positive(props, keys::JOBS_PER_INSTANCE)?
            .map_or(DEFAULT_JOBS_PER_INSTANCE, i64::unsigned_abs);

        let process_definition_key = props
            .get(keys::PROCESS_DEFINITION_KEY)
            .unwrap_or(DEFAULT_PROCESS_DEFINITION_KEY)
            .to_string();

        let stats_file = PathBuf::from(props.get(keys::STATS_FILE).unwrap_or(DEFAULT_STATS_FILE));

        Ok(Self {
            mode,
            display_stats,
            instances,
            start_delay,
            start_threads,
            start_pacing,
            expected_instances,
            sampling_interval: SAMPLING_INTERVAL,
            jobs_per_instance,
            process_definition_key,
            stats_file,
            engine: EngineConfig::from_properties(props)?,
        })
    }

    /// Number of instances this invocation starts, if any.
    #[must_use]
    pub fn target_instances(&self) -> Option<u64> {
        if !self.mode.starts_instances() {
            return None;
        }
        u64::try_from(self.instances).ok().filter(|n| *n > 0)
    }

    /// Whether this invocation does only half of the work: starting instances whose jobs
    /// another process executes, or executing jobs another process started.
    #[must_use]
    pub fn needs_peer_process(&self) -> bool {
        self.mode.uses_queue() || self.engine.executor.max_threads.is_none()
    }

    /// Settings that make the run unable to terminate or to reach its target.
    ///
    /// These are not errors: a shared store may receive work from other invocations.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();

        if self.display_stats && self.expected_instances.is_none() {
            out.push(format!(
                "`{}` is not set; sampling will never stop on its own",
                keys::EXPECTED_PROCESS_INSTANCES
            ));
        }

        if let (Some(target), Some(expected)) = (self.target_instances(), self.expected_instances)
            && expected > target
        {
            out.push(format!(
                "expecting {expected} finished instances but this run starts only {target}"
            ));
        }

        if self.instances > 0 && !self.mode.starts_instances() {
            out.push(format!(
                "`{}` is ignored in `{}` mode",
                keys::NR_PROCESS_INSTANCES,
                self.mode
            ));
        }

        out
    }
}

fn owned(v: Option<&str>) -> Option<String> {
    v.map(str::to_string)
}

fn to_usize(v: i64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

fn positive(props: &Properties, key: &str) -> Result<Option<i64>> {
    match props.get_i64(key)? {
        Some(v) if v <= 0 => Err(Error::invalid(key, &v.to_string(), "a positive integer")),
        other => Ok(other),
    }
}

fn non_negative(props: &Properties, key: &str) -> Result<Option<i64>> {
    match props.get_i64(key)? {
        Some(v) if v < 0 => Err(Error::invalid(key, &v.to_string(), "a non-negative integer")),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(text: &str) -> Properties {
        Properties::parse(text)
    }

    #[test]
    fn mode_accepts_names_and_legacy_aliases() {
        let cases = [
            ("embedded", DispatchMode::Embedded),
            ("executor", DispatchMode::Embedded),
            ("producer", DispatchMode::Embedded),
            ("queue-producer", DispatchMode::QueueProducer),
            ("message-producer", DispatchMode::QueueProducer),
            ("queue-consumer", DispatchMode::QueueConsumer),
            ("message-executor", DispatchMode::QueueConsumer),
        ];
        for (raw, expected) in cases {
            match DispatchMode::from_config_str(raw) {
                Ok(mode) => assert_eq!(mode, expected, "{raw}"),
                Err(err) => panic!("{raw}: {err}"),
            }
        }

        assert_eq!(DispatchMode::QueueConsumer.to_string(), "queue-consumer");
        assert!(matches!(
            DispatchMode::from_config_str("carrier-pigeon"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn empty_config_resolves_defaults() {
        let cfg = match RunConfig::from_properties(&props("")) {
            Ok(v) => v,
            Err(err) => panic!("empty config should resolve: {err}"),
        };

        assert_eq!(cfg.mode, DispatchMode::Embedded);
        assert!(!cfg.display_stats);
        assert_eq!(cfg.instances, -1);
        assert_eq!(cfg.start_delay, Duration::ZERO);
        assert_eq!(cfg.expected_instances, None);
        assert_eq!(cfg.sampling_interval, SAMPLING_INTERVAL);
        assert_eq!(cfg.jobs_per_instance, 27);
        assert_eq!(cfg.process_definition_key, "AsyncProcess");
        assert_eq!(cfg.stats_file, PathBuf::from("output.txt"));
        assert_eq!(cfg.engine.connection.max_pool_size, 100);
        assert_eq!(cfg.engine.executor.max_threads, None);
        assert_eq!(cfg.target_instances(), None);
    }

    #[test]
    fn bounded_run_resolves_expected_count_and_pool() {
        let cfg = match RunConfig::from_properties(&props(
            "nr-process-instances=10\ndelay-between-process-instance-start=25\nstart-process-instance-threads=4\nasync-executor-max-nr-threads=8\nasync-executor-queue-size=0\nstart-pacing=staggered\n",
        )) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };

        assert_eq!(cfg.target_instances(), Some(10));
        assert_eq!(cfg.expected_instances, Some(10));
        assert_eq!(cfg.start_delay, Duration::from_millis(25));
        assert_eq!(cfg.start_threads, 4);
        assert_eq!(cfg.start_pacing, StartPacing::Staggered);
        assert_eq!(cfg.engine.executor.max_threads, Some(8));
        assert_eq!(cfg.engine.executor.queue_size, None);
    }

    #[test]
    fn bounded_run_requires_a_start_pool() {
        let res = RunConfig::from_properties(&props("nr-process-instances=10\n"));
        assert!(matches!(res, Err(Error::Configuration(_))));

        let res = RunConfig::from_properties(&props(
            "nr-process-instances=10\nstart-process-instance-threads=0\n",
        ));
        assert!(matches!(res, Err(Error::Configuration(_))));
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        for text in [
            "mode=sideways\n",
            "display-stats=perhaps\n",
            "delay-between-process-instance-start=-5\n",
            "jobs-per-instance=0\n",
            "connections-max=lots\n",
            "start-pacing=random\n",
        ] {
            let res = RunConfig::from_properties(&props(text));
            assert!(matches!(res, Err(Error::Configuration(_))), "{text}");
        }
    }

    #[test]
    fn negative_expected_count_means_no_target() {
        let cfg = match RunConfig::from_properties(&props(
            "mode=queue-consumer\ndisplay-stats=true\nexpected-process-instances=-1\n",
        )) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };
        assert_eq!(cfg.expected_instances, None);
        assert_eq!(cfg.warnings().len(), 1);
    }

    #[test]
    fn consumer_never_starts_instances() {
        let cfg = match RunConfig::from_properties(&props(
            "mode=queue-consumer\nnr-process-instances=5\nstart-process-instance-threads=1\n",
        )) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };
        assert_eq!(cfg.target_instances(), None);
        assert!(cfg.warnings().iter().any(|w| w.contains("ignored")));
    }

    #[test]
    fn only_embedded_with_executor_is_self_contained() {
        let resolve = |text: &str| match RunConfig::from_properties(&props(text)) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };

        assert!(!resolve("async-executor-max-nr-threads=4
").needs_peer_process());
        assert!(resolve("").needs_peer_process());
        assert!(resolve("async-executor-max-nr-threads=0
").needs_peer_process());
        assert!(
            resolve("mode=queue-producer
async-executor-max-nr-threads=4
").needs_peer_process()
        );
        assert!(resolve("mode=queue-consumer
").needs_peer_process());
    }

    #[test]
    fn consumer_does_not_derive_expected_count_from_instances() {
        let cfg = match RunConfig::from_properties(&props(
            "mode=queue-consumer\ndisplay-stats=true\nnr-process-instances=5\nstart-process-instance-threads=1\n",
        )) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };
        assert_eq!(cfg.expected_instances, None);
        let warnings = cfg.warnings();
        assert!(warnings.iter().any(|w| w.contains("ignored")), "{warnings:?}");
        assert!(warnings.iter().any(|w| w.contains("never stop")), "{warnings:?}");

        let cfg = match RunConfig::from_properties(&props(
            "mode=queue-consumer\ndisplay-stats=true\nnr-process-instances=5\nstart-process-instance-threads=1\n\
             expected-process-instances=5\n",
        )) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };
        assert_eq!(cfg.expected_instances, Some(5));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let cfg = match EngineConfig::from_properties(&props("jdbc-password=hunter2\n")) {
            Ok(v) => v,
            Err(err) => panic!("config should resolve: {err}"),
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
