mod config;
mod engine;
mod error;
mod factory;
mod load;
mod properties;
mod report;
mod run;
mod sampler;
mod stats;

pub use config::{
    BrokerConfig, ConnectionConfig, DEFAULT_JOBS_PER_INSTANCE, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_PROCESS_DEFINITION_KEY, DEFAULT_STATS_FILE, DispatchMode, EMBEDDED_ACQUIRE_WAIT,
    EngineConfig, ExecutorConfig, QUEUE_ACQUIRE_WAIT, RunConfig, SAMPLING_INTERVAL, StartPacing,
    keys,
};
pub use engine::{
    EngineCounters, EngineFuture, EngineHandle, ProcessEngine, ProgressObserver, StartVariables,
};
pub use error::{EngineError, Error, Result};
pub use factory::{
    ConnectionSpec, DestinationSpec, EngineBootstrap, EngineFactory, EngineSpec,
    LocalExecutorSpec, Topology,
};
pub use load::{LoadGenerator, LoadHandle, LoadOutcome};
pub use properties::Properties;
pub use report::{RunResult, ThroughputReporter};
pub use run::{CompletedRun, Harness, RunOutcome};
pub use sampler::{
    CompletionSampler, SampleFn, SamplerState, SamplerSummary, StopCondition, Tick,
};
pub use stats::{DelimitedStatsSink, STATS_HEADER, Sample, StatsSink};
