use crate::config::DispatchMode;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an engine collaborator (bootstrap, queries, starts).
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed settings. Raised before any work starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to build `{mode}` engine: {source}")]
    EngineBuild {
        mode: DispatchMode,
        #[source]
        source: EngineError,
    },

    #[error("failed to deploy process definition `{key}`: {source}")]
    Deploy {
        key: String,
        #[source]
        source: EngineError,
    },

    /// A single counter poll failed; the tick is skipped.
    #[error("sampling tick {tick} failed: {source}")]
    Sampling {
        tick: u64,
        #[source]
        source: EngineError,
    },

    /// A single instance start (or message) failed; the rest of the batch continues.
    #[error("dispatch of {unit} failed: {source}")]
    Dispatch {
        unit: String,
        #[source]
        source: EngineError,
    },

    #[error("cannot compute throughput: {0}")]
    Reporting(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn missing(key: &str) -> Self {
        Self::Configuration(format!("`{key}` is required"))
    }

    pub(crate) fn invalid(key: &str, value: &str, expected: &str) -> Self {
        Self::Configuration(format!("`{key}` = `{value}` is invalid (expected {expected})"))
    }
}
