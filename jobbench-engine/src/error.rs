pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported jdbc url `{0}` (expected jdbc:memory:<name>)")]
    UnsupportedDatabase(String),

    #[error("unsupported broker url `{0}` (expected memory://<name>)")]
    UnsupportedBroker(String),

    #[error("authentication failed for user `{user}`")]
    Authentication { user: String },

    #[error("unknown process definition `{0}`")]
    UnknownDefinition(String),

    #[error("no deployed process definition with key `{0}`")]
    NotDeployed(String),

    #[error("job {0} does not exist")]
    UnknownJob(u64),

    #[error("malformed job message ({0} bytes)")]
    MalformedMessage(usize),

    #[error("process engine is closed")]
    Closed,
}
