#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Invalid CLI/config input (bad flags, unreadable config file, malformed settings).
    InvalidInput = 30,

    /// Engine or runtime failure (bootstrap, deployment, stats file IO, panics in tasks).
    RuntimeError = 40,

    /// The run completed but throughput could not be computed.
    ReportingFailed = 50,

    /// Stopped by Ctrl-C before the completion condition was met.
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
