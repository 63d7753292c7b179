use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    EngineError(anyhow::Error),
    ReportingError(anyhow::Error),
    Interrupted(anyhow::Error),
}

impl RunError {
    /// Classifies a harness error by the phase it came from.
    pub fn from_core(err: jobbench_core::Error) -> Self {
        use jobbench_core::Error;

        match err {
            Error::Configuration(_) => Self::InvalidInput(err.into()),
            Error::Reporting(_) => Self::ReportingError(err.into()),
            Error::EngineBuild { .. }
            | Error::Deploy { .. }
            | Error::Sampling { .. }
            | Error::Dispatch { .. }
            | Error::Io(_)
            | Error::Join(_) => Self::EngineError(err.into()),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::EngineError(_) => ExitCode::RuntimeError,
            Self::ReportingError(_) => ExitCode::ReportingFailed,
            Self::Interrupted(_) => ExitCode::Interrupted,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e)
            | Self::EngineError(e)
            | Self::ReportingError(e)
            | Self::Interrupted(e) => e,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}
