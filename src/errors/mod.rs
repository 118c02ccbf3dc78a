pub mod reason;
pub mod status_codes;

pub use reason::ErrorReason;
pub use status_codes::{StatusBand, StatusCodeRegistry};

use thiserror::Error;

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{message}")]
    Api {
        message: String,
        reason: ErrorReason,
        status: Option<u16>,
    },

    #[error("{message}")]
    Monitor { message: String, reason: ErrorReason },

    #[error("{message}")]
    EnvironmentSetup { message: String, reason: ErrorReason },

    #[error("{message}")]
    Workload { message: String, reason: ErrorReason },

    #[error("{message}")]
    WorkloadResults { message: String, reason: ErrorReason },

    #[error("{message}")]
    Dependency { message: String, reason: ErrorReason },

    #[error("{message}")]
    Process { message: String, reason: ErrorReason },

    #[error("{message}")]
    Startup {
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    #[error("{message}")]
    Schema { message: String },
}

impl OrchestrationError {
    pub fn api(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::Api {
            message: message.into(),
            reason,
            status: None,
        }
    }

    /// Translates a non-success HTTP status into an Api error. An override reason wins over the
    /// status-derived one.
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        override_reason: Option<ErrorReason>,
    ) -> Self {
        let reason = override_reason.unwrap_or(match status {
            400 => ErrorReason::Http400BadRequestResponse,
            403 => ErrorReason::Http403ForbiddenResponse,
            404 => ErrorReason::Http404NotFoundResponse,
            409 => ErrorReason::Http409ConflictResponse,
            _ => ErrorReason::HttpNonSuccessResponse,
        });

        Self::Api {
            message: message.into(),
            reason,
            status: Some(status),
        }
    }

    pub fn monitor(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::Monitor {
            message: message.into(),
            reason,
        }
    }

    pub fn environment_setup(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::EnvironmentSetup {
            message: message.into(),
            reason,
        }
    }

    pub fn workload(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::Workload {
            message: message.into(),
            reason,
        }
    }

    pub fn workload_results(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::WorkloadResults {
            message: message.into(),
            reason,
        }
    }

    pub fn dependency(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::Dependency {
            message: message.into(),
            reason,
        }
    }

    pub fn process(message: impl Into<String>, reason: ErrorReason) -> Self {
        Self::Process {
            message: message.into(),
            reason,
        }
    }

    pub fn startup(message: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::Startup {
            message: message.into(),
            source: source.map(Into::into),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            Self::Api { reason, .. }
            | Self::Monitor { reason, .. }
            | Self::EnvironmentSetup { reason, .. }
            | Self::Workload { reason, .. }
            | Self::WorkloadResults { reason, .. }
            | Self::Dependency { reason, .. }
            | Self::Process { reason, .. } => Some(*reason),
            Self::Startup { .. } | Self::Schema { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api { .. } => "Api",
            Self::Monitor { .. } => "Monitor",
            Self::EnvironmentSetup { .. } => "EnvironmentSetup",
            Self::Workload { .. } => "Workload",
            Self::WorkloadResults { .. } => "WorkloadResults",
            Self::Dependency { .. } => "Dependency",
            Self::Process { .. } => "Process",
            Self::Startup { .. } => "Startup",
            Self::Schema { .. } => "Schema",
        }
    }
}

/// Finds the first classified error in an error chain.
pub fn classify(error: &anyhow::Error) -> Option<&OrchestrationError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<OrchestrationError>())
}
