use thiserror::Error;

#[derive(Debug, Error)]
pub enum GreenrouteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Route not found: {weekday} #{index}")]
    RouteNotFound { weekday: String, index: usize },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Completing these jobs needs an explicit go-ahead: they are not due yet.
    #[error("Confirmation required for {} job(s) that are not due: {}", .job_ids.len(), .job_ids.join(", "))]
    ConfirmationRequired { job_ids: Vec<String> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GreenrouteError {
    /// Short error code string for machine-readable CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            GreenrouteError::Config(_) => "CONFIG_ERROR",
            GreenrouteError::JobNotFound { .. } => "JOB_NOT_FOUND",
            GreenrouteError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GreenrouteError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            GreenrouteError::ConfirmationRequired { .. } => "CONFIRMATION_REQUIRED",
            GreenrouteError::InvalidInput(_) => "INVALID_INPUT",
            GreenrouteError::Persistence(_) => "PERSISTENCE_ERROR",
            GreenrouteError::Serialization(_) => "SERIALIZATION_ERROR",
            GreenrouteError::Io(_) => "IO_ERROR",
            GreenrouteError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GreenrouteError>;
