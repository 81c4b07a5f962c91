//! Error types for the allotment engine

use thiserror::Error;

use crate::applicant::{ApplicationId, IpoId};

/// Result type for allotment operations
pub type AllotResult<T> = Result<T, AllotError>;

/// Allotment engine error types
#[derive(Debug, Error)]
pub enum AllotError {
    /// Application lookup returned nothing for an approved mandate
    #[error("Application not found in directory: {application_id}")]
    LookupMiss {
        /// Application that could not be resolved
        application_id: ApplicationId,
    },

    /// Application lookup could not be completed
    #[error("Application lookup failed: {0}")]
    LookupFailed(String),

    /// A draw already exists for this IPO
    #[error("Allotment already drawn for IPO {ipo_id}")]
    AlreadyDrawn {
        /// IPO identifier
        ipo_id: IpoId,
    },

    /// Draw input rejected before the lottery ran
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Inbound event rejected at the boundary
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Allotment record could not be durably written
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Record persisted but the outcome event was not emitted
    #[error("Publication failed for IPO {ipo_id}: {message}")]
    PublicationFailure {
        /// IPO identifier
        ipo_id: IpoId,
        /// Error message
        message: String,
    },

    /// Applicant not tracked
    #[error("Applicant not found: {0}")]
    ApplicantNotFound(ApplicationId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AllotError {
    /// Check if the failed operation may succeed when redelivered or retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllotError::LookupMiss { .. }
                | AllotError::LookupFailed(_)
                | AllotError::PersistenceFailure(_)
                | AllotError::PublicationFailure { .. }
                | AllotError::HttpError(_)
        )
    }

    /// Check if error reports a second draw attempt
    pub fn is_already_drawn(&self) -> bool {
        matches!(self, AllotError::AlreadyDrawn { .. })
    }

    /// Check if the draw persisted but its publication is still owed
    pub fn is_recoverable_partial(&self) -> bool {
        matches!(self, AllotError::PublicationFailure { .. })
    }
}
