//! Relay error types.

use thiserror::Error;

/// Errors produced by the ingestion, delivery and proxy paths.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound body could not be decoded by the transport layer.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// A write to one subscriber failed. Contained inside the broadcaster.
    #[error("delivery to {subscriber} failed: {reason}")]
    DeliveryFailure {
        /// Subscriber that missed the envelope.
        subscriber: String,
        /// What went wrong.
        reason: String,
    },
    /// The backend API timed out or could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A proxy request is missing a required field.
    #[error("{0}")]
    Validation(String),
}

impl RelayError {
    /// Short machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::DeliveryFailure { .. } => "DELIVERY_FAILURE",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Validation(_) => "VALIDATION_FAILURE",
        }
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
