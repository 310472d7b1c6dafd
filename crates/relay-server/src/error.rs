//! HTTP-edge error mapping and server startup errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::RelayError;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting on the listener failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
    /// The backend HTTP client could not be built.
    #[error("failed to build backend client: {0}")]
    Backend(#[from] reqwest::Error),
}

/// JSON error body: `{"error": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// A [`RelayError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// A backend failure, reported as 500 under `context` with the cause in
    /// `message`.
    pub fn backend(context: &str, err: RelayError) -> Self {
        warn!(code = err.code(), error = %err, "{context}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: context.to_string(),
                message: Some(err.to_string()),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let (status, error) = match &err {
            RelayError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            RelayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RelayError::BackendUnavailable(_) | RelayError::DeliveryFailure { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        Self {
            status,
            body: ErrorBody {
                error,
                message: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_is_400_with_verbatim_message() {
        let resp = ApiError::from(RelayError::Validation("fleetUID is required".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, serde_json::json!({"error": "fleetUID is required"}));
    }

    #[tokio::test]
    async fn malformed_is_400() {
        let resp = ApiError::from(RelayError::MalformedPayload("invalid JSON".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn backend_failure_is_500_with_context() {
        let err = ApiError::backend(
            "Failed to fetch device data",
            RelayError::BackendUnavailable("connection refused".into()),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], "Failed to fetch device data");
        assert!(body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[test]
    fn server_error_from_io() {
        let err: ServerError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use").into();
        assert!(err.to_string().contains("in use"));
    }
}
