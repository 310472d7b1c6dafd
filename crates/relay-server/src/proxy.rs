//! Notehub proxy: `GET /api/device/{devID}` and `POST /api/device/{devID}/claim`.
//!
//! The API token stays server-side; backend status and body are forwarded
//! unchanged.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use relay_core::{RawBody, RelayError};
use serde_json::Value;
use tracing::info;

use crate::backend::BackendResponse;
use crate::error::ApiError;
use crate::server::AppState;

/// GET /api/device/{dev_id}
pub async fn fetch_device(
    State(state): State<AppState>,
    Path(dev_id): Path<String>,
) -> Result<Response, ApiError> {
    let resp = state
        .backend
        .fetch_device(&dev_id)
        .await
        .map_err(|e| ApiError::backend("Failed to fetch device data", e))?;
    info!(dev_id = %dev_id, status = resp.status.as_u16(), "device lookup");
    Ok(passthrough(resp))
}

/// POST /api/device/{dev_id}/claim
///
/// Body must carry a non-empty string `fleetUID`; nothing reaches the
/// backend otherwise.
pub async fn claim_device(
    State(state): State<AppState>,
    Path(dev_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let fleet_uid = fleet_uid(&headers, &body)?;
    let resp = state
        .backend
        .claim_device(&dev_id, &fleet_uid)
        .await
        .map_err(|e| ApiError::backend("Failed to claim device", e))?;
    info!(dev_id = %dev_id, fleet_uid = %fleet_uid, status = resp.status.as_u16(), "device claim");
    Ok(passthrough(resp))
}

fn fleet_uid(headers: &HeaderMap, body: &[u8]) -> Result<String, RelayError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let parsed = RawBody::new(content_type, body).decode()?;
    match parsed.get("fleetUID") {
        Some(Value::String(uid)) if !uid.is_empty() => Ok(uid.clone()),
        _ => Err(RelayError::Validation("fleetUID is required".into())),
    }
}

fn passthrough(resp: BackendResponse) -> Response {
    let mut out = (resp.status, resp.body).into_response();
    if let Some(ct) = resp.content_type {
        let _ = out.headers_mut().insert(CONTENT_TYPE, ct);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        let _ = h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }

    #[test]
    fn fleet_uid_from_json() {
        let uid = fleet_uid(&json_headers(), br#"{"fleetUID":"fleet:1"}"#).unwrap();
        assert_eq!(uid, "fleet:1");
    }

    #[test]
    fn fleet_uid_from_form() {
        let mut h = HeaderMap::new();
        let _ = h.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        assert_eq!(fleet_uid(&h, b"fleetUID=fleet%3A9").unwrap(), "fleet:9");
    }

    #[test]
    fn missing_fleet_uid_is_validation_error() {
        for body in [
            &b""[..],
            &br#"{}"#[..],
            &br#"{"fleetUID":""}"#[..],
            &br#"{"fleetUID":7}"#[..],
        ] {
            let err = fleet_uid(&json_headers(), body).unwrap_err();
            assert!(matches!(err, RelayError::Validation(ref m) if m == "fleetUID is required"));
        }
    }

    #[test]
    fn malformed_claim_body() {
        let err = fleet_uid(&json_headers(), b"{nope").unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
    }

    #[test]
    fn passthrough_keeps_status_and_type() {
        let resp = passthrough(BackendResponse {
            status: axum::http::StatusCode::FORBIDDEN,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"err":"forbidden"}"#),
        });
        assert_eq!(resp.status(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
    }
}
