//! Webhook ingestion: `POST /webhook/normal` and `POST /webhook/anomalous`.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use relay_core::{EventCategory, RawBody};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::server::AppState;

/// Fixed acknowledgment returned to the webhook sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn received() -> Self {
        Self {
            status: "received".into(),
        }
    }
}

/// POST /webhook/normal
pub async fn normal(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    receive(&state, EventCategory::Normal, &headers, &body)
}

/// POST /webhook/anomalous
pub async fn anomalous(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    receive(&state, EventCategory::Anomalous, &headers, &body)
}

/// Normalize, hand off to the broadcaster, acknowledge.
///
/// The broadcaster only enqueues, so the response never waits on
/// subscriber sockets.
fn receive(
    state: &AppState,
    category: EventCategory,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<Ack>, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let envelope = state
        .normalizer
        .normalize(category, RawBody::new(content_type, body))
        .map_err(|e| {
            warn!(%category, content_type, error = %e, "rejected webhook");
            e
        })?;

    info!(
        %category,
        timestamp = %envelope.received_at(),
        bytes = body.len(),
        "webhook received"
    );
    let _ = state.broadcaster.broadcast(&envelope);

    Ok(Json(Ack::received()))
}
