//! Viewer pages.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::warn;

use crate::server::AppState;

const DEVICE_PAGE: &str = "device.html";

/// GET /claim/{dev_id}
///
/// Serves the device page for any id without a `.`; dotted ids are treated
/// as asset requests that do not exist.
pub async fn device_page(State(state): State<AppState>, Path(dev_id): Path<String>) -> Response {
    if dev_id.contains('.') {
        return not_found();
    }
    let path = state.static_dir.join(DEVICE_PAGE);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "device page unavailable");
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
