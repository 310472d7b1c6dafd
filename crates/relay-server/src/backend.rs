//! Notehub API client used by the proxy endpoints.
//!
//! Plain pass-through: no retry, no caching. Every call carries the bearer
//! token and the configured request timeout.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use relay_core::RelayError;
use relay_settings::BackendSettings;
use serde_json::json;
use tracing::{debug, instrument};

/// Status, content type and body of a backend response, forwarded verbatim.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client for the device and fleet endpoints of one Notehub project.
pub struct NotehubClient {
    http: reqwest::Client,
    base_url: String,
    project_uid: String,
    api_token: String,
    timeout: Duration,
}

impl NotehubClient {
    pub fn new(settings: &BackendSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            project_uid: settings.project_uid.clone(),
            api_token: settings.api_token.clone(),
            timeout: settings.timeout(),
        })
    }

    /// `GET /v1/projects/{project}/devices/{devID}`
    #[instrument(skip(self))]
    pub async fn fetch_device(&self, dev_id: &str) -> Result<BackendResponse, RelayError> {
        let url = self.endpoint(&["devices", dev_id])?;
        let request = self.http.get(url).bearer_auth(&self.api_token);
        self.execute(request).await
    }

    /// `PUT /v1/projects/{project}/fleets/{fleetUID}` with `{"addDevices": [devID]}`
    #[instrument(skip(self))]
    pub async fn claim_device(
        &self,
        dev_id: &str,
        fleet_uid: &str,
    ) -> Result<BackendResponse, RelayError> {
        let url = self.endpoint(&["fleets", fleet_uid])?;
        let request = self
            .http
            .put(url)
            .bearer_auth(&self.api_token)
            .json(&json!({ "addDevices": [dev_id] }));
        self.execute(request).await
    }

    /// Project-scoped URL with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            RelayError::BackendUnavailable(format!("invalid backend URL {}: {e}", self.base_url))
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                RelayError::BackendUnavailable(format!("backend URL {} cannot be a base", self.base_url))
            })?;
            let _ = path
                .pop_if_empty()
                .extend(["v1", "projects", self.project_uid.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<BackendResponse, RelayError> {
        let response = request.send().await.map_err(|e| self.unavailable(&e))?;
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|e| self.unavailable(&e))?;
        debug!(status = status.as_u16(), bytes = body.len(), "backend responded");
        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }

    fn unavailable(&self, e: &reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::BackendUnavailable(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            RelayError::BackendUnavailable(e.to_string())
        }
    }
}
