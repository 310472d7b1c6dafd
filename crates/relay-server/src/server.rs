//! `RelayServer`: router assembly, listener and shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use relay_core::Normalizer;
use relay_settings::RelaySettings;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backend::NotehubClient;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::connection::{serve_subscriber, ConnectionConfig};
use crate::websocket::registry::SubscriberRegistry;
use crate::{ingest, pages, proxy};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub normalizer: Arc<Normalizer>,
    pub backend: Arc<NotehubClient>,
    pub connection: ConnectionConfig,
    /// Root of the viewer pages and static assets.
    pub static_dir: Arc<PathBuf>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let assets = ServeDir::new(state.static_dir.as_path());

    Router::new()
        .route("/webhook/normal", post(ingest::normal))
        .route("/webhook/anomalous", post(ingest::anomalous))
        .route("/ws", get(ws_handler))
        .route("/api/device/{dev_id}", get(proxy::fetch_device))
        .route("/api/device/{dev_id}/claim", post(proxy::claim_device))
        .route("/claim/{dev_id}", get(pages::device_page))
        .route("/health", get(health_handler))
        .fallback_service(assets)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The relay: webhook ingestion, push fan-out and Notehub proxy on one port.
pub struct RelayServer {
    settings: RelaySettings,
    state: AppState,
}

impl RelayServer {
    /// Build shared state and the backend client. Does not bind.
    pub fn new(settings: RelaySettings) -> Result<Self, ServerError> {
        let registry = Arc::new(SubscriberRegistry::new(settings.subscribers.queue_capacity));
        let state = AppState {
            broadcaster: Arc::new(Broadcaster::new(Arc::clone(&registry))),
            registry,
            normalizer: Arc::new(Normalizer::new()),
            backend: Arc::new(NotehubClient::new(&settings.backend)?),
            connection: ConnectionConfig::from(&settings.subscribers),
            static_dir: Arc::new(PathBuf::from(&settings.server.static_dir)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        };
        Ok(Self { settings, state })
    }

    /// Router over this server's state, for `listen` or in-process tests.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.settings.server.max_body_bytes)
    }

    /// Bind `host:port` and serve until shutdown is requested.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server error");
            }
        });

        info!(
            addr = %local_addr,
            static_dir = %self.state.static_dir.display(),
            "relay server started"
        );
        Ok((local_addr, handle))
    }

    /// Stop accepting, close every subscriber, and wait for the serve task.
    pub async fn shutdown(&self, serve: JoinHandle<()>) {
        self.state.shutdown.shutdown();
        let closed = self.state.registry.close_all();
        info!(subscribers = closed, "closing subscribers");
        self.state.shutdown.graceful_shutdown(vec![serve], None).await;
        info!("relay server stopped");
    }

    /// Live subscriber membership.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.state.registry
    }

    /// Shutdown token shared with every connection task.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let registry = Arc::clone(&state.registry);
    let config = state.connection;
    let token = state.shutdown.token();
    ws.on_upgrade(move |socket| serve_subscriber(socket, registry, config, token))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}
