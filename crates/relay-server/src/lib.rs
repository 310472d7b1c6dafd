//! # relay-server
//!
//! Axum HTTP + `WebSocket` server relaying Notehub webhooks to live viewers.
//!
//! - Webhook ingestion: `POST /webhook/{normal,anomalous}`, acknowledged
//!   before delivery completes
//! - `WebSocket` fan-out: per-subscriber bounded queues, write timeouts,
//!   heartbeat, self-healing registry membership
//! - Notehub proxy: device lookup and fleet claim without exposing the token
//! - Viewer pages and static assets, `/health`, graceful shutdown

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod health;
pub mod ingest;
pub mod pages;
pub mod proxy;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use error::{ApiError, ServerError};
pub use server::{AppState, RelayServer};
