//! # relay-core
//!
//! Domain types shared by the relay crates.
//!
//! - [`envelope`]: the canonical event unit handed from ingestion to broadcast
//! - [`payload`]: transport-level decoding of inbound webhook bodies
//! - [`normalizer`]: turns a category plus raw body into an [`Envelope`]
//! - [`errors`]: the error taxonomy surfaced at the HTTP edge

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod normalizer;
pub mod payload;

pub use envelope::{Envelope, EventCategory};
pub use errors::{RelayError, Result};
pub use normalizer::{MonotonicClock, Normalizer};
pub use payload::RawBody;
