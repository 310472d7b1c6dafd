//! Push-channel subscribers: membership, fan-out and per-connection lifecycle.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod subscriber;
