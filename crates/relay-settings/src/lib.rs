//! # relay-settings
//!
//! Configuration for the relay, loaded in three layers (lowest first):
//! 1. **Compiled defaults** — [`RelaySettings::default()`]
//! 2. **Settings file** — JSON at `RELAY_SETTINGS_PATH`, deep-merged over defaults
//! 3. **Environment variables** — `PORT`, `PROJECT_UID`, `API_TOKEN`, `RELAY_*`
//!
//! Backend credentials are never validated here; a missing token only
//! shows up when the first proxy call is rejected by the backend.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::*;
