//! # parley-settings
//!
//! Configuration for the Parley client, loaded from three layers (in
//! priority order):
//!
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **Settings file**: `~/.parley/settings.json`, or an explicit path
//! 3. **Environment variables**: `PARLEY_<SECTION>__<FIELD>` overrides
//!    (highest priority), e.g. `PARLEY_KEEP_ALIVE__CADENCE_MS=15000`
//!
//! Every policy constant of the connection core lives here: keep-alive
//! cadence and missed-response multiplier, the device-mismatch error
//! window, and receive timeouts/backoff.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{KeepAliveSettings, LoggingSettings, MismatchSettings, ParleySettings, ReceiveSettings};
