//! Settings schema.
//!
//! All durations are stored as integer milliseconds so the JSON file and
//! environment overrides stay plain numbers; each section exposes typed
//! [`Duration`] accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleySettings {
    /// Keep-alive scheduling.
    pub keep_alive: KeepAliveSettings,
    /// Device-mismatch error storm detection.
    pub mismatch: MismatchSettings,
    /// Receive loop behavior.
    pub receive: ReceiveSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject values that would disable or break the connection core.
    pub fn validate(&self) -> Result<()> {
        self.keep_alive.validate()?;
        self.mismatch.validate()?;
        self.receive.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keep-alive
// ─────────────────────────────────────────────────────────────────────────────

/// Default interval between keep-alive pings.
pub const DEFAULT_KEEP_ALIVE_CADENCE_MS: u64 = 30_000;
/// Default number of cadences without a response before the connection is dead.
pub const DEFAULT_MISSED_MULTIPLIER: u32 = 3;

/// Keep-alive scheduling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveSettings {
    /// Interval between keep-alive pings.
    pub cadence_ms: u64,
    /// A channel whose last keep-alive response is older than
    /// `cadence * missed_multiplier` is presumed dead.
    pub missed_multiplier: u32,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self {
            cadence_ms: DEFAULT_KEEP_ALIVE_CADENCE_MS,
            missed_multiplier: DEFAULT_MISSED_MULTIPLIER,
        }
    }
}

impl KeepAliveSettings {
    /// Interval between keep-alive pings.
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    /// Maximum age of the last keep-alive response.
    pub fn max_response_age(&self) -> Duration {
        self.cadence().saturating_mul(self.missed_multiplier)
    }

    fn validate(&self) -> Result<()> {
        if self.cadence_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "keep_alive.cadence_ms",
                reason: "must be greater than zero",
            });
        }
        if self.missed_multiplier == 0 {
            return Err(SettingsError::Invalid {
                field: "keep_alive.missed_multiplier",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mismatch errors
// ─────────────────────────────────────────────────────────────────────────────

/// Default status code treated as a device mismatch.
pub const DEFAULT_MISMATCH_STATUS: u16 = 409;
/// Default number of mismatch errors that constitutes a storm.
pub const DEFAULT_MISMATCH_SAMPLES: usize = 5;
/// Default width of the mismatch error window.
pub const DEFAULT_MISMATCH_WINDOW_MS: u64 = 60_000;

/// Device-mismatch error storm detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MismatchSettings {
    /// Status code counted as a mismatch error.
    pub status: u16,
    /// Errors within `window_ms` that force a reconnect.
    pub samples: usize,
    /// Width of the sliding window.
    pub window_ms: u64,
}

impl Default for MismatchSettings {
    fn default() -> Self {
        Self {
            status: DEFAULT_MISMATCH_STATUS,
            samples: DEFAULT_MISMATCH_SAMPLES,
            window_ms: DEFAULT_MISMATCH_WINDOW_MS,
        }
    }
}

impl MismatchSettings {
    /// Width of the sliding window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(SettingsError::Invalid {
                field: "mismatch.samples",
                reason: "must be at least 1",
            });
        }
        if self.window_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "mismatch.window_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Receive
// ─────────────────────────────────────────────────────────────────────────────

/// Default read timeout for a synchronous receive without an explicit timeout.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 60_000;
/// Default first reconnect delay of the continuous receive loop.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;
/// Default cap on the backoff exponent (100 ms * 2^9 ≈ 51 s).
pub const DEFAULT_BACKOFF_MAX_EXPONENT: u32 = 9;

/// Receive loop behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveSettings {
    /// Read timeout used when a synchronous receive has no timeout of its own.
    pub default_timeout_ms: u64,
    /// First delay before restarting a failed continuous receive.
    pub backoff_base_ms: u64,
    /// Cap on the doubling exponent.
    pub backoff_max_exponent: u32,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_exponent: DEFAULT_BACKOFF_MAX_EXPONENT,
        }
    }
}

impl ReceiveSettings {
    /// Read timeout used when a synchronous receive has no timeout of its own.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// First delay before restarting a failed continuous receive.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "receive.default_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
