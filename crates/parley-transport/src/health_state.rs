//! Per-channel health bookkeeping.

use parley_settings::MismatchSettings;
use tokio::time::Instant;

use crate::error_window::ErrorWindowTracker;

/// Health of one channel.
#[derive(Clone, Debug)]
pub struct HealthState {
    /// Whether the channel was last seen connected.
    pub needs_keep_alive: bool,
    /// When the last keep-alive response arrived.
    pub last_keep_alive_received: Instant,
    /// Device-mismatch errors seen on this channel.
    pub mismatch_errors: ErrorWindowTracker,
}

impl HealthState {
    /// Fresh state: not connected, last response stamped now.
    pub fn new(mismatch: &MismatchSettings) -> Self {
        Self {
            needs_keep_alive: false,
            last_keep_alive_received: Instant::now(),
            mismatch_errors: ErrorWindowTracker::new(mismatch.samples, mismatch.window()),
        }
    }
}
