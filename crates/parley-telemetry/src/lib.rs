//! # parley-telemetry
//!
//! Log output for the Parley client.
//!
//! - [`init_subscriber`] installs a compact stderr subscriber
//! - [`init_json_subscriber`] installs a newline-delimited JSON subscriber
//! - [`capture_logs`] records events in memory for test assertions
//!
//! Both initializers honour `RUST_LOG` when set and fall back to the level
//! passed in otherwise. Only the first initializer call in a process takes
//! effect.

#![deny(unsafe_code)]

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber with human-readable stderr output.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // no-op if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Install the global subscriber with one JSON object per event on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
