//! # parley-transport
//!
//! Keeps the client's two channels (identified and unidentified) alive.
//!
//! - [`Transport`]: the socket operations the monitor drives
//! - [`HealthMonitor`]: turns [`TransportEvent`](parley_core::TransportEvent)s
//!   into keep-alive scheduling and forced reconnects
//! - [`ErrorWindowTracker`]: "N errors within T" detection
//! - [`MemoryTransport`]: recording transport for tests and simulations

#![deny(unsafe_code)]

pub mod error;
pub mod error_window;
pub mod health_state;
mod keep_alive;
pub mod memory;
pub mod monitor;
pub mod transport;

pub use error::TransportError;
pub use error_window::ErrorWindowTracker;
pub use health_state::HealthState;
pub use memory::{MemoryTransport, TransportCall};
pub use monitor::{ChannelHealth, HealthMonitor, HealthSnapshot};
pub use transport::Transport;
