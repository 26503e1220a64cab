//! Notifications emitted by the transport toward the health monitor.

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ConnectionState};

/// A single transport notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// A channel changed connection state.
    StateChanged {
        /// Affected channel.
        channel: Channel,
        /// New state.
        state: ConnectionState,
    },
    /// The server answered a keep-alive.
    KeepAliveResponse {
        /// Channel the response arrived on.
        channel: Channel,
        /// Transport timestamp of the matching request, in milliseconds.
        sent_at_ms: u64,
    },
    /// The server rejected an outgoing request with a status code.
    MessageError {
        /// Channel the error arrived on.
        channel: Channel,
        /// Protocol status code.
        status: u16,
    },
}

impl TransportEvent {
    /// Channel the event concerns.
    pub fn channel(&self) -> Channel {
        match self {
            Self::StateChanged { channel, .. }
            | Self::KeepAliveResponse { channel, .. }
            | Self::MessageError { channel, .. } => *channel,
        }
    }
}
