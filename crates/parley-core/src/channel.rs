//! Logical transport channels and their connection states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two logical connections the client keeps open.
///
/// The identified channel is authenticated with the account credentials;
/// the unidentified channel carries sealed-sender traffic anonymously.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Authenticated connection.
    Identified,
    /// Anonymous connection.
    Unidentified,
}

impl Channel {
    /// Both channels, identified first.
    pub const ALL: [Self; 2] = [Self::Identified, Self::Unidentified];

    /// Stable lowercase name, used in logs and serialized snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identified => "identified",
            Self::Unidentified => "unidentified",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a single channel, as reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Socket open and authenticated (where applicable).
    Connected,
    /// Connection lost, transport is retrying.
    Reconnecting,
    /// Orderly teardown in progress.
    Disconnecting,
    /// The server rejected the account credentials.
    AuthenticationFailed,
    /// The connection failed and the transport gave up.
    Failed,
}

impl ConnectionState {
    /// Whether the channel is usable and should be kept alive.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether this state reports a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lists_both_channels() {
        assert_eq!(Channel::ALL, [Channel::Identified, Channel::Unidentified]);
    }

    #[test]
    fn channel_display_matches_serde() {
        for channel in Channel::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{channel}\""));
        }
    }

    #[test]
    fn only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::Failed.is_connected());
    }

    #[test]
    fn failure_states() {
        assert!(ConnectionState::Failed.is_failure());
        assert!(ConnectionState::AuthenticationFailed.is_failure());
        assert!(!ConnectionState::Disconnected.is_failure());
    }

    #[test]
    fn state_deserializes_snake_case() {
        let state: ConnectionState = serde_json::from_str("\"authentication_failed\"").unwrap();
        assert_eq!(state, ConnectionState::AuthenticationFailed);
        assert_eq!(state.to_string(), "authentication_failed");
    }
}
