//! Inbound messages as seen by receive handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::Channel;

/// Routing metadata of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Sender address, absent for sealed-sender envelopes that failed to unseal.
    #[serde(default)]
    pub source: Option<String>,
    /// Sender device id.
    #[serde(default)]
    pub source_device: Option<u32>,
    /// Server delivery timestamp in milliseconds since the Unix epoch.
    #[serde(default)]
    pub server_timestamp_ms: u64,
    /// Channel the envelope arrived on.
    pub channel: Channel,
}

impl Envelope {
    /// Envelope from a known sender on the given channel.
    pub fn from_source(source: impl Into<String>, channel: Channel) -> Self {
        Self {
            source: Some(source.into()),
            source_device: None,
            server_timestamp_ms: 0,
            channel,
        }
    }
}

/// A decrypted inbound message, or the failure to decrypt one.
///
/// Decryption happens below this crate; handlers receive either the
/// plaintext body or a description of what went wrong, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Locally assigned id (UUID v7, time ordered).
    pub id: Uuid,
    /// Routing metadata.
    pub envelope: Envelope,
    /// Decrypted body.
    #[serde(default)]
    pub body: Option<String>,
    /// Why the envelope could not be decrypted.
    #[serde(default)]
    pub failure: Option<String>,
}

impl IncomingMessage {
    /// A successfully decrypted message.
    pub fn new(envelope: Envelope, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            envelope,
            body: Some(body.into()),
            failure: None,
        }
    }

    /// An envelope that failed to decrypt.
    pub fn failed(envelope: Envelope, failure: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            envelope,
            body: None,
            failure: Some(failure.into()),
        }
    }

    /// Whether decryption failed.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
