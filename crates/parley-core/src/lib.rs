//! # parley-core
//!
//! Shared vocabulary for the Parley messaging client.
//!
//! Every other Parley crate depends on these types:
//!
//! - **Channels**: [`Channel`] names the two logical transport connections
//!   (identified and unidentified) the client multiplexes
//! - **Connection states**: [`ConnectionState`] as reported by the transport
//! - **Messages**: [`Envelope`] and [`IncomingMessage`], the decrypted
//!   traffic handed to receive handlers
//! - **Transport events**: [`TransportEvent`], the notifications the
//!   transport emits toward the health monitor

#![deny(unsafe_code)]

pub mod channel;
pub mod events;
pub mod message;
pub mod status;

pub use channel::{Channel, ConnectionState};
pub use events::TransportEvent;
pub use message::{Envelope, IncomingMessage};
