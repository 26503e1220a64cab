//! Client error types.

use parley_receive::ReceiveError;

/// Errors surfaced by [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client has been closed.
    #[error("client closed")]
    Closed,

    /// Receiving failed or was refused.
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}

impl ClientError {
    /// Whether the request was refused because something is already
    /// receiving messages.
    pub fn is_already_receiving(&self) -> bool {
        matches!(self, Self::Receive(ReceiveError::AlreadyReceiving))
    }
}
