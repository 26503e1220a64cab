//! Receive error types.

/// Errors from [`ReceiveSession`](crate::ReceiveSession) and
/// [`MessageSource`](crate::MessageSource)s.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    /// A synchronous receive was requested while messages are already
    /// being received.
    #[error("already receiving messages")]
    AlreadyReceiving,

    /// The session has been closed.
    #[error("receive session closed")]
    Closed,

    /// The message source failed.
    #[error("message source failed: {0}")]
    Source(String),
}
