//! Transport error type.

/// Failure reported by a [`Transport`](crate::Transport) operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport cannot serve the request right now.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport has been disconnected for good.
    #[error("transport closed")]
    Closed,

    /// Socket-level failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TransportError::Unavailable("no route".into()).to_string(),
            "transport unavailable: no route"
        );
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
    }

    #[test]
    fn io_converts() {
        let err: TransportError = std::io::Error::other("reset").into();
        assert!(err.to_string().contains("reset"));
    }
}
