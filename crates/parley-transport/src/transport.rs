//! The socket layer the health monitor drives.

use async_trait::async_trait;

use crate::error::TransportError;

/// Operations the health monitor needs from the underlying two-channel
/// socket layer.
///
/// Notifications flowing the other way (state changes, keep-alive
/// responses, message errors) are delivered as
/// [`TransportEvent`](parley_core::TransportEvent)s to
/// [`HealthMonitor`](crate::HealthMonitor).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a keep-alive ping on both channels.
    async fn send_keep_alive(&self) -> Result<(), TransportError>;

    /// Discard both channel sockets so the next connect opens fresh ones.
    async fn force_new_sockets(&self) -> Result<(), TransportError>;

    /// Connect both channels.
    async fn reconnect(&self) -> Result<(), TransportError>;

    /// Close both channels permanently.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
