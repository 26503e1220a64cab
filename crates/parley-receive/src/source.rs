//! The decrypted-message stream the session reads from.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::IncomingMessage;
use tokio_util::sync::CancellationToken;

use crate::errors::ReceiveError;

/// Callback a [`MessageSource`] hands each message to.
pub type Dispatch<'a> = &'a (dyn Fn(&IncomingMessage) + Send + Sync);

/// Read limits for [`MessageSource::receive_bounded`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveLimits {
    /// How long a single read may wait for the next message.
    pub timeout: Duration,
    /// Return on the first read timeout instead of waiting again.
    pub return_on_timeout: bool,
}

/// Blocking receive primitives over the decrypted message stream.
///
/// Both calls must return promptly once `cancel` fires and must not
/// dispatch after returning.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Dispatch messages until the connection is torn down (`Ok`), fails
    /// (`Err`) or `cancel` fires (`Ok`).
    async fn receive_continuously(
        &self,
        dispatch: Dispatch<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ReceiveError>;

    /// Dispatch messages until a read times out (if
    /// `limits.return_on_timeout`), the source fails, or `cancel` fires.
    async fn receive_bounded(
        &self,
        limits: ReceiveLimits,
        dispatch: Dispatch<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ReceiveError>;
}
