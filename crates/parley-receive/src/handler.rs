//! Receive handlers.

use std::sync::Arc;

use parley_core::IncomingMessage;

/// Callback invoked for every received message.
///
/// Errors and panics are logged by the session and never reach other
/// handlers or stop the receive loop.
pub trait ReceiveHandler: Send + Sync {
    /// Handle one message.
    fn handle_message(&self, message: &IncomingMessage) -> anyhow::Result<()>;
}

impl<F> ReceiveHandler for F
where
    F: Fn(&IncomingMessage) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_message(&self, message: &IncomingMessage) -> anyhow::Result<()> {
        self(message)
    }
}

/// A registered handler. Registration and removal compare the allocation,
/// so keep the `Arc` around to remove it later.
pub type SharedHandler = Arc<dyn ReceiveHandler>;

/// Wrap a closure as a [`SharedHandler`].
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&IncomingMessage) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Whether a handler keeps the continuous receive loop alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Registering it starts continuous receiving; removing the last one
    /// stops it.
    Strong,
    /// Only observes messages while something else is receiving.
    Weak,
}

pub(crate) fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
