//! Queue-fed [`MessageSource`] for tests and simulations.

use async_trait::async_trait;
use parley_core::IncomingMessage;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::ReceiveError;
use crate::source::{Dispatch, MessageSource, ReceiveLimits};

enum SourceEvent {
    Message(IncomingMessage),
    Disconnect,
    Fail(String),
}

/// Reads messages pushed through a [`MemorySourceHandle`].
pub struct MemorySource {
    events: Mutex<mpsc::UnboundedReceiver<SourceEvent>>,
}

/// Feeds a [`MemorySource`].
#[derive(Clone)]
pub struct MemorySourceHandle {
    events: mpsc::UnboundedSender<SourceEvent>,
}

impl MemorySource {
    /// New source and the handle that feeds it.
    pub fn new() -> (Self, MemorySourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Mutex::new(rx),
            },
            MemorySourceHandle { events: tx },
        )
    }
}

impl MemorySourceHandle {
    /// Queue a message for delivery.
    pub fn push(&self, message: IncomingMessage) {
        self.send(SourceEvent::Message(message));
    }

    /// Make the current read return cleanly, as if the server closed the
    /// connection.
    pub fn disconnect(&self) {
        self.send(SourceEvent::Disconnect);
    }

    /// Make the current read fail with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        self.send(SourceEvent::Fail(reason.into()));
    }

    fn send(&self, event: SourceEvent) {
        if self.events.send(event).is_err() {
            trace!("memory source dropped, event discarded");
        }
    }
}

fn source_gone() -> ReceiveError {
    ReceiveError::Source("memory source handle dropped".into())
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn receive_continuously(
        &self,
        dispatch: Dispatch<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ReceiveError> {
        let mut events = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            events = self.events.lock() => events,
        };
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                event = events.recv() => event,
            };
            match event.ok_or_else(source_gone)? {
                SourceEvent::Message(message) => dispatch(&message),
                SourceEvent::Disconnect => return Ok(()),
                SourceEvent::Fail(reason) => return Err(ReceiveError::Source(reason)),
            }
        }
    }

    async fn receive_bounded(
        &self,
        limits: ReceiveLimits,
        dispatch: Dispatch<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ReceiveError> {
        let mut events = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            events = self.events.lock() => events,
        };
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                event = tokio::time::timeout(limits.timeout, events.recv()) => event,
            };
            let Ok(event) = event else {
                if limits.return_on_timeout {
                    return Ok(());
                }
                trace!("read timed out, waiting again");
                continue;
            };
            match event.ok_or_else(source_gone)? {
                SourceEvent::Message(message) => dispatch(&message),
                SourceEvent::Disconnect => return Ok(()),
                SourceEvent::Fail(reason) => return Err(ReceiveError::Source(reason)),
            }
        }
    }
}
