//! In-process [`Transport`] that records calls instead of touching sockets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{Channel, TransportEvent};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::error::TransportError;
use crate::monitor::millis;
use crate::transport::Transport;

/// One recorded [`Transport`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCall {
    /// [`Transport::send_keep_alive`].
    SendKeepAlive,
    /// [`Transport::force_new_sockets`].
    ForceNewSockets,
    /// [`Transport::reconnect`].
    Reconnect,
    /// [`Transport::disconnect`].
    Disconnect,
}

/// Recording transport for tests and simulations.
///
/// Every call is recorded, including ones that fail. After
/// [`disconnect`](Transport::disconnect) every operation fails with
/// [`TransportError::Closed`].
pub struct MemoryTransport {
    calls: Mutex<Vec<TransportCall>>,
    fail_keep_alives: AtomicBool,
    disconnected: AtomicBool,
    responder: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    epoch: Instant,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Transport with no failures injected.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_keep_alives: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            responder: Mutex::new(None),
            epoch: Instant::now(),
        }
    }

    /// Answer each successful keep-alive with a response event on both
    /// channels, sent to `events`.
    pub fn respond_to_keep_alives(&self, events: mpsc::Sender<TransportEvent>) {
        *self.responder.lock() = Some(events);
    }

    /// Stop answering keep-alives; sends still succeed.
    pub fn stop_responding(&self) {
        *self.responder.lock() = None;
    }

    /// Make keep-alive sends fail until switched off again.
    pub fn fail_keep_alives(&self, fail: bool) {
        self.fail_keep_alives.store(fail, Ordering::SeqCst);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Number of calls of one kind.
    pub fn count(&self, call: TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Number of calls per kind.
    pub fn counts(&self) -> BTreeMap<TransportCall, usize> {
        let mut counts = BTreeMap::new();
        for call in self.calls.lock().iter() {
            *counts.entry(*call).or_insert(0) += 1;
        }
        counts
    }

    /// Whether [`Transport::disconnect`] has been called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) -> Result<(), TransportError> {
        trace!(?call, "memory transport call");
        self.calls.lock().push(call);
        if self.is_disconnected() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_keep_alive(&self) -> Result<(), TransportError> {
        self.record(TransportCall::SendKeepAlive)?;
        if self.fail_keep_alives.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("keep-alive send failed".into()));
        }

        let responder = self.responder.lock().clone();
        if let Some(events) = responder {
            let sent_at_ms = millis(Instant::now().saturating_duration_since(self.epoch));
            for channel in Channel::ALL {
                if events
                    .try_send(TransportEvent::KeepAliveResponse {
                        channel,
                        sent_at_ms,
                    })
                    .is_err()
                {
                    trace!(%channel, "keep-alive response dropped");
                }
            }
        }
        Ok(())
    }

    async fn force_new_sockets(&self) -> Result<(), TransportError> {
        self.record(TransportCall::ForceNewSockets)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Reconnect)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Disconnect);
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}
