//! The client facade.
//!
//! A [`Client`] owns one transport, the [`HealthMonitor`] keeping its
//! channels alive and the [`ReceiveSession`] reading from it. Closing the
//! client tears these down in dependency order: receiving stops first, then
//! the keep-alive supervisor, then the sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::TransportEvent;
use parley_receive::{
    HandlerKind, MessageSource, ReceiveError, ReceiveHandler, ReceiveSession, SharedHandler,
};
use parley_settings::ParleySettings;
use parley_transport::{HealthMonitor, HealthSnapshot, Transport};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::ClientError;

/// Callback run once the client has fully closed.
pub type ClosedListener = Box<dyn FnOnce() + Send>;

/// Health monitoring and message receiving over one transport.
pub struct Client {
    transport: Arc<dyn Transport>,
    monitor: HealthMonitor,
    session: ReceiveSession,
    closed: AtomicBool,
    /// Serializes [`Client::close`] so every caller returns after teardown.
    close_gate: tokio::sync::Mutex<()>,
    /// `None` once the listeners have run.
    closed_listeners: Mutex<Option<Vec<ClosedListener>>>,
}

impl Client {
    /// Client over `transport`, reading messages from `source`.
    pub fn new(
        transport: Arc<dyn Transport>,
        source: Arc<dyn MessageSource>,
        settings: &ParleySettings,
    ) -> Self {
        Self {
            monitor: HealthMonitor::new(Arc::clone(&transport), settings),
            session: ReceiveSession::new(source, settings.receive.clone()),
            transport,
            closed: AtomicBool::new(false),
            close_gate: tokio::sync::Mutex::new(()),
            closed_listeners: Mutex::new(Some(Vec::new())),
        }
    }

    /// Feed transport notifications into the health monitor until `events`
    /// closes or the client does.
    pub fn attach_transport_events(&self, events: mpsc::Receiver<TransportEvent>) {
        self.monitor.watch(events);
    }

    /// Register a message handler. See
    /// [`ReceiveSession::add_receive_handler`].
    pub fn add_receive_handler(&self, handler: SharedHandler, kind: HandlerKind) {
        self.session.add_receive_handler(handler, kind);
    }

    /// Unregister a message handler; it is not called again once this
    /// returns.
    pub async fn remove_receive_handler(&self, handler: &SharedHandler) {
        self.session.remove_receive_handler(handler).await;
    }

    /// Whether messages are being received, or will be because a strong
    /// handler is registered.
    pub fn is_receiving(&self) -> bool {
        self.session.is_receiving()
    }

    /// Receive in the foreground. See [`ReceiveSession::receive_messages`].
    pub async fn receive_messages(
        &self,
        timeout: Option<Duration>,
        max_messages: Option<usize>,
        handler: &dyn ReceiveHandler,
    ) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        self.session
            .receive_messages(timeout, max_messages, handler)
            .await
            .map_err(|e| match e {
                ReceiveError::Closed => ClientError::Closed,
                e => e.into(),
            })
    }

    /// Interrupt a foreground receive and wait for it to return.
    pub async fn stop_receive_messages(&self) {
        self.session.stop_receive_messages().await;
    }

    /// The channel health monitor.
    pub fn health(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Current health of both channels.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.monitor.snapshot()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `listener` once the client has closed. Runs it immediately if
    /// that has already happened.
    pub fn add_closed_listener(&self, listener: ClosedListener) {
        let mut listeners = self.closed_listeners.lock();
        if let Some(pending) = listeners.as_mut() {
            pending.push(listener);
            return;
        }
        drop(listeners);
        listener();
    }

    /// Stop receiving, stop keep-alives, disconnect the transport and notify
    /// closed listeners.
    ///
    /// Safe to call more than once; later calls wait for the first to finish.
    pub async fn close(&self) {
        let _gate = self.close_gate.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing client");

        self.session.close().await;
        self.monitor.shutdown().await;
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "transport disconnect failed");
        }

        let listeners = self.closed_listeners.lock().take().unwrap_or_default();
        for listener in listeners {
            listener();
        }
        info!("client closed");
    }
}
