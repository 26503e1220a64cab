//! Continuous and synchronous receiving.
//!
//! A session is in one of three modes:
//!
//! - `Idle`: nothing is reading.
//! - `Continuous`: a background worker reads for as long as at least one
//!   strong handler is registered.
//! - `Synchronous`: a caller of [`ReceiveSession::receive_messages`] is
//!   reading for a bounded time or message count.
//!
//! The two reading modes exclude each other. When a synchronous receive
//! ends, continuous receiving resumes if strong handlers are registered.
//! The worker decides between restarting and going idle under the same lock
//! that records it as no longer running, so a handler registered while the
//! worker is exiting is never left without a reader.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::IncomingMessage;
use parley_settings::ReceiveSettings;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::ReconnectBackoff;
use crate::errors::ReceiveError;
use crate::handler::{HandlerKind, ReceiveHandler, SharedHandler};
use crate::registry::HandlerRegistry;
use crate::source::{MessageSource, ReceiveLimits};

/// What a session is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Not reading.
    Idle,
    /// Background worker reading for strong handlers.
    Continuous,
    /// A foreground [`ReceiveSession::receive_messages`] call is reading.
    Synchronous,
}

struct Worker {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    async fn stop(self) {
        debug!(worker = self.id, "receive stop requested, interrupting read");
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(worker = self.id, error = %e, "receive worker ended abnormally");
        }
    }
}

struct SyncCall {
    cancel: CancellationToken,
    /// Closes when the call has fully unwound.
    done: watch::Receiver<()>,
}

enum Mode {
    Idle,
    Continuous(Worker),
    Synchronous(SyncCall),
}

struct SessionState {
    handlers: HandlerRegistry,
    mode: Mode,
    closed: bool,
    /// Tickets of fan-outs in progress.
    dispatching: BTreeSet<u64>,
    next_dispatch: u64,
}

impl SessionState {
    fn is_receiving(&self) -> bool {
        !matches!(self.mode, Mode::Idle) || self.handlers.has_strong()
    }
}

struct SessionInner {
    source: Arc<dyn MessageSource>,
    settings: ReceiveSettings,
    state: Mutex<SessionState>,
    /// Signalled whenever a fan-out finishes.
    dispatch_done: Notify,
    next_worker: AtomicU64,
}

impl SessionInner {
    fn start_worker_if_required(self: &Arc<Self>, state: &mut SessionState) {
        if state.closed || !matches!(state.mode, Mode::Idle) || !state.handlers.has_strong() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, cannot start receiving messages");
            return;
        };

        let id = self.next_worker.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(Arc::clone(self).run_worker(id, cancel.clone()));
        debug!(worker = id, "starting continuous receive");
        state.mode = Mode::Continuous(Worker { id, cancel, handle });
    }

    async fn run_worker(self: Arc<Self>, id: u64, cancel: CancellationToken) {
        let mut backoff =
            ReconnectBackoff::new(self.settings.backoff_base(), self.settings.backoff_max_exponent);
        let dispatch = |message: &IncomingMessage| self.fan_out(message, None);

        loop {
            debug!(worker = id, "receiving messages");
            match self.source.receive_continuously(&dispatch, &cancel).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        worker = id,
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "continuous receive failed"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }

            let restart = {
                let mut state = self.state.lock();
                let owned = matches!(&state.mode, Mode::Continuous(w) if w.id == id);
                let restart = owned
                    && !cancel.is_cancelled()
                    && !state.closed
                    && state.handlers.has_strong();
                if owned && !restart {
                    state.mode = Mode::Idle;
                }
                restart
            };
            if !restart {
                break;
            }
            debug!(worker = id, "strong handlers still registered, receiving again");
        }
        debug!(worker = id, "finished receiving messages");
    }

    /// Hand `message` to every registered handler, then to `caller`.
    fn fan_out(&self, message: &IncomingMessage, caller: Option<&dyn ReceiveHandler>) {
        // The ticket is taken under the same lock as the snapshot, so a
        // removal either sees this fan-out or is not part of it.
        let (handlers, _ticket) = {
            let mut state = self.state.lock();
            let id = state.next_dispatch;
            state.next_dispatch += 1;
            let _ = state.dispatching.insert(id);
            (state.handlers.snapshot(), DispatchTicket { inner: self, id })
        };
        for handler in &handlers {
            invoke(handler.as_ref(), message);
        }
        if let Some(caller) = caller {
            invoke(caller, message);
        }
    }

    /// Wait until every fan-out already started has finished. Later ones
    /// are not waited for.
    async fn wait_for_dispatch(&self) {
        let started_before = self.state.lock().next_dispatch;
        loop {
            let done = self.dispatch_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();

            let pending = self
                .state
                .lock()
                .dispatching
                .first()
                .is_some_and(|id| *id < started_before);
            if !pending {
                return;
            }
            done.await;
        }
    }
}

struct DispatchTicket<'a> {
    inner: &'a SessionInner,
    id: u64,
}

impl Drop for DispatchTicket<'_> {
    fn drop(&mut self) {
        let _ = self.inner.state.lock().dispatching.remove(&self.id);
        self.inner.dispatch_done.notify_waiters();
    }
}

fn invoke(handler: &dyn ReceiveHandler, message: &IncomingMessage) {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle_message(message))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(message_id = %message.id, error = %e, "message handler failed, ignoring");
        }
        Err(_) => warn!(message_id = %message.id, "message handler panicked, ignoring"),
    }
}

/// Restores the session when a synchronous receive ends, however it ends.
struct SyncGuard<'a> {
    inner: &'a Arc<SessionInner>,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if matches!(state.mode, Mode::Synchronous(_)) {
            state.mode = Mode::Idle;
        }
        self.inner.start_worker_if_required(&mut state);
    }
}

/// Arbitrates between continuous and synchronous receiving over one
/// [`MessageSource`].
pub struct ReceiveSession {
    inner: Arc<SessionInner>,
}

impl ReceiveSession {
    /// Session reading from `source`.
    pub fn new(source: Arc<dyn MessageSource>, settings: ReceiveSettings) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                source,
                settings,
                state: Mutex::new(SessionState {
                    handlers: HandlerRegistry::new(),
                    mode: Mode::Idle,
                    closed: false,
                    dispatching: BTreeSet::new(),
                    next_dispatch: 0,
                }),
                dispatch_done: Notify::new(),
                next_worker: AtomicU64::new(0),
            }),
        }
    }

    /// Register a handler. The first strong handler starts continuous
    /// receiving unless a synchronous receive is in progress.
    ///
    /// Ignored after [`close`](Self::close).
    pub fn add_receive_handler(&self, handler: SharedHandler, kind: HandlerKind) {
        let mut state = self.inner.state.lock();
        if state.closed {
            debug!(?kind, "session closed, ignoring receive handler");
            return;
        }
        if !state.handlers.insert(handler, kind) {
            return;
        }
        if kind == HandlerKind::Strong {
            self.inner.start_worker_if_required(&mut state);
        }
    }

    /// Unregister a handler. Removing the last strong handler stops
    /// continuous receiving and waits for the worker to exit.
    ///
    /// Once this returns, `handler` is not called again.
    pub async fn remove_receive_handler(&self, handler: &SharedHandler) {
        let worker = {
            let mut state = self.inner.state.lock();
            let _ = state.handlers.remove(handler);
            if state.handlers.has_strong() {
                None
            } else {
                match std::mem::replace(&mut state.mode, Mode::Idle) {
                    Mode::Continuous(worker) => Some(worker),
                    other => {
                        state.mode = other;
                        None
                    }
                }
            }
        };

        if let Some(worker) = worker {
            worker.stop().await;
        }
        self.inner.wait_for_dispatch().await;
    }

    /// Whether messages are being received, or will be because a strong
    /// handler is registered.
    pub fn is_receiving(&self) -> bool {
        self.inner.state.lock().is_receiving()
    }

    /// Current mode.
    pub fn mode(&self) -> ReceiveMode {
        match self.inner.state.lock().mode {
            Mode::Idle => ReceiveMode::Idle,
            Mode::Continuous(_) => ReceiveMode::Continuous,
            Mode::Synchronous(_) => ReceiveMode::Synchronous,
        }
    }

    /// Receive in the foreground, passing each message to the registered
    /// handlers and then to `handler`.
    ///
    /// With `timeout`, returns when a read waits longer than that. Without
    /// one, reads with the configured default timeout and keeps going until
    /// [`stop_receive_messages`](Self::stop_receive_messages) or
    /// `max_messages` is reached.
    ///
    /// Fails with [`ReceiveError::AlreadyReceiving`] without side effects if
    /// anything is already receiving.
    pub async fn receive_messages(
        &self,
        timeout: Option<Duration>,
        max_messages: Option<usize>,
        handler: &dyn ReceiveHandler,
    ) -> Result<(), ReceiveError> {
        let limits = match timeout {
            Some(timeout) => ReceiveLimits {
                timeout,
                return_on_timeout: true,
            },
            None => ReceiveLimits {
                timeout: self.inner.settings.default_timeout(),
                return_on_timeout: false,
            },
        };
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(());

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ReceiveError::Closed);
            }
            if state.is_receiving() {
                return Err(ReceiveError::AlreadyReceiving);
            }
            state.mode = Mode::Synchronous(SyncCall {
                cancel: cancel.clone(),
                done: done_rx,
            });
        }
        // Dropped after the guard, so waiters see the session restored.
        let _done = done_tx;
        let _restore = SyncGuard { inner: &self.inner };

        if max_messages == Some(0) {
            return Ok(());
        }

        let remaining = max_messages.map(AtomicUsize::new);
        let dispatch = |message: &IncomingMessage| {
            let last = match &remaining {
                None => false,
                Some(remaining) => {
                    match remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        n.checked_sub(1)
                    }) {
                        Ok(before) => before == 1,
                        Err(_) => return,
                    }
                }
            };
            self.inner.fan_out(message, Some(handler));
            if last {
                cancel.cancel();
            }
        };

        debug!(
            timeout_ms = u64::try_from(limits.timeout.as_millis()).unwrap_or(u64::MAX),
            return_on_timeout = limits.return_on_timeout,
            max_messages,
            "receiving messages synchronously"
        );
        let result = self
            .inner
            .source
            .receive_bounded(limits, &dispatch, &cancel)
            .await;
        debug!("finished receiving messages synchronously");
        result
    }

    /// Interrupt a synchronous receive and wait for it to return.
    ///
    /// Does nothing if no synchronous receive is in progress.
    pub async fn stop_receive_messages(&self) {
        let call = match &self.inner.state.lock().mode {
            Mode::Synchronous(call) => Some((call.cancel.clone(), call.done.clone())),
            _ => None,
        };
        if let Some((cancel, done)) = call {
            wait_for_sync_call(cancel, done).await;
        }
    }

    /// Stop all receiving, drop every handler and wait for in-flight
    /// dispatch to finish.
    ///
    /// Later synchronous receives fail with [`ReceiveError::Closed`] and
    /// later handler registrations are ignored.
    pub async fn close(&self) {
        let (worker, call) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.handlers.clear();
            match std::mem::replace(&mut state.mode, Mode::Idle) {
                Mode::Idle => (None, None),
                Mode::Continuous(worker) => (Some(worker), None),
                Mode::Synchronous(call) => {
                    let waiter = (call.cancel.clone(), call.done.clone());
                    state.mode = Mode::Synchronous(call);
                    (None, Some(waiter))
                }
            }
        };

        if let Some(worker) = worker {
            worker.stop().await;
        }
        if let Some((cancel, done)) = call {
            wait_for_sync_call(cancel, done).await;
        }
        self.inner.wait_for_dispatch().await;
        debug!("receive session closed");
    }
}

async fn wait_for_sync_call(cancel: CancellationToken, mut done: watch::Receiver<()>) {
    debug!("receive stop requested, interrupting synchronous read");
    cancel.cancel();
    // Nothing is ever sent; this resolves once the sender is dropped.
    let _ = done.changed().await;
}

impl Drop for ReceiveSession {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        match std::mem::replace(&mut state.mode, Mode::Idle) {
            Mode::Continuous(worker) => worker.cancel.cancel(),
            Mode::Synchronous(call) => {
                call.cancel.cancel();
                state.mode = Mode::Synchronous(call);
            }
            Mode::Idle => {}
        }
    }
}
