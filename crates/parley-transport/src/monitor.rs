//! Connection health monitor.
//!
//! Bridges transport notifications to keep-alive scheduling and forced
//! reconnects:
//!
//! - a channel reported `Connected` needs keep-alives; any other state
//!   clears the need. The keep-alive supervisor exists exactly while at
//!   least one channel needs it.
//! - keep-alive responses stamp the channel's last-seen time, which the
//!   supervisor compares against `cadence * missed_multiplier`.
//! - device-mismatch errors feed a per-channel sliding window; a full
//!   window forces new sockets and a reconnect on both channels.
//!
//! Nothing here surfaces transport failures to callers. They are logged and
//! left to the transport to recover from.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::{Channel, ConnectionState, TransportEvent};
use parley_settings::{KeepAliveSettings, ParleySettings};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::health_state::HealthState;
use crate::keep_alive::KeepAliveSupervisor;
use crate::transport::Transport;

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) struct MonitorInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) keep_alive: KeepAliveSettings,
    mismatch_status: u16,
    state: Mutex<MonitorState>,
    /// Serializes force-new-sockets + reconnect between the supervisor and
    /// the mismatch path.
    reconnect_gate: tokio::sync::Mutex<()>,
    /// Runtime the monitor was created on. State changes may arrive on
    /// threads outside it.
    runtime: Option<Handle>,
    /// Parent of every task token; cancelled on shutdown and on drop.
    root: CancellationToken,
    next_supervisor_id: AtomicU64,
    forced_reconnects: AtomicU64,
}

struct MonitorState {
    identified: HealthState,
    unidentified: HealthState,
    supervisor: Option<KeepAliveSupervisor>,
    /// Task of the last supervisor shut down, awaited by its successor.
    retired: Option<JoinHandle<()>>,
    pumps: Vec<JoinHandle<()>>,
    closed: bool,
}

impl MonitorState {
    fn health(&self, channel: Channel) -> &HealthState {
        match channel {
            Channel::Identified => &self.identified,
            Channel::Unidentified => &self.unidentified,
        }
    }

    fn health_mut(&mut self, channel: Channel) -> &mut HealthState {
        match channel {
            Channel::Identified => &mut self.identified,
            Channel::Unidentified => &mut self.unidentified,
        }
    }

    fn keep_alive_needed(&self) -> bool {
        self.identified.needs_keep_alive || self.unidentified.needs_keep_alive
    }
}

impl MonitorInner {
    fn runtime(&self) -> Option<Handle> {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    pub(crate) fn keep_alive_needed(&self) -> bool {
        self.state.lock().keep_alive_needed()
    }

    pub(crate) fn stamp_keep_alive_all(&self, now: Instant) {
        let mut state = self.state.lock();
        state.identified.last_keep_alive_received = now;
        state.unidentified.last_keep_alive_received = now;
    }

    /// Ages of both channels' last keep-alive response if either is older
    /// than `max_age`.
    ///
    /// Ages are measured from `now`, so this holds however recently the
    /// monotonic clock started.
    pub(crate) fn stale_keep_alives(
        &self,
        now: Instant,
        max_age: Duration,
    ) -> Option<(Duration, Duration)> {
        let state = self.state.lock();
        let identified = now.saturating_duration_since(state.identified.last_keep_alive_received);
        let unidentified =
            now.saturating_duration_since(state.unidentified.last_keep_alive_received);
        (identified > max_age || unidentified > max_age).then_some((identified, unidentified))
    }

    pub(crate) async fn force_reconnect(&self) -> Result<(), TransportError> {
        let _gate = self.reconnect_gate.lock().await;
        let _ = self.forced_reconnects.fetch_add(1, Ordering::Relaxed);
        self.transport.force_new_sockets().await?;
        self.transport.reconnect().await
    }

    fn on_channel_state_changed(self: &Arc<Self>, channel: Channel, state: ConnectionState) {
        match state {
            ConnectionState::Connected => debug!(%channel, "channel connected"),
            ConnectionState::AuthenticationFailed => {
                debug!(%channel, "channel authentication failed");
            }
            ConnectionState::Failed => debug!(%channel, "channel connection failed"),
            _ => trace!(%channel, %state, "channel state changed"),
        }

        let mut guard = self.state.lock();
        if guard.closed {
            trace!(%channel, %state, "monitor shut down, ignoring state change");
            return;
        }
        guard.health_mut(channel).needs_keep_alive = state.is_connected();

        let needed = guard.keep_alive_needed();
        if needed && guard.supervisor.is_none() {
            let Some(runtime) = self.runtime() else {
                warn!(%channel, "no tokio runtime, cannot start keep-alive supervisor");
                return;
            };
            let id = self.next_supervisor_id.fetch_add(1, Ordering::Relaxed) + 1;
            let previous = guard.retired.take();
            guard.supervisor = Some(KeepAliveSupervisor::start(
                &runtime,
                Arc::clone(self),
                id,
                self.root.child_token(),
                previous,
            ));
        } else if !needed {
            if let Some(supervisor) = guard.supervisor.take() {
                guard.retired = Some(supervisor.shutdown());
            }
        }
    }

    fn on_keep_alive_response(&self, channel: Channel, sent_at_ms: u64) {
        trace!(%channel, sent_at_ms, "keep-alive response");
        self.state.lock().health_mut(channel).last_keep_alive_received = Instant::now();
    }

    async fn on_message_error(&self, channel: Channel, status: u16) -> bool {
        if status != self.mismatch_status {
            return false;
        }

        let saturated = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state
                .health_mut(channel)
                .mismatch_errors
                .add_sample(Instant::now())
        };
        if !saturated {
            return false;
        }

        warn!(%channel, status, "too many device mismatch errors, forcing new sockets");
        if let Err(e) = self.force_reconnect().await {
            warn!(error = %e, "forced reconnect after mismatch errors failed");
        }
        true
    }

    async fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged { channel, state } => {
                self.on_channel_state_changed(channel, state);
            }
            TransportEvent::KeepAliveResponse {
                channel,
                sent_at_ms,
            } => self.on_keep_alive_response(channel, sent_at_ms),
            TransportEvent::MessageError { channel, status } => {
                let _ = self.on_message_error(channel, status).await;
            }
        }
    }
}

/// Point-in-time view of one channel's health.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelHealth {
    /// Whether the channel was last seen connected.
    pub needs_keep_alive: bool,
    /// Time since the last keep-alive response.
    pub last_keep_alive_age_ms: u64,
    /// Mismatch errors currently held in the window.
    pub pending_mismatch_errors: usize,
}

/// Point-in-time view of the monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Authenticated channel.
    pub identified: ChannelHealth,
    /// Anonymous channel.
    pub unidentified: ChannelHealth,
    /// Whether a keep-alive supervisor is running.
    pub keep_alive_active: bool,
    /// Supervisors started since creation.
    pub supervisors_started: u64,
    /// Forced reconnects attempted since creation.
    pub forced_reconnects: u64,
    /// Whether [`HealthMonitor::shutdown`] has been called.
    pub closed: bool,
}

/// Watches both channels and keeps them alive.
///
/// The keep-alive supervisor and event pumps run on the tokio runtime the
/// monitor was created on, so notifications may be delivered from any
/// thread. A monitor created outside a runtime falls back to the caller's.
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl HealthMonitor {
    /// Monitor driving `transport` with the keep-alive and mismatch policy
    /// from `settings`.
    pub fn new(transport: Arc<dyn Transport>, settings: &ParleySettings) -> Self {
        let health = || HealthState::new(&settings.mismatch);
        Self {
            inner: Arc::new(MonitorInner {
                transport,
                keep_alive: settings.keep_alive.clone(),
                mismatch_status: settings.mismatch.status,
                state: Mutex::new(MonitorState {
                    identified: health(),
                    unidentified: health(),
                    supervisor: None,
                    retired: None,
                    pumps: Vec::new(),
                    closed: false,
                }),
                reconnect_gate: tokio::sync::Mutex::new(()),
                runtime: Handle::try_current().ok(),
                root: CancellationToken::new(),
                next_supervisor_id: AtomicU64::new(0),
                forced_reconnects: AtomicU64::new(0),
            }),
        }
    }

    /// Record a channel state change and start or stop the keep-alive
    /// supervisor accordingly.
    pub fn on_channel_state_changed(&self, channel: Channel, state: ConnectionState) {
        self.inner.on_channel_state_changed(channel, state);
    }

    /// Record a keep-alive response on `channel`.
    pub fn on_keep_alive_response(&self, channel: Channel, sent_at_ms: u64) {
        self.inner.on_keep_alive_response(channel, sent_at_ms);
    }

    /// Record a message error on `channel`.
    ///
    /// Returns `true` when this error completed a mismatch storm and a
    /// forced reconnect of both channels was issued.
    pub async fn on_message_error(&self, channel: Channel, status: u16) -> bool {
        self.inner.on_message_error(channel, status).await
    }

    /// Route one transport notification.
    pub async fn handle_event(&self, event: TransportEvent) {
        self.inner.handle_event(event).await;
    }

    /// Consume transport notifications from `events` until the sender side
    /// closes or the monitor shuts down.
    ///
    /// Consecutive identical states for the same channel are dropped.
    pub fn watch(&self, mut events: mpsc::Receiver<TransportEvent>) {
        let mut guard = self.inner.state.lock();
        if guard.closed {
            debug!("monitor shut down, not watching events");
            return;
        }

        let Some(runtime) = self.inner.runtime() else {
            warn!("no tokio runtime, cannot watch transport events");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let cancel = self.inner.root.child_token();
        guard.pumps.push(runtime.spawn(async move {
            let mut last: HashMap<Channel, ConnectionState> = HashMap::new();
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                if let TransportEvent::StateChanged { channel, state } = event {
                    if last.insert(channel, state) == Some(state) {
                        continue;
                    }
                }
                inner.handle_event(event).await;
            }
            trace!("transport event pump finished");
        }));
    }

    /// Whether a keep-alive supervisor is running.
    pub fn keep_alive_active(&self) -> bool {
        self.inner.state.lock().supervisor.is_some()
    }

    /// Whether `channel` was last seen connected.
    pub fn needs_keep_alive(&self, channel: Channel) -> bool {
        self.inner.state.lock().health(channel).needs_keep_alive
    }

    /// Current health of both channels.
    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Instant::now();
        let state = self.inner.state.lock();
        let channel = |health: &HealthState| ChannelHealth {
            needs_keep_alive: health.needs_keep_alive,
            last_keep_alive_age_ms: millis(
                now.saturating_duration_since(health.last_keep_alive_received),
            ),
            pending_mismatch_errors: health.mismatch_errors.pending(),
        };
        HealthSnapshot {
            identified: channel(&state.identified),
            unidentified: channel(&state.unidentified),
            keep_alive_active: state.supervisor.is_some(),
            supervisors_started: self.inner.next_supervisor_id.load(Ordering::Relaxed),
            forced_reconnects: self.inner.forced_reconnects.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }

    /// Stop the supervisor and event pumps and wait for them to finish.
    ///
    /// Later state changes are ignored. Calling this more than once is a
    /// no-op.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.identified.needs_keep_alive = false;
            state.unidentified.needs_keep_alive = false;

            let supervisor = state.supervisor.take().map(KeepAliveSupervisor::shutdown);
            supervisor
                .into_iter()
                .chain(state.retired.take())
                .chain(state.pumps.drain(..))
                .collect()
        };
        self.inner.root.cancel();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "monitor task ended abnormally");
            }
        }
        debug!("health monitor shut down");
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.inner.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use parley_core::status::CONFLICT;
    use parley_telemetry::capture_logs;
    use tracing::Level;

    use super::*;
    use crate::memory::{MemoryTransport, TransportCall};
    use crate::transport::MockTransport;

    const CADENCE: Duration = Duration::from_secs(30);

    fn monitor_with(transport: Arc<dyn Transport>) -> HealthMonitor {
        HealthMonitor::new(transport, &ParleySettings::default())
    }

    fn memory_monitor() -> (Arc<MemoryTransport>, HealthMonitor) {
        let transport = Arc::new(MemoryTransport::new());
        let monitor = monitor_with(transport.clone());
        (transport, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_follows_connected_channels() {
        let (_transport, monitor) = memory_monitor();
        assert!(!monitor.keep_alive_active());

        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);
        assert!(monitor.keep_alive_active());
        assert!(monitor.needs_keep_alive(Channel::Identified));
        assert!(!monitor.needs_keep_alive(Channel::Unidentified));

        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Disconnected);
        assert!(!monitor.keep_alive_active());
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_supervisor() {
        let (_transport, monitor) = memory_monitor();
        let steps = [
            (Channel::Identified, ConnectionState::Connected),
            (Channel::Unidentified, ConnectionState::Connected),
            (Channel::Identified, ConnectionState::Connected),
            (Channel::Identified, ConnectionState::Failed),
            (Channel::Unidentified, ConnectionState::Connected),
        ];
        for (channel, state) in steps {
            monitor.on_channel_state_changed(channel, state);
            assert!(monitor.keep_alive_active());
        }
        assert_eq!(monitor.snapshot().supervisors_started, 1);

        monitor.on_channel_state_changed(Channel::Unidentified, ConnectionState::Failed);
        assert!(!monitor.keep_alive_active());

        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);
        assert!(monitor.keep_alive_active());
        assert_eq!(monitor.snapshot().supervisors_started, 2);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_cadence_while_responses_arrive() {
        let (transport, monitor) = memory_monitor();
        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);

        for _ in 0..6 {
            tokio::time::sleep(CADENCE / 2).await;
            monitor.on_keep_alive_response(Channel::Identified, 0);
            monitor.on_keep_alive_response(Channel::Unidentified, 0);
            tokio::time::sleep(CADENCE / 2).await;
        }

        assert!(transport.count(TransportCall::SendKeepAlive) >= 5);
        assert_eq!(transport.count(TransportCall::ForceNewSockets), 0);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missed_keep_alives_force_reconnect() {
        let (transport, monitor) = memory_monitor();
        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);

        // Three pings go unanswered; the fourth wake-up finds the stamp too old.
        tokio::time::sleep(CADENCE * 4 + Duration::from_secs(1)).await;

        assert_eq!(transport.count(TransportCall::SendKeepAlive), 3);
        assert_eq!(transport.count(TransportCall::ForceNewSockets), 1);
        assert_eq!(transport.count(TransportCall::Reconnect), 1);
        assert_eq!(monitor.snapshot().forced_reconnects, 1);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut transport = MockTransport::new();
        transport.expect_send_keep_alive().returning(move || {
            let _ = counted.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Unavailable("socket not open".into()))
        });
        transport.expect_force_new_sockets().returning(|| Ok(()));
        transport.expect_reconnect().returning(|| Ok(()));

        let (logs, _guard) = capture_logs();
        let monitor = monitor_with(Arc::new(transport));
        monitor.on_channel_state_changed(Channel::Unidentified, ConnectionState::Connected);

        for _ in 0..3 {
            tokio::time::sleep(CADENCE).await;
            monitor.on_keep_alive_response(Channel::Identified, 0);
            monitor.on_keep_alive_response(Channel::Unidentified, 0);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(logs.count_matching("keep-alive tick failed"), 3);
        monitor.shutdown().await;
    }

    struct PanickingTransport {
        pings: AtomicUsize,
    }

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn send_keep_alive(&self) -> Result<(), TransportError> {
            let _ = self.pings.fetch_add(1, Ordering::SeqCst);
            panic!("keep-alive frame encoder broke");
        }

        async fn force_new_sockets(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn reconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_ticks_do_not_stop_the_loop() {
        let transport = Arc::new(PanickingTransport {
            pings: AtomicUsize::new(0),
        });
        let (logs, _guard) = capture_logs();
        let monitor = monitor_with(transport.clone());
        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);

        tokio::time::sleep(CADENCE * 2 + Duration::from_secs(1)).await;

        assert_eq!(transport.pings.load(Ordering::SeqCst), 2);
        assert!(logs.has_event(Level::WARN, "keep-alive tick panicked"));
        assert!(monitor.keep_alive_active());
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_storm_forces_one_reconnect() {
        let (transport, monitor) = memory_monitor();

        let mut fired = Vec::new();
        for _ in 0..5 {
            fired.push(monitor.on_message_error(Channel::Identified, CONFLICT).await);
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        assert_eq!(fired, [false, false, false, false, true]);
        assert_eq!(transport.count(TransportCall::ForceNewSockets), 1);
        assert_eq!(transport.count(TransportCall::Reconnect), 1);

        for _ in 0..4 {
            assert!(!monitor.on_message_error(Channel::Identified, CONFLICT).await);
        }
        assert_eq!(transport.count(TransportCall::ForceNewSockets), 1);
        assert_eq!(monitor.snapshot().identified.pending_mismatch_errors, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn other_statuses_are_ignored() {
        let (transport, monitor) = memory_monitor();
        for status in [400, 401, 404, 410, 500, 500, 500] {
            assert!(!monitor.on_message_error(Channel::Unidentified, status).await);
        }
        assert_eq!(monitor.snapshot().unidentified.pending_mismatch_errors, 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn channels_track_mismatches_separately() {
        let (transport, monitor) = memory_monitor();
        for _ in 0..4 {
            assert!(!monitor.on_message_error(Channel::Identified, CONFLICT).await);
            assert!(!monitor.on_message_error(Channel::Unidentified, CONFLICT).await);
        }
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_forced_reconnect_is_logged_not_returned() {
        let mut transport = MockTransport::new();
        transport
            .expect_force_new_sockets()
            .times(1)
            .returning(|| Err(TransportError::Closed));
        transport.expect_reconnect().never();

        let (logs, _guard) = capture_logs();
        let settings = ParleySettings {
            mismatch: parley_settings::MismatchSettings {
                samples: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let monitor = HealthMonitor::new(Arc::new(transport), &settings);

        assert!(monitor.on_message_error(Channel::Identified, CONFLICT).await);
        assert!(logs.has_event(Level::WARN, "forced reconnect after mismatch errors failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_drops_repeated_states() {
        let (logs, _guard) = capture_logs();
        let (_transport, monitor) = memory_monitor();
        let (tx, rx) = mpsc::channel(16);
        monitor.watch(rx);

        for state in [
            ConnectionState::Connected,
            ConnectionState::Connected,
            ConnectionState::Connected,
        ] {
            tx.send(TransportEvent::StateChanged {
                channel: Channel::Identified,
                state,
            })
            .await
            .unwrap();
        }
        tx.send(TransportEvent::StateChanged {
            channel: Channel::Unidentified,
            state: ConnectionState::Connected,
        })
        .await
        .unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(logs.count_matching("channel connected"), 2);
        assert!(monitor.keep_alive_active());
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watch_routes_every_event_kind() {
        let (transport, monitor) = memory_monitor();
        let settings = ParleySettings::default();
        let (tx, rx) = mpsc::channel(16);
        monitor.watch(rx);

        tx.send(TransportEvent::StateChanged {
            channel: Channel::Unidentified,
            state: ConnectionState::Connected,
        })
        .await
        .unwrap();
        for _ in 0..settings.mismatch.samples {
            tx.send(TransportEvent::MessageError {
                channel: Channel::Unidentified,
                status: CONFLICT,
            })
            .await
            .unwrap();
        }
        tx.send(TransportEvent::KeepAliveResponse {
            channel: Channel::Unidentified,
            sent_at_ms: 7,
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(monitor.needs_keep_alive(Channel::Unidentified));
        assert_eq!(transport.count(TransportCall::ForceNewSockets), 1);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_and_is_idempotent() {
        let (transport, monitor) = memory_monitor();
        let (tx, rx) = mpsc::channel(16);
        monitor.watch(rx);
        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);

        monitor.shutdown().await;
        monitor.shutdown().await;
        assert!(!monitor.keep_alive_active());
        assert!(monitor.snapshot().closed);
        assert!(tx.is_closed());

        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);
        assert!(!monitor.keep_alive_active());
        assert!(!monitor.on_message_error(Channel::Identified, CONFLICT).await);

        tokio::time::sleep(CADENCE * 5).await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_serializes() {
        let (_transport, monitor) = memory_monitor();
        monitor.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);
        assert!(!monitor.on_message_error(Channel::Identified, CONFLICT).await);
        tokio::time::advance(Duration::from_secs(5)).await;

        let value = serde_json::to_value(monitor.snapshot()).unwrap();
        assert_eq!(value["identified"]["needs_keep_alive"], true);
        assert_eq!(value["identified"]["pending_mismatch_errors"], 1);
        assert_eq!(value["unidentified"]["needs_keep_alive"], false);
        assert_eq!(value["keep_alive_active"], true);
        assert_eq!(value["supervisors_started"], 1);
        assert_eq!(value["forced_reconnects"], 0);
        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn state_change_from_foreign_thread_starts_supervisor() {
        let (transport, monitor) = memory_monitor();
        let monitor = Arc::new(monitor);

        let remote = Arc::clone(&monitor);
        std::thread::spawn(move || {
            remote.on_channel_state_changed(Channel::Identified, ConnectionState::Connected);
        })
        .join()
        .unwrap();
        assert!(monitor.keep_alive_active());

        tokio::time::sleep(CADENCE + Duration::from_millis(1)).await;
        assert_eq!(transport.count(TransportCall::SendKeepAlive), 1);
        monitor.shutdown().await;
    }

    #[test]
    fn state_change_without_any_runtime_is_logged() {
        let (logs, _guard) = capture_logs();
        let (_transport, monitor) = memory_monitor();

        monitor.on_channel_state_changed(Channel::Unidentified, ConnectionState::Connected);

        assert!(monitor.needs_keep_alive(Channel::Unidentified));
        assert!(!monitor.keep_alive_active());
        assert_eq!(monitor.snapshot().supervisors_started, 0);
        assert!(logs.has_event(Level::WARN, "no tokio runtime"));
    }

    #[tokio::test(start_paused = true)]
    async fn response_exactly_max_age_old_is_fresh() {
        let (_transport, monitor) = memory_monitor();
        let max_age = ParleySettings::default().keep_alive.max_response_age();
        let stamped = Instant::now();
        monitor.inner.stamp_keep_alive_all(stamped);

        assert_eq!(monitor.inner.stale_keep_alives(stamped, max_age), None);
        assert_eq!(monitor.inner.stale_keep_alives(stamped + max_age, max_age), None);

        let late = max_age + Duration::from_millis(1);
        assert_eq!(
            monitor.inner.stale_keep_alives(stamped + late, max_age),
            Some((late, late))
        );
    }
}
