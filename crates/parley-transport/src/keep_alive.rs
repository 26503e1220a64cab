//! Background keep-alive loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::monitor::{MonitorInner, millis};

/// Handle to the running keep-alive task.
///
/// Created and shut down only while the monitor's state lock is held, so at
/// most one is live at a time.
#[derive(Debug)]
pub(crate) struct KeepAliveSupervisor {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl KeepAliveSupervisor {
    /// Spawn the loop. It waits for `previous` (an already shut down
    /// supervisor) to finish before touching any state.
    pub(crate) fn start(
        runtime: &Handle,
        inner: Arc<MonitorInner>,
        id: u64,
        cancel: CancellationToken,
        previous: Option<JoinHandle<()>>,
    ) -> Self {
        let handle = runtime.spawn(run(inner, id, cancel.clone(), previous));
        Self { id, cancel, handle }
    }

    /// Request the loop to stop and hand back its task for joining.
    pub(crate) fn shutdown(self) -> JoinHandle<()> {
        debug!(supervisor = self.id, "stopping keep-alive supervisor");
        self.cancel.cancel();
        self.handle
    }
}

async fn run(
    inner: Arc<MonitorInner>,
    id: u64,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!(supervisor = id, error = %e, "previous keep-alive supervisor ended abnormally");
        }
    }

    let cadence = inner.keep_alive.cadence();
    let max_age = inner.keep_alive.max_response_age();
    inner.stamp_keep_alive_all(Instant::now());
    debug!(
        supervisor = id,
        cadence_ms = millis(cadence),
        "keep-alive supervisor started"
    );

    while !cancel.is_cancelled() && inner.keep_alive_needed() {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(cadence) => {}
        }

        if cancel.is_cancelled() || !inner.keep_alive_needed() {
            continue;
        }

        match AssertUnwindSafe(tick(&inner, max_age)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(supervisor = id, error = %e, "keep-alive tick failed, continuing"),
            Err(panic) => warn!(
                supervisor = id,
                panic = %panic_message(panic.as_ref()),
                "keep-alive tick panicked, continuing"
            ),
        }
    }

    debug!(supervisor = id, "keep-alive supervisor stopped");
}

/// One wake-up: reconnect if either channel went quiet, ping otherwise.
async fn tick(inner: &MonitorInner, max_age: Duration) -> Result<(), TransportError> {
    let now = Instant::now();
    if let Some((identified_age, unidentified_age)) = inner.stale_keep_alives(now, max_age) {
        warn!(
            identified_age_ms = millis(identified_age),
            unidentified_age_ms = millis(unidentified_age),
            max_age_ms = millis(max_age),
            "missed keep-alives, forcing new sockets"
        );
        return inner.force_reconnect().await;
    }
    inner.transport.send_keep_alive().await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_from_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
