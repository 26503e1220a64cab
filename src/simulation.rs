//! Scripted sessions against the in-memory transport and source.
//!
//! A script is a JSON list of steps replayed in order on a paused clock, so
//! hours of keep-alive traffic run instantly and deterministically. Every
//! step other than `advance` lets the clock move by one millisecond so
//! spawned tasks observe it before the next step.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use parley_client::Client;
use parley_core::{Channel, Envelope, IncomingMessage, TransportEvent};
use parley_receive::{HandlerKind, MemorySource, SharedHandler, handler_fn};
use parley_settings::ParleySettings;
use parley_transport::{HealthSnapshot, MemoryTransport, TransportCall};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

const SETTLE: Duration = Duration::from_millis(1);
const EVENT_BUFFER: usize = 256;

/// Name under which foreground receives are counted.
const SYNC_CALLER: &str = "receive_messages";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Deliver a transport notification to the health monitor.
    Event { event: TransportEvent },
    /// Queue an inbound message on the source.
    Message {
        #[serde(default = "default_channel")]
        channel: Channel,
        #[serde(default)]
        source: Option<String>,
        body: String,
    },
    /// Let virtual time pass.
    Advance { ms: u64 },
    AddHandler {
        name: String,
        #[serde(default)]
        kind: StepHandlerKind,
    },
    RemoveHandler { name: String },
    /// Run a foreground receive. It returns after `timeout_ms` without a
    /// message (the configured default read timeout when absent), or after
    /// `max_messages`.
    Receive {
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        max_messages: Option<usize>,
    },
    /// Whether the server answers keep-alives.
    RespondToKeepAlives { respond: bool },
    FailKeepAlives { fail: bool },
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepHandlerKind {
    #[default]
    Strong,
    Weak,
}

impl From<StepHandlerKind> for HandlerKind {
    fn from(kind: StepHandlerKind) -> Self {
        match kind {
            StepHandlerKind::Strong => Self::Strong,
            StepHandlerKind::Weak => Self::Weak,
        }
    }
}

fn default_channel() -> Channel {
    Channel::Identified
}

/// Outcome of a replayed script.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub elapsed_ms: u64,
    /// Taken just before the client is closed.
    pub health: HealthSnapshot,
    pub transport_calls: BTreeMap<TransportCall, usize>,
    /// Messages seen per handler name.
    pub received: BTreeMap<String, usize>,
    pub receive_errors: Vec<String>,
}

pub fn load_script(path: &Path) -> Result<Script> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid script: {}", path.display()))
}

/// Replay `script` and close the client afterwards.
///
/// Must run on a runtime with a paused clock for the timings to be exact.
pub async fn run(script: Script, settings: &ParleySettings) -> Result<Summary> {
    let started = Instant::now();
    let transport = Arc::new(MemoryTransport::new());
    let (source, feed) = MemorySource::new();
    let client = Client::new(transport.clone(), Arc::new(source), settings);

    let (events, rx) = mpsc::channel(EVENT_BUFFER);
    transport.respond_to_keep_alives(events.clone());
    client.attach_transport_events(rx);

    let received: Arc<Mutex<BTreeMap<String, usize>>> = Arc::default();
    let mut handlers: HashMap<String, SharedHandler> = HashMap::new();
    let mut receive_errors = Vec::new();

    for (index, step) in script.steps.into_iter().enumerate() {
        debug!(index, ?step, "replaying step");
        match step {
            Step::Event { event } => {
                events
                    .send(event)
                    .await
                    .context("transport event pump stopped")?;
            }
            Step::Message {
                channel,
                source,
                body,
            } => {
                let envelope = Envelope {
                    source,
                    source_device: None,
                    server_timestamp_ms: 0,
                    channel,
                };
                feed.push(IncomingMessage::new(envelope, body));
            }
            Step::Advance { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                continue;
            }
            Step::AddHandler { name, kind } => {
                if handlers.contains_key(&name) {
                    bail!("step {index}: handler {name:?} already registered");
                }
                let handler = counting_handler(&received, name.clone());
                client.add_receive_handler(handler.clone(), kind.into());
                let _ = handlers.insert(name, handler);
            }
            Step::RemoveHandler { name } => {
                let Some(handler) = handlers.remove(&name) else {
                    bail!("step {index}: no handler named {name:?}");
                };
                client.remove_receive_handler(&handler).await;
            }
            Step::Receive {
                timeout_ms,
                max_messages,
            } => {
                let caller = counting_handler(&received, SYNC_CALLER.to_owned());
                // Nothing else runs while a step does, so the read must end on its own.
                let timeout = timeout_ms
                    .map_or_else(|| settings.receive.default_timeout(), Duration::from_millis);
                if let Err(e) = client
                    .receive_messages(Some(timeout), max_messages, caller.as_ref())
                    .await
                {
                    receive_errors.push(format!("step {index}: {e}"));
                }
            }
            Step::RespondToKeepAlives { respond } => {
                if respond {
                    transport.respond_to_keep_alives(events.clone());
                } else {
                    transport.stop_responding();
                }
            }
            Step::FailKeepAlives { fail } => transport.fail_keep_alives(fail),
        }
        tokio::time::sleep(SETTLE).await;
    }

    let health = client.health_snapshot();
    client.close().await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(elapsed_ms, "simulation finished");
    let received = received.lock().clone();
    Ok(Summary {
        elapsed_ms,
        health,
        transport_calls: transport.counts(),
        received,
        receive_errors,
    })
}

fn counting_handler(counts: &Arc<Mutex<BTreeMap<String, usize>>>, name: String) -> SharedHandler {
    let counts = Arc::clone(counts);
    handler_fn(move |_| {
        *counts.lock().entry(name.clone()).or_insert(0) += 1;
        Ok(())
    })
}
