//! Fire-and-forget delivery of tracked events.
//!
//! `DecisionTracker` hands every event to a [`Transport`] wrapped in an
//! [`Envelope`] that carries the destination. `dispatch` must not block the
//! caller on I/O and has no error channel: delivery failures are logged and
//! the event is dropped (no retries, no persistence).
//!
//! HTTP is out of scope for this crate. [`ChannelTransport`] moves envelopes
//! to a background thread and calls a user-supplied [`Deliver`] sink there,
//! which is where an HTTP client would plug in.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tracker::TrackedEvent;

/// Where events for one model are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub track_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Endpoint {
    /// Endpoint without an API key.
    pub fn new(track_url: impl Into<String>) -> Self {
        Self {
            track_url: track_url.into(),
            api_key: None,
        }
    }

    /// Attach the API key sent with each event.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// One event plus its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub endpoint: Endpoint,
    pub event: TrackedEvent,
}

impl Envelope {
    /// The request body: the event as a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.event)?)
    }
}

/// Non-blocking event sink.
pub trait Transport: Send + Sync {
    fn dispatch(&self, envelope: Envelope);
}

/// Keeps every envelope in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<Envelope>>,
}

impl MemoryTransport {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything dispatched so far.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    /// Remove and return everything dispatched so far.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of buffered envelopes.
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn dispatch(&self, envelope: Envelope) {
        self.sent.lock().push(envelope);
    }
}

/// Emits each envelope as an `info` event on target `improve::transport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn dispatch(&self, envelope: Envelope) {
        match envelope.to_json() {
            Ok(body) => info!(
                target: "improve::transport",
                url = %envelope.endpoint.track_url,
                model = %envelope.event.model,
                id = %envelope.event.id,
                %body,
                "event"
            ),
            Err(e) => warn!(target: "improve::transport", error = %e, "event not serializable"),
        }
    }
}

/// Performs the actual delivery on the dispatcher thread.
pub trait Deliver: Send + 'static {
    fn deliver(&mut self, envelope: &Envelope) -> std::result::Result<(), String>;
}

impl<F> Deliver for F
where
    F: FnMut(&Envelope) -> std::result::Result<(), String> + Send + 'static,
{
    fn deliver(&mut self, envelope: &Envelope) -> std::result::Result<(), String> {
        self(envelope)
    }
}

/// Queues envelopes for a background thread.
///
/// `dispatch` only enqueues. Events still queued when [`ChannelTransport::shutdown`]
/// is called are delivered before the thread exits.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<DispatchStats>>>,
}

/// Counters returned by [`ChannelTransport::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

impl ChannelTransport {
    /// Start the delivery thread feeding `sink`.
    pub fn spawn<D: Deliver>(mut sink: D) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Envelope>();
        let worker = thread::Builder::new()
            .name("improve-dispatch".to_string())
            .spawn(move || {
                let mut stats = DispatchStats::default();
                for envelope in rx {
                    match sink.deliver(&envelope) {
                        Ok(()) => stats.delivered += 1,
                        Err(reason) => {
                            stats.failed += 1;
                            warn!(
                                url = %envelope.endpoint.track_url,
                                model = %envelope.event.model,
                                id = %envelope.event.id,
                                %reason,
                                "event delivery failed"
                            );
                        }
                    }
                }
                stats
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting events, drain the queue, and join the dispatcher.
    ///
    /// Later calls (and dispatches after shutdown) are no-ops.
    pub fn shutdown(&self) -> DispatchStats {
        drop(self.tx.lock().take());
        let Some(worker) = self.worker.lock().take() else {
            return DispatchStats::default();
        };
        match worker.join() {
            Ok(stats) => {
                debug!(delivered = stats.delivered, failed = stats.failed, "dispatcher stopped");
                stats
            }
            Err(_) => {
                warn!("dispatcher thread panicked; queued events dropped");
                DispatchStats::default()
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn dispatch(&self, envelope: Envelope) {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(envelope).is_err() {
                    warn!("dispatcher is gone; event dropped");
                }
            }
            None => warn!(id = %envelope.event.id, "transport shut down; event dropped"),
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
