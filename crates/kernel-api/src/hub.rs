//! Fan-out of stream events to every connected subscriber.
//!
//! Each subscriber is a bounded channel drained by its own socket writer task, so the
//! channel is the single egress path for that subscriber. Events are serialized once per
//! broadcast and shared as `Arc<str>`. The hub also holds a close signal per subscriber
//! and fires it on eviction, so the socket that owns the channel can shut down.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use contracts::StreamEvent;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

pub type SubscriberId = u64;
pub type Frame = Arc<str>;

/// Per-subscriber buffer used by the socket route.
pub const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to encode {kind} event: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("subscriber channel closed before registration completed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: usize,
}

/// Handle returned to the owner of a subscriber channel.
#[derive(Debug)]
pub struct Registration {
    pub id: SubscriberId,
    /// Resolves once the hub has dropped this subscriber, whether evicted or unregistered.
    pub closed: oneshot::Receiver<()>,
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<Frame>,
    close: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct HubInner {
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber>>,
    // Serializes delivery passes so one subscriber never sees two broadcasts interleaved.
    egress: Mutex<()>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber after queueing its connection acknowledgement.
    pub async fn register(&self, tx: mpsc::Sender<Frame>) -> Result<Registration, HubError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let ack = encode(&StreamEvent::connection(id, Utc::now()))?;
        let (close, closed) = oneshot::channel();

        let mut subscribers = self.inner.subscribers.lock().await;
        tx.try_send(ack).map_err(|_| HubError::Closed)?;
        subscribers.insert(id, Subscriber { tx, close });
        debug!(subscriber = id, active = subscribers.len(), "hub.subscriber_registered");
        Ok(Registration { id, closed })
    }

    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.inner.subscribers.lock().await;
        match subscribers.remove(&id) {
            Some(subscriber) => {
                let _ = subscriber.close.send(());
                debug!(subscriber = id, active = subscribers.len(), "hub.subscriber_unregistered");
                true
            }
            None => false,
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().await.len()
    }

    pub async fn broadcast(&self, event: &StreamEvent) -> Result<BroadcastReport, HubError> {
        let frame = encode(event)?;
        let _egress = self.inner.egress.lock().await;

        let snapshot: Vec<(SubscriberId, mpsc::Sender<Frame>)> = {
            let subscribers = self.inner.subscribers.lock().await;
            subscribers
                .iter()
                .map(|(id, subscriber)| (*id, subscriber.tx.clone()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            // A full buffer means the writer cannot keep up; treat it like a broken socket.
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(err) => failed.push((id, err.to_string())),
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.inner.subscribers.lock().await;
            for (id, reason) in failed {
                if let Some(subscriber) = subscribers.remove(&id) {
                    // The owner may hold its own sender clone, so the channel alone never closes.
                    let _ = subscriber.close.send(());
                    report.removed += 1;
                    warn!(subscriber = id, kind = event.kind(), reason = %reason, "hub.subscriber_removed");
                }
            }
        }

        Ok(report)
    }
}

fn encode(event: &StreamEvent) -> Result<Frame, HubError> {
    serde_json::to_string(event)
        .map(Frame::from)
        .map_err(|source| HubError::Encode {
            kind: event.kind(),
            source,
        })
}
