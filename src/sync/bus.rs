//! Mutation Sync Bus
//!
//! In-process publish/subscribe for mutation events. Delivery to handlers is
//! synchronous and in publish order; every dispatched event is also offered on
//! a broadcast tap so a transport can carry it to other processes. Nothing here
//! assumes the publisher lives in the same process as the subscriber: events
//! arriving from elsewhere enter through [`SyncBus::deliver`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Capacity of the transport tap before slow consumers start lagging.
pub const TAP_CAPACITY: usize = 1024;

// == Mutation Event ==
/// Envelope for a mutation, both in-process and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// `sync:<entity>:<action>`
    pub topic: String,
    /// Full record for create/update/status-changed, `{ "id": ... }` for delete
    pub payload: Value,
    /// Node that published the event first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

type Handler = Arc<dyn Fn(&Value) -> Result<(), SyncError> + Send + Sync>;

struct Registered {
    id: u64,
    handler: Handler,
}

struct BusInner {
    node_id: String,
    handlers: RwLock<HashMap<String, Vec<Registered>>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<MutationEvent>,
}

impl BusInner {
    fn detach(&self, topic: &str, id: u64) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(topic) {
            list.retain(|registered| registered.id != id);
            if list.is_empty() {
                handlers.remove(topic);
            }
        }
    }
}

// == Sync Bus ==
#[derive(Clone)]
pub struct SyncBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBus")
            .field("node_id", &self.inner.node_id)
            .finish_non_exhaustive()
    }
}

impl SyncBus {
    pub fn new(node_id: impl Into<String>) -> Self {
        let (tap, _rx) = broadcast::channel(TAP_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                node_id: node_id.into(),
                handlers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                tap,
            }),
        }
    }

    /// Identity stamped as `origin` on events published here.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    // == Subscribe ==
    /// Registers `handler` for an exact topic.
    ///
    /// The returned [`Subscription`] detaches the handler when unsubscribed or
    /// dropped, whichever comes first.
    pub fn subscribe<H>(&self, topic: impl Into<String>, handler: H) -> Subscription
    where
        H: Fn(&Value) -> Result<(), SyncError> + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.clone())
            .or_default()
            .push(Registered {
                id,
                handler: Arc::new(handler),
            });
        debug!(topic = %topic, id, "Subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
            active: true,
        }
    }

    // == Publish ==
    /// Publishes a locally originated event. Returns how many handlers accepted it.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        self.dispatch(MutationEvent {
            topic: topic.to_string(),
            payload,
            origin: Some(self.inner.node_id.clone()),
        })
    }

    /// Delivers an event that arrived from another process, keeping its origin.
    pub fn deliver(&self, event: MutationEvent) -> usize {
        self.dispatch(event)
    }

    /// Receiver of every event dispatched on this bus, for transports.
    pub fn tap(&self) -> broadcast::Receiver<MutationEvent> {
        self.inner.tap.subscribe()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    fn dispatch(&self, event: MutationEvent) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.topic)
            .map(|list| list.iter().map(|r| Arc::clone(&r.handler)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event.payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(topic = %event.topic, error = %err, "Sync handler failed"),
                Err(cause) => warn!(
                    topic = %event.topic,
                    panic = panic_message(cause.as_ref()),
                    "Sync handler panicked"
                ),
            }
        }
        debug!(topic = %event.topic, delivered, "Dispatched event");

        // No tap receivers is fine
        let _ = self.inner.tap.send(event);
        delivered
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// == Subscription ==
/// Handle for one registered handler.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Detaches the handler. Consumes the handle, so it runs exactly once.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.topic, self.id);
            debug!(topic = %self.topic, id = self.id, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
