//! Mutation Sync Bridge
//!
//! Binds a [`TrackedCollection`] to the four topics of its entity. Bus
//! handlers only decode and enqueue; a single applier task per binding applies
//! the queue in delivery order, so events for one entity type are serialized
//! while different entity types proceed in parallel.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::sync::{Action, MergeOutcome, Record, Subscription, SyncBus, Topic, TrackedCollection};

// == Delete Payload ==
/// `{ "id": ... }`; numeric ids are accepted and compared as strings.
#[derive(Debug, Deserialize)]
struct DeleteRef {
    id: RawId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(id) => id,
            RawId::Number(n) => n.to_string(),
        }
    }
}

enum Mutation<R> {
    Upsert { action: Action, record: R },
    Delete(String),
    Flush(oneshot::Sender<()>),
}

fn decode<R: Record>(topic: &str, action: Action, payload: &Value) -> Result<Mutation<R>, SyncError> {
    let malformed = |reason: String| SyncError::MalformedPayload {
        topic: topic.to_string(),
        reason,
    };

    match action {
        Action::Delete => {
            let DeleteRef { id } =
                DeleteRef::deserialize(payload).map_err(|e| malformed(e.to_string()))?;
            let id = id.into_string();
            if id.is_empty() {
                return Err(malformed("empty id".into()));
            }
            Ok(Mutation::Delete(id))
        }
        _ => {
            let record = R::deserialize(payload).map_err(|e| malformed(e.to_string()))?;
            if record.id().is_empty() {
                return Err(malformed("empty id".into()));
            }
            Ok(Mutation::Upsert { action, record })
        }
    }
}

// == Sync Binding ==
/// Live link between the bus and one collection.
///
/// Tear down with [`unbind`](Self::unbind) when the owning view goes away;
/// dropping the binding does the same.
pub struct SyncBinding<R: Record> {
    entity: String,
    subscriptions: Vec<Subscription>,
    queue: mpsc::UnboundedSender<Mutation<R>>,
}

impl<R: Record> SyncBinding<R> {
    /// Subscribes `collection` to `sync:<entity>:{create,update,delete,status-changed}`.
    /// Must be called inside a tokio runtime.
    pub fn bind(bus: &SyncBus, entity: &str, collection: TrackedCollection<R>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();

        let subscriptions: Vec<Subscription> = Action::ALL
            .into_iter()
            .map(|action| {
                let topic = Topic::new(entity, action).to_string();
                let queue = queue.clone();
                let entity = entity.to_string();
                bus.subscribe(topic.clone(), move |payload| {
                    let mutation = decode::<R>(&topic, action, payload)?;
                    queue
                        .send(mutation)
                        .map_err(|_| SyncError::Unbound(entity.clone()))
                })
            })
            .collect();

        // Exits once the binding and its handlers drop their queue senders
        tokio::spawn(apply_queue(entity.to_string(), collection, rx));
        info!(entity, "Sync binding attached");

        Self {
            entity: entity.to_string(),
            subscriptions,
            queue,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Waits until every event accepted so far has been applied.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (done, wait) = oneshot::channel();
        self.queue
            .send(Mutation::Flush(done))
            .map_err(|_| SyncError::Unbound(self.entity.clone()))?;
        wait.await.map_err(|_| SyncError::Unbound(self.entity.clone()))
    }

    /// Unsubscribes every topic handler. Events already queued are still applied.
    pub fn unbind(self) {
        // Drop does the work
    }
}

impl<R: Record> Drop for SyncBinding<R> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        info!(entity = %self.entity, "Sync binding detached");
    }
}

async fn apply_queue<R: Record>(
    entity: String,
    collection: TrackedCollection<R>,
    mut rx: mpsc::UnboundedReceiver<Mutation<R>>,
) {
    while let Some(mutation) = rx.recv().await {
        match mutation {
            Mutation::Upsert { action, record } => {
                let id = record.id().to_string();
                let outcome = match action {
                    Action::Create => collection.apply_create(record).await,
                    Action::StatusChanged => collection.apply_status_changed(record).await,
                    _ => collection.apply_update(record).await,
                };
                if outcome == MergeOutcome::OverrodeLocal {
                    info!(entity = %entity, id = %id, "Remote event replaced unacknowledged local edit");
                } else {
                    debug!(entity = %entity, id = %id, action = %action, ?outcome, "Applied remote event");
                }
            }
            Mutation::Delete(id) => {
                let removed = collection.apply_delete(&id).await;
                debug!(entity = %entity, id = %id, removed, "Applied remote delete");
            }
            Mutation::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(entity = %entity, "Sync applier finished");
}
