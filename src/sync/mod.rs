//! Sync Module
//!
//! Cross-terminal mutation propagation: a publish/subscribe bus, tracked
//! collections with idempotent merges, the bridge between them, and an HTTP
//! relay to peer processes.

mod bridge;
mod bus;
mod collection;
mod relay;
mod topic;

pub use bridge::SyncBinding;
pub use bus::{MutationEvent, Subscription, SyncBus, TAP_CAPACITY};
pub use collection::{MergeOutcome, Record, TrackedCollection};
pub use relay::{relay_client, spawn_relay, RelayHandle, EVENTS_PATH, RELAY_ATTEMPTS};
pub use topic::{Action, Topic, TOPIC_PREFIX};
