//! Peer Relay
//!
//! Carries this node's mutation events to other terminal processes over HTTP.
//! Each peer gets its own forwarding task fed from the bus tap, so per-peer
//! delivery keeps publish order. Only events that originated on this node are
//! forwarded; events received from peers are not echoed back.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::sync::{MutationEvent, SyncBus};

/// Path on a peer node that accepts inbound events.
pub const EVENTS_PATH: &str = "/sync/events";

/// Delivery attempts per event per peer.
pub const RELAY_ATTEMPTS: u32 = 3;

/// Builds the HTTP client used for forwarding.
pub fn relay_client(timeout: Duration) -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Relay(format!("failed to create HTTP client: {}", e)))
}

// == Relay Handle ==
/// Running forwarders, one per peer.
#[derive(Debug)]
pub struct RelayHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn peer_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every forwarder. Idempotent.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Starts forwarding locally originated events to every peer base URL.
pub fn spawn_relay(bus: &SyncBus, peers: Vec<String>, client: reqwest::Client) -> RelayHandle {
    let tasks = peers
        .into_iter()
        .map(|peer| {
            let rx = bus.tap();
            let node_id = bus.node_id().to_string();
            let client = client.clone();
            tokio::spawn(forward_loop(node_id, peer, client, rx))
        })
        .collect();

    RelayHandle { tasks }
}

async fn forward_loop(
    node_id: String,
    peer: String,
    client: reqwest::Client,
    mut rx: broadcast::Receiver<MutationEvent>,
) {
    let url = format!("{}{}", peer.trim_end_matches('/'), EVENTS_PATH);
    info!(peer = %peer, "Relay to peer started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.origin.as_deref() != Some(node_id.as_str()) {
                    continue;
                }
                if let Err(err) = forward(&client, &url, &event).await {
                    warn!(peer = %peer, topic = %event.topic, error = %err, "Dropping event for peer");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(peer = %peer, skipped, "Relay lagged, some events were not forwarded");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(peer = %peer, "Sync bus closed, relay stopping");
                break;
            }
        }
    }
}

/// Posts one event, retrying with exponential backoff: 100ms, 200ms.
async fn forward(client: &reqwest::Client, url: &str, event: &MutationEvent) -> Result<(), SyncError> {
    let mut delay = Duration::from_millis(100);
    let mut last_error = String::new();

    for attempt in 1..=RELAY_ATTEMPTS {
        match client.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url, topic = %event.topic, attempt, "Event forwarded");
                return Ok(());
            }
            // A peer rejecting the event will reject it again
            Ok(response) if response.status().is_client_error() => {
                return Err(SyncError::Relay(format!("peer rejected event: {}", response.status())));
            }
            Ok(response) => last_error = format!("peer returned {}", response.status()),
            Err(err) => last_error = err.to_string(),
        }

        if attempt < RELAY_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    Err(SyncError::Relay(last_error))
}
