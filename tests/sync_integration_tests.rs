//! Integration Tests for Coalescing and Cross-Terminal Sync
//!
//! End-to-end scenarios: a burst of identical fetches from several screens,
//! tables kept in sync through bus events, and two terminal nodes linked over
//! HTTP by the relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pos_sync_cache::api::create_router;
use pos_sync_cache::sync::{relay_client, spawn_relay};
use pos_sync_cache::{
    AppState, CacheConfig, CacheError, ExecuteOptions, QueryCache, Record, SyncBinding, SyncBus,
    TrackedCollection,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DiningTable {
    id: String,
    name: String,
    status: String,
}

impl Record for DiningTable {
    fn id(&self) -> &str {
        &self.id
    }
}

fn table_list() -> Value {
    json!([
        {"id": "table-1", "name": "T1", "status": "free"},
        {"id": "table-2", "name": "T2", "status": "occupied"}
    ])
}

// == Coalescing ==

#[tokio::test(start_paused = true)]
async fn test_five_screens_one_network_call() {
    let cache = QueryCache::new(CacheConfig::default());
    let network_calls = Arc::new(AtomicUsize::new(0));

    let mut callers = Vec::new();
    for i in 0..5u64 {
        let cache = cache.clone();
        let calls = Arc::clone(&network_calls);
        callers.push(tokio::spawn(async move {
            // All five land within 50ms
            tokio::time::sleep(Duration::from_millis(i * 12)).await;
            cache
                .execute(
                    "tables-layout-active",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(table_list())
                    },
                    ExecuteOptions::new().ttl(Duration::from_secs(30)),
                )
                .await
        }));
    }

    for caller in callers {
        let value = assert_ok!(caller.await.unwrap());
        assert_eq!(*value, table_list());
    }
    assert_eq!(network_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_parallel_screens_one_network_call() {
    let cache = QueryCache::new(CacheConfig::default());
    let network_calls = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(tokio::sync::Barrier::new(50));

    let mut callers = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        let calls = Arc::clone(&network_calls);
        let start = Arc::clone(&start);
        callers.push(tokio::spawn(async move {
            start.wait().await;
            cache
                .execute(
                    "tables-layout-active",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(table_list())
                    },
                    ExecuteOptions::new().ttl(Duration::from_secs(30)),
                )
                .await
        }));
    }

    for caller in callers {
        let value = assert_ok!(caller.await.unwrap());
        assert_eq!(*value, table_list());
    }
    assert_eq!(network_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_retries_immediately() {
    let cache = QueryCache::new(CacheConfig::default());
    let network_calls = Arc::new(AtomicUsize::new(0));

    let calls = Arc::clone(&network_calls);
    let first = cache
        .execute(
            "orders-open",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("gateway timeout"))
            },
            ExecuteOptions::new(),
        )
        .await;
    let err = assert_err!(first);
    assert!(matches!(err, CacheError::Producer(_)));

    let calls = Arc::clone(&network_calls);
    let second = cache
        .execute(
            "orders-open",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!([]))
            },
            ExecuteOptions::new(),
        )
        .await;
    assert_ok!(second);
    assert_eq!(network_calls.load(Ordering::SeqCst), 2);
}

// == Tracked Collections ==

#[tokio::test]
async fn test_seeded_tables_follow_bus_events() {
    let cache = QueryCache::new(CacheConfig::default());
    let bus = SyncBus::new("cashier-1");
    let tables = TrackedCollection::<DiningTable>::new();
    let binding = SyncBinding::bind(&bus, "table", tables.clone());

    let loaded = tables
        .seed(
            &cache,
            "tables-layout-active",
            || async { Ok(table_list()) },
            ExecuteOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(loaded, 2);

    // Delete of a present id removes it
    bus.publish("sync:table:delete", json!({"id": "table-1"}));
    binding.flush().await.unwrap();
    assert_eq!(tables.len().await, 1);

    // Redelivery is a no-op
    bus.publish("sync:table:delete", json!({"id": "table-1"}));
    binding.flush().await.unwrap();
    assert_eq!(tables.len().await, 1);

    // Update for an id never created is inserted once
    let t3 = json!({"id": "table-3", "name": "T3", "status": "reserved"});
    bus.publish("sync:table:update", t3.clone());
    bus.publish("sync:table:create", t3);
    binding.flush().await.unwrap();
    assert_eq!(tables.len().await, 2);
    assert_eq!(tables.get("table-3").await.unwrap().status, "reserved");

    binding.unbind();
}

#[tokio::test]
async fn test_local_edit_then_remote_event_last_event_wins() {
    let bus = SyncBus::new("waiter-3");
    let tables = TrackedCollection::<DiningTable>::new();
    let binding = SyncBinding::bind(&bus, "table", tables.clone());

    tables
        .upsert(DiningTable {
            id: "table-1".into(),
            name: "T1".into(),
            status: "occupied".into(),
        })
        .await;

    bus.deliver(pos_sync_cache::sync::MutationEvent {
        topic: "sync:table:status-changed".into(),
        payload: json!({"id": "table-1", "name": "T1", "status": "cleaning"}),
        origin: Some("cashier-1".into()),
    });
    binding.flush().await.unwrap();

    assert_eq!(tables.get("table-1").await.unwrap().status, "cleaning");
}

// == Two Nodes Over HTTP ==

#[tokio::test]
async fn test_relay_carries_events_between_nodes() {
    // Node B: serves the HTTP surface and tracks tables
    let bus_b = SyncBus::new("node-b");
    let tables_b = TrackedCollection::<DiningTable>::new();
    let _binding_b = SyncBinding::bind(&bus_b, "table", tables_b.clone());
    let app_b = create_router(AppState::new(QueryCache::new(CacheConfig::default()), bus_b));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app_b).await.unwrap();
    });

    // Node A: publishes locally and relays to B
    let bus_a = SyncBus::new("node-a");
    let client = relay_client(Duration::from_secs(2)).unwrap();
    let relay = spawn_relay(&bus_a, vec![format!("http://{}", addr)], client);

    bus_a.publish(
        "sync:table:create",
        json!({"id": "table-7", "name": "T7", "status": "free"}),
    );
    bus_a.publish(
        "sync:table:status-changed",
        json!({"id": "table-7", "name": "T7", "status": "occupied"}),
    );

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(table) = tables_b.get("table-7").await {
                if table.status == "occupied" {
                    return table;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let table = assert_ok!(converged);
    assert_eq!(table.name, "T7");
    assert_eq!(tables_b.len().await, 1);

    relay.abort();
    server.abort();
}

#[tokio::test]
async fn test_relay_does_not_forward_foreign_events() {
    let bus_b = SyncBus::new("node-b");
    let tables_b = TrackedCollection::<DiningTable>::new();
    let binding_b = SyncBinding::bind(&bus_b, "table", tables_b.clone());
    let app_b = create_router(AppState::new(QueryCache::new(CacheConfig::default()), bus_b));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app_b).await.unwrap();
    });

    let bus_a = SyncBus::new("node-a");
    let client = relay_client(Duration::from_secs(2)).unwrap();
    let relay = spawn_relay(&bus_a, vec![format!("http://{}", addr)], client);

    // Arrived at A from some third node: A must not pass it on
    bus_a.deliver(pos_sync_cache::sync::MutationEvent {
        topic: "sync:table:create".into(),
        payload: json!({"id": "table-9", "name": "T9", "status": "free"}),
        origin: Some("node-c".into()),
    });
    // A local event afterwards proves the relay is running and ordered
    bus_a.publish(
        "sync:table:create",
        json!({"id": "table-8", "name": "T8", "status": "free"}),
    );

    let arrived = tokio::time::timeout(Duration::from_secs(5), async {
        while tables_b.get("table-8").await.is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert_ok!(arrived);
    binding_b.flush().await.unwrap();

    assert!(tables_b.get("table-9").await.is_none());

    relay.abort();
    server.abort();
}
