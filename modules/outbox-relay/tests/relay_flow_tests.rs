//! Relay flow tests against a real Postgres.
//!
//! Ignored by default; run with a database prepared by the relay's
//! migrations:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/catalog_test cargo test -p outbox-relay -- --ignored
//! ```

use event_bus::{EventBus, InMemoryBus, IntegrationEvent};
use futures::StreamExt;
use outbox::{payload_field_resolver, ChangeFeed, OutboxPublisher, PollFeed, PublisherConfig};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPool::connect(&url).await.expect("connect");
    sqlx::migrate!("./db/migrations").run(&pool).await.expect("migrate");
    sqlx::query("TRUNCATE catalog_outbox, outbox_dead_letters")
        .execute(&pool)
        .await
        .expect("truncate");
    pool
}

fn product_payload(product_id: Uuid) -> serde_json::Value {
    serde_json::json!({ "product_id": product_id.to_string() })
}

/// Spawn a publisher with a fast poll feed; returns a stop closure.
fn spawn_publisher(
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    config: PublisherConfig,
) -> (tokio::task::JoinHandle<()>, tokio::sync::watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let publisher =
        OutboxPublisher::new(pool, bus, payload_field_resolver("product_id")).with_config(config);

    let handle = tokio::spawn(async move {
        let feeds: Vec<Box<dyn ChangeFeed>> =
            vec![Box::new(PollFeed::new(Duration::from_millis(50)))];
        publisher.run(feeds, shutdown_rx).await.expect("publisher run");
    });

    (handle, shutdown_tx)
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn committed_write_has_outbox_row_rolled_back_write_has_none() {
    let pool = test_pool().await;

    // Committed transaction: row must be captured
    let committed = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    outbox::store::enqueue(&mut *tx, "product.created", &product_payload(committed))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // Rolled-back transaction: no trace
    let rolled_back = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    outbox::store::enqueue(&mut *tx, "product.created", &product_payload(rolled_back))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let rows = outbox::store::fetch_undispatched(&pool, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload["product_id"], committed.to_string());
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn drain_publishes_in_commit_order_and_marks_dispatched() {
    let pool = test_pool().await;
    let bus = Arc::new(InMemoryBus::new());
    let mut stream = bus.subscribe("catalog.events.>").await.unwrap();

    let product_id = Uuid::new_v4();
    for event_type in ["product.created", "product.updated", "product.deleted"] {
        let mut tx = pool.begin().await.unwrap();
        outbox::store::enqueue(&mut *tx, event_type, &product_payload(product_id))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let (task, stop) = spawn_publisher(pool.clone(), bus.clone(), PublisherConfig::default());

    for expected in ["product.created", "product.updated", "product.deleted"] {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let envelope = IntegrationEvent::from_bytes(&msg.payload).unwrap();
        assert_eq!(envelope.event_type, expected);
        assert!(msg.subject.ends_with(&product_id.to_string()));
    }

    stop.send(true).unwrap();
    task.await.unwrap();

    let remaining = outbox::store::fetch_undispatched(&pool, 10).await.unwrap();
    assert!(remaining.is_empty(), "all rows must be marked dispatched");
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn unmarked_row_is_republished_with_same_event_id() {
    let pool = test_pool().await;
    let bus = Arc::new(InMemoryBus::new());
    let mut stream = bus.subscribe("catalog.events.>").await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let row_id = outbox::store::enqueue(
        &mut *tx,
        "product.created",
        &product_payload(Uuid::new_v4()),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let (task, stop) = spawn_publisher(pool.clone(), bus.clone(), PublisherConfig::default());

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended");

    // Simulate a crash between broker ack and mark-dispatched
    sqlx::query("UPDATE catalog_outbox SET dispatched_at = NULL WHERE id = $1")
        .bind(row_id)
        .execute(&pool)
        .await
        .unwrap();

    let second = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended");

    stop.send(true).unwrap();
    task.await.unwrap();

    // Duplicate allowed, loss forbidden. The envelope is identical,
    // so consumers can deduplicate on event_id
    let first = IntegrationEvent::from_bytes(&first.payload).unwrap();
    let second = IntegrationEvent::from_bytes(&second.payload).unwrap();
    assert_eq!(first.event_id, row_id);
    assert_eq!(second.event_id, row_id);
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn malformed_row_is_dead_lettered_and_unblocks_the_log() {
    let pool = test_pool().await;
    let bus = Arc::new(InMemoryBus::new());
    let mut stream = bus.subscribe("catalog.events.>").await.unwrap();

    // First row has no product_id: the resolver cannot find a subject
    let mut tx = pool.begin().await.unwrap();
    let bad_id = outbox::store::enqueue(
        &mut *tx,
        "product.created",
        &serde_json::json!({"unexpected": true}),
    )
    .await
    .unwrap();
    // Second, well-formed row is behind it in the log
    let good_product = Uuid::new_v4();
    outbox::store::enqueue(&mut *tx, "product.created", &product_payload(good_product))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let config = PublisherConfig {
        max_row_attempts: 2,
        ..PublisherConfig::default()
    };
    let (task, stop) = spawn_publisher(pool.clone(), bus.clone(), config);

    // The good row only arrives after the bad one is dead-lettered
    let msg = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended");
    let envelope = IntegrationEvent::from_bytes(&msg.payload).unwrap();
    assert_eq!(envelope.payload["product_id"], good_product.to_string());

    stop.send(true).unwrap();
    task.await.unwrap();

    let dead: i64 =
        sqlx::query_scalar("SELECT count(*) FROM outbox_dead_letters WHERE message_id = $1")
            .bind(bad_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(dead, 1);

    let remaining = outbox::store::fetch_undispatched(&pool, 10).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
#[ignore] // Requires Postgres
async fn mark_dispatched_claim_guard_rejects_second_claim() {
    let pool = test_pool().await;

    let mut tx = pool.begin().await.unwrap();
    let row_id = outbox::store::enqueue(
        &mut *tx,
        "product.created",
        &product_payload(Uuid::new_v4()),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert!(outbox::store::mark_dispatched(&pool, row_id).await.unwrap());
    // A racing relay instance loses the claim without corrupting state
    assert!(!outbox::store::mark_dispatched(&pool, row_id).await.unwrap());
}
