use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use solarflare_core::models::CollectionRequest;
use solarflare_core::traits::CollectionQueue;
use solarflare_core::{
    CollectionListener, DEFAULT_QUEUE_NAME, IngestionService, ListenerConfig, NullMetrics,
    TracingCollectorReporter,
};
use solarflare_db::{CollectionQueueRepository, Database};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{StubSource, flare_payload, setup_test_db};

#[tokio::test]
async fn publish_then_receive_once() {
    let (pool, _container) = setup_test_db().await;
    let queue = CollectionQueueRepository::new(pool, DEFAULT_QUEUE_NAME);
    queue.declare().await.unwrap();

    let id = queue
        .publish(&CollectionRequest::new("2025-01-20", "2025-01-22"))
        .await
        .unwrap();
    assert_eq!(queue.pending().await.unwrap(), 1);

    let message = queue.receive().await.unwrap().expect("message delivered");
    assert_eq!(message.id, id);
    let body: serde_json::Value = serde_json::from_str(&message.body).unwrap();
    assert_eq!(
        body,
        json!({"start_date": "2025-01-20", "end_date": "2025-01-22"})
    );

    assert!(queue.receive().await.unwrap().is_none());
    assert_eq!(queue.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn messages_are_delivered_oldest_first() {
    let (pool, _container) = setup_test_db().await;
    let queue = CollectionQueueRepository::new(pool, DEFAULT_QUEUE_NAME);

    for day in 1..=3 {
        let date = format!("2025-01-0{day}");
        queue
            .publish(&CollectionRequest::new(&date, &date))
            .await
            .unwrap();
    }

    let mut starts = Vec::new();
    while let Some(message) = queue.receive().await.unwrap() {
        let range = CollectionRequest::parse_body(&message.body).unwrap();
        starts.push(range.start().to_string());
    }
    assert_eq!(starts, ["2025-01-01", "2025-01-02", "2025-01-03"]);
}

#[tokio::test]
async fn queues_are_isolated_by_name() {
    let (pool, _container) = setup_test_db().await;
    let collection = CollectionQueueRepository::new(pool.clone(), DEFAULT_QUEUE_NAME);
    let other = CollectionQueueRepository::new(pool, "other_queue");

    other
        .publish(&CollectionRequest::new("2025-01-20", "2025-01-22"))
        .await
        .unwrap();

    assert!(collection.receive().await.unwrap().is_none());
    assert!(other.receive().await.unwrap().is_some());
}

#[tokio::test]
async fn competing_consumers_receive_each_message_once() {
    let (pool, _container) = setup_test_db().await;
    let queue = CollectionQueueRepository::new(pool, DEFAULT_QUEUE_NAME);

    let mut published = HashSet::new();
    for _ in 0..40 {
        let id = queue
            .publish(&CollectionRequest::new("2025-01-20", "2025-01-22"))
            .await
            .unwrap();
        published.insert(id);
    }

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(message) = queue.receive().await.unwrap() {
                    seen.push(message.id);
                }
                seen
            })
        })
        .collect();

    let mut received = Vec::new();
    for consumer in consumers {
        received.extend(consumer.await.unwrap());
    }

    let unique: HashSet<_> = received.iter().copied().collect();
    assert_eq!(received.len(), 40);
    assert_eq!(unique, published);
}

#[tokio::test]
async fn listener_ingests_published_request() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let queue = db.queue_repo(DEFAULT_QUEUE_NAME);
    let repo = db.flare_repo();
    let source = StubSource::new(json!([flare_payload(
        "2025-01-21T10:08:00-FLR-001",
        "2025-01-21T10:08Z"
    )]));

    queue
        .publish(&CollectionRequest::new("2025-01-20", "2025-01-22"))
        .await
        .unwrap();
    sqlx::query("INSERT INTO collection_requests (queue_name, body) VALUES ($1, $2)")
        .bind(DEFAULT_QUEUE_NAME)
        .bind("{not json")
        .execute(db.pool())
        .await
        .unwrap();

    let listener = CollectionListener::new(
        queue.clone(),
        DEFAULT_QUEUE_NAME,
        IngestionService::new(source, repo.clone()),
        NullMetrics,
        ListenerConfig::default().with_poll_interval(Duration::from_millis(20)),
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { listener.run(cancel, &TracingCollectorReporter).await }
    });

    for _ in 0..100 {
        if queue.pending().await.unwrap() == 0 && repo.count().await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(queue.pending().await.unwrap(), 0);
    assert_eq!(repo.count().await.unwrap(), 1);
}
