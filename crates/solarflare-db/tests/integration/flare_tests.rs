use chrono::{DateTime, Utc};
use serde_json::json;
use solarflare_core::models::NewFlare;
use solarflare_core::traits::FlareTransaction;
use solarflare_core::{IngestionService, RangePlanner};
use solarflare_db::Database;

use crate::integration::common::{StubSource, flare_payload, range, setup_test_db};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn new_flare(external_id: &str, begin: &str) -> NewFlare {
    NewFlare {
        external_id: external_id.to_string(),
        begin_time: ts(begin),
        peak_time: ts(begin),
        end_time: None,
        class_type: "M1.0".to_string(),
        source_location: None,
        active_region_num: None,
        linked_events: None,
    }
}

#[tokio::test]
async fn ingest_stores_mapped_flare() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();
    let source = StubSource::new(json!([flare_payload(
        "2025-01-21T10:08:00-FLR-001",
        "2025-01-21T10:08Z"
    )]));

    let summary = IngestionService::new(source, repo.clone())
        .ingest(&range())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    let flare = repo
        .get_by_external_id("2025-01-21T10:08:00-FLR-001")
        .await
        .unwrap()
        .expect("flare stored");
    assert_eq!(flare.begin_time, ts("2025-01-21T10:08:00Z"));
    assert_eq!(flare.peak_time, ts("2025-01-21T10:08:00Z"));
    assert_eq!(flare.end_time, None);
    assert_eq!(flare.class_type, "C3.2");
    assert_eq!(flare.source_location.as_deref(), Some("S15W30"));
    assert_eq!(flare.active_region_num, Some(13961));
    assert_eq!(
        flare.linked_events,
        Some(json!([{"activityID": "2025-01-21T11:00:00-CME-001"}]))
    );
}

#[tokio::test]
async fn repeated_ingest_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();
    let source = StubSource::new(json!([
        flare_payload("2025-01-21T10:08:00-FLR-001", "2025-01-21T10:08Z"),
        flare_payload("2025-01-21T14:30:00-FLR-002", "2025-01-21T14:30Z"),
        flare_payload("2025-01-21T10:08:00-FLR-001", "2025-01-21T10:08Z"),
    ]));
    let service = IngestionService::new(source, repo.clone());

    let first = service.ingest(&range()).await.unwrap();
    let second = service.ingest(&range()).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(first.duplicates_in_batch, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.already_stored, 2);
    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn long_upstream_fields_do_not_block_the_batch() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();
    let long_id = format!("legacy-{}", "7".repeat(93));
    let mut odd = flare_payload(&long_id, "2025-01-21T09:00Z");
    odd["classType"] = json!("C".repeat(40));
    odd["sourceLocation"] = json!("S".repeat(80));
    let source = StubSource::new(json!([
        odd,
        flare_payload("2025-01-21T10:08:00-FLR-001", "2025-01-21T10:08Z"),
    ]));

    let summary = IngestionService::new(source, repo.clone())
        .ingest(&range())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    let stored = repo.get_by_external_id(&long_id).await.unwrap().unwrap();
    assert_eq!(stored.external_id.len(), 100);
    assert_eq!(stored.class_type.len(), 40);
    assert_eq!(stored.source_location.map(|s| s.len()), Some(80));
}

#[tokio::test]
async fn concurrent_ingests_store_each_flare_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();
    let payloads: Vec<_> = (1..=20)
        .map(|n| {
            flare_payload(
                &format!("2025-01-21T10:{n:02}:00-FLR-{n:03}"),
                &format!("2025-01-21T10:{n:02}Z"),
            )
        })
        .collect();
    let service = IngestionService::new(StubSource::new(json!(payloads)), repo.clone());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.ingest(&range()).await })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.inserted + summary.already_stored, 20);
        inserted += summary.inserted;
    }

    assert_eq!(inserted, 20);
    assert_eq!(repo.count().await.unwrap(), 20);
}

#[tokio::test]
async fn rolled_back_transaction_leaves_no_rows() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();

    let mut tx = repo.begin().await.unwrap();
    assert!(tx.insert(&new_flare("A", "2025-01-21T10:00:00Z")).await.unwrap());
    assert!(tx.insert(&new_flare("B", "2025-01-21T11:00:00Z")).await.unwrap());
    assert!(tx.exists("A").await.unwrap());
    tx.rollback().await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 0);

    let mut tx = repo.begin().await.unwrap();
    tx.insert(&new_flare("C", "2025-01-21T12:00:00Z")).await.unwrap();
    drop(tx);

    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn insert_conflict_reports_not_inserted() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();

    let mut tx = repo.begin().await.unwrap();
    assert!(tx.insert(&new_flare("A", "2025-01-21T10:00:00Z")).await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = repo.begin().await.unwrap();
    assert!(tx.exists("A").await.unwrap());
    assert!(!tx.insert(&new_flare("A", "2025-02-01T00:00:00Z")).await.unwrap());
    tx.commit().await.unwrap();

    let stored = repo.get_by_external_id("A").await.unwrap().unwrap();
    assert_eq!(stored.begin_time, ts("2025-01-21T10:00:00Z"));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn latest_begin_time_drives_next_window() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).flare_repo();

    assert_eq!(repo.latest_begin_time().await.unwrap(), None);

    let mut tx = repo.begin().await.unwrap();
    tx.insert(&new_flare("A", "2024-06-08T09:00:00Z")).await.unwrap();
    tx.insert(&new_flare("B", "2024-06-10T00:00:00Z")).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        repo.latest_begin_time().await.unwrap(),
        Some(ts("2024-06-10T00:00:00Z"))
    );

    let window = RangePlanner::new(repo).next_window().await.unwrap();
    assert_eq!(window.start().to_string(), "2024-06-10");
    assert_eq!(window.end(), Utc::now().date_naive());
}

#[tokio::test]
async fn health_check_succeeds() {
    let (pool, _container) = setup_test_db().await;
    Database::from_pool(pool).flare_repo().health_check().await.unwrap();
}
