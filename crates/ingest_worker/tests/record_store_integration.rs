#![cfg(feature = "integration-tests")]

use chrono::{Duration as ChronoDuration, Utc};
use common::clickhouse::ClickHouseClient;
use common::domain::{Collection, ExtendedRecord, RecordKind, RecordRepository, StatusRecord};
use ingest_worker::clickhouse::ClickHouseRecordRepository;
use ingest_worker::domain::RecordStoreService;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::clickhouse::ClickHouse;

async fn setup_clickhouse() -> (ContainerAsync<ClickHouse>, ClickHouseClient) {
    let clickhouse = ClickHouse::default().start().await.unwrap();
    let host = clickhouse.get_host().await.unwrap();
    let port = clickhouse.get_host_port_ipv4(8123).await.unwrap();

    let client = ClickHouseClient::new(&format!("http://{}:{}", host, port), "default", "default", "");
    client.ping().await.expect("clickhouse not reachable");

    (clickhouse, client)
}

fn status_record(created_at: chrono::DateTime<Utc>) -> StatusRecord {
    let mut document = Map::new();
    document.insert("public_key".to_string(), json!("pk1"));
    document.insert("data".to_string(), json!({"server_name": "node.internal"}));

    StatusRecord {
        public_key: "pk1".to_string(),
        server_name: "node.internal".to_string(),
        created_at,
        document,
    }
}

#[tokio::test]
async fn test_persist_then_find_status() {
    let (_container, client) = setup_clickhouse().await;
    let repository = Arc::new(ClickHouseRecordRepository::new(client, 604_800));
    let store = RecordStoreService::new(repository.clone(), Duration::from_secs(10));

    let transaction = ExtendedRecord {
        kind: RecordKind::Transaction,
        public_key: "pk1".to_string(),
        server_name: "node.internal".to_string(),
        sent_at: Utc::now().timestamp_millis(),
        created_at: Utc::now(),
        payload: json!({"url": "/health"}),
    };

    let report = store
        .persist(status_record(Utc::now()), vec![transaction.clone(), transaction])
        .await;
    assert_eq!(report.written, 3);
    assert_eq!(report.failed, 0);

    let found = repository
        .find_status("pk1", "node.internal")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].document["data"]["server_name"], "node.internal");
}

#[tokio::test]
async fn test_expired_status_is_not_returned() {
    let (_container, client) = setup_clickhouse().await;
    let repository = Arc::new(ClickHouseRecordRepository::new(client, 60));
    let store = RecordStoreService::new(repository.clone(), Duration::from_secs(10));

    let stale = store
        .persist(status_record(Utc::now() - ChronoDuration::seconds(600)), vec![])
        .await;
    let fresh = store.persist(status_record(Utc::now()), vec![]).await;
    assert_eq!(stale.written + fresh.written, 2);

    let found = repository
        .find_status("pk1", "node.internal")
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert!(found[0].created_at > Utc::now() - ChronoDuration::seconds(60));
}

#[tokio::test]
async fn test_ensure_retention_is_idempotent() {
    let (_container, client) = setup_clickhouse().await;
    let repository = ClickHouseRecordRepository::new(client, 604_800);

    for collection in Collection::ALL {
        repository.ensure_retention(collection).await.unwrap();
        repository.ensure_retention(collection).await.unwrap();
    }
}

#[tokio::test]
async fn test_first_insert_on_empty_database_creates_table() {
    let (_container, client) = setup_clickhouse().await;
    let repository = Arc::new(ClickHouseRecordRepository::new(client, 604_800));

    let direct = repository.insert_status(&status_record(Utc::now())).await;
    assert!(direct.is_err(), "status table should not exist yet");

    let store = RecordStoreService::new(repository.clone(), Duration::from_secs(10));
    let report = store.persist(status_record(Utc::now()), vec![]).await;
    assert_eq!(report.written, 1);
    assert_eq!(report.failed, 0);

    let found = repository
        .find_status("pk1", "node.internal")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}
