#![cfg(feature = "integration-tests")]

use common::domain::{BucketRepository, GetBucketRepoInput};
use common::postgres::{PostgresBucketRepository, PostgresClient, PostgresConfig};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

const BUCKETS_DDL: &str = "CREATE TABLE buckets (
    public_key TEXT PRIMARY KEY,
    secret_key TEXT NOT NULL,
    name TEXT,
    created_at TIMESTAMPTZ DEFAULT now()
)";

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresClient) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(&PostgresConfig {
        host: host.to_string(),
        port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        max_pool_size: 2,
        acquire_attempts: 5,
        acquire_delay_ms: 500,
    })
    .expect("Failed to create client");

    let conn = client.get_connection().await.unwrap();
    conn.batch_execute(BUCKETS_DDL).await.unwrap();
    conn.execute(
        "INSERT INTO buckets (public_key, secret_key, name) VALUES ($1, $2, $3)",
        &[&"pk-live", &"s3cret", &"production"],
    )
    .await
    .unwrap();

    (postgres, client)
}

#[tokio::test]
async fn test_get_bucket_by_public_key() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBucketRepository::new(client);

    let bucket = repo
        .get_bucket(GetBucketRepoInput {
            public_key: "pk-live".to_string(),
        })
        .await
        .unwrap()
        .expect("bucket should exist");

    assert_eq!(bucket.public_key, "pk-live");
    assert_eq!(bucket.secret_key, "s3cret");
    assert_eq!(bucket.name.as_deref(), Some("production"));
    assert!(bucket.created_at.is_some());
}

#[tokio::test]
async fn test_unknown_public_key_returns_none() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresBucketRepository::new(client);

    let bucket = repo
        .get_bucket(GetBucketRepoInput {
            public_key: "pk-missing".to_string(),
        })
        .await
        .unwrap();

    assert!(bucket.is_none());
}
