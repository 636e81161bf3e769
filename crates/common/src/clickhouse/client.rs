use anyhow::{Context, Result};
use clickhouse::Client;

/// ClickHouse client wrapper
///
/// The underlying HTTP client pools connections: every query or insert checks one
/// out for the duration of the request and returns it when the request finishes.
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
}

impl ClickHouseClient {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password)
            .with_compression(clickhouse::Compression::Lz4);

        Self { client }
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .context("clickhouse ping failed")?;
        Ok(())
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}
