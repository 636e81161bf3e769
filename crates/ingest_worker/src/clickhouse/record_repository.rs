use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use common::clickhouse::ClickHouseClient;
use common::domain::{
    Collection, DomainError, DomainResult, ExtendedRecord, RecordRepository, StatusRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StatusRow {
    pub public_key: String,
    pub server_name: String,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub created_at: DateTime<Utc>,
    // Full envelope document as JSON text
    pub document: String,
}

impl TryFrom<&StatusRecord> for StatusRow {
    type Error = DomainError;

    fn try_from(record: &StatusRecord) -> Result<Self, Self::Error> {
        let document = serde_json::to_string(&record.document).map_err(|e| {
            DomainError::ParseError(format!("failed to serialize status document: {}", e))
        })?;

        Ok(StatusRow {
            public_key: record.public_key.clone(),
            server_name: record.server_name.clone(),
            created_at: record.created_at,
            document,
        })
    }
}

impl TryFrom<StatusRow> for StatusRecord {
    type Error = DomainError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let document = serde_json::from_str(&row.document).map_err(|e| {
            DomainError::ParseError(format!("stored status document is not an object: {}", e))
        })?;

        Ok(StatusRecord {
            public_key: row.public_key,
            server_name: row.server_name,
            created_at: row.created_at,
            document,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ExtendedRow {
    pub public_key: String,
    pub server_name: String,
    /// Epoch milliseconds
    pub sent_at: i64,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub created_at: DateTime<Utc>,
    // `{server_name, <kind>: payload}` as JSON text
    pub data: String,
}

impl TryFrom<&ExtendedRecord> for ExtendedRow {
    type Error = DomainError;

    fn try_from(record: &ExtendedRecord) -> Result<Self, Self::Error> {
        let data = serde_json::to_string(&record.data()).map_err(|e| {
            DomainError::ParseError(format!(
                "failed to serialize {} record: {}",
                record.kind.collection(),
                e
            ))
        })?;

        Ok(ExtendedRow {
            public_key: record.public_key.clone(),
            server_name: record.server_name.clone(),
            sent_at: record.sent_at,
            created_at: record.created_at,
            data,
        })
    }
}

fn columns(collection: Collection) -> &'static str {
    match collection {
        Collection::Status => {
            "public_key String, server_name String, created_at DateTime, document String"
        }
        _ => {
            "public_key String, server_name String, sent_at Int64, created_at DateTime, data String"
        }
    }
}

fn create_table_sql(collection: Collection, retention_secs: u64) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({columns}) \
         ENGINE = MergeTree \
         ORDER BY (public_key, server_name, created_at) \
         TTL created_at + INTERVAL {retention_secs} SECOND",
        table = collection.table_name(),
        columns = columns(collection),
    )
}

fn modify_ttl_sql(collection: Collection, retention_secs: u64) -> String {
    format!(
        "ALTER TABLE {table} MODIFY TTL created_at + INTERVAL {retention_secs} SECOND",
        table = collection.table_name(),
    )
}

/// ClickHouse implementation of RecordRepository
///
/// Each collection is a MergeTree table with a TTL on `created_at`. Reads also
/// filter on the retention window, so rows awaiting a TTL merge stay invisible.
#[derive(Clone)]
pub struct ClickHouseRecordRepository {
    client: ClickHouseClient,
    retention_secs: u64,
    ensured: Arc<Mutex<HashSet<Collection>>>,
}

impl ClickHouseRecordRepository {
    pub fn new(client: ClickHouseClient, retention_secs: u64) -> Self {
        Self {
            client,
            retention_secs,
            ensured: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn is_ensured(&self, collection: Collection) -> bool {
        self.ensured
            .lock()
            .map(|ensured| ensured.contains(&collection))
            .unwrap_or(false)
    }

    fn mark_ensured(&self, collection: Collection) {
        if let Ok(mut ensured) = self.ensured.lock() {
            ensured.insert(collection);
        }
    }

    async fn execute(&self, sql: &str) -> DomainResult<()> {
        self.client.get_client().query(sql).execute().await.map_err(|e| {
            error!(error = %e, "ClickHouse statement failed");
            DomainError::StoreUnavailable(e.to_string())
        })
    }

    /// Status records for a node that are still inside the retention window, oldest first
    pub async fn find_status(
        &self,
        public_key: &str,
        server_name: &str,
    ) -> DomainResult<Vec<StatusRecord>> {
        let sql = format!(
            "SELECT ?fields FROM {} \
             WHERE public_key = ? AND server_name = ? \
             AND created_at > now() - INTERVAL ? SECOND \
             ORDER BY created_at",
            Collection::Status.table_name()
        );

        let rows = self
            .client
            .get_client()
            .query(&sql)
            .bind(public_key)
            .bind(server_name)
            .bind(self.retention_secs)
            .fetch_all::<StatusRow>()
            .await
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))?;

        rows.into_iter().map(StatusRecord::try_from).collect()
    }
}

#[async_trait]
impl RecordRepository for ClickHouseRecordRepository {
    async fn ensure_retention(&self, collection: Collection) -> DomainResult<()> {
        if self.is_ensured(collection) {
            return Ok(());
        }

        self.execute(&create_table_sql(collection, self.retention_secs))
            .await?;
        self.execute(&modify_ttl_sql(collection, self.retention_secs))
            .await?;

        self.mark_ensured(collection);
        info!(
            collection = %collection,
            retention_secs = self.retention_secs,
            "retention policy ensured"
        );
        Ok(())
    }

    async fn insert_status(&self, record: &StatusRecord) -> DomainResult<()> {
        let table = Collection::Status.table_name();
        let row = StatusRow::try_from(record).inspect_err(|e| {
            error!(table = %table, error = %e, "failed to build status row");
        })?;

        let mut insert = self
            .client
            .get_client()
            .insert::<StatusRow>(table)
            .await
            .map_err(|e| {
                error!(table = %table, "failed to create ClickHouse insert: {}", e);
                DomainError::StoreUnavailable(e.to_string())
            })?;
        insert.write(&row).await.map_err(|e| {
            error!(table = %table, "failed to write row to ClickHouse: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;
        insert.end().await.map_err(|e| {
            error!(table = %table, "failed to finalize ClickHouse insert: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        debug!(server_name = %record.server_name, "stored status record");
        Ok(())
    }

    async fn insert_extended(&self, record: &ExtendedRecord) -> DomainResult<()> {
        let collection = record.kind.collection();
        let table = collection.table_name();
        let row = ExtendedRow::try_from(record).inspect_err(|e| {
            error!(table = %table, error = %e, "failed to build extended row");
        })?;

        let mut insert = self
            .client
            .get_client()
            .insert::<ExtendedRow>(table)
            .await
            .map_err(|e| {
                error!(table = %table, "failed to create ClickHouse insert: {}", e);
                DomainError::StoreUnavailable(e.to_string())
            })?;
        insert.write(&row).await.map_err(|e| {
            error!(table = %table, "failed to write row to ClickHouse: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;
        insert.end().await.map_err(|e| {
            error!(table = %table, "failed to finalize ClickHouse insert: {}", e);
            DomainError::StoreUnavailable(e.to_string())
        })?;

        debug!(
            collection = %collection,
            server_name = %record.server_name,
            "stored extended record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::RecordKind;
    use serde_json::{json, Map};

    #[test]
    fn test_status_row_roundtrip_keeps_document() {
        let mut document = Map::new();
        document.insert("public_key".to_string(), json!("pk1"));
        document.insert("data".to_string(), json!({"server_name": "node"}));

        let record = StatusRecord {
            public_key: "pk1".to_string(),
            server_name: "node".to_string(),
            created_at: Utc::now(),
            document,
        };

        let row = StatusRow::try_from(&record).unwrap();
        assert!(row.document.starts_with(r#"{"public_key":"pk1""#));

        let restored = StatusRecord::try_from(row).unwrap();
        assert_eq!(restored.document, record.document);
    }

    #[test]
    fn test_extended_row_wraps_payload_under_kind_field() {
        let record = ExtendedRecord {
            kind: RecordKind::Transaction,
            public_key: "pk1".to_string(),
            server_name: "node".to_string(),
            sent_at: 1_700_000_000_000,
            created_at: Utc::now(),
            payload: json!({"url": "/health"}),
        };

        let row = ExtendedRow::try_from(&record).unwrap();

        let data: serde_json::Value = serde_json::from_str(&row.data).unwrap();
        assert_eq!(
            data,
            json!({"server_name": "node", "transaction": {"url": "/health"}})
        );
        assert_eq!(row.sent_at, 1_700_000_000_000);
    }

    #[test]
    fn test_ddl_carries_ttl() {
        let create = create_table_sql(Collection::Events, 604_800);
        assert!(create.starts_with("CREATE TABLE IF NOT EXISTS events"));
        assert!(create.contains("TTL created_at + INTERVAL 604800 SECOND"));
        assert!(create.contains("sent_at Int64"));

        let status = create_table_sql(Collection::Status, 60);
        assert!(status.contains("document String"));

        assert_eq!(
            modify_ttl_sql(Collection::Transactions, 60),
            "ALTER TABLE transactions MODIFY TTL created_at + INTERVAL 60 SECOND"
        );
    }
}
