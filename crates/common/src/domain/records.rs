use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Default retention ceiling for every persisted record: 7 days
pub const DEFAULT_RETENTION_SECS: u64 = 3600 * 24 * 7;

/// Retention-bounded collections written by the ingest pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Status,
    Events,
    Exceptions,
    Monitorings,
    Transactions,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Status,
        Collection::Events,
        Collection::Exceptions,
        Collection::Monitorings,
        Collection::Transactions,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Status => "status",
            Collection::Events => "events",
            Collection::Exceptions => "exceptions",
            Collection::Monitorings => "monitorings",
            Collection::Transactions => "transactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Sub-record kinds split out of a monitoring payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Event,
    Exception,
    Monitoring,
    Transaction,
}

impl RecordKind {
    /// Payload key the kind is extracted from
    pub fn source_key(&self) -> &'static str {
        match self {
            RecordKind::Event => "process:event",
            RecordKind::Exception => "process:exception",
            RecordKind::Monitoring => "monitoring",
            RecordKind::Transaction => "http:transaction",
        }
    }

    /// Field name the payload is stored under inside `data`
    pub fn field_name(&self) -> &'static str {
        match self {
            RecordKind::Event => "event",
            RecordKind::Exception => "exception",
            RecordKind::Monitoring => "monitoring",
            RecordKind::Transaction => "transaction",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            RecordKind::Event => Collection::Events,
            RecordKind::Exception => Collection::Exceptions,
            RecordKind::Monitoring => Collection::Monitorings,
            RecordKind::Transaction => Collection::Transactions,
        }
    }
}

/// Primary record: the full normalized envelope
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub public_key: String,
    pub server_name: String,
    pub created_at: DateTime<Utc>,
    pub document: Map<String, Value>,
}

/// One sub-record of a given kind
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedRecord {
    pub kind: RecordKind,
    pub public_key: String,
    pub server_name: String,
    /// Epoch milliseconds at which the pipeline produced the record
    pub sent_at: i64,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

impl ExtendedRecord {
    /// The persisted `data` object: `{server_name, <kind>: payload}`
    pub fn data(&self) -> Value {
        let mut data = Map::new();
        data.insert(
            "server_name".to_string(),
            Value::String(self.server_name.clone()),
        );
        data.insert(self.kind.field_name().to_string(), self.payload.clone());
        Value::Object(data)
    }
}

/// Repository trait for retention-bounded record storage
/// Infrastructure layer (e.g., ClickHouse) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Make sure the collection exists and carries the TTL policy on `created_at`
    /// Must be safe to call repeatedly
    async fn ensure_retention(&self, collection: Collection) -> DomainResult<()>;

    async fn insert_status(&self, record: &StatusRecord) -> DomainResult<()>;

    async fn insert_extended(&self, record: &ExtendedRecord) -> DomainResult<()>;
}
