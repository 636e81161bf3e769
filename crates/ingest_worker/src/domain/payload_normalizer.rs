use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult, ExtendedRecord, RecordKind};
use serde_json::{Map, Value};

/// Separator the document store uses for nested paths
const PATH_SEPARATOR: char = '.';
const SEPARATOR_SUBSTITUTE: &str = "-";

const EXTRACTED_KINDS: [RecordKind; 4] = [
    RecordKind::Event,
    RecordKind::Exception,
    RecordKind::Monitoring,
    RecordKind::Transaction,
];

/// Canonical payload plus the sub-records split out of it
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    pub server_name: String,
    pub payload: Map<String, Value>,
    pub extended: Vec<ExtendedRecord>,
}

/// Return a copy of `payload` whose `monitoring.processes` keys contain no path separator
///
/// Values and key order are preserved. Applying this twice is the same as applying it once.
pub fn sanitize_process_keys(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = payload.clone();

    let processes = sanitized
        .get_mut("monitoring")
        .and_then(Value::as_object_mut)
        .and_then(|monitoring| monitoring.get_mut("processes"))
        .and_then(Value::as_object_mut);

    if let Some(processes) = processes {
        if processes.keys().any(|key| key.contains(PATH_SEPARATOR)) {
            let rewritten: Map<String, Value> = std::mem::take(processes)
                .into_iter()
                .map(|(key, value)| (key.replace(PATH_SEPARATOR, SEPARATOR_SUBSTITUTE), value))
                .collect();
            *processes = rewritten;
        }
    }

    sanitized
}

/// Sanitize a decrypted payload and extract its extended records
pub fn normalize(
    public_key: &str,
    payload: &Map<String, Value>,
    sent_at: i64,
    created_at: DateTime<Utc>,
) -> DomainResult<NormalizedPayload> {
    let payload = sanitize_process_keys(payload);

    let server_name = payload
        .get("server_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DomainError::ParseError("payload is missing server_name".to_string()))?
        .to_string();

    let record = |kind: RecordKind, value: &Value| ExtendedRecord {
        kind,
        public_key: public_key.to_string(),
        server_name: server_name.clone(),
        sent_at,
        created_at,
        payload: value.clone(),
    };

    let mut extended = Vec::new();
    for kind in EXTRACTED_KINDS {
        let Some(value) = payload.get(kind.source_key()) else {
            continue;
        };
        match (kind, value) {
            (RecordKind::Transaction, Value::Array(transactions)) => {
                extended.extend(transactions.iter().map(|t| record(kind, t)));
            }
            (RecordKind::Transaction, _) => {}
            (kind, value) => extended.push(record(kind, value)),
        }
    }

    Ok(NormalizedPayload {
        server_name,
        payload,
        extended,
    })
}
