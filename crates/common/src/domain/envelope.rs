use crate::domain::result::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level inbound message sent by a monitoring agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EnvelopeData>,
    #[serde(default)]
    pub heapdump: bool,
    #[serde(default)]
    pub cpuprofile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm_id: Option<Value>,
    /// Any other routing metadata the agent attaches; persisted untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope body: an encrypted blob (`<hex nonce>:<hex ciphertext>`) or a plain object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeData {
    Encrypted(String),
    Plain(Map<String, Value>),
}

impl Envelope {
    /// Parse an envelope from its JSON text form
    pub fn parse(raw: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| DomainError::ParseError(format!("invalid envelope: {}", e)))
    }

    /// True when the agent flagged this envelope as carrying a profiling artifact
    pub fn declares_profiling(&self) -> bool {
        self.heapdump || self.cpuprofile
    }

    /// Render `pm_id` the way agents print it (numbers bare, strings unquoted)
    pub fn pm_id_label(&self) -> String {
        value_label(self.pm_id.as_ref())
    }

    /// Build the status document: the envelope with `data` replaced by the normalized payload
    pub fn to_status_document(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        let mut document = Map::new();
        document.insert(
            "public_key".to_string(),
            Value::String(self.public_key.clone()),
        );
        document.insert("data".to_string(), Value::Object(payload.clone()));
        if self.heapdump {
            document.insert("heapdump".to_string(), Value::Bool(true));
        }
        if self.cpuprofile {
            document.insert("cpuprofile".to_string(), Value::Bool(true));
        }
        if let Some(server_name) = &self.server_name {
            document.insert(
                "server_name".to_string(),
                Value::String(server_name.clone()),
            );
        }
        if let Some(name) = &self.name {
            document.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(pm_id) = &self.pm_id {
            document.insert("pm_id".to_string(), pm_id.clone());
        }
        for (key, value) in &self.extra {
            document.entry(key.clone()).or_insert_with(|| value.clone());
        }
        document
    }
}

/// Render an optional JSON scalar as agents print it; absent or null is `unknown`
pub fn value_label(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_encrypted_envelope() {
        let raw = br#"{"public_key":"pk1","data":"00ff:abcd","server_name":"node.internal","pm_id":3}"#;

        let envelope = Envelope::parse(raw).unwrap();

        assert_eq!(envelope.public_key, "pk1");
        assert_eq!(
            envelope.data,
            Some(EnvelopeData::Encrypted("00ff:abcd".to_string()))
        );
        assert!(!envelope.declares_profiling());
        assert_eq!(envelope.pm_id_label(), "3");
    }

    #[test]
    fn test_parse_plain_envelope_keeps_extra_fields() {
        let raw = br#"{"public_key":"pk1","data":{"server_name":"a"},"sent_at":12,"rev":"abc"}"#;

        let envelope = Envelope::parse(raw).unwrap();

        assert!(matches!(envelope.data, Some(EnvelopeData::Plain(_))));
        assert_eq!(envelope.extra.get("sent_at"), Some(&json!(12)));
        assert_eq!(envelope.extra.get("rev"), Some(&json!("abc")));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let result = Envelope::parse(b"{not json");
        assert!(matches!(result, Err(DomainError::ParseError(_))));
    }

    #[test]
    fn test_parse_rejects_missing_public_key() {
        let result = Envelope::parse(br#"{"data":"00:11"}"#);
        assert!(matches!(result, Err(DomainError::ParseError(_))));
    }

    #[test]
    fn test_status_document_replaces_data() {
        let envelope = Envelope::parse(
            br#"{"public_key":"pk1","data":"00:11","server_name":"node","rev":"r1"}"#,
        )
        .unwrap();
        let mut payload = Map::new();
        payload.insert("server_name".to_string(), json!("node"));

        let document = envelope.to_status_document(&payload);

        assert_eq!(document.get("data"), Some(&json!({"server_name": "node"})));
        assert_eq!(document.get("public_key"), Some(&json!("pk1")));
        assert_eq!(document.get("rev"), Some(&json!("r1")));
    }

    #[test]
    fn test_pm_id_label_variants() {
        let mut envelope = Envelope::parse(br#"{"public_key":"pk1","pm_id":"web-1"}"#).unwrap();
        assert_eq!(envelope.pm_id_label(), "web-1");

        envelope.pm_id = None;
        assert_eq!(envelope.pm_id_label(), "unknown");
    }
}
