use crate::domain::envelope::value_label;
use crate::domain::result::{DomainError, DomainResult};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Typed view of a decrypted monitoring payload, as consumed by the metric forwarder
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MonitoringPayload {
    pub server_name: String,
    #[serde(default, deserialize_with = "lenient_monitoring")]
    pub monitoring: Monitoring,
}

/// Host-level monitoring snapshot
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Monitoring {
    #[serde(default, deserialize_with = "lenient_processes")]
    pub processes: BTreeMap<String, ProcessStat>,
    #[serde(default, deserialize_with = "lenient_f64_vec")]
    pub loadavg: Vec<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_mem: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub free_mem: f64,
}

/// Per-process statistics reported by the agent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessStat {
    #[serde(default)]
    pub pm_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub memory: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub restart_time: f64,
    #[serde(default, deserialize_with = "lenient_object")]
    pub axm_monitor: Option<Map<String, Value>>,
}

impl MonitoringPayload {
    /// Build the typed view from a normalized payload object
    pub fn from_object(payload: &Map<String, Value>) -> DomainResult<Self> {
        Self::deserialize(Value::Object(payload.clone()))
            .map_err(|e| DomainError::ParseError(format!("invalid monitoring payload: {}", e)))
    }

    /// First dot-delimited segment of the server name
    pub fn endpoint(&self) -> &str {
        self.server_name.split('.').next().unwrap_or_default()
    }
}

impl ProcessStat {
    /// Identifier used in metric names; falls back to the process map key
    pub fn label(&self, key: &str) -> String {
        match &self.pm_id {
            Some(Value::Null) | None => key.to_string(),
            pm_id => value_label(pm_id.as_ref()),
        }
    }

    /// Value of a custom axm metric, if the agent reported it
    ///
    /// Entries may be bare values or `{ "value": ... }` objects. A present entry that
    /// does not parse as a number counts as 0.
    pub fn axm_metric(&self, key: &str) -> Option<f64> {
        let entry = self.axm_monitor.as_ref()?.get(key)?;
        let raw = match entry {
            Value::Object(obj) => obj.get("value").unwrap_or(&Value::Null),
            other => other,
        };
        Some(number_from_value(raw).unwrap_or(0.0))
    }
}

/// Parse a JSON value as a finite number; strings use a leading-numeric-prefix rule
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_float_prefix(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Longest leading numeric prefix of `input` ("12.5ms" -> 12.5)
pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let trimmed = input.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();

    while end < bytes.len() {
        let c = bytes[end];
        match c {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 => {}
            b'+' | b'-' if seen_exp && matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }

    // Back off over a dangling exponent marker or sign ("3e", "3e-")
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        if let Ok(parsed) = candidate.parse::<f64>() {
            return parsed.is_finite().then_some(parsed);
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    None
}

/// Anything other than an object yields an empty snapshot
fn lenient_monitoring<'de, D>(deserializer: D) -> Result<Monitoring, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => Monitoring::deserialize(value).unwrap_or_default(),
        _ => Monitoring::default(),
    })
}

/// Non-object process maps are empty; non-object entries are skipped
fn lenient_processes<'de, D>(deserializer: D) -> Result<BTreeMap<String, ProcessStat>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Object(entries) = value else {
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter(|(_, entry)| entry.is_object())
        .map(|(key, entry)| (key, ProcessStat::deserialize(entry).unwrap_or_default()))
        .collect())
}

fn lenient_object<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value).unwrap_or(0.0))
}

fn lenient_f64_vec<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .map(|item| number_from_value(item).unwrap_or(0.0))
            .collect(),
        _ => Vec::new(),
    })
}

/// Numeric statuses pass through; the textual `online` maps to 1, any other text to 0
fn lenient_status<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::String(s) if s.eq_ignore_ascii_case("online") => 1.0,
        Value::String(_) => 0.0,
        other => number_from_value(other).unwrap_or(0.0),
    })
}
