use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// A single named numeric observation sent to the metrics backend
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub metric: String,
    pub value: f64,
    pub tags: GaugeTags,
}

/// Tag set attached to every gauge of one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeTags {
    pub kind: String,
    pub server_name: String,
    pub endpoint: String,
}

impl GaugeTags {
    /// Render as the backend's `k=v,k=v` tag string
    pub fn to_tag_string(&self) -> String {
        format!("type={},server_name={}", self.kind, self.server_name)
    }
}

/// Trait for pushing gauges to a time-series backend
///
/// Implementations should:
/// - Submit the whole batch in one request where the backend allows it
/// - Return error if the backend rejects or cannot be reached
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn push(&self, gauges: Vec<Gauge>) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_string() {
        let tags = GaugeTags {
            kind: "pm86".to_string(),
            server_name: "node.internal".to_string(),
            endpoint: "node".to_string(),
        };
        assert_eq!(tags.to_tag_string(), "type=pm86,server_name=node.internal");
    }
}
