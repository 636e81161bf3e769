use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{DomainError, DomainResult, Gauge, MetricsSink};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_FALCON_URL: &str = "http://127.0.0.1:41624";
pub const DEFAULT_FALCON_STEP_SECS: u64 = 60;

const COUNTER_TYPE_GAUGE: &str = "GAUGE";

/// One item of an Open-Falcon `/v1/push` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FalconItem {
    pub endpoint: String,
    pub metric: String,
    pub timestamp: i64,
    pub step: u64,
    pub value: f64,
    #[serde(rename = "counterType")]
    pub counter_type: &'static str,
    pub tags: String,
}

impl FalconItem {
    pub fn from_gauge(gauge: &Gauge, timestamp: i64, step: u64) -> Self {
        Self {
            endpoint: gauge.tags.endpoint.clone(),
            metric: gauge.metric.clone(),
            timestamp,
            step,
            value: gauge.value,
            counter_type: COUNTER_TYPE_GAUGE,
            tags: gauge.tags.to_tag_string(),
        }
    }
}

/// Pushes gauges to an Open-Falcon agent over HTTP
#[derive(Clone)]
pub struct FalconClient {
    client: Client,
    push_url: String,
    step: u64,
}

impl FalconClient {
    pub fn new(base_url: &str, step: u64, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build falcon HTTP client")?;

        Ok(Self {
            client,
            push_url: format!("{}/v1/push", base_url.trim_end_matches('/')),
            step,
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}

#[async_trait]
impl MetricsSink for FalconClient {
    async fn push(&self, gauges: Vec<Gauge>) -> DomainResult<()> {
        if gauges.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now().timestamp();
        let items: Vec<FalconItem> = gauges
            .iter()
            .map(|gauge| FalconItem::from_gauge(gauge, timestamp, self.step))
            .collect();

        let response = self
            .client
            .post(&self.push_url)
            .json(&items)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.push_url, error = %e, "falcon push failed");
                DomainError::MetricsUnavailable(e.to_string())
            })?;

        response.error_for_status().map_err(|e| {
            error!(url = %self.push_url, error = %e, "falcon rejected push");
            DomainError::MetricsUnavailable(e.to_string())
        })?;

        debug!(items = items.len(), "pushed gauges to falcon");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::GaugeTags;
    use serde_json::json;

    fn gauge() -> Gauge {
        Gauge {
            metric: "pm86.monitoring.free_mem".to_string(),
            value: 2000.0,
            tags: GaugeTags {
                kind: "pm86".to_string(),
                server_name: "node.internal".to_string(),
                endpoint: "node".to_string(),
            },
        }
    }

    #[test]
    fn test_item_json_shape() {
        let item = FalconItem::from_gauge(&gauge(), 1_700_000_000, 60);

        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "endpoint": "node",
                "metric": "pm86.monitoring.free_mem",
                "timestamp": 1_700_000_000,
                "step": 60,
                "value": 2000.0,
                "counterType": "GAUGE",
                "tags": "type=pm86,server_name=node.internal"
            })
        );
    }

    #[test]
    fn test_push_url_normalized() {
        let client =
            FalconClient::new("http://falcon:1988/", 60, Duration::from_secs(1)).unwrap();
        assert_eq!(client.push_url(), "http://falcon:1988/v1/push");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_metrics_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            FalconClient::new(&format!("http://{}", addr), 60, Duration::from_secs(2)).unwrap();

        let result = client.push(vec![gauge()]).await;

        assert!(matches!(result, Err(DomainError::MetricsUnavailable(_))));
    }
}
