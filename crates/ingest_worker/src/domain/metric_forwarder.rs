use crate::domain::DedupWindow;
use common::domain::{with_timeout, Gauge, GaugeTags, MetricsSink, MonitoringPayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const METRIC_PREFIX: &str = "pm86";
const TAG_TYPE: &str = "pm86";

const AXM_REQ_PER_SEC: &str = "req/sec";
const AXM_CURRENT_REQ: &str = "Current req processed";
const AXM_HTTP_LATENCY: &str = "pmx:http:latency";

/// Result of a forward attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// Gauges were accepted by the backend
    Forwarded { gauges: usize },
    /// The node was already forwarded within the current window
    Suppressed,
    /// The window was claimed but the backend push failed; not retried
    Failed { reason: String },
}

/// Forwards derived gauges at most once per node per dedup window
pub struct MetricForwarder {
    sink: Arc<dyn MetricsSink>,
    window: Arc<DedupWindow>,
    timeout: Duration,
}

impl MetricForwarder {
    pub fn new(sink: Arc<dyn MetricsSink>, window: Arc<DedupWindow>, timeout: Duration) -> Self {
        Self {
            sink,
            window,
            timeout,
        }
    }

    #[instrument(skip(self, payload), fields(server_name = %payload.server_name))]
    pub async fn forward(&self, payload: &MonitoringPayload) -> ForwardOutcome {
        if !self.window.try_claim(&payload.server_name) {
            debug!("node already forwarded in this window, suppressing");
            return ForwardOutcome::Suppressed;
        }

        let gauges = build_gauges(payload);
        let count = gauges.len();

        match with_timeout("metrics push", self.timeout, self.sink.push(gauges)).await {
            Ok(()) => {
                debug!(gauges = count, "forwarded gauges");
                ForwardOutcome::Forwarded { gauges: count }
            }
            Err(e) => {
                warn!(error = %e, gauges = count, "failed to forward gauges");
                ForwardOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Derive per-process and aggregate gauges from a monitoring payload
pub fn build_gauges(payload: &MonitoringPayload) -> Vec<Gauge> {
    let tags = GaugeTags {
        kind: TAG_TYPE.to_string(),
        server_name: payload.server_name.clone(),
        endpoint: payload.endpoint().to_string(),
    };
    let gauge = |metric: String, value: f64| Gauge {
        metric,
        value: if value.is_finite() { value } else { 0.0 },
        tags: tags.clone(),
    };

    let monitoring = &payload.monitoring;
    let mut gauges = Vec::new();

    let mut total_restarts = 0.0;
    let mut total_req_per_sec = 0.0;
    let mut total_current_req = 0.0;
    let mut total_latency = 0.0;

    for (key, process) in &monitoring.processes {
        let prefix = format!("{}.process.{}", METRIC_PREFIX, process.label(key));

        gauges.push(gauge(format!("{}.restart_time", prefix), process.restart_time));
        gauges.push(gauge(format!("{}.status", prefix), process.status));
        gauges.push(gauge(format!("{}.cpu", prefix), process.cpu));
        gauges.push(gauge(format!("{}.memory", prefix), process.memory));
        total_restarts += process.restart_time;

        if let Some(value) = process.axm_metric(AXM_REQ_PER_SEC) {
            gauges.push(gauge(format!("{}.req/sec", prefix), value));
            total_req_per_sec += value;
        }
        if let Some(value) = process.axm_metric(AXM_CURRENT_REQ) {
            gauges.push(gauge(format!("{}.current_req_processed", prefix), value));
            total_current_req += value;
        }
        if let Some(value) = process.axm_metric(AXM_HTTP_LATENCY) {
            gauges.push(gauge(format!("{}.pmx_http_latency", prefix), value));
            total_latency += value;
        }
    }

    let aggregate = format!("{}.monitoring", METRIC_PREFIX);
    let loadavg = |index: usize| monitoring.loadavg.get(index).copied().unwrap_or(0.0);

    gauges.push(gauge(format!("{}.loadavg.1min", aggregate), loadavg(0)));
    gauges.push(gauge(format!("{}.loadavg.5min", aggregate), loadavg(1)));
    gauges.push(gauge(format!("{}.loadavg.20min", aggregate), loadavg(2)));
    gauges.push(gauge(format!("{}.total_mem", aggregate), monitoring.total_mem));
    gauges.push(gauge(format!("{}.free_mem", aggregate), monitoring.free_mem));
    gauges.push(gauge(format!("{}.req/sec", aggregate), total_req_per_sec));
    gauges.push(gauge(
        format!("{}.current_req_processed", aggregate),
        total_current_req,
    ));
    gauges.push(gauge(format!("{}.pmx_http_latency", aggregate), total_latency));
    gauges.push(gauge(format!("{}.restart_time", aggregate), total_restarts));

    gauges
}
