use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Completion descriptor sent to the control plane once an artifact is on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingNotification {
    pub status: String,
    pub server_name: String,
    pub public_key: String,
    pub name: Option<String>,
    pub pm_id: Option<Value>,
    pub heapdump: bool,
    pub cpuprofile: bool,
    pub file_name: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Trait for notifying the control plane about stored profiling artifacts
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProfilingNotifier: Send + Sync {
    /// Deliver a `profiling` notification tagged by `(server_name, public_key)`
    async fn notify(&self, notification: ProfilingNotification) -> DomainResult<()>;
}
