use anyhow::Context;
use chrono::Utc;
use common::domain::{
    value_label, with_timeout, DomainError, DomainResult, Envelope, ProfilingNotification,
    ProfilingNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Build `<server_name>.<public_key>.<name>.<pm_id>[.heapsnapshot][.cpuprofile]`
///
/// Path separators inside any segment are replaced so the file always lands
/// directly in the artifact directory.
pub fn artifact_file_name(envelope: &Envelope) -> String {
    let mut file_name = format!(
        "{}.{}.{}.{}",
        safe_segment(envelope.server_name.as_deref().unwrap_or("unknown")),
        safe_segment(&envelope.public_key),
        safe_segment(envelope.name.as_deref().unwrap_or("unknown")),
        safe_segment(&value_label(envelope.pm_id.as_ref())),
    );
    if envelope.heapdump {
        file_name.push_str(".heapsnapshot");
    }
    if envelope.cpuprofile {
        file_name.push_str(".cpuprofile");
    }
    file_name
}

fn safe_segment(segment: &str) -> String {
    segment.replace(['/', '\\'], "_")
}

/// Writes profiling snapshots to disk and tells the control plane about them
pub struct ProfilingService {
    artifact_dir: PathBuf,
    notifier: Arc<dyn ProfilingNotifier>,
    artifact_timeout: Duration,
    rpc_timeout: Duration,
}

impl ProfilingService {
    pub fn new(
        artifact_dir: impl Into<PathBuf>,
        notifier: Arc<dyn ProfilingNotifier>,
        artifact_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            notifier,
            artifact_timeout,
            rpc_timeout,
        }
    }

    /// Store the artifact and notify the control plane
    ///
    /// Returns the artifact file name on a successful write. Write failures are
    /// returned after logging and skip the notification; notification failures
    /// are only logged.
    #[instrument(
        skip(self, envelope, artifact),
        fields(public_key = %envelope.public_key, artifact_size = artifact.len())
    )]
    pub async fn handle(&self, envelope: &Envelope, artifact: &[u8]) -> DomainResult<String> {
        let file_name = artifact_file_name(envelope);

        if let Err(e) = self.write_artifact(&file_name, artifact).await {
            error!(file_name = %file_name, error = %e, "profiling artifact not stored");
            return Err(e);
        }
        info!(file_name = %file_name, "profiling artifact stored");

        let notification = ProfilingNotification {
            status: "success".to_string(),
            server_name: envelope
                .server_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            public_key: envelope.public_key.clone(),
            name: envelope.name.clone(),
            pm_id: envelope.pm_id.clone(),
            heapdump: envelope.heapdump,
            cpuprofile: envelope.cpuprofile,
            file_name: file_name.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };

        match with_timeout(
            "profiling notification",
            self.rpc_timeout,
            self.notifier.notify(notification),
        )
        .await
        {
            Ok(()) => debug!(file_name = %file_name, "control plane notified"),
            Err(e) => {
                let e = match e {
                    e @ DomainError::NotificationFailed(_) => e,
                    other => DomainError::NotificationFailed(other.to_string()),
                };
                error!(file_name = %file_name, error = %e, "profiling notification dropped");
            }
        }

        Ok(file_name)
    }

    async fn write_artifact(&self, file_name: &str, artifact: &[u8]) -> DomainResult<()> {
        let path = self.artifact_dir.join(file_name);
        let write = async {
            tokio::fs::create_dir_all(&self.artifact_dir)
                .await
                .with_context(|| {
                    format!("failed to create {}", self.artifact_dir.display())
                })?;
            tokio::fs::write(&path, artifact)
                .await
                .with_context(|| format!("failed to write {}", path.display()))
        };

        match tokio::time::timeout(self.artifact_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DomainError::ArtifactWriteFailed {
                file_name: file_name.to_string(),
                source,
            }),
            Err(_) => Err(DomainError::Timeout {
                operation: "artifact write",
                after: self.artifact_timeout,
            }),
        }
    }
}
