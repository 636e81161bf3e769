use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown identity: no bucket registered for public key {0}")]
    UnknownIdentity(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Artifact write failed for {file_name}: {source:#}")]
    ArtifactWriteFailed {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Metrics backend unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Frame error: {0}")]
    FrameError(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

/// Awaits `future` for at most `after`, mapping elapsed time to [`DomainError::Timeout`]
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, future: F) -> DomainResult<T>
where
    F: std::future::Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let result: DomainResult<()> = with_timeout("slow_call", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(DomainError::Timeout {
                operation: "slow_call",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_result() {
        let result = with_timeout("fast_call", Duration::from_secs(1), async {
            Err::<(), _>(DomainError::UnknownIdentity("pk1".to_string()))
        })
        .await;

        assert!(matches!(result, Err(DomainError::UnknownIdentity(_))));
    }
}
