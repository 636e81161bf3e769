use common::domain::{
    with_timeout, Collection, DomainError, DomainResult, ExtendedRecord, RecordRepository,
    StatusRecord,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Counts of what a persist call managed to write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub written: usize,
    pub failed: usize,
}

/// Persists status and extended records under a retention ceiling
///
/// Writes are fire-and-forget: failures are logged as `StoreUnavailable` and the
/// record is considered lost.
pub struct RecordStoreService {
    repository: Arc<dyn RecordRepository>,
    timeout: Duration,
}

impl RecordStoreService {
    pub fn new(repository: Arc<dyn RecordRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    #[instrument(
        skip(self, status, extended),
        fields(public_key = %status.public_key, server_name = %status.server_name, extended_count = extended.len())
    )]
    pub async fn persist(&self, status: StatusRecord, extended: Vec<ExtendedRecord>) -> PersistReport {
        let status_write = self.write_status(&status);
        let extended_writes = join_all(extended.iter().map(|record| self.write_extended(record)));

        let (status_ok, extended_results) = tokio::join!(status_write, extended_writes);

        let mut report = PersistReport::default();
        for ok in std::iter::once(status_ok).chain(extended_results) {
            if ok {
                report.written += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            written = report.written,
            failed = report.failed,
            "persisted envelope records"
        );
        report
    }

    async fn write_status(&self, record: &StatusRecord) -> bool {
        let result = self
            .unit_of_work(Collection::Status, || self.repository.insert_status(record))
            .await;
        self.log_outcome(Collection::Status, result)
    }

    async fn write_extended(&self, record: &ExtendedRecord) -> bool {
        let collection = record.kind.collection();
        let result = self
            .unit_of_work(collection, || self.repository.insert_extended(record))
            .await;
        self.log_outcome(collection, result)
    }

    /// Make sure the collection exists with its TTL policy, then insert
    ///
    /// The insert future is only created once the collection exists.
    async fn unit_of_work<F, Fut>(&self, collection: Collection, insert: F) -> DomainResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DomainResult<()>>,
    {
        with_timeout(
            "retention ensure",
            self.timeout,
            self.repository.ensure_retention(collection),
        )
        .await?;
        with_timeout("record insert", self.timeout, insert()).await
    }

    fn log_outcome(&self, collection: Collection, result: DomainResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                let e = match e {
                    e @ DomainError::StoreUnavailable(_) => e,
                    other => DomainError::StoreUnavailable(other.to_string()),
                };
                error!(collection = %collection, error = %e, "record lost");
                false
            }
        }
    }
}
