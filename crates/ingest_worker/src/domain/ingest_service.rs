use crate::domain::{
    normalize, EnvelopeDecryptor, ForwardOutcome, MetricForwarder, ProfilingService,
    RecordStoreService,
};
use bytes::Bytes;
use chrono::Utc;
use common::domain::{
    with_timeout, BucketRepository, DomainError, DomainResult, Envelope, GetBucketRepoInput,
    MonitoringPayload, StatusRecord,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// One decoded inbound frame: JSON envelope header plus optional binary attachment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundMessage {
    pub header: Bytes,
    pub attachment: Bytes,
}

impl InboundMessage {
    pub fn new(header: impl Into<Bytes>, attachment: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            attachment: attachment.into(),
        }
    }
}

/// What the pipeline did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested {
        extended_records: usize,
        forward: ForwardOutcome,
    },
    ProfilingHandled {
        file_name: String,
    },
}

/// Domain service that runs one envelope through the ingest pipeline
///
/// Flow:
/// 1. Parse the envelope header
/// 2. Resolve the bucket secret by public key
/// 3. Route profiling artifacts to the profiling handler
/// 4. Decrypt and normalize the payload
/// 5. Persist status and extended records
/// 6. Forward derived gauges
pub struct IngestService {
    bucket_repository: Arc<dyn BucketRepository>,
    decryptor: EnvelopeDecryptor,
    store: RecordStoreService,
    forwarder: MetricForwarder,
    profiling: ProfilingService,
    lookup_timeout: Duration,
}

impl IngestService {
    pub fn new(
        bucket_repository: Arc<dyn BucketRepository>,
        decryptor: EnvelopeDecryptor,
        store: RecordStoreService,
        forwarder: MetricForwarder,
        profiling: ProfilingService,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            bucket_repository,
            decryptor,
            store,
            forwarder,
            profiling,
            lookup_timeout,
        }
    }

    #[instrument(
        skip(self, message),
        fields(header_size = message.header.len(), attachment_size = message.attachment.len())
    )]
    pub async fn handle_message(&self, message: InboundMessage) -> DomainResult<IngestOutcome> {
        let started = Instant::now();
        let result = self.process(message).await;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "message handled"
        );
        result
    }

    async fn process(&self, message: InboundMessage) -> DomainResult<IngestOutcome> {
        let envelope = Envelope::parse(&message.header)?;

        let bucket = with_timeout(
            "bucket lookup",
            self.lookup_timeout,
            self.bucket_repository.get_bucket(GetBucketRepoInput {
                public_key: envelope.public_key.clone(),
            }),
        )
        .await?
        .ok_or_else(|| DomainError::UnknownIdentity(envelope.public_key.clone()))?;

        if envelope.declares_profiling() && !message.attachment.is_empty() {
            let file_name = self.profiling.handle(&envelope, &message.attachment).await?;
            return Ok(IngestOutcome::ProfilingHandled { file_name });
        }

        let data = envelope
            .data
            .as_ref()
            .ok_or_else(|| DomainError::DecryptionFailed("envelope carries no data".to_string()))?;
        let payload = self.decryptor.open(data, &bucket.secret_key)?;

        let created_at = Utc::now();
        let normalized = normalize(
            &envelope.public_key,
            &payload,
            created_at.timestamp_millis(),
            created_at,
        )?;

        let status = StatusRecord {
            public_key: envelope.public_key.clone(),
            server_name: normalized.server_name.clone(),
            created_at,
            document: envelope.to_status_document(&normalized.payload),
        };
        let extended_records = normalized.extended.len();
        self.store.persist(status, normalized.extended).await;

        let monitoring = MonitoringPayload::from_object(&normalized.payload)?;
        let forward = self.forwarder.forward(&monitoring).await;

        Ok(IngestOutcome::Ingested {
            extended_records,
            forward,
        })
    }
}
