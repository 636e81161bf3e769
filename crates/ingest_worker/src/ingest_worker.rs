use crate::clickhouse::ClickHouseRecordRepository;
use crate::control_plane::ControlPlaneClient;
use crate::domain::{
    DedupWindow, EnvelopeDecryptor, InboundMessage, IngestOutcome, IngestService,
    MetricForwarder, ProfilingService, RecordStoreService,
};
use crate::falcon::FalconClient;
use crate::transport::PullListener;
use anyhow::Result;
use common::domain::BucketRepository;
use common::ClickHouseClient;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type RunnerProcess =
    Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send>;

pub struct IngestWorkerConfig {
    pub listen_addr: String,
    pub max_frame_bytes: usize,
    pub ingest_queue_capacity: usize,
    pub retention_secs: u64,
    pub falcon_url: String,
    pub falcon_step_secs: u64,
    pub dedup_window: Duration,
    pub dedup_sweep_interval: Duration,
    pub control_plane_addr: String,
    pub profiling_dir: PathBuf,
    pub allow_plaintext: bool,
    pub lookup_timeout: Duration,
    pub store_timeout: Duration,
    pub metrics_timeout: Duration,
    pub rpc_timeout: Duration,
    pub artifact_timeout: Duration,
}

pub struct IngestWorker {
    listener: PullListener,
    receiver: mpsc::Receiver<InboundMessage>,
    service: Arc<IngestService>,
    dedup_window: Arc<DedupWindow>,
    dedup_sweep_interval: Duration,
}

impl IngestWorker {
    pub async fn new(
        bucket_repository: Arc<dyn BucketRepository>,
        clickhouse_client: ClickHouseClient,
        config: IngestWorkerConfig,
    ) -> Result<Self> {
        info!("Initializing ingest worker");

        let record_repository = Arc::new(ClickHouseRecordRepository::new(
            clickhouse_client,
            config.retention_secs,
        ));
        let store = RecordStoreService::new(record_repository, config.store_timeout);

        let dedup_window = Arc::new(DedupWindow::new(config.dedup_window));
        let falcon = Arc::new(FalconClient::new(
            &config.falcon_url,
            config.falcon_step_secs,
            config.metrics_timeout,
        )?);
        let forwarder = MetricForwarder::new(falcon, dedup_window.clone(), config.metrics_timeout);

        let control_plane = Arc::new(ControlPlaneClient::new(config.control_plane_addr.clone()));
        let profiling = ProfilingService::new(
            config.profiling_dir.clone(),
            control_plane,
            config.artifact_timeout,
            config.rpc_timeout,
        );

        let service = Arc::new(IngestService::new(
            bucket_repository,
            EnvelopeDecryptor::new(config.allow_plaintext),
            store,
            forwarder,
            profiling,
            config.lookup_timeout,
        ));

        let (sender, receiver) = mpsc::channel(config.ingest_queue_capacity.max(1));
        let listener =
            PullListener::bind(&config.listen_addr, config.max_frame_bytes, sender).await?;

        info!(
            listen_addr = %config.listen_addr,
            falcon_url = %config.falcon_url,
            control_plane_addr = %config.control_plane_addr,
            "Ingest worker initialized"
        );

        Ok(Self {
            listener,
            receiver,
            service,
            dedup_window,
            dedup_sweep_interval: config.dedup_sweep_interval,
        })
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, RunnerProcess)> {
        let listener = self.listener;
        let listener_process: RunnerProcess =
            Box::new(move |ctx| Box::pin(async move { listener.run(ctx).await }));

        let service = self.service;
        let receiver = self.receiver;
        let ingest_process: RunnerProcess = Box::new(move |ctx| {
            Box::pin(async move { run_ingest_loop(service, receiver, ctx).await })
        });

        let window = self.dedup_window;
        let interval = self.dedup_sweep_interval;
        let sweeper_process: RunnerProcess =
            Box::new(move |ctx| Box::pin(async move { window.run_sweeper(ctx, interval).await }));

        vec![
            ("ingest-listener", listener_process),
            ("ingest-worker", ingest_process),
            ("dedup-sweeper", sweeper_process),
        ]
    }
}

/// Drain the ingest queue, one message at a time in arrival order
pub async fn run_ingest_loop(
    service: Arc<IngestService>,
    mut receiver: mpsc::Receiver<InboundMessage>,
    ctx: CancellationToken,
) -> Result<()> {
    info!("starting ingest loop");

    loop {
        let message = tokio::select! {
            _ = ctx.cancelled() => {
                info!("received shutdown signal, stopping ingest loop");
                break;
            }
            message = receiver.recv() => match message {
                Some(message) => message,
                None => {
                    warn!("ingest queue closed, stopping ingest loop");
                    break;
                }
            },
        };

        match service.handle_message(message).await {
            Ok(IngestOutcome::Ingested {
                extended_records,
                forward,
            }) => debug!(extended_records, forward = ?forward, "envelope ingested"),
            Ok(IngestOutcome::ProfilingHandled { file_name }) => {
                debug!(file_name = %file_name, "profiling artifact handled")
            }
            Err(e) => error!(error = %e, "failed to ingest message"),
        }
    }

    Ok(())
}
