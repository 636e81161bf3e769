mod config;

use common::clickhouse::ClickHouseClient;
use common::postgres::{PostgresBucketRepository, PostgresClient, PostgresConfig};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use crate::config::ServiceConfig;
use ingest_worker::ingest_worker::{IngestWorker, IngestWorkerConfig};
use pm86_runner::Runner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        listen_addr = %config.listen_addr(),
        "Starting pm86-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let (bucket_repository, clickhouse_client) =
        match tokio::time::timeout(startup_timeout, initialize_shared_dependencies(&config)).await {
            Ok(Ok(deps)) => deps,
            Ok(Err(e)) => {
                error!("Failed to initialize shared dependencies: {:#}", e);
                std::process::exit(1);
            }
            Err(_) => {
                error!(
                    "Shared dependencies not ready after {:?}",
                    startup_timeout
                );
                std::process::exit(1);
            }
        };

    let ingest_worker = match IngestWorker::new(
        bucket_repository,
        clickhouse_client,
        build_ingest_worker_config(&config),
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize ingest worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (name, process) in ingest_worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<PostgresBucketRepository>, ClickHouseClient)> {
    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_pool_size,
        acquire_attempts: config.pool_acquire_attempts,
        acquire_delay_ms: config.pool_acquire_delay_ms,
    })?;
    postgres_client.ping().await?;
    let bucket_repository = Arc::new(PostgresBucketRepository::new(postgres_client));

    info!("Initializing ClickHouse...");
    let clickhouse_client = ClickHouseClient::new(
        &config.clickhouse_url,
        &config.clickhouse_database,
        &config.clickhouse_username,
        &config.clickhouse_password,
    );
    clickhouse_client.ping().await?;

    Ok((bucket_repository, clickhouse_client))
}

fn build_ingest_worker_config(config: &ServiceConfig) -> IngestWorkerConfig {
    IngestWorkerConfig {
        listen_addr: config.listen_addr(),
        max_frame_bytes: config.max_frame_bytes,
        ingest_queue_capacity: config.ingest_queue_capacity,
        retention_secs: config.retention_secs,
        falcon_url: config.falcon_url.clone(),
        falcon_step_secs: config.falcon_step_secs,
        dedup_window: Duration::from_secs(config.dedup_window_secs),
        dedup_sweep_interval: Duration::from_secs(config.dedup_sweep_interval_secs),
        control_plane_addr: config.control_plane_addr.clone(),
        profiling_dir: PathBuf::from(&config.profiling_dir),
        allow_plaintext: config.allow_plaintext,
        lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
        store_timeout: Duration::from_secs(config.store_timeout_secs),
        metrics_timeout: Duration::from_secs(config.metrics_timeout_secs),
        rpc_timeout: Duration::from_secs(config.rpc_timeout_secs),
        artifact_timeout: Duration::from_secs(config.artifact_timeout_secs),
    }
}
