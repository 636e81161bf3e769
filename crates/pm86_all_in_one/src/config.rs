use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Inbound listener
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Largest accepted frame body in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Frames buffered between the listener and the ingest worker
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,

    // PostgreSQL key registry
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: usize,

    /// Attempts at checking a connection out of the pool, including the first
    #[serde(default = "default_pool_acquire_attempts")]
    pub pool_acquire_attempts: u32,

    #[serde(default = "default_pool_acquire_delay_ms")]
    pub pool_acquire_delay_ms: u64,

    // ClickHouse record store
    /// ClickHouse HTTP URL
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    /// Record retention ceiling in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    // Open-Falcon
    #[serde(default = "default_falcon_url")]
    pub falcon_url: String,

    /// Reporting interval advertised with every gauge
    #[serde(default = "default_falcon_step_secs")]
    pub falcon_step_secs: u64,

    // Dedup window
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    #[serde(default = "default_dedup_sweep_interval_secs")]
    pub dedup_sweep_interval_secs: u64,

    // Profiling
    /// Control-plane RPC address (host:port)
    #[serde(default = "default_control_plane_addr")]
    pub control_plane_addr: String,

    #[serde(default = "default_profiling_dir")]
    pub profiling_dir: String,

    /// Accept unencrypted `data` objects
    #[serde(default)]
    pub allow_plaintext: bool,

    // Timeouts in seconds
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    #[serde(default = "default_metrics_timeout_secs")]
    pub metrics_timeout_secs: u64,

    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    #[serde(default = "default_artifact_timeout_secs")]
    pub artifact_timeout_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry
    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_max_frame_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_ingest_queue_capacity() -> usize {
    1024
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "pm86".to_string()
}

fn default_postgres_username() -> String {
    "pm86".to_string()
}

fn default_postgres_password() -> String {
    "pm86".to_string()
}

fn default_postgres_pool_size() -> usize {
    10
}

fn default_pool_acquire_attempts() -> u32 {
    3
}

fn default_pool_acquire_delay_ms() -> u64 {
    200
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "pm86".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_retention_secs() -> u64 {
    3600 * 24 * 7
}

fn default_falcon_url() -> String {
    "http://127.0.0.1:41624".to_string()
}

fn default_falcon_step_secs() -> u64 {
    60
}

fn default_dedup_window_secs() -> u64 {
    60
}

fn default_dedup_sweep_interval_secs() -> u64 {
    80
}

fn default_control_plane_addr() -> String {
    "127.0.0.1:43666".to_string()
}

fn default_profiling_dir() -> String {
    "./profilings".to_string()
}

fn default_lookup_timeout_secs() -> u64 {
    5
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_metrics_timeout_secs() -> u64 {
    5
}

fn default_rpc_timeout_secs() -> u64 {
    5
}

fn default_artifact_timeout_secs() -> u64 {
    30
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "pm86-ingest".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PM86"))
            .build()?
            .try_deserialize()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}
