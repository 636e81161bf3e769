use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::PostgresConfig;

/// Bounded retry policy for acquiring pooled connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireRetry {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for AcquireRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// PostgreSQL client wrapper with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
    retry: AcquireRetry,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("failed to create postgres pool")?;

        pool.resize(config.max_pool_size);

        Ok(Self {
            pool,
            retry: AcquireRetry {
                max_attempts: config.acquire_attempts.max(1),
                delay: Duration::from_millis(config.acquire_delay_ms),
            },
        })
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool
    ///
    /// Acquisition is the one transient failure worth retrying; the returned
    /// guard hands the connection back to the pool when dropped.
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        let mut attempt = 1;
        loop {
            match self.pool.get().await {
                Ok(client) => return Ok(client),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "failed to acquire postgres connection, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "failed to acquire postgres connection after {} attempts",
                            attempt
                        )
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry() {
        let retry = AcquireRetry::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay, Duration::from_millis(200));
    }

    #[test]
    fn test_pool_creation_clamps_attempts() {
        let config = PostgresConfig {
            acquire_attempts: 0,
            ..PostgresConfig::default()
        };

        let client = PostgresClient::new(&config).unwrap();

        assert_eq!(client.retry.max_attempts, 1);
    }
}
