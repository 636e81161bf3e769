use serde::{Deserialize, Serialize};

/// PostgreSQL configuration for the key registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    pub acquire_attempts: u32,
    pub acquire_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "pm86".to_string(),
            username: "pm86".to_string(),
            password: "pm86".to_string(),
            max_pool_size: 10,
            acquire_attempts: 3,
            acquire_delay_ms: 200,
        }
    }
}
