//! Connection pool configuration.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use hip_core::ConfigError;
use tokio_postgres::NoTls;

use crate::config::env_parse;

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait and connect timeout for pool checkouts
    pub timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "hip".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Read `HIP_DB_HOST`, `HIP_DB_PORT`, `HIP_DB_NAME`, `HIP_DB_USER`,
    /// `HIP_DB_PASSWORD`, `HIP_DB_POOL_SIZE` and `HIP_DB_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HIP_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("HIP_DB_PORT", defaults.port),
            dbname: std::env::var("HIP_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("HIP_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("HIP_DB_PASSWORD").unwrap_or_default(),
            max_size: env_parse("HIP_DB_POOL_SIZE", defaults.max_size).max(1),
            timeout: Duration::from_secs(env_parse("HIP_DB_TIMEOUT_SECS", 5u64).max(1)),
        }
    }

    /// Create a connection pool. No connection is opened until first use.
    pub fn create_pool(&self) -> Result<Pool, ConfigError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts.wait = Some(self.timeout);
        pool.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConfigError::InvalidValue {
                field: "HIP_DB_HOST".to_string(),
                value: self.host.clone(),
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let config = DbConfig {
            password: "hunter2".to_string(),
            ..DbConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        let pool = DbConfig::default().create_pool();
        assert!(pool.is_ok());
    }
}
