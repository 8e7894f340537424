//! Connection pool and processor-state schema.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use cadence_core::error::{StorageError, StorageResult};

/// Pool settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Reported as `application_name`, visible in `pg_stat_activity`.
    pub application_name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Connection acquisition timeout.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    /// Pool sized for one processor stream.
    ///
    /// Blocks are processed one at a time: the open unit of work holds one
    /// connection, cursor and migration reads need at most one more.
    pub fn for_processor(url: &str, stream: &str) -> Self {
        Self {
            url: url.to_string(),
            application_name: format!("cadence:{stream}"),
            max_connections: 4,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }

    fn connect_options(&self) -> StorageResult<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| StorageError::ConnectionError(format!("invalid database url: {e}")))?;
        Ok(options.application_name(&self.application_name))
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database with the given configuration.
    #[instrument(skip_all, fields(app = %config.application_name))]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool created");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the processor state tables (`processor_cursor`,
    /// `schema_migrations`).
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;

        debug!("Processor state tables ready");
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_config() {
        let config = DatabaseConfig::for_processor("postgres://db/cadence", "main");
        assert_eq!(config.url, "postgres://db/cadence");
        assert_eq!(config.application_name, "cadence:main");
        assert!(config.min_connections <= config.max_connections);
    }

    #[test]
    fn test_invalid_url_is_a_connection_error() {
        let config = DatabaseConfig::for_processor("not a url", "main");
        assert!(matches!(
            config.connect_options(),
            Err(StorageError::ConnectionError(_))
        ));
    }
}
