use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use super::DatabaseError;
use crate::config::DatabaseConfig;

/// Deadline for the startup connectivity check
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds and checks the Postgres connection pool
pub struct DatabaseManager;

impl DatabaseManager {
    /// Opens a pool sized from configuration and pings it before returning.
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }

        let pool = Self::pool_options(config).connect_lazy(&config.url)?;
        Self::health_check(&pool).await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "database connection pool established"
        );
        Ok(pool)
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(Duration::from_secs(config.max_idle_time_secs))
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        super::with_timeout(PING_TIMEOUT, async {
            sqlx::query("SELECT 1").execute(pool).await?;
            Ok::<_, DatabaseError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let mut config = crate::config::AppConfig::for_environment(
            crate::config::Environment::Development,
        )
        .database;
        config.url.clear();

        let err = DatabaseManager::connect(&config).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConfigMissing("DATABASE_URL")));
    }
}
