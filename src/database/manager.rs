use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from DatabaseManager and the stores built on it
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Tables owned by the gateway. The platform's `db_services` and
/// `db_service_grants` tables are read but never created here.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS proxy_targets (
        name        TEXT PRIMARY KEY,
        url         TEXT NOT NULL,
        version     TEXT NOT NULL,
        prefixes    TEXT[] NOT NULL,
        position    BIGINT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS workbench_connections (
        db_service_id         TEXT NOT NULL,
        purpose               TEXT NOT NULL,
        user_id               TEXT NOT NULL,
        remote_connection_id  TEXT NOT NULL,
        fingerprint           TEXT NOT NULL,
        updated_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (db_service_id, purpose, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS workbench_connections_remote_id ON workbench_connections (remote_connection_id)",
    "CREATE INDEX IF NOT EXISTS workbench_connections_user_id ON workbench_connections (user_id)",
];

/// Owner of the gateway's connection pool, built once at startup
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Connect using the configured URL
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let raw = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(raw)
            .await?;

        info!(
            "Created database pool for: {}{}",
            url.host_str().unwrap_or("localhost"),
            url.path()
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the gateway's own tables if they are missing
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_a_url() {
        let config = DatabaseConfig {
            url: None,
            max_connections: 1,
            connection_timeout: 1,
        };
        let err = DatabaseManager::connect(&config).await.err().unwrap();
        assert!(matches!(err, DatabaseError::ConfigMissing("DATABASE_URL")));
    }

    #[tokio::test]
    async fn connect_rejects_unparseable_url() {
        let config = DatabaseConfig {
            url: Some("not a url".to_string()),
            max_connections: 1,
            connection_timeout: 1,
        };
        let err = DatabaseManager::connect(&config).await.err().unwrap();
        assert!(matches!(err, DatabaseError::InvalidDatabaseUrl));
    }

    #[test]
    fn schema_statements_are_idempotent() {
        assert!(SCHEMA.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
