use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::proxy_target::ProxyTargetRow;
use super::models::remote_connection::{ConnectionKey, RemoteConnection};
use super::store::{ConnectionStore, TargetStore};
use crate::platform::{AuthorizedService, DbService, DirectoryError, PlatformDirectory};
use crate::proxy::ProxyTarget;

/// Registry persistence in `proxy_targets`
pub struct PgTargetStore {
    pool: PgPool,
}

impl PgTargetStore {
    pub fn new(db: &DatabaseManager) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl TargetStore for PgTargetStore {
    async fn load(&self) -> Result<Vec<ProxyTarget>, DatabaseError> {
        let rows = sqlx::query_as::<_, ProxyTargetRow>(
            "SELECT name, url, version, prefixes, position, updated_at
             FROM proxy_targets
             ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProxyTarget::from).collect())
    }

    async fn save_all(&self, targets: &[ProxyTarget]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM proxy_targets").execute(&mut *tx).await?;

        for (position, target) in targets.iter().enumerate() {
            sqlx::query(
                "INSERT INTO proxy_targets (name, url, version, prefixes, position, updated_at)
                 VALUES ($1, $2, $3, $4, $5, now())",
            )
            .bind(&target.name)
            .bind(&target.url)
            .bind(&target.version)
            .bind(&target.prefixes)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Connection cache persistence in `workbench_connections`
pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(db: &DatabaseManager) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RemoteConnection>, DatabaseError> {
        let rows = sqlx::query_as::<_, RemoteConnection>(
            "SELECT db_service_id, purpose, user_id, remote_connection_id, fingerprint, updated_at
             FROM workbench_connections
             WHERE user_id = $1
             ORDER BY db_service_id, purpose",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_remote_id(&self, remote_connection_id: &str) -> Result<Option<RemoteConnection>, DatabaseError> {
        let row = sqlx::query_as::<_, RemoteConnection>(
            "SELECT db_service_id, purpose, user_id, remote_connection_id, fingerprint, updated_at
             FROM workbench_connections
             WHERE remote_connection_id = $1
             LIMIT 1",
        )
        .bind(remote_connection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert(&self, connection: &RemoteConnection) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO workbench_connections
                (db_service_id, purpose, user_id, remote_connection_id, fingerprint, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (db_service_id, purpose, user_id)
             DO UPDATE SET remote_connection_id = EXCLUDED.remote_connection_id,
                           fingerprint = EXCLUDED.fingerprint,
                           updated_at = EXCLUDED.updated_at",
        )
        .bind(&connection.db_service_id)
        .bind(&connection.purpose)
        .bind(&connection.user_id)
        .bind(&connection.remote_connection_id)
        .bind(&connection.fingerprint)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &ConnectionKey) -> Result<(), DatabaseError> {
        sqlx::query(
            "DELETE FROM workbench_connections
             WHERE db_service_id = $1 AND purpose = $2 AND user_id = $3",
        )
        .bind(&key.db_service_id)
        .bind(&key.purpose)
        .bind(&key.user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM workbench_connections WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, FromRow)]
struct DbServiceRow {
    id: String,
    name: String,
    db_type: String,
    host: String,
    port: i32,
    admin_user: String,
    admin_password: String,
    params: Json<BTreeMap<String, String>>,
    audit_enabled: bool,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct GrantedServiceRow {
    #[sqlx(flatten)]
    service: DbServiceRow,
    purpose: String,
}

impl TryFrom<DbServiceRow> for DbService {
    type Error = DatabaseError;

    fn try_from(row: DbServiceRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port)
            .map_err(|_| DatabaseError::QueryError(format!("db service {} has invalid port {}", row.id, row.port)))?;
        Ok(DbService {
            id: row.id,
            name: row.name,
            db_type: row.db_type,
            host: row.host,
            port,
            admin_user: row.admin_user,
            admin_password: row.admin_password,
            additional_params: row.params.0,
            audit_enabled: row.audit_enabled,
            active: row.is_active,
        })
    }
}

/// Reads the platform's DB services and grants
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(db: &DatabaseManager) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl PlatformDirectory for PgDirectory {
    async fn authorized_services(&self, user_id: &str) -> Result<Vec<AuthorizedService>, DirectoryError> {
        let rows = sqlx::query_as::<_, GrantedServiceRow>(
            "SELECT s.id, s.name, s.db_type, s.host, s.port, s.admin_user, s.admin_password,
                    s.params, s.audit_enabled, s.is_active, g.purpose
             FROM db_service_grants g
             JOIN db_services s ON s.id = g.db_service_id
             WHERE g.user_id = $1
             ORDER BY s.id, g.purpose",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        rows.into_iter()
            .map(|row| -> Result<AuthorizedService, DirectoryError> {
                Ok(AuthorizedService {
                    service: DbService::try_from(row.service)?,
                    purpose: row.purpose,
                })
            })
            .collect()
    }

    async fn db_service(&self, id: &str) -> Result<Option<DbService>, DirectoryError> {
        let row = sqlx::query_as::<_, DbServiceRow>(
            "SELECT id, name, db_type, host, port, admin_user, admin_password,
                    params, audit_enabled, is_active
             FROM db_services
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row.map(DbService::try_from).transpose()?)
    }
}
