use async_trait::async_trait;

use super::manager::DatabaseError;
use super::models::remote_connection::{ConnectionKey, RemoteConnection};
use crate::proxy::ProxyTarget;

/// Durable home of the target registry
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets in registration order
    async fn load(&self) -> Result<Vec<ProxyTarget>, DatabaseError>;

    /// Replace the stored list; the slice order is the registration order
    async fn save_all(&self, targets: &[ProxyTarget]) -> Result<(), DatabaseError>;
}

/// Durable cache of connections that exist on the workbench
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RemoteConnection>, DatabaseError>;

    async fn find_by_remote_id(&self, remote_connection_id: &str) -> Result<Option<RemoteConnection>, DatabaseError>;

    async fn upsert(&self, connection: &RemoteConnection) -> Result<(), DatabaseError>;

    async fn delete(&self, key: &ConnectionKey) -> Result<(), DatabaseError>;

    /// Remove every row of a user, returning how many were removed
    async fn delete_for_user(&self, user_id: &str) -> Result<u64, DatabaseError>;
}
