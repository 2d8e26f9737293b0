// In-memory stores: used when no DATABASE_URL is configured, and by tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::manager::DatabaseError;
use super::models::remote_connection::{ConnectionKey, RemoteConnection};
use super::store::{ConnectionStore, TargetStore};
use crate::proxy::ProxyTarget;

#[derive(Default)]
pub struct MemoryTargetStore {
    targets: RwLock<Vec<ProxyTarget>>,
    fail_writes: AtomicBool,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<ProxyTarget>) -> Self {
        Self {
            targets: RwLock::new(targets),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail, to exercise persistence errors
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<ProxyTarget> {
        self.targets.read().await.clone()
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn load(&self) -> Result<Vec<ProxyTarget>, DatabaseError> {
        Ok(self.targets.read().await.clone())
    }

    async fn save_all(&self, targets: &[ProxyTarget]) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("target store is read-only".to_string()));
        }
        *self.targets.write().await = targets.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConnectionStore {
    rows: RwLock<BTreeMap<ConnectionKey, RemoteConnection>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn get(&self, key: &ConnectionKey) -> Option<RemoteConnection> {
        self.rows.read().await.get(key).cloned()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RemoteConnection>, DatabaseError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_remote_id(&self, remote_connection_id: &str) -> Result<Option<RemoteConnection>, DatabaseError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|row| row.remote_connection_id == remote_connection_id)
            .cloned())
    }

    async fn upsert(&self, connection: &RemoteConnection) -> Result<(), DatabaseError> {
        self.rows
            .write()
            .await
            .insert(connection.key(), connection.clone());
        Ok(())
    }

    async fn delete(&self, key: &ConnectionKey) -> Result<(), DatabaseError> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| row.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}
