use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{AuthorizedService, DbService, DEFAULT_PURPOSE};
use crate::database::DatabaseError;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Directory source error: {0}")]
    Source(String),
}

/// Authorization and DB-service lookups answered by the platform
#[async_trait]
pub trait PlatformDirectory: Send + Sync {
    /// Every DB service the user may see, one entry per granted purpose
    async fn authorized_services(&self, user_id: &str) -> Result<Vec<AuthorizedService>, DirectoryError>;

    async fn db_service(&self, id: &str) -> Result<Option<DbService>, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Grant {
    pub user_id: String,
    pub db_service_id: String,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

fn default_purpose() -> String {
    DEFAULT_PURPOSE.to_string()
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    services: Vec<DbService>,
    #[serde(default)]
    grants: Vec<Grant>,
}

/// In-process directory, loaded from YAML or filled programmatically
#[derive(Default)]
pub struct StaticDirectory {
    services: RwLock<Vec<DbService>>,
    grants: RwLock<Vec<Grant>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_yaml::from_str(raw)
            .map_err(|e| DirectoryError::Source(format!("invalid directory file: {}", e)))?;
        Ok(Self {
            services: RwLock::new(file.services),
            grants: RwLock::new(file.grants),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Source(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    /// Insert or replace a service by id
    pub async fn put_service(&self, service: DbService) {
        let mut services = self.services.write().await;
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(slot) => *slot = service,
            None => services.push(service),
        }
    }

    pub async fn grant(&self, user_id: &str, db_service_id: &str, purpose: &str) {
        let grant = Grant {
            user_id: user_id.to_string(),
            db_service_id: db_service_id.to_string(),
            purpose: purpose.to_string(),
        };
        let mut grants = self.grants.write().await;
        if !grants.contains(&grant) {
            grants.push(grant);
        }
    }

    pub async fn revoke_all(&self, user_id: &str) {
        self.grants.write().await.retain(|g| g.user_id != user_id);
    }
}

#[async_trait]
impl PlatformDirectory for StaticDirectory {
    async fn authorized_services(&self, user_id: &str) -> Result<Vec<AuthorizedService>, DirectoryError> {
        let services = self.services.read().await;
        let grants = self.grants.read().await;

        Ok(grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .filter_map(|g| {
                services
                    .iter()
                    .find(|s| s.id == g.db_service_id)
                    .map(|s| AuthorizedService {
                        service: s.clone(),
                        purpose: g.purpose.clone(),
                    })
            })
            .collect())
    }

    async fn db_service(&self, id: &str) -> Result<Option<DbService>, DirectoryError> {
        Ok(self.services.read().await.iter().find(|s| s.id == id).cloned())
    }
}
