use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use super::client::WorkbenchAdmin;
use super::error::WorkbenchError;
use super::reconciler::{ConnectionReconciler, ReconcileReport};
use super::session::{SessionCache, SessionHandle};
use crate::config::WorkbenchConfig;
use crate::database::{ConnectionStore, RemoteConnection};
use crate::platform::{DbService, PlatformDirectory};

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(skip)]
    pub handle: SessionHandle,
    /// True when the cached session was handed out without a remote login
    pub reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileReport>,
}

/// Delegated workbench login and the state shared with the dispatcher
pub struct WorkbenchService {
    config: WorkbenchConfig,
    admin: Arc<dyn WorkbenchAdmin>,
    directory: Arc<dyn PlatformDirectory>,
    store: Arc<dyn ConnectionStore>,
    reconciler: ConnectionReconciler,
    sessions: SessionCache,
}

impl WorkbenchService {
    pub fn new(
        config: WorkbenchConfig,
        admin: Arc<dyn WorkbenchAdmin>,
        directory: Arc<dyn PlatformDirectory>,
        store: Arc<dyn ConnectionStore>,
    ) -> Self {
        let reconciler = ConnectionReconciler::new(
            directory.clone(),
            store.clone(),
            admin.clone(),
            config.verify_every_login,
        );
        Self {
            config,
            admin,
            directory,
            store,
            reconciler,
            sessions: SessionCache::new(),
        }
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Log `user_id` into the workbench, reusing a session bound to the same
    /// credential version. A fresh login reconciles the user's connections
    /// first; an aborted pass fails the login.
    pub async fn login(&self, user_id: &str, credential_version: &str) -> Result<LoginOutcome, WorkbenchError> {
        if let Some(handle) = self.sessions.lookup(user_id, credential_version) {
            debug!("Reusing workbench session for {}", user_id);
            return Ok(LoginOutcome {
                handle,
                reused: true,
                reconciliation: None,
            });
        }

        let password = self.derived_password(user_id);
        self.admin.ensure_user(user_id, &password).await?;

        let report = self.reconciler.reconcile(user_id).await?;
        let handle = self.admin.login_user(user_id, &password).await?;
        self.sessions.bind(user_id, credential_version, handle.clone());
        info!("Workbench login for {} completed", user_id);

        Ok(LoginOutcome {
            handle,
            reused: false,
            reconciliation: Some(report),
        })
    }

    pub fn logout(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.unbind(user_id)
    }

    /// Per-user workbench password, derived so it never has to be stored
    pub fn derived_password(&self, user_id: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", user_id, self.config.user_password_secret).as_bytes());
        format!("{:x}", digest)
    }

    /// Cached connection row and its DB service for a workbench connection id
    pub async fn connection_owner(
        &self,
        remote_connection_id: &str,
    ) -> Result<Option<(RemoteConnection, DbService)>, WorkbenchError> {
        let Some(row) = self.store.find_by_remote_id(remote_connection_id).await? else {
            return Ok(None);
        };
        let service = self.directory.db_service(&row.db_service_id).await?;
        Ok(service.map(|s| (row, s)))
    }
}
