use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::adapter::translate;
use super::client::WorkbenchAdmin;
use super::error::WorkbenchError;
use super::fingerprint::fingerprint;
use crate::database::{ConnectionKey, ConnectionStore, RemoteConnection};
use crate::platform::{DbService, PlatformDirectory};

/// A desired connection: the service it points at and its current fingerprint
#[derive(Debug, Clone)]
pub struct DesiredConnection {
    pub service: DbService,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create { key: ConnectionKey },
    Update { key: ConnectionKey, remote_id: String },
    Delete { key: ConnectionKey, remote_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub user_id: String,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<KeyFailure>,
    pub verified: bool,
    pub rebound: bool,
    pub converged: bool,
}

impl ReconcileReport {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            converged: true,
            ..Default::default()
        }
    }

    pub fn applied_changes(&self) -> bool {
        !(self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }

    fn fail(&mut self, key: &ConnectionKey, error: impl ToString) {
        let error = error.to_string();
        warn!("Reconciliation of {} failed: {}", key, error);
        self.failed.push(KeyFailure {
            key: key.to_string(),
            error,
        });
    }
}

/// Desired set: active services the user may see, keyed per purpose
pub fn desired_state(
    user_id: &str,
    authorized: Vec<crate::platform::AuthorizedService>,
) -> BTreeMap<ConnectionKey, DesiredConnection> {
    authorized
        .into_iter()
        .filter(|a| a.service.active)
        .map(|a| {
            let key = ConnectionKey::new(&a.service.id, &a.purpose, user_id);
            let fingerprint = fingerprint(&a.service);
            (
                key,
                DesiredConnection {
                    service: a.service,
                    fingerprint,
                },
            )
        })
        .collect()
}

/// Diff desired against cached state, in key order: creates and updates for
/// desired keys, then deletes for keys that are only cached
pub fn plan(
    desired: &BTreeMap<ConnectionKey, DesiredConnection>,
    actual: &BTreeMap<ConnectionKey, RemoteConnection>,
) -> Vec<Change> {
    let mut changes = Vec::new();

    for (key, wanted) in desired {
        match actual.get(key) {
            None => changes.push(Change::Create { key: key.clone() }),
            Some(row) if row.fingerprint != wanted.fingerprint => changes.push(Change::Update {
                key: key.clone(),
                remote_id: row.remote_connection_id.clone(),
            }),
            Some(_) => {}
        }
    }

    for (key, row) in actual {
        if !desired.contains_key(key) {
            changes.push(Change::Delete {
                key: key.clone(),
                remote_id: row.remote_connection_id.clone(),
            });
        }
    }

    changes
}

/// Keeps a user's workbench connections equal to what the platform grants.
///
/// Passes for the same user are serialized; different users run concurrently.
pub struct ConnectionReconciler {
    directory: Arc<dyn PlatformDirectory>,
    store: Arc<dyn ConnectionStore>,
    admin: Arc<dyn WorkbenchAdmin>,
    verify_every_login: bool,
    user_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConnectionReconciler {
    pub fn new(
        directory: Arc<dyn PlatformDirectory>,
        store: Arc<dyn ConnectionStore>,
        admin: Arc<dyn WorkbenchAdmin>,
        verify_every_login: bool,
    ) -> Self {
        Self {
            directory,
            store,
            admin,
            verify_every_login,
            user_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Run one pass for `user_id`.
    ///
    /// Errors only when the desired or cached state cannot be read; per-key
    /// failures are reported in the returned report.
    pub async fn reconcile(&self, user_id: &str) -> Result<ReconcileReport, WorkbenchError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(user_id).await
        };
        drop(lock);
        self.release_user_lock(user_id);

        if let Err(e) = &result {
            error!("Reconciliation for {} aborted: {}", user_id, e);
        }
        result
    }

    async fn reconcile_locked(&self, user_id: &str) -> Result<ReconcileReport, WorkbenchError> {
        let authorized = self.directory.authorized_services(user_id).await?;
        let desired = desired_state(user_id, authorized);
        let actual: BTreeMap<ConnectionKey, RemoteConnection> = self
            .store
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(|row| (row.key(), row))
            .collect();

        let mut report = ReconcileReport::new(user_id);

        if desired.is_empty() {
            if !actual.is_empty() {
                self.clear_user(user_id, &actual, &mut report).await?;
            }
            return Ok(report);
        }

        for change in plan(&desired, &actual) {
            self.apply(&change, &desired, &mut report).await;
        }

        if report.applied_changes() || self.verify_every_login {
            self.verify(user_id, &desired, &mut report).await?;
        }

        info!(
            "Reconciled {}: {} created, {} updated, {} deleted, {} failed{}",
            user_id,
            report.created.len(),
            report.updated.len(),
            report.deleted.len(),
            report.failed.len(),
            if report.rebound { ", rebound" } else { "" }
        );
        Ok(report)
    }

    /// Nothing is granted any more: one bulk revoke instead of per-key deletes
    async fn clear_user(
        &self,
        user_id: &str,
        actual: &BTreeMap<ConnectionKey, RemoteConnection>,
        report: &mut ReconcileReport,
    ) -> Result<(), WorkbenchError> {
        if let Err(e) = self.admin.set_user_connections(user_id, &[]).await {
            for key in actual.keys() {
                report.fail(key, &e);
            }
            report.converged = false;
            return Ok(());
        }

        let removed = self.store.delete_for_user(user_id).await?;
        report.deleted = actual.keys().map(ToString::to_string).collect();
        info!("Revoked all {} workbench connection(s) of {}", removed, user_id);
        Ok(())
    }

    async fn apply(
        &self,
        change: &Change,
        desired: &BTreeMap<ConnectionKey, DesiredConnection>,
        report: &mut ReconcileReport,
    ) {
        match change {
            Change::Create { key } => {
                let Some(wanted) = desired.get(key) else { return };
                let config = match translate(&wanted.service, &key.purpose, &key.user_id) {
                    Ok(config) => config,
                    Err(e) => return report.fail(key, e),
                };
                let remote_id = match self.admin.create_connection(&key.user_id, &config).await {
                    Ok(id) => id,
                    Err(e) => return report.fail(key, e),
                };
                let row = RemoteConnection::new(key.clone(), remote_id, &wanted.fingerprint);
                match self.store.upsert(&row).await {
                    Ok(()) => report.created.push(key.to_string()),
                    Err(e) => report.fail(key, e),
                }
            }
            Change::Update { key, remote_id } => {
                let Some(wanted) = desired.get(key) else { return };
                let config = match translate(&wanted.service, &key.purpose, &key.user_id) {
                    Ok(config) => config,
                    Err(e) => return report.fail(key, e),
                };
                if let Err(e) = self.admin.update_connection(remote_id, &config).await {
                    return report.fail(key, e);
                }
                let row = RemoteConnection::new(key.clone(), remote_id, &wanted.fingerprint);
                match self.store.upsert(&row).await {
                    Ok(()) => report.updated.push(key.to_string()),
                    Err(e) => report.fail(key, e),
                }
            }
            Change::Delete { key, remote_id } => {
                if let Err(e) = self.admin.delete_connection(remote_id).await {
                    return report.fail(key, e);
                }
                match self.store.delete(key).await {
                    Ok(()) => report.deleted.push(key.to_string()),
                    Err(e) => report.fail(key, e),
                }
            }
        }
    }

    /// Read back the user's granted ids and rebind once if they drifted
    async fn verify(
        &self,
        user_id: &str,
        desired: &BTreeMap<ConnectionKey, DesiredConnection>,
        report: &mut ReconcileReport,
    ) -> Result<(), WorkbenchError> {
        let expected: Vec<String> = self
            .store
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|row| desired.contains_key(&row.key()))
            .map(|row| row.remote_connection_id)
            .collect();

        report.verified = true;
        let remote = match self.admin.user_connection_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Cannot read workbench grants of {}: {}", user_id, e);
                report.converged = false;
                return Ok(());
            }
        };

        if Drift::between(&expected, &remote).is_none() {
            return Ok(());
        }

        warn!("Workbench grants of {} drifted, rebinding {} connection(s)", user_id, expected.len());
        report.rebound = true;
        if let Err(e) = self.admin.set_user_connections(user_id, &expected).await {
            warn!("Rebind for {} failed: {}", user_id, e);
            report.converged = false;
            return Ok(());
        }

        let after = match self.admin.user_connection_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Cannot re-read workbench grants of {}: {}", user_id, e);
                report.converged = false;
                return Ok(());
            }
        };
        if let Some(drift) = Drift::between(&expected, &after) {
            let err = WorkbenchError::DriftConvergence {
                user: user_id.to_string(),
                missing: drift.missing,
                unexpected: drift.unexpected,
            };
            warn!("{}; left for next login", err);
            report.converged = false;
        }
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Forget the lock once no pass holds or waits on it
    fn release_user_lock(&self, user_id: &str) {
        let mut locks = self.user_locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks.get(user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(user_id);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Drift {
    missing: Vec<String>,
    unexpected: Vec<String>,
}

impl Drift {
    /// `None` when `remote` holds exactly the expected ids, each once
    fn between(expected: &[String], remote: &[String]) -> Option<Drift> {
        let want: BTreeSet<&String> = expected.iter().collect();
        let have: BTreeSet<&String> = remote.iter().collect();
        let missing: Vec<String> = want.difference(&have).map(|s| s.to_string()).collect();
        let unexpected: Vec<String> = have.difference(&want).map(|s| s.to_string()).collect();

        if missing.is_empty() && unexpected.is_empty() && expected.len() == remote.len() {
            None
        } else {
            Some(Drift { missing, unexpected })
        }
    }
}
