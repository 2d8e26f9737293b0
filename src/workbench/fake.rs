// In-process stand-in for the workbench admin API, recording every call

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use super::adapter::ConnectionConfig;
use super::client::WorkbenchAdmin;
use super::error::WorkbenchError;
use super::queries::WorkbenchVersion;
use super::session::SessionHandle;

pub struct FakeAdmin {
    calls: Mutex<Vec<String>>,
    grants: Mutex<HashMap<String, Vec<String>>>,
    pinned: Mutex<HashMap<String, Vec<String>>>,
    failing_creates: Mutex<HashSet<String>>,
    passwords: Mutex<HashMap<String, String>>,
    create_delay: Mutex<Duration>,
    create_gate: Mutex<Option<Arc<Barrier>>>,
    next_id: AtomicU64,
    sessions: AtomicU64,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            grants: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashMap::new()),
            failing_creates: Mutex::new(HashSet::new()),
            passwords: Mutex::new(HashMap::new()),
            create_delay: Mutex::new(Duration::ZERO),
            create_gate: Mutex::new(None),
            next_id: AtomicU64::new(42),
            sessions: AtomicU64::new(1),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change connections or grants
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| ["create:", "update:", "delete:", "set:"].iter().any(|p| c.starts_with(p)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn seed_grants(&self, user_id: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.grants.lock().unwrap().insert(user_id.to_string(), ids);
    }

    /// Grants reported for `user_id` regardless of any rebind
    pub fn pin_grants(&self, user_id: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.pinned.lock().unwrap().insert(user_id.to_string(), ids);
    }

    pub fn fail_create_for(&self, description: &str) {
        self.failing_creates.lock().unwrap().insert(description.to_string());
    }

    /// Every create sleeps this long before answering
    pub fn delay_creates(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    /// Creates block until `parties` of them are in flight at once
    pub fn gate_creates(&self, parties: usize) {
        *self.create_gate.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WorkbenchAdmin for FakeAdmin {
    async fn server_version(&self) -> Result<WorkbenchVersion, WorkbenchError> {
        Ok(WorkbenchVersion(23, 2, 0))
    }

    async fn ensure_user(&self, user_id: &str, password: &str) -> Result<(), WorkbenchError> {
        self.record(format!("ensure:{}", user_id));
        self.passwords.lock().unwrap().insert(user_id.to_string(), password.to_string());
        Ok(())
    }

    async fn login_user(&self, user_id: &str, password: &str) -> Result<SessionHandle, WorkbenchError> {
        self.record(format!("login:{}", user_id));
        match self.passwords.lock().unwrap().get(user_id) {
            Some(known) if known == password => {
                let n = self.sessions.fetch_add(1, Ordering::SeqCst);
                Ok(SessionHandle(format!("session-{}-{}", user_id, n)))
            }
            _ => Err(WorkbenchError::Authentication(format!("bad credentials for {}", user_id))),
        }
    }

    async fn create_connection(&self, user_id: &str, config: &ConnectionConfig) -> Result<String, WorkbenchError> {
        self.record(format!("create:{}", config.description));
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let gate = self.create_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        if self.failing_creates.lock().unwrap().contains(&config.description) {
            return Err(WorkbenchError::Remote("create refused".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.grants
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(id.clone());
        Ok(id)
    }

    async fn update_connection(&self, remote_id: &str, _config: &ConnectionConfig) -> Result<(), WorkbenchError> {
        self.record(format!("update:{}", remote_id));
        Ok(())
    }

    async fn delete_connection(&self, remote_id: &str) -> Result<(), WorkbenchError> {
        self.record(format!("delete:{}", remote_id));
        for ids in self.grants.lock().unwrap().values_mut() {
            ids.retain(|id| id != remote_id);
        }
        Ok(())
    }

    async fn user_connection_ids(&self, user_id: &str) -> Result<Vec<String>, WorkbenchError> {
        self.record(format!("list:{}", user_id));
        if let Some(pinned) = self.pinned.lock().unwrap().get(user_id) {
            return Ok(pinned.clone());
        }
        Ok(self.grants.lock().unwrap().get(user_id).cloned().unwrap_or_default())
    }

    async fn set_user_connections(&self, user_id: &str, ids: &[String]) -> Result<(), WorkbenchError> {
        self.record(format!("set:{}:[{}]", user_id, ids.join(",")));
        self.grants.lock().unwrap().insert(user_id.to_string(), ids.to_vec());
        Ok(())
    }
}
