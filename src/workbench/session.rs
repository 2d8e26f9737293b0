use std::collections::HashMap;
use std::sync::Mutex;

/// Session id issued by the workbench for a delegated user login
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub String);

impl SessionHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
struct SessionBinding {
    credential_version: String,
    handle: SessionHandle,
}

/// Local user id -> workbench session, valid for one credential version.
///
/// Memory only. Entries never expire here; a session the workbench has dropped
/// is replaced at the user's next delegated login.
#[derive(Debug, Default)]
pub struct SessionCache {
    bindings: Mutex<HashMap<String, SessionBinding>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, user_id: &str, credential_version: &str, handle: SessionHandle) {
        let binding = SessionBinding {
            credential_version: credential_version.to_string(),
            handle,
        };
        self.lock().insert(user_id.to_string(), binding);
    }

    /// Hit only when the stored credential version matches
    pub fn lookup(&self, user_id: &str, credential_version: &str) -> Option<SessionHandle> {
        self.lock()
            .get(user_id)
            .filter(|b| b.credential_version == credential_version)
            .map(|b| b.handle.clone())
    }

    pub fn unbind(&self, user_id: &str) -> Option<SessionHandle> {
        self.lock().remove(user_id).map(|b| b.handle)
    }

    /// Remove whichever binding owns `handle`, returning its user
    pub fn unbind_by_handle(&self, handle: &str) -> Option<String> {
        let mut bindings = self.lock();
        let user_id = bindings
            .iter()
            .find(|(_, b)| b.handle.0 == handle)
            .map(|(user, _)| user.clone())?;
        bindings.remove(&user_id);
        Some(user_id)
    }

    pub fn user_for_handle(&self, handle: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|(_, b)| b.handle.0 == handle)
            .map(|(user, _)| user.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionBinding>> {
        // A panic while holding the guard cannot leave a half-written entry
        self.bindings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
