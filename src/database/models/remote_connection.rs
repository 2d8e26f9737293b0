use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Composite key of a workbench connection: one per DB service, purpose and user
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub db_service_id: String,
    pub purpose: String,
    pub user_id: String,
}

impl ConnectionKey {
    pub fn new(db_service_id: impl Into<String>, purpose: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            db_service_id: db_service_id.into(),
            purpose: purpose.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.db_service_id, self.purpose, self.user_id)
    }
}

/// Cached state of a connection that exists on the workbench side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RemoteConnection {
    pub db_service_id: String,
    pub purpose: String,
    pub user_id: String,
    pub remote_connection_id: String,
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

impl RemoteConnection {
    pub fn new(key: ConnectionKey, remote_connection_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            db_service_id: key.db_service_id,
            purpose: key.purpose,
            user_id: key.user_id,
            remote_connection_id: remote_connection_id.into(),
            fingerprint: fingerprint.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(&self.db_service_id, &self.purpose, &self.user_id)
    }
}
