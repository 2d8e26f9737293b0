// Read-only view of the platform's DB services and who may see them.
// User, role and DB-service management live elsewhere; the gateway only asks.

pub mod directory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use directory::{DirectoryError, PlatformDirectory, StaticDirectory};

/// Purpose used when a grant does not name one
pub const DEFAULT_PURPOSE: &str = "default";

/// Connection-relevant description of a database managed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbService {
    pub id: String,
    pub name: String,
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    #[serde(default, skip_serializing)]
    pub admin_password: String,
    #[serde(default)]
    pub additional_params: BTreeMap<String, String>,
    #[serde(default)]
    pub audit_enabled: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A DB service a user may see, together with the purpose it was granted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedService {
    pub service: DbService,
    pub purpose: String,
}
