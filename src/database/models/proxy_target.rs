use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::proxy::ProxyTarget;

/// Row of the `proxy_targets` table; `position` keeps registration order
#[derive(Debug, Clone, FromRow)]
pub struct ProxyTargetRow {
    pub name: String,
    pub url: String,
    pub version: String,
    pub prefixes: Vec<String>,
    pub position: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<ProxyTargetRow> for ProxyTarget {
    fn from(row: ProxyTargetRow) -> Self {
        ProxyTarget {
            name: row.name,
            url: row.url,
            version: row.version,
            prefixes: row.prefixes,
        }
    }
}
