use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::target::{prefixes_overlap, ProxyTarget};
use crate::database::{DatabaseError, TargetStore};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid target name: {0}")]
    InvalidName(String),

    #[error("Malformed target URL: {0}")]
    MalformedUrl(String),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Prefix '{prefix}' is already owned by target '{owner}'")]
    PrefixConflict { prefix: String, owner: String },

    #[error("Prefix '{0}' is reserved by the gateway")]
    ReservedPrefix(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Catalogue of backend services and the path prefixes they own.
///
/// Reads take a shared lock on every request; registration takes the
/// exclusive lock and persists the new list before publishing it, so a
/// failed write leaves the registry exactly as it was.
pub struct TargetRegistry {
    targets: RwLock<Vec<ProxyTarget>>,
    store: Arc<dyn TargetStore>,
    local: ProxyTarget,
    reserved: Vec<String>,
}

impl TargetRegistry {
    /// Load the persisted list and build the registry
    pub async fn load(
        store: Arc<dyn TargetStore>,
        self_url: impl Into<String>,
        reserved: Vec<String>,
    ) -> Result<Self, RegistryError> {
        let targets = store.load().await?;
        info!("Loaded {} proxy target(s)", targets.len());

        Ok(Self {
            targets: RwLock::new(targets),
            store,
            local: ProxyTarget::local(self_url),
            reserved,
        })
    }

    /// Insert or update a target by name
    pub async fn register(
        &self,
        name: &str,
        url: &str,
        version: &str,
        prefixes: Vec<String>,
    ) -> Result<ProxyTarget, RegistryError> {
        let candidate = ProxyTarget::new(name, url, version, prefixes)?;

        for prefix in &candidate.prefixes {
            if let Some(reserved) = self.reserved.iter().find(|r| prefixes_overlap(r, prefix)) {
                return Err(RegistryError::ReservedPrefix(format!("{} (overlaps {})", prefix, reserved)));
            }
        }

        let mut targets = self.targets.write().await;

        for other in targets.iter().filter(|t| t.name != candidate.name) {
            for prefix in &candidate.prefixes {
                if other.prefixes.iter().any(|owned| prefixes_overlap(owned, prefix)) {
                    return Err(RegistryError::PrefixConflict {
                        prefix: prefix.clone(),
                        owner: other.name.clone(),
                    });
                }
            }
        }

        let mut next = targets.clone();
        match next.iter_mut().find(|t| t.name == candidate.name) {
            Some(existing) => *existing = candidate.clone(),
            None => next.push(candidate.clone()),
        }

        self.store.save_all(&next).await?;
        *targets = next;

        info!(
            "Registered proxy target '{}' -> {} (version {}, prefixes {:?})",
            candidate.name, candidate.url, candidate.version, candidate.prefixes
        );
        Ok(candidate)
    }

    /// The target owning a prefix of `path`, if any. Registration order
    /// breaks ties, although overlap checks keep matches unique.
    pub async fn resolve(&self, path: &str) -> Option<ProxyTarget> {
        let targets = self.targets.read().await;
        let found = targets.iter().find(|t| t.matching_prefix(path).is_some()).cloned();
        debug!(
            "Route lookup for {}: {}",
            path,
            found.as_ref().map(|t| t.name.as_str()).unwrap_or("<local>")
        );
        found
    }

    /// Owning target, or the built-in self target when nothing matches.
    ///
    /// For admin tooling and embedders that want a total answer. The request
    /// pipeline calls [`resolve`](Self::resolve) instead and lets unmatched
    /// paths fall through to the local routes.
    pub async fn route(&self, path: &str) -> ProxyTarget {
        self.resolve(path).await.unwrap_or_else(|| self.local.clone())
    }

    /// Whether the request should leave the gateway at all
    pub async fn should_proxy(&self, path: &str) -> bool {
        self.resolve(path).await.is_some()
    }

    pub async fn list(&self) -> Vec<ProxyTarget> {
        self.targets.read().await.clone()
    }
}
