use serde::{Deserialize, Serialize};
use url::Url;

use super::registry::RegistryError;

/// Name of the built-in fallback target that points back at the gateway
pub const SELF_TARGET_NAME: &str = "self";

/// A backend service owning one or more URL path prefixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub name: String,
    pub url: String,
    pub version: String,
    pub prefixes: Vec<String>,
}

impl ProxyTarget {
    /// Build a target after checking name, URL and prefixes
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        version: impl Into<String>,
        prefixes: Vec<String>,
    ) -> Result<Self, RegistryError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidName("target name must not be empty".to_string()));
        }
        if name == SELF_TARGET_NAME {
            return Err(RegistryError::InvalidName(format!("'{}' is reserved", SELF_TARGET_NAME)));
        }

        let url = url.into();
        validate_base_url(&url)?;

        if prefixes.is_empty() {
            return Err(RegistryError::InvalidPrefix("at least one prefix is required".to_string()));
        }
        let mut normalized: Vec<String> = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let prefix = prefix.trim().to_string();
            if !prefix.starts_with('/') || prefix.len() < 2 {
                return Err(RegistryError::InvalidPrefix(format!(
                    "prefix '{}' must start with '/' and name a path",
                    prefix
                )));
            }
            if !normalized.contains(&prefix) {
                normalized.push(prefix);
            }
        }

        Ok(Self {
            name,
            url,
            version: version.into(),
            prefixes: normalized,
        })
    }

    /// The built-in target for the gateway's own listening address
    pub fn local(self_url: impl Into<String>) -> Self {
        Self {
            name: SELF_TARGET_NAME.to_string(),
            url: self_url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            prefixes: Vec::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.name == SELF_TARGET_NAME
    }

    /// First owned prefix that `path` starts with
    pub fn matching_prefix(&self, path: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| path.starts_with(prefix))
    }

    /// Join the base URL with an already-rewritten path and query
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path_and_query)
    }
}

/// Two prefixes overlap when one is a string prefix of the other
pub fn prefixes_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn validate_base_url(raw: &str) -> Result<(), RegistryError> {
    let url = Url::parse(raw).map_err(|e| RegistryError::MalformedUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RegistryError::MalformedUrl(format!("{}: scheme must be http or https", raw)));
    }
    if url.host_str().is_none() {
        return Err(RegistryError::MalformedUrl(format!("{}: missing host", raw)));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(RegistryError::MalformedUrl(format!("{}: query and fragment are not allowed", raw)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        for bad in ["not a url", "ftp://files.local", "http://svc/?a=1", "unix:/tmp/sock"] {
            let err = ProxyTarget::new("svc", bad, "1.0", vec!["/svc".into()]).unwrap_err();
            assert!(matches!(err, RegistryError::MalformedUrl(_)), "{bad} -> {err:?}");
        }
    }

    #[test]
    fn normalizes_and_dedups_prefixes() {
        let target = ProxyTarget::new(" svc ", "http://svc:8080", "1.0", vec![" /svc".into(), "/svc".into()]).unwrap();
        assert_eq!(target.name, "svc");
        assert_eq!(target.prefixes, vec!["/svc".to_string()]);
    }

    #[test]
    fn rejects_bare_slash_and_relative_prefixes() {
        assert!(ProxyTarget::new("svc", "http://svc", "1", vec!["/".into()]).is_err());
        assert!(ProxyTarget::new("svc", "http://svc", "1", vec!["svc".into()]).is_err());
        assert!(ProxyTarget::new("svc", "http://svc", "1", vec![]).is_err());
    }

    #[test]
    fn self_name_is_reserved() {
        let err = ProxyTarget::new("self", "http://svc", "1", vec!["/x".into()]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName(_)));
    }

    #[test]
    fn joins_upstream_url() {
        let target = ProxyTarget::new("svc", "http://svc:8080/", "1", vec!["/svc".into()]).unwrap();
        assert_eq!(target.upstream_url("/svc/a?b=1"), "http://svc:8080/svc/a?b=1");
    }

    #[test]
    fn overlap_is_string_prefix_in_either_direction() {
        assert!(prefixes_overlap("/api", "/api/v1"));
        assert!(prefixes_overlap("/api/v1", "/api"));
        assert!(prefixes_overlap("/a", "/a"));
        assert!(!prefixes_overlap("/api/a", "/api/b"));
    }
}
