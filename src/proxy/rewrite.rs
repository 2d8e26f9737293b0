use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::config::{ProxyConfig, RewriteRuleConfig};

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Invalid rewrite pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cannot read rewrite file {path}: {message}")]
    File { path: String, message: String },
}

#[derive(Debug)]
struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

#[derive(Debug, Deserialize)]
struct RewriteFile {
    #[serde(default)]
    rules: Vec<RewriteRuleConfig>,
}

/// Ordered path rewrite rules, fixed after startup
#[derive(Debug, Default)]
pub struct RewriteRules {
    rules: Vec<RewriteRule>,
}

impl RewriteRules {
    pub fn new(configs: &[RewriteRuleConfig]) -> Result<Self, RewriteError> {
        let rules = configs
            .iter()
            .map(|c| {
                Regex::new(&c.pattern)
                    .map(|pattern| RewriteRule {
                        pattern,
                        replacement: c.replacement.clone(),
                    })
                    .map_err(|source| RewriteError::Pattern {
                        pattern: c.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Inline rules first, then the ones from `rewrite_file`
    pub fn from_config(proxy: &ProxyConfig) -> Result<Self, RewriteError> {
        let mut configs = proxy.rewrite_rules.clone();
        if let Some(path) = &proxy.rewrite_file {
            configs.extend(read_rule_file(path)?);
        }
        Self::new(&configs)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first rule whose pattern matches; later rules are ignored
    pub fn apply(&self, path: &str) -> String {
        for rule in &self.rules {
            if rule.pattern.is_match(path) {
                return rule.pattern.replace(path, rule.replacement.as_str()).into_owned();
            }
        }
        path.to_string()
    }
}

fn read_rule_file(path: impl AsRef<Path>) -> Result<Vec<RewriteRuleConfig>, RewriteError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| RewriteError::File {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let file: RewriteFile = serde_yaml::from_str(&raw).map_err(|e| RewriteError::File {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(file.rules)
}
