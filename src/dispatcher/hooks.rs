// Extension points around query execution. The audit and masking rules live
// in external collaborators; the gateway only calls them and enforces the
// answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook timed out")]
    Timeout,

    #[error("Hook unreachable: {0}")]
    Transport(String),

    #[error("Hook answered with an invalid payload: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for HookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HookError::Timeout
        } else if err.is_decode() {
            HookError::InvalidResponse(err.to_string())
        } else {
            HookError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub user_id: Option<String>,
    pub db_service_id: String,
    pub connection_id: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDecision {
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AuditDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRequest {
    pub user_id: Option<String>,
    pub db_service_id: Option<String>,
    /// `results` array of a task-results reply
    pub results: Value,
}

#[derive(Debug, Deserialize)]
struct MaskResponse {
    results: Value,
}

/// Reviews SQL before it reaches the workbench
#[async_trait]
pub trait SqlAuditor: Send + Sync {
    async fn audit(&self, request: &AuditRequest) -> Result<AuditDecision, HookError>;
}

/// Rewrites result sets before they reach the user
#[async_trait]
pub trait DataMasker: Send + Sync {
    async fn mask(&self, request: &MaskRequest) -> Result<Value, HookError>;
}

/// Used when no audit collaborator is configured
pub struct AllowAll;

#[async_trait]
impl SqlAuditor for AllowAll {
    async fn audit(&self, _request: &AuditRequest) -> Result<AuditDecision, HookError> {
        Ok(AuditDecision::allow())
    }
}

/// Used when no masking collaborator is configured
pub struct NoMasking;

#[async_trait]
impl DataMasker for NoMasking {
    async fn mask(&self, request: &MaskRequest) -> Result<Value, HookError> {
        Ok(request.results.clone())
    }
}

pub struct HttpAuditor {
    client: reqwest::Client,
    url: String,
}

impl HttpAuditor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HookError> {
        Ok(Self {
            client: hook_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SqlAuditor for HttpAuditor {
    async fn audit(&self, request: &AuditRequest) -> Result<AuditDecision, HookError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(HookError::Transport(format!("audit answered {}", response.status())));
        }
        Ok(response.json().await?)
    }
}

pub struct HttpMasker {
    client: reqwest::Client,
    url: String,
}

impl HttpMasker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HookError> {
        Ok(Self {
            client: hook_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DataMasker for HttpMasker {
    async fn mask(&self, request: &MaskRequest) -> Result<Value, HookError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(HookError::Transport(format!("masking answered {}", response.status())));
        }
        let body: MaskResponse = response.json().await?;
        Ok(body.results)
    }
}

fn hook_client(timeout: Duration) -> Result<reqwest::Client, HookError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HookError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn defaults_allow_and_keep_results() {
        let audit = AllowAll
            .audit(&AuditRequest {
                user_id: None,
                db_service_id: "S1".into(),
                connection_id: "42".into(),
                sql: "drop table t".into(),
            })
            .await
            .unwrap();
        assert!(audit.allowed);

        let results = json!([{ "resultSet": { "rows": [["a"]] } }]);
        let masked = NoMasking
            .mask(&MaskRequest { user_id: None, db_service_id: None, results: results.clone() })
            .await
            .unwrap();
        assert_eq!(masked, results);
    }

    #[test]
    fn decision_reason_is_optional() {
        let d: AuditDecision = serde_json::from_value(json!({ "allowed": false })).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.reason, None);
    }
}
