use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::adapter::ConnectionConfig;
use super::error::WorkbenchError;
use super::graphql::{GqlRequest, GqlResponse};
use super::queries::{self, QuerySet, WorkbenchVersion, SERVER_VERSION};
use super::session::SessionHandle;
use crate::config::WorkbenchConfig;

/// Privileged operations on the workbench, plus delegated user login
#[async_trait]
pub trait WorkbenchAdmin: Send + Sync {
    async fn server_version(&self) -> Result<WorkbenchVersion, WorkbenchError>;

    /// Create the workbench user if missing and (re)set its local password
    async fn ensure_user(&self, user_id: &str, password: &str) -> Result<(), WorkbenchError>;

    async fn login_user(&self, user_id: &str, password: &str) -> Result<SessionHandle, WorkbenchError>;

    /// Create a connection and grant it to `user_id`; returns the remote id
    async fn create_connection(&self, user_id: &str, config: &ConnectionConfig) -> Result<String, WorkbenchError>;

    async fn update_connection(&self, remote_id: &str, config: &ConnectionConfig) -> Result<(), WorkbenchError>;

    async fn delete_connection(&self, remote_id: &str) -> Result<(), WorkbenchError>;

    /// Connection ids the workbench currently grants to `user_id`
    async fn user_connection_ids(&self, user_id: &str) -> Result<Vec<String>, WorkbenchError>;

    /// Replace the user's granted connections with exactly `ids`
    async fn set_user_connections(&self, user_id: &str, ids: &[String]) -> Result<(), WorkbenchError>;
}

/// Admin client speaking the workbench's query protocol over HTTP.
///
/// One admin session is shared by all callers. It is established lazily and
/// dropped (then re-established once) when the workbench rejects it.
pub struct RemoteAdminClient {
    http: reqwest::Client,
    endpoint: String,
    config: WorkbenchConfig,
    queries: OnceCell<&'static QuerySet>,
    admin_session: Mutex<Option<String>>,
}

impl RemoteAdminClient {
    pub fn new(config: &WorkbenchConfig) -> Result<Self, WorkbenchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WorkbenchError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.remote_gql_url(),
            config: config.clone(),
            queries: OnceCell::new(),
            admin_session: Mutex::new(None),
        })
    }

    /// Query set for the detected workbench release, resolved once
    async fn queries(&self) -> Result<&'static QuerySet, WorkbenchError> {
        self.queries
            .get_or_try_init(|| async {
                let version = self.server_version().await?;
                let set = queries::select(version)?;
                info!("Workbench {} detected, using {} queries", version, set.label);
                Ok(set)
            })
            .await
            .copied()
    }

    async fn send(
        &self,
        query: &str,
        variables: Value,
        session: Option<&str>,
    ) -> Result<(HeaderMap, Value), WorkbenchError> {
        let mut request = self.http.post(&self.endpoint).json(&GqlRequest::new(query, variables));
        if let Some(session) = session {
            request = request.header(COOKIE, format!("{}={}", self.config.session_cookie, session));
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(WorkbenchError::Authentication(format!("workbench answered {}", status)));
        }
        if !status.is_success() {
            return Err(WorkbenchError::Transport(format!("workbench answered {}", status)));
        }

        let body: GqlResponse = response.json().await?;
        if let Some(error) = body.errors.first() {
            return Err(classify_remote_error(&error.message, error.code()));
        }
        Ok((headers, body.data.unwrap_or(Value::Null)))
    }

    async fn admin_session(&self) -> Result<String, WorkbenchError> {
        let mut session = self.admin_session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.clone());
        }

        let queries = self.queries().await?;
        let handle = self
            .login(queries, &self.config.admin_user, &self.config.admin_password)
            .await
            .map_err(|e| match e {
                WorkbenchError::Remote(msg) => WorkbenchError::Authentication(msg),
                other => other,
            })?;
        info!("Workbench admin session established for {}", self.config.admin_user);
        *session = Some(handle.0.clone());
        Ok(handle.0)
    }

    /// Run `query` with the admin session, re-authenticating once if it expired
    async fn admin_call(&self, query: &str, variables: Value) -> Result<Value, WorkbenchError> {
        let session = self.admin_session().await?;
        match self.send(query, variables.clone(), Some(&session)).await {
            Err(e) if e.is_authentication() => {
                warn!("Workbench admin session rejected, logging in again: {}", e);
                self.admin_session.lock().await.take();
                let session = self.admin_session().await?;
                Ok(self.send(query, variables, Some(&session)).await?.1)
            }
            other => Ok(other?.1),
        }
    }

    async fn login(&self, queries: &QuerySet, user: &str, password: &str) -> Result<SessionHandle, WorkbenchError> {
        let variables = json!({ "credentials": { "user": user, "password": password } });
        let (headers, _) = self.send(queries.auth_login, variables, None).await?;
        session_from_headers(&headers, &self.config.session_cookie)
            .map(SessionHandle)
            .ok_or_else(|| WorkbenchError::Authentication(format!("no session cookie issued for {}", user)))
    }

    fn scoped(&self, queries: &QuerySet, mut variables: Value) -> Value {
        if queries.project_scoped {
            if let Some(map) = variables.as_object_mut() {
                map.insert("projectId".into(), Value::String(self.config.project_id.clone()));
            }
        }
        variables
    }
}

#[async_trait]
impl WorkbenchAdmin for RemoteAdminClient {
    async fn server_version(&self) -> Result<WorkbenchVersion, WorkbenchError> {
        let (_, data) = self.send(SERVER_VERSION, json!({}), None).await?;
        let raw = data
            .pointer("/serverConfig/version")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkbenchError::InvalidResponse("serverConfig.version missing".into()))?;
        WorkbenchVersion::parse(raw).ok_or_else(|| WorkbenchError::UnsupportedVersion(raw.to_string()))
    }

    async fn ensure_user(&self, user_id: &str, password: &str) -> Result<(), WorkbenchError> {
        let queries = self.queries().await?;
        let found = self.admin_call(queries.find_user, json!({ "userId": user_id })).await?;
        let exists = match found.get("user") {
            None | Some(Value::Null) => false,
            Some(Value::Array(users)) => !users.is_empty(),
            Some(_) => true,
        };

        if !exists {
            self.admin_call(queries.create_user, json!({ "userId": user_id })).await?;
            info!("Created workbench user {}", user_id);
        }
        self.admin_call(
            queries.set_user_credentials,
            json!({ "userId": user_id, "password": password }),
        )
        .await?;
        Ok(())
    }

    async fn login_user(&self, user_id: &str, password: &str) -> Result<SessionHandle, WorkbenchError> {
        let queries = self.queries().await?;
        self.login(queries, user_id, password).await.map_err(|e| match e {
            WorkbenchError::Remote(msg) => WorkbenchError::Authentication(msg),
            other => other,
        })
    }

    async fn create_connection(&self, user_id: &str, config: &ConnectionConfig) -> Result<String, WorkbenchError> {
        let queries = self.queries().await?;
        let data = self
            .admin_call(queries.create_connection, self.scoped(queries, json!({ "config": config })))
            .await?;
        let id = data
            .pointer("/connection/id")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkbenchError::InvalidResponse("createConnection returned no id".into()))?
            .to_string();

        self.admin_call(
            queries.grant_connection,
            self.scoped(queries, json!({ "connectionId": id, "subjects": [user_id] })),
        )
        .await?;
        debug!("Created workbench connection {} for {}", id, user_id);
        Ok(id)
    }

    async fn update_connection(&self, remote_id: &str, config: &ConnectionConfig) -> Result<(), WorkbenchError> {
        let queries = self.queries().await?;
        let config = config.clone().with_connection_id(remote_id);
        self.admin_call(queries.update_connection, self.scoped(queries, json!({ "config": config })))
            .await?;
        Ok(())
    }

    async fn delete_connection(&self, remote_id: &str) -> Result<(), WorkbenchError> {
        let queries = self.queries().await?;
        self.admin_call(queries.delete_connection, self.scoped(queries, json!({ "id": remote_id })))
            .await?;
        Ok(())
    }

    async fn user_connection_ids(&self, user_id: &str) -> Result<Vec<String>, WorkbenchError> {
        let queries = self.queries().await?;
        let data = self
            .admin_call(queries.user_connections, json!({ "subjectId": user_id }))
            .await?;
        let grants = data
            .get("grants")
            .and_then(Value::as_array)
            .ok_or_else(|| WorkbenchError::InvalidResponse("connection grants missing".into()))?;

        Ok(grants
            .iter()
            .filter_map(|g| g.get("connectionId").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn set_user_connections(&self, user_id: &str, ids: &[String]) -> Result<(), WorkbenchError> {
        let queries = self.queries().await?;
        self.admin_call(
            queries.set_user_connections,
            self.scoped(queries, json!({ "subjectId": user_id, "connectionIds": ids })),
        )
        .await?;
        Ok(())
    }
}

fn classify_remote_error(message: &str, code: Option<&str>) -> WorkbenchError {
    let lower = message.to_ascii_lowercase();
    let auth_code = matches!(code, Some("UNAUTHENTICATED") | Some("ACCESS_DENIED"));
    if auth_code
        || lower.contains("access denied")
        || lower.contains("not authorized")
        || lower.contains("authentication")
        || lower.contains("anonymous access")
    {
        WorkbenchError::Authentication(message.to_string())
    } else {
        WorkbenchError::Remote(message.to_string())
    }
}

/// Value of cookie `name` in any `Set-Cookie` header
pub fn session_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
