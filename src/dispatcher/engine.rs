use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::hooks::{AllowAll, AuditRequest, DataMasker, HookError, HttpAuditor, HttpMasker, MaskRequest, NoMasking, SqlAuditor};
use super::intercept::Interception;
use super::policy::{policy_for, OperationPolicy};
use super::tasks::{TaskIndex, TaskOwner};
use super::variables::{coerce, ExecuteQueryVariables, TaskResultsVariables};
use crate::app::AppState;
use crate::error::ApiError;
use crate::proxy::forward::buffer_body;
use crate::workbench::{GqlRequest, GqlResponse, RootField, WorkbenchService};

const RESPONSE_CAPTURE_LIMIT: usize = 64 * 1024 * 1024;
const TASK_INDEX_CAPACITY: usize = 10_000;

/// What a local handler learned before forwarding, needed after it
enum LocalContext {
    None,
    ExecuteQuery { connection_id: String },
    FetchResults { task_id: String },
}

/// Inline handler for the workbench query endpoint
pub struct Dispatcher {
    workbench: Arc<WorkbenchService>,
    auditor: Arc<dyn SqlAuditor>,
    masker: Arc<dyn DataMasker>,
    tasks: TaskIndex,
    gql_path: String,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        workbench: Arc<WorkbenchService>,
        auditor: Arc<dyn SqlAuditor>,
        masker: Arc<dyn DataMasker>,
        max_body_bytes: usize,
    ) -> Self {
        let gql_path = workbench.config().gql_path();
        Self {
            workbench,
            auditor,
            masker,
            tasks: TaskIndex::new(TASK_INDEX_CAPACITY),
            gql_path,
            max_body_bytes,
        }
    }

    /// Wire HTTP hooks for the configured collaborator URLs
    pub fn from_config(workbench: Arc<WorkbenchService>, max_body_bytes: usize) -> Result<Self, HookError> {
        let config = workbench.config().clone();

        let auditor: Arc<dyn SqlAuditor> = match &config.audit_url {
            Some(url) => Arc::new(HttpAuditor::new(url, config.hook_timeout())?),
            None => {
                warn!("No SQL audit collaborator configured, queries are not audited");
                Arc::new(AllowAll)
            }
        };
        let masker: Arc<dyn DataMasker> = match &config.masking_url {
            Some(url) => Arc::new(HttpMasker::new(url, config.hook_timeout())?),
            None => Arc::new(NoMasking),
        };

        Ok(Self::new(workbench, auditor, masker, max_body_bytes))
    }

    pub fn handles(&self, method: &Method, path: &str) -> bool {
        *method == Method::POST && path == self.gql_path
    }

    fn hook_timeout(&self) -> Duration {
        self.workbench.config().hook_timeout()
    }

    pub async fn dispatch(&self, request: Request, next: Next) -> Response {
        let (parts, body) = request.into_parts();
        let bytes = match buffer_body(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => return ApiError::from(e).into_response(),
        };

        let Ok(mut gql) = serde_json::from_slice::<GqlRequest>(&bytes) else {
            return next.run(Request::from_parts(parts, Body::from(bytes))).await;
        };
        let fields = match gql.root_fields() {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Rejected unreadable workbench query: {}", e);
                return gql_reply(GqlResponse::error(
                    format!("Invalid query document: {}", e),
                    "GRAPHQL_PARSE_FAILED",
                ));
            }
        };
        let (field, policy) = match select_policy(&fields) {
            Ok(Some(found)) => found,
            Ok(None) => return next.run(Request::from_parts(parts, Body::from(bytes))).await,
            Err(reply) => return gql_reply(reply),
        };
        let operation = field.name.as_str();
        debug!("Workbench operation {} -> {:?}", operation, policy);

        let mut body = bytes;
        if policy.preprocess {
            match coerce(operation, std::mem::take(&mut gql.variables)) {
                Ok(variables) => gql.variables = variables,
                Err(e) => return gql_reply(GqlResponse::error(e.to_string(), "BAD_USER_INPUT")),
            }
            match serde_json::to_vec(&gql) {
                Ok(encoded) => body = Bytes::from(encoded),
                Err(e) => {
                    error!("Failed to re-encode {} request: {}", operation, e);
                    return ApiError::internal_server_error("Failed to prepare request").into_response();
                }
            }
        }

        let session = session_cookie(&parts.headers, &self.workbench.config().session_cookie);
        let user_id = session
            .as_deref()
            .and_then(|s| self.workbench.sessions().user_for_handle(s));

        let local = if policy.handle_locally {
            match self.before(field, &gql, session.as_deref(), user_id.as_deref()).await {
                Ok(local) => local,
                Err(reply) => return reply,
            }
        } else {
            LocalContext::None
        };

        let response = next.run(Request::from_parts(parts, Body::from(body))).await;

        if !needs_capture(&policy, &local) {
            return response;
        }
        let captured = match Interception::capture(response, RESPONSE_CAPTURE_LIMIT).await {
            Ok(captured) => captured,
            Err(e) => {
                error!("Failed to buffer {} response: {}", operation, e);
                return ApiError::bad_gateway("Workbench response could not be read").into_response();
            }
        };
        self.after(operation, local, captured, user_id).await
    }

    /// Before hooks. `Err` carries a reply that replaces forwarding.
    async fn before(
        &self,
        field: &RootField,
        gql: &GqlRequest,
        session: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<LocalContext, Response> {
        match field.name.as_str() {
            "asyncSqlExecuteQuery" => {
                // Document arguments win over same-named variables
                let vars = serde_json::from_value::<ExecuteQueryVariables>(gql.variables.clone()).ok();
                let connection_id = field
                    .argument_str("connectionId")
                    .map(str::to_string)
                    .or_else(|| vars.as_ref().and_then(|v| v.connection_id.clone()));
                let sql = field
                    .argument_str("sql")
                    .map(str::to_string)
                    .or_else(|| vars.and_then(|v| v.sql));
                let (Some(connection_id), Some(sql)) = (connection_id, sql) else {
                    warn!("Execute request without connectionId or sql refused");
                    return Err(gql_reply(GqlResponse::error(
                        "asyncSqlExecuteQuery requires connectionId and sql",
                        "BAD_USER_INPUT",
                    )));
                };
                self.audit(&connection_id, &sql, user_id).await?;
                Ok(LocalContext::ExecuteQuery { connection_id })
            }
            "getSqlExecuteTaskResults" => {
                let task_id = field.argument_str("taskId").map(str::to_string).or_else(|| {
                    serde_json::from_value::<TaskResultsVariables>(gql.variables.clone())
                        .ok()
                        .map(|v| v.task_id)
                });
                Ok(task_id.map_or(LocalContext::None, |task_id| LocalContext::FetchResults { task_id }))
            }
            "authLogout" => {
                if let Some(user) = session.and_then(|s| self.workbench.sessions().unbind_by_handle(s)) {
                    info!("Workbench session of {} ended by logout", user);
                }
                Ok(LocalContext::None)
            }
            _ => Ok(LocalContext::None),
        }
    }

    async fn audit(&self, connection_id: &str, sql: &str, user_id: Option<&str>) -> Result<(), Response> {
        let owner = self.workbench.connection_owner(connection_id).await.map_err(|e| {
            error!("Cannot resolve connection {} for audit: {}", connection_id, e);
            gql_reply(GqlResponse::error("SQL audit unavailable", "AUDIT_UNAVAILABLE"))
        })?;
        let Some((row, service)) = owner else {
            warn!("Connection {} is not managed by the gateway, skipping audit", connection_id);
            return Ok(());
        };
        if !service.audit_enabled {
            return Ok(());
        }

        let request = AuditRequest {
            user_id: user_id.map(str::to_string).or(Some(row.user_id)),
            db_service_id: service.id,
            connection_id: connection_id.to_string(),
            sql: sql.to_string(),
        };
        match tokio::time::timeout(self.hook_timeout(), self.auditor.audit(&request)).await {
            Ok(Ok(decision)) if decision.allowed => Ok(()),
            Ok(Ok(decision)) => {
                let reason = decision.reason.unwrap_or_else(|| "no reason given".to_string());
                info!("SQL on {} rejected by audit: {}", request.db_service_id, reason);
                Err(gql_reply(GqlResponse::error(format!("SQL rejected by audit: {}", reason), "SQL_REJECTED")))
            }
            Ok(Err(e)) => {
                warn!("SQL audit failed: {}", e);
                Err(gql_reply(GqlResponse::error("SQL audit unavailable", "AUDIT_UNAVAILABLE")))
            }
            Err(_) => {
                warn!("SQL audit timed out after {:?}", self.hook_timeout());
                Err(gql_reply(GqlResponse::error("SQL audit timed out", "AUDIT_UNAVAILABLE")))
            }
        }
    }

    async fn after(
        &self,
        operation: &str,
        local: LocalContext,
        captured: Interception,
        user_id: Option<String>,
    ) -> Response {
        match (operation, local) {
            ("asyncSqlExecuteQuery", LocalContext::ExecuteQuery { connection_id }) => {
                if let Some(task_id) = captured.json().as_ref().and_then(task_id) {
                    self.tasks.record(&task_id, TaskOwner { connection_id, user_id });
                }
                captured.passthrough()
            }
            ("getSqlExecuteTaskResults", local) => {
                let task_id = match local {
                    LocalContext::FetchResults { task_id } => Some(task_id),
                    _ => None,
                };
                self.mask_results(task_id, captured, user_id).await
            }
            ("serverConfig", _) => {
                let Some(mut json) = captured.json() else {
                    return captured.passthrough();
                };
                match json.pointer_mut("/data/serverConfig").and_then(Value::as_object_mut) {
                    Some(server_config) => {
                        server_config.insert("supportsCustomConnections".into(), Value::Bool(false));
                        captured.rewritten_json(&json)
                    }
                    None => captured.passthrough(),
                }
            }
            _ => captured.passthrough(),
        }
    }

    async fn mask_results(&self, task_id: Option<String>, captured: Interception, user_id: Option<String>) -> Response {
        if !self.workbench.config().enable_masking {
            return captured.passthrough();
        }
        let Some(mut json) = captured.json() else {
            return captured.passthrough();
        };
        let Some(results) = results_mut(&mut json) else {
            return captured.passthrough();
        };

        let owner = task_id.and_then(|id| self.tasks.owner(&id));
        let db_service_id = match &owner {
            Some(owner) => match self.workbench.connection_owner(&owner.connection_id).await {
                Ok(found) => found.map(|(_, service)| service.id),
                Err(e) => {
                    warn!("Cannot resolve connection {} for masking: {}", owner.connection_id, e);
                    None
                }
            },
            None => None,
        };

        let request = MaskRequest {
            user_id: user_id.or_else(|| owner.and_then(|o| o.user_id)),
            db_service_id,
            results: results.take(),
        };
        match tokio::time::timeout(self.hook_timeout(), self.masker.mask(&request)).await {
            Ok(Ok(masked)) => {
                *results = masked;
                captured.rewritten_json(&json)
            }
            Ok(Err(e)) => {
                warn!("Result masking failed: {}", e);
                captured.rewritten_json(&GqlResponse::error("Result masking failed", "MASKING_FAILED").to_value())
            }
            Err(_) => {
                warn!("Result masking timed out after {:?}", self.hook_timeout());
                captured.rewritten_json(&GqlResponse::error("Result masking timed out", "MASKING_FAILED").to_value())
            }
        }
    }
}

/// Apply the dispatcher to the workbench query endpoint; everything else
/// continues down the stack unchanged.
pub async fn dispatcher_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match &state.dispatcher {
        Some(dispatcher) if dispatcher.handles(request.method(), request.uri().path()) => {
            dispatcher.dispatch(request, next).await
        }
        _ => next.run(request).await,
    }
}

/// Governed root field of a request and its policy. `Err` carries the reply
/// for a request that must not be forwarded.
fn select_policy(fields: &[RootField]) -> Result<Option<(&RootField, OperationPolicy)>, GqlResponse> {
    let governed: Vec<(&RootField, OperationPolicy)> = fields
        .iter()
        .filter_map(|field| policy_for(&field.name).map(|policy| (field, policy)))
        .collect();

    if let Some((field, _)) = governed.iter().find(|(_, policy)| policy.disabled) {
        warn!("Blocked disabled workbench operation {}", field.name);
        return Err(GqlResponse::error(
            format!("Operation '{}' is disabled; connections are managed by the platform", field.name),
            "OPERATION_DISABLED",
        ));
    }
    match governed.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        [(first, _), (second, _), ..] => {
            warn!("Refused request combining {} and {}", first.name, second.name);
            Err(GqlResponse::error(
                format!("Operations '{}' and '{}' must be sent as separate requests", first.name, second.name),
                "BAD_USER_INPUT",
            ))
        }
    }
}

fn needs_capture(policy: &OperationPolicy, local: &LocalContext) -> bool {
    policy.rewrite_response || matches!(local, LocalContext::ExecuteQuery { .. })
}

fn gql_reply(reply: GqlResponse) -> Response {
    (StatusCode::OK, Json(reply.to_value())).into_response()
}

/// Value of cookie `name` in the request's `Cookie` headers
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Task id of an execute reply: `id` of the (possibly aliased) root field
fn task_id(reply: &Value) -> Option<String> {
    reply
        .get("data")?
        .as_object()?
        .values()
        .find_map(|field| field.get("id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// `results` array of a task-results reply
fn results_mut(reply: &mut Value) -> Option<&mut Value> {
    reply
        .get_mut("data")?
        .as_object_mut()?
        .values_mut()
        .find_map(|field| field.get_mut("results"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn reads_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; cb-session-id=abc; x=1"));
        assert_eq!(session_cookie(&headers, "cb-session-id").as_deref(), Some("abc"));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    fn field(name: &str) -> RootField {
        RootField {
            name: name.to_string(),
            arguments: Default::default(),
        }
    }

    #[test]
    fn policy_follows_root_fields() {
        assert_eq!(select_policy(&[field("productInfo")]).unwrap(), None);

        let fields = [field("productInfo"), field("serverConfig")];
        let (governed, policy) = select_policy(&fields).unwrap().unwrap();
        assert_eq!(governed.name, "serverConfig");
        assert!(policy.rewrite_response);

        let hidden = [field("serverConfig"), field("createConnection")];
        let reply = select_policy(&hidden).unwrap_err();
        assert_eq!(reply.errors[0].code(), Some("OPERATION_DISABLED"));

        let mixed = [field("asyncSqlExecuteQuery"), field("asyncSqlExecuteQuery")];
        let reply = select_policy(&mixed).unwrap_err();
        assert_eq!(reply.errors[0].code(), Some("BAD_USER_INPUT"));
    }

    #[test]
    fn finds_task_id_under_aliased_field() {
        let reply = json!({ "data": { "taskInfo": { "id": "17", "running": true } } });
        assert_eq!(task_id(&reply).as_deref(), Some("17"));
        assert_eq!(task_id(&json!({ "data": null })), None);
    }

    #[test]
    fn finds_results_array() {
        let mut reply = json!({ "data": { "result": { "duration": 3, "results": [{ "resultSet": {} }] } } });
        let results = results_mut(&mut reply).unwrap();
        *results = json!([]);
        assert_eq!(reply["data"]["result"]["results"], json!([]));
    }
}
