#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use workbench_gateway::auth::{generate_jwt, Claims};
use workbench_gateway::config::{AppConfig, WorkbenchConfig};
use workbench_gateway::database::memory::MemoryConnectionStore;
use workbench_gateway::dispatcher::Dispatcher;
use workbench_gateway::platform::StaticDirectory;
use workbench_gateway::workbench::{GqlRequest, RemoteAdminClient, WorkbenchService};
use workbench_gateway::{router, AppState};

pub const ADMIN_USER: &str = "administrator";
pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const WORKBENCH_VERSION: &str = "23.2.0";

/// Serve `app` on a free local port and return its base URL
pub async fn serve(app: Router) -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}

/// A port nothing listens on
pub fn closed_port_url() -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    Ok(format!("http://127.0.0.1:{}", port))
}

pub struct TestGateway {
    pub base_url: String,
    pub config: AppConfig,
    pub state: AppState,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn token(&self, user_id: &str, role: &str) -> String {
        token(&self.config, user_id, role)
    }

    pub fn admin_token(&self) -> String {
        self.token("root", "admin")
    }
}

pub fn token(config: &AppConfig, user_id: &str, role: &str) -> String {
    generate_jwt(&Claims::new(user_id, user_id, role, 1), &config.security).expect("token")
}

/// Development config bound to a free local port, no database, no workbench
pub fn test_config() -> Result<AppConfig> {
    let mut config = AppConfig::defaults();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = portpicker::pick_unused_port().context("failed to pick free port")?;
    Ok(config)
}

/// Start the gateway in-process from `config`
pub async fn spawn_gateway(config: AppConfig) -> Result<TestGateway> {
    let state = AppState::build(config.clone()).await?;
    start(config, state).await
}

/// Start the gateway with the workbench wired to `directory`, which the test
/// keeps so it can change grants and DB services between logins
pub async fn spawn_workbench_gateway(config: AppConfig, directory: Arc<StaticDirectory>) -> Result<TestGateway> {
    let wb = config.workbench.clone().context("workbench config required")?;
    let mut state = AppState::build(config.clone()).await?;

    let admin = Arc::new(RemoteAdminClient::new(&wb)?);
    let service = Arc::new(WorkbenchService::new(
        wb,
        admin,
        directory,
        Arc::new(MemoryConnectionStore::new()),
    ));
    state.dispatcher = Some(Arc::new(Dispatcher::from_config(
        service.clone(),
        config.proxy.max_body_bytes,
    )?));
    state.workbench = Some(service);

    start(config, state).await
}

async fn start(config: AppConfig, state: AppState) -> Result<TestGateway> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let gateway = TestGateway {
        base_url: format!("http://{}", addr),
        config,
        state,
    };
    wait_ready(&gateway.base_url, Duration::from_secs(10)).await?;
    Ok(gateway)
}

async fn wait_ready(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(format!("{}/health", base_url)).send().await {
            if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("gateway did not become ready on {} within {:?}", base_url, timeout)
}

/// Backend that echoes what it received as JSON
pub async fn mock_backend(name: &'static str) -> Result<String> {
    let app = Router::new().fallback(move |request: Request| echo(name, request));
    serve(app).await
}

async fn echo(name: &'static str, request: Request) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let headers: BTreeMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    Json(json!({
        "backend": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Audit rejects statements containing `drop`; masking replaces every result
pub async fn mock_hooks() -> Result<String> {
    async fn audit(Json(request): Json<Value>) -> Json<Value> {
        let sql = request["sql"].as_str().unwrap_or_default().to_ascii_lowercase();
        if sql.contains("drop") {
            Json(json!({ "allowed": false, "reason": "destructive statement" }))
        } else {
            Json(json!({ "allowed": true }))
        }
    }

    async fn mask(Json(request): Json<Value>) -> Json<Value> {
        let count = request["results"].as_array().map(Vec::len).unwrap_or(0);
        Json(json!({
            "results": vec![json!({ "masked": true, "dbServiceId": request["dbServiceId"] }); count]
        }))
    }

    let app = Router::new()
        .route("/audit", post(audit))
        .route("/mask", post(mask));
    serve(app).await
}

/// Workbench config pointing at `mock`, with hook URLs from `hooks` when given
pub fn workbench_config(mock_url: &str, hooks: Option<&str>) -> WorkbenchConfig {
    let mut wb = WorkbenchConfig::new(mock_url);
    wb.admin_user = ADMIN_USER.to_string();
    wb.admin_password = ADMIN_PASSWORD.to_string();
    wb.user_password_secret = "integration-secret".to_string();
    wb.request_timeout_secs = 5;
    wb.hook_timeout_secs = 2;
    if let Some(hooks) = hooks {
        wb.audit_url = Some(format!("{}/audit", hooks));
        wb.masking_url = Some(format!("{}/mask", hooks));
        wb.enable_masking = true;
    }
    wb
}

#[derive(Default)]
struct WorkbenchData {
    passwords: HashMap<String, String>,
    sessions: HashMap<String, String>,
    connections: BTreeMap<String, Value>,
    grants: HashMap<String, Vec<String>>,
    operations: Vec<(String, Value)>,
    next_id: u64,
}

/// In-process stand-in for the SQL workbench query endpoint
#[derive(Clone)]
pub struct MockWorkbench {
    pub url: String,
    data: Arc<Mutex<WorkbenchData>>,
}

impl MockWorkbench {
    pub async fn start() -> Result<Self> {
        let data = Arc::new(Mutex::new(WorkbenchData {
            next_id: 100,
            ..Default::default()
        }));
        data.lock()
            .expect("mock lock")
            .passwords
            .insert(ADMIN_USER.to_string(), ADMIN_PASSWORD.to_string());

        let app = Router::new()
            .route("/sql_query/api/gql", post(gql))
            .with_state(data.clone());
        let url = serve(app).await?;
        Ok(Self { url, data })
    }

    fn with<T>(&self, f: impl FnOnce(&mut WorkbenchData) -> T) -> T {
        f(&mut self.data.lock().expect("mock lock"))
    }

    /// Operation names received, oldest first
    pub fn operations(&self) -> Vec<String> {
        self.with(|d| d.operations.iter().map(|(op, _)| op.clone()).collect())
    }

    /// Variables of the most recent call of `operation`
    pub fn last_variables(&self, operation: &str) -> Option<Value> {
        self.with(|d| {
            d.operations
                .iter()
                .rev()
                .find(|(op, _)| op == operation)
                .map(|(_, vars)| vars.clone())
        })
    }

    pub fn clear_operations(&self) {
        self.with(|d| d.operations.clear())
    }

    pub fn connections(&self) -> BTreeMap<String, Value> {
        self.with(|d| d.connections.clone())
    }

    pub fn grants(&self, user_id: &str) -> Vec<String> {
        self.with(|d| d.grants.get(user_id).cloned().unwrap_or_default())
    }

    /// Overwrite grants behind the gateway's back
    pub fn set_grants(&self, user_id: &str, ids: Vec<String>) {
        self.with(|d| {
            d.grants.insert(user_id.to_string(), ids);
        })
    }

    pub fn user_exists(&self, user_id: &str) -> bool {
        self.with(|d| d.passwords.contains_key(user_id))
    }
}

const ADMIN_OPERATIONS: [&str; 9] = [
    "adminUserInfo",
    "createUser",
    "setUserCredentials",
    "createConnection",
    "updateConnection",
    "deleteConnection",
    "addConnectionsAccess",
    "getSubjectConnectionAccess",
    "setSubjectConnectionAccess",
];

fn gql_error(message: &str, code: &str) -> Response {
    Json(json!({ "errors": [{ "message": message, "extensions": { "code": code } }] })).into_response()
}

fn gql_data(data: Value) -> Response {
    Json(json!({ "data": data })).into_response()
}

fn cookie_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == "cb-session-id")
        .map(|(_, v)| v.trim().to_string())
}

async fn gql(State(data): State<Arc<Mutex<WorkbenchData>>>, headers: HeaderMap, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<GqlRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "not a query request").into_response();
    };
    let operation = request.operation().unwrap_or_default();
    let vars = request.variables.clone();

    let mut d = match data.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    d.operations.push((operation.clone(), vars.clone()));

    let caller = cookie_session(&headers).and_then(|s| d.sessions.get(&s).cloned());
    if ADMIN_OPERATIONS.contains(&operation.as_str()) && caller.as_deref() != Some(ADMIN_USER) {
        return gql_error("Access denied", "ACCESS_DENIED");
    }

    match operation.as_str() {
        "serverConfig" => gql_data(json!({
            "serverConfig": {
                "version": WORKBENCH_VERSION,
                "supportsCustomConnections": true,
                "productName": "mock workbench"
            }
        })),
        "authLogin" => {
            let user = vars["credentials"]["user"].as_str().unwrap_or_default().to_string();
            let password = vars["credentials"]["password"].as_str().unwrap_or_default();
            if d.passwords.get(&user).map(String::as_str) != Some(password) {
                return gql_error("Invalid user credentials", "INVALID_CREDENTIALS");
            }
            d.next_id += 1;
            let session = format!("sess-{}-{}", user, d.next_id);
            d.sessions.insert(session.clone(), user);
            let cookie = format!("cb-session-id={}; Path=/sql_query; HttpOnly", session);
            (
                [(header::SET_COOKIE, cookie)],
                Json(json!({ "data": { "auth": { "authStatus": "SUCCESS" } } })),
            )
                .into_response()
        }
        "authLogout" => {
            if let Some(session) = cookie_session(&headers) {
                d.sessions.remove(&session);
            }
            gql_data(json!({ "authLogout": true }))
        }
        "adminUserInfo" => {
            let user = vars["userId"].as_str().unwrap_or_default();
            if d.passwords.contains_key(user) {
                gql_data(json!({ "user": { "userId": user } }))
            } else {
                gql_data(json!({ "user": null }))
            }
        }
        "createUser" => {
            let user = vars["userId"].as_str().unwrap_or_default().to_string();
            d.passwords.entry(user.clone()).or_default();
            gql_data(json!({ "user": { "userId": user } }))
        }
        "setUserCredentials" => {
            let user = vars["userId"].as_str().unwrap_or_default().to_string();
            let password = vars["password"].as_str().unwrap_or_default().to_string();
            d.passwords.insert(user, password);
            gql_data(json!({ "setUserCredentials": true }))
        }
        "createConnection" => {
            d.next_id += 1;
            let id = format!("conn-{}", d.next_id);
            d.connections.insert(id.clone(), vars["config"].clone());
            gql_data(json!({ "connection": { "id": id } }))
        }
        "updateConnection" => {
            let id = vars["config"]["connectionId"].as_str().unwrap_or_default().to_string();
            if !d.connections.contains_key(&id) {
                return gql_error("Connection not found", "NOT_FOUND");
            }
            d.connections.insert(id.clone(), vars["config"].clone());
            gql_data(json!({ "connection": { "id": id } }))
        }
        "deleteConnection" => {
            let id = vars["id"].as_str().unwrap_or_default().to_string();
            d.connections.remove(&id);
            for ids in d.grants.values_mut() {
                ids.retain(|g| g != &id);
            }
            gql_data(json!({ "deleteConnection": true }))
        }
        "addConnectionsAccess" => {
            let id = vars["connectionId"].as_str().unwrap_or_default().to_string();
            for subject in vars["subjects"].as_array().into_iter().flatten().filter_map(Value::as_str) {
                let granted = d.grants.entry(subject.to_string()).or_default();
                if !granted.contains(&id) {
                    granted.push(id.clone());
                }
            }
            gql_data(json!({ "addConnectionsAccess": true }))
        }
        "getSubjectConnectionAccess" => {
            let subject = vars["subjectId"].as_str().unwrap_or_default();
            let grants: Vec<Value> = d
                .grants
                .get(subject)
                .into_iter()
                .flatten()
                .map(|id| json!({ "connectionId": id }))
                .collect();
            gql_data(json!({ "grants": grants }))
        }
        "setSubjectConnectionAccess" => {
            let subject = vars["subjectId"].as_str().unwrap_or_default().to_string();
            let ids = vars["connectionIds"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            d.grants.insert(subject, ids);
            gql_data(json!({ "setSubjectConnectionAccess": true }))
        }
        "asyncSqlExecuteQuery" => gql_data(json!({ "taskInfo": { "id": "task-1", "running": true } })),
        "getSqlExecuteTaskResults" => gql_data(json!({
            "result": {
                "duration": 1,
                "results": [{ "resultSet": { "columns": [{ "name": "email" }], "rows": [["ada@example.com"]] } }]
            }
        })),
        _ => gql_data(json!({ "echo": { "operation": operation, "variables": vars } })),
    }
}

/// POST a query request to the gateway's workbench endpoint
pub async fn post_gql(
    client: &reqwest::Client,
    gateway: &TestGateway,
    operation: &str,
    variables: Value,
    session: Option<&str>,
) -> Result<Value> {
    let query = format!("query {} {{ {} }}", operation, operation);
    post_document(client, gateway, operation, &query, variables, session).await
}

/// POST a query request whose document is given verbatim
pub async fn post_document(
    client: &reqwest::Client,
    gateway: &TestGateway,
    operation_name: &str,
    query: &str,
    variables: Value,
    session: Option<&str>,
) -> Result<Value> {
    let mut request = client
        .post(gateway.url("/sql_query/api/gql"))
        .json(&json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
        }));
    if let Some(session) = session {
        request = request.header("cookie", format!("cb-session-id={}", session));
    }
    let response = request.send().await?;
    anyhow::ensure!(response.status() == reqwest::StatusCode::OK, "query endpoint answered {}", response.status());
    Ok(response.json().await?)
}

/// Log in through the gateway; returns the workbench session from Set-Cookie and the body
pub async fn workbench_login(client: &reqwest::Client, gateway: &TestGateway, token: &str) -> Result<(String, Value)> {
    let response = client
        .post(gateway.url("/api/workbench/session"))
        .bearer_auth(token)
        .send()
        .await?;
    anyhow::ensure!(response.status() == reqwest::StatusCode::OK, "login answered {}", response.status());

    let cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .context("no Set-Cookie on login")?
        .to_string();
    let session = cookie
        .split(';')
        .next()
        .and_then(|kv| kv.strip_prefix("cb-session-id="))
        .context("no workbench session cookie")?
        .to_string();
    Ok((session, response.json().await?))
}

pub const DIRECTORY: &str = r#"
services:
  - id: S1
    name: orders
    db_type: MySQL
    host: 10.0.0.5
    port: 3306
    admin_user: root
    admin_password: secret
    audit_enabled: true
  - id: S2
    name: reports
    db_type: PostgreSQL
    host: 10.0.0.6
    port: 5432
    admin_user: postgres
    admin_password: secret
grants:
  - user_id: alice
    db_service_id: S1
  - user_id: alice
    db_service_id: S2
    purpose: reporting
"#;
