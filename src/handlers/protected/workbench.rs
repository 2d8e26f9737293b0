use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
    Extension,
};
use serde::Serialize;

use crate::app::AppState;
use crate::config::WorkbenchConfig;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::workbench::{LoginOutcome, WorkbenchError, WorkbenchService};

fn workbench(state: &AppState) -> Result<&WorkbenchService, ApiError> {
    state
        .workbench
        .as_deref()
        .ok_or_else(|| WorkbenchError::NotConfigured.into())
}

fn session_cookie(config: &WorkbenchConfig, value: &str, max_age: Option<u32>) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax",
        config.session_cookie, value, config.path_prefix
    );
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", age));
    }
    cookie
}

/// POST /api/workbench/session - Delegated login into the SQL workbench
///
/// Reuses the cached workbench session when the caller's token is unchanged.
/// Otherwise provisions the workbench user, reconciles its connections and
/// logs in. The workbench session cookie is set on the response.
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "reused": false,
///     "reconciliation": {
///       "user_id": "u1",
///       "created": ["S1:default:u1"],
///       "updated": [],
///       "deleted": [],
///       "failed": [],
///       "verified": true,
///       "rebound": false,
///       "converged": true
///     }
///   }
/// }
/// ```
pub async fn workbench_login(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = workbench(&state)?;
    let outcome: LoginOutcome = service.login(&user.user_id, &user.credential_version).await?;
    let cookie = session_cookie(service.config(), outcome.handle.as_str(), None);

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), ApiResponse::success(outcome)))
}

#[derive(Debug, Serialize)]
pub struct LogoutOutcome {
    pub unbound: bool,
}

/// DELETE /api/workbench/session - Drop the caller's cached workbench session
pub async fn workbench_logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = workbench(&state)?;
    let unbound = service.logout(&user.user_id).is_some();
    let cookie = session_cookie(service.config(), "", Some(0));

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), ApiResponse::success(LogoutOutcome { unbound })))
}
