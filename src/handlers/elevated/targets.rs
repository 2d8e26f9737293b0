use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::proxy::ProxyTarget;

#[derive(Debug, Deserialize)]
pub struct RegisterTargetRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    pub prefixes: Vec<String>,
}

/// POST /api/gateway/targets - Register or update a backend target
///
/// Upserts by name, answering 201 for a new target and 200 for an update.
/// Fails with 400 on a malformed URL or prefix and with 409 when a prefix
/// overlaps one owned by another target or the gateway itself.
///
/// Expected Input:
/// ```json
/// {
///   "name": "orders",
///   "url": "http://orders:8080",
///   "version": "1.4.0",
///   "prefixes": ["/orders", "/api/orders"]
/// }
/// ```
pub async fn register_target(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<RegisterTargetRequest>, JsonRejection>,
) -> ApiResult<ProxyTarget> {
    user.require_admin()?;
    let Json(request) = body.map_err(|e| ApiError::invalid_json(e.body_text()))?;

    let existed = state.registry.list().await.iter().any(|t| t.name == request.name.trim());
    let target = state
        .registry
        .register(&request.name, &request.url, &request.version, request.prefixes)
        .await?;

    tracing::info!("Target '{}' registered by {}", target.name, user.user_id);
    if existed {
        Ok(ApiResponse::success(target))
    } else {
        Ok(ApiResponse::created(target))
    }
}

/// GET /api/gateway/targets - Registered targets in registration order
pub async fn list_targets(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<ProxyTarget>> {
    user.require_admin()?;
    Ok(ApiResponse::success(state.registry.list().await))
}
