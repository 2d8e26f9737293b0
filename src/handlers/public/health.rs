use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::app::AppState;
use crate::middleware::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
    pub workbench: &'static str,
    pub targets: usize,
}

/// GET /health - Gateway liveness and dependency status
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "status": "ok",
///     "timestamp": "2025-01-01T00:00:00Z",
///     "database": "ok",
///     "workbench": "enabled",
///     "targets": 3
///   }
/// }
/// ```
///
/// An unreachable database turns the report into a 503 with `"status": "degraded"`.
pub async fn health(State(state): State<AppState>) -> Response {
    let mut report = HealthReport {
        status: "ok",
        timestamp: Utc::now(),
        database: "memory",
        database_error: None,
        workbench: if state.workbench.is_some() { "enabled" } else { "disabled" },
        targets: state.registry.list().await.len(),
    };

    let Some(db) = &state.database else {
        return ApiResponse::success(report).into_response();
    };

    match db.health_check().await {
        Ok(()) => {
            report.database = "ok";
            ApiResponse::success(report).into_response()
        }
        Err(e) => {
            tracing::warn!("health check: database unavailable: {}", e);
            report.status = "degraded";
            report.database = "unavailable";
            report.database_error = Some(e.to_string());
            let body = json!({ "success": false, "error": "database unavailable", "data": report });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
