// Errors returned by the gateway's own endpoints and middleware.
// Component errors convert into `ApiError`; internals are logged, not exposed.
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

use crate::database::DatabaseError;
use crate::proxy::{ForwardError, RegistryError};
use crate::workbench::WorkbenchError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// 400 with per-field messages
    ValidationError {
        message: String,
        field_errors: HashMap<String, String>,
    },
    InvalidJson(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    InternalServerError(String),
    /// Upstream target or workbench failed
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
}

impl ApiError {
    /// HTTP status and machine-readable code
    fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::ValidationError { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::InvalidJson(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            ApiError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT"),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().0
    }

    pub fn code(&self) -> &'static str {
        self.kind().1
    }

    /// Client-safe message
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::BadRequest(msg)
            | ApiError::InvalidJson(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::GatewayTimeout(msg) => msg,
        }
    }

    /// `{"error": true, "message", "code"}`, plus `field_errors` for validation failures
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": true,
            "message": self.message(),
            "code": self.code()
        });
        if let ApiError::ValidationError { field_errors, .. } = self {
            body["field_errors"] = json!(field_errors);
        }
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Validation error pinned to one request field
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::ValidationError {
            field_errors: HashMap::from([(field.to_string(), message.clone())]),
            message,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        ApiError::GatewayTimeout(message.into())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("store misconfigured: {}", err);
                ApiError::service_unavailable("Gateway store unavailable")
            }
            DatabaseError::QueryError(_) | DatabaseError::Sqlx(_) => {
                tracing::error!("store failure: {}", err);
                ApiError::internal_server_error("Gateway store failure")
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidName(msg) => ApiError::field_error("name", msg),
            RegistryError::MalformedUrl(msg) => ApiError::field_error("url", msg),
            RegistryError::InvalidPrefix(msg) => ApiError::field_error("prefixes", msg),
            RegistryError::PrefixConflict { .. } | RegistryError::ReservedPrefix(_) => {
                ApiError::conflict(err.to_string())
            }
            RegistryError::Store(db) => db.into(),
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::BodyTooLarge(_) => ApiError::PayloadTooLarge(err.to_string()),
            ForwardError::Body(msg) => ApiError::bad_request(msg),
            ForwardError::Timeout { .. } => ApiError::gateway_timeout(err.to_string()),
            ForwardError::Upstream { target, .. } => ApiError::bad_gateway(format!("Upstream {} unavailable", target)),
            ForwardError::Client(msg) => {
                tracing::error!("HTTP client error: {}", msg);
                ApiError::internal_server_error("Proxy misconfigured")
            }
        }
    }
}

impl From<WorkbenchError> for ApiError {
    fn from(err: WorkbenchError) -> Self {
        match err {
            WorkbenchError::NotConfigured => ApiError::service_unavailable(err.to_string()),
            WorkbenchError::Authentication(_) => {
                tracing::warn!("{}", err);
                ApiError::bad_gateway("Workbench login failed")
            }
            WorkbenchError::Timeout => ApiError::gateway_timeout(err.to_string()),
            WorkbenchError::Transport(_)
            | WorkbenchError::Remote(_)
            | WorkbenchError::InvalidResponse(_)
            | WorkbenchError::UnsupportedVersion(_)
            | WorkbenchError::Translation(_)
            | WorkbenchError::DriftConvergence { .. } => {
                tracing::error!("Workbench error: {}", err);
                ApiError::bad_gateway("Workbench request failed")
            }
            WorkbenchError::Directory(e) => {
                tracing::error!("Directory error: {}", e);
                ApiError::service_unavailable("Permission directory unavailable")
            }
            WorkbenchError::Store(db) => db.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}
