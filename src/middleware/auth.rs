use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::app::AppState;
use crate::auth::{credential_version, Claims, ADMIN_ROLE};
use crate::error::ApiError;

/// Caller identity taken from a verified gateway token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub name: String,
    pub role: String,
    /// Digest of the presented token, see [`credential_version`]
    pub credential_version: String,
}

impl AuthUser {
    fn from_claims(claims: Claims, token: &str) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            role: claims.role,
            credential_version: credential_version(token),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Administrator role required"))
        }
    }
}

/// Rejects requests without a valid bearer token and attaches [`AuthUser`] for handlers
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers).map_err(ApiError::unauthorized)?;
    let claims = decode_claims(token, &state.config.security.jwt_secret).map_err(ApiError::unauthorized)?;

    let user = AuthUser::from_claims(claims, token);
    tracing::debug!(user = %user.user_id, role = %user.role, "authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let value = headers.get(AUTHORIZATION).ok_or("Missing Authorization header")?;
    let value = value.to_str().map_err(|_| "Authorization header is not valid text")?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use the Bearer scheme")?
        .trim();
    if token.is_empty() {
        return Err("Empty bearer token");
    }
    Ok(token)
}

fn decode_claims(token: &str, secret: &str) -> Result<Claims, String> {
    if secret.is_empty() {
        return Err("Token signing is not configured".to_string());
    }
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| format!("Invalid token: {}", e))
}
