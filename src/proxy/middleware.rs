use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;

/// Forward requests whose path is owned by a registered target.
///
/// Paths without an owner fall through to the local router.
pub async fn proxy_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    let Some(target) = state.registry.resolve(&path).await else {
        return Ok(next.run(request).await);
    };

    let rewritten = state.rewrites.apply(&path);
    if rewritten != path {
        debug!("Rewrote {} -> {}", path, rewritten);
    }

    let (parts, body) = request.into_parts();
    let path_and_query = join_query(&rewritten, parts.uri.query());
    let body = state.forwarder.buffer(body).await?;

    Ok(state.forwarder.forward(&target, &parts, &path_and_query, body).await?)
}

/// Re-attach the inbound query to a rewritten path, which may carry its own
fn join_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() && path.contains('?') => format!("{}&{}", path, q),
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}
