use axum::body::{to_bytes, Body};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::response::Response;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use super::target::ProxyTarget;
use crate::config::ProxyConfig;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Upstream {target} timed out")]
    Timeout { target: String },

    #[error("Upstream {target} unreachable: {message}")]
    Upstream { target: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Outbound HTTP leg of the proxy
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Read the whole inbound body, refusing anything over the configured limit
    pub async fn buffer(&self, body: Body) -> Result<Bytes, ForwardError> {
        buffer_body(body, self.max_body_bytes).await
    }

    /// Send an already-buffered request to `target` and stream the answer back
    pub async fn forward(
        &self,
        target: &ProxyTarget,
        parts: &Parts,
        path_and_query: &str,
        body: Bytes,
    ) -> Result<Response, ForwardError> {
        let url = target.upstream_url(path_and_query);
        debug!("Forwarding {} {} -> {}", parts.method, parts.uri, url);

        let response = self
            .client
            .request(parts.method.clone(), &url)
            .headers(outbound_headers(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ForwardError::Timeout {
                        target: target.name.clone(),
                    }
                } else {
                    warn!("Upstream {} failed: {}", target.name, e);
                    ForwardError::Upstream {
                        target: target.name.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        Ok(stream_response(response))
    }
}

pub async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, ForwardError> {
    to_bytes(body, limit).await.map_err(|e| {
        let message = e.to_string();
        if message.contains("length limit") {
            ForwardError::BodyTooLarge(limit)
        } else {
            ForwardError::Body(message)
        }
    })
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Headers named in `Connection` are hop-by-hop too
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || listed.iter().any(|l| l == name.as_str())
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::ACCEPT_ENCODING
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(host) = inbound.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
    if !headers.contains_key("x-forwarded-proto") {
        headers.insert(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static("http"),
        );
    }
    headers
}

fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let listed = connection_listed(upstream.headers());

    let mut headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
