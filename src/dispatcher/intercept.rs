use axum::body::{to_bytes, Body};
use axum::http::{header, response::Parts, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;

/// A fully buffered downstream response.
///
/// Both exits take `self`, so a captured response is released exactly once:
/// either byte-for-byte as received or as one replacement payload.
pub struct Interception {
    parts: Parts,
    body: Bytes,
}

impl Interception {
    pub async fn capture(response: Response, limit: usize) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let body = to_bytes(body, limit).await?;
        Ok(Self { parts, body })
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    /// Body as JSON, when the response is a successful JSON reply
    pub fn json(&self) -> Option<Value> {
        if !self.parts.status.is_success() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    pub fn passthrough(self) -> Response {
        let mut parts = self.parts;
        let len = self.body.len();
        set_length(&mut parts, len);
        Response::from_parts(parts, Body::from(self.body))
    }

    pub fn rewritten(self, body: impl Into<Bytes>) -> Response {
        let body = body.into();
        let mut parts = self.parts;
        parts.headers.remove(header::CONTENT_ENCODING);
        parts.headers.remove(header::ETAG);
        set_length(&mut parts, body.len());
        Response::from_parts(parts, Body::from(body))
    }

    pub fn rewritten_json(self, value: &Value) -> Response {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                let mut response = self.rewritten(bytes);
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                tracing::error!("Failed to serialize rewritten payload: {}", e);
                self.passthrough()
            }
        }
    }
}

fn set_length(parts: &mut Parts, len: usize) {
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
