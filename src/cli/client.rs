use anyhow::{anyhow, Context};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

/// Thin HTTP client for the gateway's local API
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<(u16, Value)> {
        send(self.request(Method::GET, path)).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> anyhow::Result<(u16, Value)> {
        send(self.request(Method::POST, path).json(body)).await
    }
}

async fn send(builder: RequestBuilder) -> anyhow::Result<(u16, Value)> {
    let response = builder.send().await.context("gateway unreachable")?;
    let status = response.status().as_u16();
    let body = response
        .json::<Value>()
        .await
        .map_err(|e| anyhow!("gateway answered {} with a non-JSON body: {}", status, e))?;
    Ok((status, body))
}

/// Unwrap the `{"success": true, "data": ...}` envelope or surface the error message
pub fn into_data(status: u16, body: Value) -> anyhow::Result<Value> {
    if (200..300).contains(&status) {
        return Ok(body.get("data").cloned().unwrap_or(body));
    }
    let message = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("request failed");
    Err(anyhow!("{} ({})", message, status))
}
