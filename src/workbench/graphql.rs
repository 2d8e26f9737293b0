use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::document::{self, DocumentError, RootField};

/// Body of a request to the workbench query endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GqlRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub variables: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GqlRequest {
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
            ..Default::default()
        }
    }

    /// Operation name from `operationName`, else from the document header
    /// (`query serverConfig(...) {`)
    pub fn operation(&self) -> Option<String> {
        if let Some(name) = self.operation_name.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        let mut tokens = self
            .query
            .split(|c: char| c.is_whitespace() || c == '(' || c == '{')
            .filter(|t| !t.is_empty());
        match tokens.next()? {
            "query" | "mutation" | "subscription" => tokens.next().map(str::to_string),
            _ => None,
        }
    }

    /// Root fields of the executed operation. A request without a document
    /// calls the field named by `operationName`.
    pub fn root_fields(&self) -> Result<Vec<RootField>, DocumentError> {
        if self.query.trim().is_empty() {
            return Ok(self
                .operation()
                .map(|name| RootField {
                    name,
                    arguments: Map::new(),
                })
                .into_iter()
                .collect());
        }
        document::root_fields(&self.query, self.operation_name.as_deref(), &self.variables)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GqlError {
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

/// `{data, errors}` reply of the query endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GqlError>,
}

impl GqlResponse {
    /// A normally shaped reply carrying one error and no data
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        Self {
            data: None,
            errors: vec![GqlError {
                message: message.into(),
                extensions: Some(json!({ "code": code })),
                extra: Map::new(),
            }],
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "data": self.data.clone().unwrap_or(Value::Null),
            "errors": self.errors,
        })
    }
}
