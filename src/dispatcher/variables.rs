// Typed variables of the operations whose integer arguments the workbench
// UI may send as floats (`200.0`). Deserializing through these structs is the
// single coercion step; fields they do not name pass through in `extra`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VariablesError {
    #[error("Invalid variables for {operation}: {message}")]
    Invalid { operation: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilterConstraint {
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub attribute_position: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub order_position: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<DataFilterConstraint>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryVariables {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DataFilter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadContainerVariables {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DataFilter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNodeChildrenVariables {
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Variables of `getSqlExecuteTaskResults`; read, never rewritten
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultsVariables {
    pub task_id: String,
}

/// Round-trip `variables` through the typed shape of `operation`.
/// Operations without a typed shape are returned unchanged.
pub fn coerce(operation: &str, variables: Value) -> Result<Value, VariablesError> {
    match operation {
        "asyncSqlExecuteQuery" => round_trip::<ExecuteQueryVariables>(operation, variables),
        "asyncReadDataFromContainer" => round_trip::<ReadContainerVariables>(operation, variables),
        "navNodeChildren" => round_trip::<NavNodeChildrenVariables>(operation, variables),
        _ => Ok(variables),
    }
}

fn round_trip<T>(operation: &str, variables: Value) -> Result<Value, VariablesError>
where
    T: for<'de> Deserialize<'de> + Serialize,
{
    if variables.is_null() {
        return Ok(variables);
    }
    let invalid = |e: serde_json::Error| VariablesError::Invalid {
        operation: operation.to_string(),
        message: e.to_string(),
    };
    let typed: T = serde_json::from_value(variables).map_err(invalid)?;
    serde_json::to_value(typed).map_err(invalid)
}

mod lenient {
    use super::*;
    use serde::de::Error;

    /// Integers, or floats with no fractional part
    pub fn opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Ok(Some(f as i64)),
                    _ => Err(D::Error::custom(format!("expected an integer, got {}", n))),
                }
            }
            other => Err(D::Error::custom(format!("expected an integer, got {}", other))),
        }
    }
}
