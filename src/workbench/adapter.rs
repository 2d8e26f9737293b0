use serde::Serialize;
use std::collections::BTreeMap;

use super::error::TranslationError;
use crate::database::ConnectionKey;
use crate::platform::{DbService, DEFAULT_PURPOSE};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCredentials {
    pub user_name: String,
    pub user_password: String,
}

/// Connection shape accepted by the workbench's create/update mutations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub name: String,
    pub description: String,
    pub driver_id: String,
    pub host: String,
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    pub auth_model_id: String,
    pub credentials: ConnectionCredentials,
    pub save_credentials: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn with_connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }
}

/// Engine families the workbench has drivers for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    MySql,
    TiDb,
    OceanBase,
    PostgreSql,
    Oracle,
    SqlServer,
    Db2,
}

impl Engine {
    fn parse(db_type: &str) -> Option<Self> {
        match db_type.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Engine::MySql),
            "tidb" => Some(Engine::TiDb),
            "oceanbase" => Some(Engine::OceanBase),
            "postgresql" | "postgres" => Some(Engine::PostgreSql),
            "oracle" => Some(Engine::Oracle),
            "sqlserver" | "mssql" | "sql server" => Some(Engine::SqlServer),
            "db2" => Some(Engine::Db2),
            _ => None,
        }
    }

    fn driver_id(self) -> &'static str {
        match self {
            Engine::MySql | Engine::TiDb => "mysql:mysql8",
            Engine::OceanBase => "oceanbase:oceanbase_mysql",
            Engine::PostgreSql => "postgresql:postgres-jdbc",
            Engine::Oracle => "oracle:oracle_thin",
            Engine::SqlServer => "sqlserver:microsoft",
            Engine::Db2 => "db2:db2",
        }
    }
}

const PARAM_DATABASE: &str = "database_name";
const PARAM_SERVICE: &str = "service_name";
const PARAM_SID: &str = "sid";

/// Build the workbench connection for one (service, purpose) grant of `user_id`.
///
/// Parameters the adapter consumes (`database_name`, `service_name`, `sid`)
/// are not repeated as driver properties; every other additional parameter is.
pub fn translate(service: &DbService, purpose: &str, user_id: &str) -> Result<ConnectionConfig, TranslationError> {
    let engine = Engine::parse(&service.db_type)
        .ok_or_else(|| TranslationError::UnsupportedEngine(service.db_type.clone()))?;

    let params = &service.additional_params;
    let param = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

    let mut provider_properties = BTreeMap::new();
    let database_name = match engine {
        Engine::Oracle => {
            if let Some(service_name) = param(PARAM_SERVICE) {
                provider_properties.insert("@dbeaver-sid-service@".to_string(), "SERVICE".to_string());
                Some(service_name)
            } else if let Some(sid) = param(PARAM_SID) {
                provider_properties.insert("@dbeaver-sid-service@".to_string(), "SID".to_string());
                Some(sid)
            } else {
                return Err(TranslationError::MissingParameter {
                    engine: service.db_type.clone(),
                    param: PARAM_SERVICE,
                });
            }
        }
        Engine::Db2 => Some(param(PARAM_DATABASE).ok_or_else(|| TranslationError::MissingParameter {
            engine: service.db_type.clone(),
            param: PARAM_DATABASE,
        })?),
        Engine::PostgreSql => Some(param(PARAM_DATABASE).unwrap_or_else(|| "postgres".to_string())),
        Engine::MySql | Engine::TiDb | Engine::OceanBase | Engine::SqlServer => param(PARAM_DATABASE),
    };

    let properties = params
        .iter()
        .filter(|(k, _)| ![PARAM_DATABASE, PARAM_SERVICE, PARAM_SID].contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let name = if purpose == DEFAULT_PURPOSE {
        service.name.clone()
    } else {
        format!("{} ({})", service.name, purpose)
    };

    Ok(ConnectionConfig {
        connection_id: None,
        name,
        description: format!("gateway:{}", ConnectionKey::new(&service.id, purpose, user_id)),
        driver_id: engine.driver_id().to_string(),
        host: service.host.clone(),
        port: service.port.to_string(),
        database_name,
        server_name: None,
        auth_model_id: "native".to_string(),
        credentials: ConnectionCredentials {
            user_name: service.admin_user.clone(),
            user_password: service.admin_password.clone(),
        },
        save_credentials: true,
        provider_properties,
        properties,
    })
}
