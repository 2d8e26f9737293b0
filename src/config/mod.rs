use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub proxy: ProxyConfig,
    pub workbench: Option<WorkbenchConfig>,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; `None` runs the gateway on in-memory stores
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

/// A single `pattern => replacement` path rewrite, as written in config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteRuleConfig {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub rewrite_rules: Vec<RewriteRuleConfig>,
    pub rewrite_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// Base URL of the workbench server, e.g. http://cloudbeaver:8978
    pub base_url: String,
    /// Gateway path prefix under which the workbench is served
    pub path_prefix: String,
    pub admin_user: String,
    pub admin_password: String,
    pub project_id: String,
    pub request_timeout_secs: u64,
    pub hook_timeout_secs: u64,
    pub enable_masking: bool,
    pub verify_every_login: bool,
    pub session_cookie: String,
    /// Secret mixed into the derived per-user workbench password
    pub user_password_secret: String,
    pub audit_url: Option<String>,
    pub masking_url: Option<String>,
    /// YAML file with DB services and grants; read instead of the platform tables when set
    pub directory_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WorkbenchConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path_prefix: "/sql_query".to_string(),
            admin_user: "administrator".to_string(),
            admin_password: String::new(),
            project_id: "g_GlobalConfiguration".to_string(),
            request_timeout_secs: 30,
            hook_timeout_secs: 10,
            enable_masking: false,
            verify_every_login: false,
            session_cookie: "cb-session-id".to_string(),
            user_password_secret: String::new(),
            audit_url: None,
            masking_url: None,
            directory_file: None,
        }
    }

    /// Fixed path of the workbench query endpoint as seen by clients of the gateway
    pub fn gql_path(&self) -> String {
        format!("{}/api/gql", self.path_prefix.trim_end_matches('/'))
    }

    /// Query endpoint on the workbench server itself, used by the admin client
    pub fn remote_gql_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.gql_path())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }
}

impl Environment {
    fn detect() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Parsed value of `key`, or `current` when unset or unparsable
fn env_or<T: FromStr>(key: &str, current: T) -> T {
    match env::var(key).ok().and_then(|v| v.parse().ok()) {
        Some(value) => value,
        None => current,
    }
}

/// Non-empty value of `key`
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::preset(Environment::detect());
        config.apply_env();
        config
    }

    /// Development preset without env overrides; used by tests and embedders
    pub fn defaults() -> Self {
        Self::preset(Environment::Development)
    }

    /// Baseline for an environment. Production tightens body size, pool and token lifetime.
    fn preset(environment: Environment) -> Self {
        let (max_connections, connection_timeout, request_timeout_secs, body_mib, jwt_expiry_hours) =
            match environment {
                Environment::Development => (10, 30, 120, 10, 24 * 7),
                Environment::Staging => (20, 10, 60, 5, 24),
                Environment::Production => (50, 5, 60, 2, 4),
            };
        let cors_origins = match environment {
            Environment::Development => vec!["http://localhost:3000", "http://localhost:5173"],
            Environment::Staging => vec!["https://staging.example.com"],
            Environment::Production => vec!["https://app.example.com"],
        };
        // Only development ships a usable signing secret
        let jwt_secret = match environment {
            Environment::Development => "development-secret",
            _ => "",
        };

        Self {
            environment,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 7601,
            },
            database: DatabaseConfig {
                url: None,
                max_connections,
                connection_timeout,
            },
            proxy: ProxyConfig {
                request_timeout_secs,
                max_body_bytes: body_mib * 1024 * 1024,
                rewrite_rules: Vec::new(),
                rewrite_file: None,
            },
            workbench: None,
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: cors_origins.into_iter().map(String::from).collect(),
                jwt_secret: jwt_secret.to_string(),
                jwt_expiry_hours,
            },
        }
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        self.server.port = env_or("PORT", self.server.port);
        self.server.port = env_or("GATEWAY_PORT", self.server.port);

        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = Some(url).filter(|s| !s.is_empty());
        }
        self.database.max_connections = env_or("DATABASE_MAX_CONNECTIONS", self.database.max_connections);
        self.database.connection_timeout = env_or("DATABASE_CONNECTION_TIMEOUT", self.database.connection_timeout);

        self.proxy.request_timeout_secs = env_or("PROXY_REQUEST_TIMEOUT_SECS", self.proxy.request_timeout_secs);
        self.proxy.max_body_bytes = env_or("PROXY_MAX_BODY_BYTES", self.proxy.max_body_bytes);
        if let Ok(raw) = env::var("PROXY_REWRITE_RULES") {
            self.proxy.rewrite_rules = parse_rewrite_rules(&raw);
        }
        if let Ok(file) = env::var("PROXY_REWRITE_FILE") {
            self.proxy.rewrite_file = Some(file).filter(|s| !s.is_empty());
        }

        self.security.enable_cors = env_or("SECURITY_ENABLE_CORS", self.security.enable_cors);
        if let Ok(raw) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = raw.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(secret) = env::var("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        self.security.jwt_expiry_hours = env_or("SECURITY_JWT_EXPIRY_HOURS", self.security.jwt_expiry_hours);

        // Workbench integration is only enabled when a URL is given
        let jwt_secret = self.security.jwt_secret.clone();
        self.workbench = env_opt("WORKBENCH_URL").map(|url| {
            let mut wb = WorkbenchConfig::new(url);
            wb.path_prefix = env_or("WORKBENCH_PATH_PREFIX", wb.path_prefix);
            wb.admin_user = env_or("WORKBENCH_ADMIN_USER", wb.admin_user);
            wb.admin_password = env_or("WORKBENCH_ADMIN_PASSWORD", wb.admin_password);
            wb.project_id = env_or("WORKBENCH_PROJECT_ID", wb.project_id);
            wb.request_timeout_secs = env_or("WORKBENCH_REQUEST_TIMEOUT_SECS", wb.request_timeout_secs);
            wb.hook_timeout_secs = env_or("WORKBENCH_HOOK_TIMEOUT_SECS", wb.hook_timeout_secs);
            wb.enable_masking = env_or("WORKBENCH_ENABLE_MASKING", wb.enable_masking);
            wb.verify_every_login = env_or("WORKBENCH_VERIFY_EVERY_LOGIN", wb.verify_every_login);
            wb.session_cookie = env_or("WORKBENCH_SESSION_COOKIE", wb.session_cookie);
            wb.user_password_secret = env_opt("WORKBENCH_USER_PASSWORD_SECRET").unwrap_or(jwt_secret);
            wb.audit_url = env_opt("WORKBENCH_AUDIT_URL");
            wb.masking_url = env_opt("WORKBENCH_MASKING_URL");
            wb.directory_file = env_opt("WORKBENCH_DIRECTORY_FILE");
            wb
        });
    }

    /// Address the gateway itself listens on, as seen from the gateway
    pub fn self_url(&self) -> String {
        let host = match self.server.host.as_str() {
            "0.0.0.0" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.server.port)
    }
}

/// Parse `pattern=>replacement` pairs separated by `;`
fn parse_rewrite_rules(raw: &str) -> Vec<RewriteRuleConfig> {
    raw.split(';')
        .filter_map(|pair| {
            let (pattern, replacement) = pair.split_once("=>")?;
            let pattern = pattern.trim();
            if pattern.is_empty() {
                return None;
            }
            Some(RewriteRuleConfig {
                pattern: pattern.to_string(),
                replacement: replacement.trim().to_string(),
            })
        })
        .collect()
}

/// Process-wide config, read from the environment on first use
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
