// app.rs - Service wiring and the HTTP router
//
// Every shared service is built once here and handed to handlers and
// middleware through `AppState`.

use anyhow::Context;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::{AppConfig, WorkbenchConfig};
use crate::database::memory::{MemoryConnectionStore, MemoryTargetStore};
use crate::database::postgres::{PgConnectionStore, PgDirectory, PgTargetStore};
use crate::database::{ConnectionStore, DatabaseManager, TargetStore};
use crate::dispatcher::{dispatcher_middleware, Dispatcher};
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::jwt_auth_middleware;
use crate::platform::{PlatformDirectory, StaticDirectory};
use crate::proxy::{proxy_middleware, Forwarder, RewriteRules, TargetRegistry};
use crate::workbench::{RemoteAdminClient, WorkbenchAdmin, WorkbenchService};

/// Prefixes served by the gateway itself; targets may not claim them
pub const RESERVED_PREFIXES: [&str; 3] = ["/api/gateway", "/api/workbench", "/health"];

/// Name the workbench registers under when the integration is enabled
pub const WORKBENCH_TARGET_NAME: &str = "workbench";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<TargetRegistry>,
    pub rewrites: Arc<RewriteRules>,
    pub forwarder: Forwarder,
    pub database: Option<DatabaseManager>,
    pub workbench: Option<Arc<WorkbenchService>>,
    pub dispatcher: Option<Arc<Dispatcher>>,
}

impl AppState {
    /// Build every service from configuration.
    ///
    /// Without a database URL the registry and connection cache live in
    /// memory. Without a workbench URL the dispatcher and the workbench
    /// endpoints stay disabled.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let database = match &config.database.url {
            Some(_) => {
                let db = DatabaseManager::connect(&config.database)
                    .await
                    .context("connecting to the gateway database")?;
                db.ensure_schema().await.context("preparing the gateway schema")?;
                Some(db)
            }
            None => {
                warn!("DATABASE_URL not set, targets and connections are kept in memory");
                None
            }
        };

        let (target_store, connection_store): (Arc<dyn TargetStore>, Arc<dyn ConnectionStore>) = match &database {
            Some(db) => (Arc::new(PgTargetStore::new(db)), Arc::new(PgConnectionStore::new(db))),
            None => (Arc::new(MemoryTargetStore::new()), Arc::new(MemoryConnectionStore::new())),
        };

        let reserved = RESERVED_PREFIXES.iter().map(|p| p.to_string()).collect();
        let registry = Arc::new(TargetRegistry::load(target_store, config.self_url(), reserved).await?);
        let rewrites = Arc::new(RewriteRules::from_config(&config.proxy)?);
        let forwarder = Forwarder::new(&config.proxy)?;

        let workbench = match &config.workbench {
            Some(wb) => {
                let directory = directory_for(wb, database.as_ref())?;
                let admin: Arc<dyn WorkbenchAdmin> = Arc::new(RemoteAdminClient::new(wb)?);
                register_workbench(&registry, wb, admin.as_ref()).await?;
                Some(Arc::new(WorkbenchService::new(wb.clone(), admin, directory, connection_store)))
            }
            None => {
                info!("WORKBENCH_URL not set, workbench integration disabled");
                None
            }
        };

        let dispatcher = match &workbench {
            Some(service) => Some(Arc::new(Dispatcher::from_config(
                service.clone(),
                config.proxy.max_body_bytes,
            )?)),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            registry,
            rewrites,
            forwarder,
            database,
            workbench,
            dispatcher,
        })
    }
}

fn directory_for(
    wb: &WorkbenchConfig,
    database: Option<&DatabaseManager>,
) -> anyhow::Result<Arc<dyn PlatformDirectory>> {
    if let Some(path) = &wb.directory_file {
        let directory = StaticDirectory::load(path).with_context(|| format!("loading directory file {}", path))?;
        return Ok(Arc::new(directory));
    }
    match database {
        Some(db) => Ok(Arc::new(PgDirectory::new(db))),
        None => {
            warn!("No platform directory configured, users see no DB services");
            Ok(Arc::new(StaticDirectory::new()))
        }
    }
}

/// Register the workbench as a target owning its path prefix
async fn register_workbench(
    registry: &TargetRegistry,
    wb: &WorkbenchConfig,
    admin: &dyn WorkbenchAdmin,
) -> anyhow::Result<()> {
    let version = match admin.server_version().await {
        Ok(version) => version.to_string(),
        Err(e) => {
            warn!("Workbench version detection failed: {}", e);
            "unknown".to_string()
        }
    };

    let target = registry
        .register(WORKBENCH_TARGET_NAME, &wb.base_url, &version, vec![wb.path_prefix.clone()])
        .await?;
    info!("Workbench {} registered at {} ({})", target.version, target.url, wb.path_prefix);
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route(
            "/api/workbench/session",
            post(handlers::workbench_login).delete(handlers::workbench_logout),
        )
        .route(
            "/api/gateway/targets",
            get(handlers::list_targets).post(handlers::register_target),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(authenticated)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), proxy_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), dispatcher_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() || config.security.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("No route or target owns this path")
}
