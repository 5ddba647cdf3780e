//! # Server Configuration
//!
//! Wires collaborators, caches and the orchestrator into the axum router.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::cache::{DeviceDataCache, TopologyCache};
use crate::config::{AppConfig, ConfigError, VendorMode};
use crate::connectors::{DeviceCloud, HttpDeviceCloud, InMemoryDeviceCloud, OdooClient};
use crate::handlers;
use crate::orchestrator::{DeviceOrchestrator, ErpMappingService};
use crate::telemetry::{REQUEST_ID_HEADER, TraceContext, with_trace_context};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<DeviceOrchestrator>,
    /// `None` when no ERP is configured
    pub erp: Option<Arc<ErpMappingService>>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the orchestrator and its caches for the configured vendor mode.
pub fn build_orchestrator(config: &AppConfig) -> Result<Arc<DeviceOrchestrator>, StartupError> {
    let cloud: Arc<dyn DeviceCloud> = match config.vendor.mode {
        VendorMode::Http => Arc::new(HttpDeviceCloud::new(config.http_device_cloud()?)?),
        VendorMode::InMemory => {
            warn!("Using the in-memory vendor; device changes are not persisted");
            Arc::new(InMemoryDeviceCloud::local_fixture())
        }
    };

    Ok(Arc::new(DeviceOrchestrator::new(
        cloud,
        Arc::new(TopologyCache::new(config.cache.topology_ttl())),
        Arc::new(DeviceDataCache::new(config.cache.device_ttl())),
        config.retry.policy(),
    )))
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let orchestrator = build_orchestrator(&config)?;
        let erp = match config.erp.odoo()? {
            Some(odoo) => {
                info!(url = %odoo.url, category_id = odoo.category_id, "ERP integration enabled");
                Some(Arc::new(ErpMappingService::new(
                    Arc::new(OdooClient::new(odoo)?),
                    Arc::clone(&orchestrator),
                    config.erp.location_defaults(),
                )))
            }
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            erp,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/devices",
            get(handlers::devices::list_devices).post(handlers::devices::create_device),
        )
        .route(
            "/devices/{guid}",
            put(handlers::devices::update_device).delete(handlers::devices::delete_device),
        )
        .route("/cache/status", get(handlers::cache::cache_status))
        .route("/cache/clear", post(handlers::cache::cache_clear))
        .route(
            "/erp/inspection-points",
            get(handlers::erp::list_inspection_points),
        )
        .route("/erp/mapping", get(handlers::erp::mapping_report))
        .route("/erp/unmapped", get(handlers::erp::unmapped_inspection_points))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Scope each request in a trace context and echo its id on the response.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::from_request_id(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );
    let trace_id = context.trace_id.clone();
    request.extensions_mut().insert(context.clone());

    let mut response = with_trace_context(context, next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), StartupError> {
    let addr = config
        .bind_addr()
        .map_err(|source| ConfigError::InvalidBindAddr {
            value: config.api_bind_addr.clone(),
            source,
        })?;
    let profile = config.profile.clone();
    let app = create_app(AppState::from_config(config)?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Device bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Device bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

struct BearerAuthAddon;

impl Modify for BearerAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::devices::list_devices,
        crate::handlers::devices::create_device,
        crate::handlers::devices::update_device,
        crate::handlers::devices::delete_device,
        crate::handlers::cache::cache_status,
        crate::handlers::cache::cache_clear,
        crate::handlers::erp::list_inspection_points,
        crate::handlers::erp::mapping_report,
        crate::handlers::erp::unmapped_inspection_points,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::CanonicalDevice,
            crate::models::CreateDeviceRequest,
            crate::models::DevicePatch,
            crate::models::DeviceStatus,
            crate::models::DeviceType,
            crate::models::LocationFields,
            crate::models::InspectionPoint,
            crate::models::InspectionPointView,
            crate::models::MappingReport,
            crate::models::UnmappedPoint,
            crate::handlers::HealthResponse,
            crate::orchestrator::DeviceListing,
            crate::orchestrator::ClusterInfo,
            crate::orchestrator::CreatedDevice,
            crate::orchestrator::UpdatedDevice,
            crate::orchestrator::DeletedDevice,
            crate::orchestrator::CacheStatus,
            crate::orchestrator::CacheCleared,
            crate::error::ApiError,
        )
    ),
    modifiers(&BearerAuthAddon),
    tags(
        (name = "root", description = "Service information"),
        (name = "devices", description = "Device CRUD across vendor clusters"),
        (name = "cache", description = "Topology and device cache administration"),
        (name = "erp", description = "ERP inspection point mapping")
    ),
    info(
        title = "Device Bridge API",
        description = "Keeps ERP inspection points and IoT vendor device clusters in sync",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
