//! HTTP API gateway for Ridgeline.
//!
//! Exposes REST endpoints for directive intake, queue processing, draft
//! review, and execution. Built on Axum.

pub mod api;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use ridgeline_assistant::ComposeLoop;
use ridgeline_core::backend::ReasoningBackend;
use ridgeline_core::crm::{CrmStore, WeekdayScheduler};
use ridgeline_core::draft::DraftStore;
use ridgeline_core::OrgContext;
use ridgeline_dispatch::{ActionExecutor, BatchDispatcher};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub org: OrgContext,
    pub drafts: Arc<dyn DraftStore>,
    pub dispatcher: Arc<BatchDispatcher>,
    pub executor: Arc<ActionExecutor>,
    pub backend: Arc<dyn ReasoningBackend>,
    pub bearer_token: Option<String>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: health plus the v1 API.
///
/// Security layers applied:
/// - Optional bearer token authentication on all /v1 routes
/// - CORS restricted to the local frontend origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let v1 = api::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire the engine components and start the HTTP server.
pub async fn start(
    config: ridgeline_config::AppConfig,
    drafts: Arc<dyn DraftStore>,
    crm: Arc<dyn CrmStore>,
    backend: Arc<dyn ReasoningBackend>,
) -> ridgeline_core::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let compose = Arc::new(
        ComposeLoop::new(
            backend.clone(),
            &config.backend.model,
            config.backend.temperature,
        )
        .with_max_tokens(config.backend.max_tokens),
    );
    let dispatcher = Arc::new(
        BatchDispatcher::new(drafts.clone(), crm.clone(), compose)
            .with_max_batch(config.dispatch.max_batch)
            .with_chunk_width(config.dispatch.chunk_width),
    );
    let executor = Arc::new(ActionExecutor::new(
        drafts.clone(),
        crm,
        Arc::new(WeekdayScheduler),
    ));

    let state = Arc::new(GatewayState {
        org: OrgContext::new(
            &config.org.org_id,
            &config.org.user_id,
            &config.org.user_name,
            &config.org.company_name,
        ),
        drafts,
        dispatcher,
        executor,
        backend,
        bearer_token: config.gateway.bearer_token.clone(),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| ridgeline_core::Error::Internal(format!("failed to bind {addr}: {err}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|err| ridgeline_core::Error::Internal(format!("server error: {err}")))?;

    Ok(())
}

/// Authentication middleware for the /v1 API. When a bearer token is
/// configured, every v1 request must carry it.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let Some(expected) = state.bearer_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => {
            warn!("Unauthorized request to /v1 API");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let backend = match state.backend.health_check().await {
        Ok(true) => "ok",
        Ok(false) | Err(_) => "unreachable",
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend,
    })
}
