//! HTTP API for the PDF stamp service.
//!
//! This module provides the REST API endpoints for:
//! - Liveness and health
//! - Multipart uploads edited with a fixed template
//! - JSON requests carrying an explicit annotation list

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{ApiKeyGuard, require_api_key};
use crate::config::ServiceConfig;
use crate::editor::{AssetResolver, EditSession, LopdfCodec};
use crate::error::{ServiceError, ServiceResult};

pub mod edit;
use edit::{annotate_pdf_handler, edit_pdf_handler, stamp_pdf_handler};

/// Application state
pub struct AppState {
    pub session: EditSession<LopdfCodec>,
    pub guard: Arc<ApiKeyGuard>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> ServiceResult<Self> {
        Ok(Self {
            session: EditSession::new(LopdfCodec, AssetResolver::new(&config.fetch)?),
            guard: Arc::new(ApiKeyGuard::new(&config.auth.api_key)),
            start_time: Instant::now(),
        })
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>, config: &ServiceConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // These authenticate by header only; the JSON route also accepts the
    // key in its body and checks it in the handler.
    let protected_routes = Router::new()
        .route("/", get(root_handler))
        .route("/edit-pdf", post(edit_pdf_handler))
        .route("/stamp-pdf", post(stamp_pdf_handler))
        .route_layer(middleware::from_fn_with_state(
            state.guard.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/annotate-pdf", post(annotate_pdf_handler))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.server.request_timeout(),
        ))
        .layer(middleware::map_response_with_state(
            config.server.request_timeout_secs,
            timeout_error_body,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Give timed-out requests the same JSON error body as every other failure.
async fn timeout_error_body(State(seconds): State<u64>, response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return ServiceError::RequestTimeout { seconds }.into_response();
    }
    response
}

// === Health ===

async fn root_handler() -> &'static str {
    "PDF stamp service is running"
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}
