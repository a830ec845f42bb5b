//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/materials", get(http::http_list_materials))
        .route("/api/v1/materials", post(http::http_save_material))
        .route("/api/v1/materials/:id", delete(http::http_delete_material))
        .route("/api/v1/ingest", post(http::http_ingest))
        .route("/api/v1/quiz", post(http::http_generate_quiz))
        .route("/api/v1/blueprint", post(http::http_blueprint))
        .route("/api/v1/blueprint/chapters", post(http::http_chapter_details))
        .route("/api/v1/session/:id/answer", post(http::http_submit_answer))
        .route("/api/v1/session/:id/advance", post(http::http_advance))
        .route("/api/v1/session/:id/restart", post(http::http_restart))
        .route("/api/v1/session/:id/summary", get(http::http_summary))
        .route("/api/v1/billing/webhook", post(http::http_billing_webhook))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
