//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Optionally host the built client next to the game socket
    let router = match &state.config.static_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Serving static client files");
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origins))
        .layer(TimeoutLayer::new(Duration::from_secs(HTTP_TIMEOUT_SECS)))
        .layer(CompressionLayer::new());

    router.layer(middleware).with_state(state)
}

/// CORS for the configured client origins (comma-separated in CLIENT_ORIGIN)
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let allowed: Vec<header::HeaderValue> = origins
            .iter()
            .filter_map(|s| s.parse::<header::HeaderValue>().ok())
            .collect();
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connections: state.connections.len(),
        players: state.match_handle.player_count(),
    })
}
