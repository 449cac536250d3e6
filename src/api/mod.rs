//! Read-only HTTP status API
//!
//! Thin JSON handlers over the monitor's last-state snapshot plus a few
//! Steam Web API passthroughs. Handlers never mutate monitor state; the
//! snapshot is swapped whole by the monitor task.

pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::monitor::SharedMonitorState;
use crate::steam::SteamWebClient;

/// State shared across API handlers.
pub struct ApiState {
    pub app_id: u32,
    pub monitor: SharedMonitorState,
    pub web: Arc<SteamWebClient>,
    pub started_at: Instant,
}

pub type SharedApiState = Arc<ApiState>;

/// Build the API router. Every route is also reachable under a `/steam`
/// prefix for reverse-proxy setups that mount this service on a subpath.
pub fn create_router(state: SharedApiState) -> Router {
    let api = Router::new()
        .route("/", get(routes::status))
        .route("/status", get(routes::status))
        .route("/health", get(routes::health))
        .route("/diff", get(routes::diff))
        .route("/diff/details", get(routes::diff_details))
        .route("/depots", get(routes::depots))
        .route("/players", get(routes::players))
        .route("/servers", get(routes::servers))
        .route("/news", get(routes::news));

    Router::new()
        .merge(api.clone())
        .nest("/steam", api)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
