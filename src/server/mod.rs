//! JSON HTTP API over resolver sessions.

mod handlers;
mod state;

pub use handlers::ApiError;
pub use state::{AppState, DEFAULT_SESSION_IDLE_SECS};

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::location::{GeographySource, HttpGeographyClient};

pub fn build_router<S: GeographySource + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/sessions", post(handlers::create_session::<S>))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session::<S>).delete(handlers::close_session::<S>),
        )
        .route("/api/sessions/{id}/select", post(handlers::select::<S>))
        .route("/api/sessions/{id}/back", post(handlers::back::<S>))
        .route("/api/sessions/{id}/search", post(handlers::search::<S>))
        .route("/api/sessions/{id}/retry", post(handlers::retry::<S>))
        .route("/api/cache", get(handlers::cache_stats::<S>))
        .route("/api/fallback", get(handlers::fallback))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// How often the server sweeps idle sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn start(config: &Config) -> std::io::Result<()> {
    let state = Arc::new(
        AppState::new(HttpGeographyClient::from_config(config)).with_idle_timeout(config.session_idle_secs),
    );
    spawn_sweeper(Arc::clone(&state));
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, api = %config.api_base_url, "geocascade server listening");
    eprintln!("  geocascade server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}

fn spawn_sweeper<S: GeographySource + 'static>(state: Arc<AppState<S>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.evict_idle();
        }
    });
}
