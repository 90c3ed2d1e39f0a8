use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::location::cache::CacheEntryInfo;
use crate::location::{fallback_records, FallbackInfo, GeographySource, LocationError, ResolverSession, SessionOptions, SessionView};

use super::state::{AppState, SharedSession};

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<LocationError> for ApiError {
    fn from(err: LocationError) -> Self {
        let status = match err {
            LocationError::UnknownChoice { .. } | LocationError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            LocationError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            LocationError::Request(_) | LocationError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        };
        api_error(status, err.to_string())
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

fn session<S: GeographySource + 'static>(state: &AppState<S>, id: u64) -> Result<SharedSession<S>, ApiError> {
    state
        .get(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown session {}", id)))
}

fn log_request(what: &str, id: u64, view: &SessionView, start: Instant) {
    info!(
        session = id,
        step = %view.step,
        candidates = view.candidates.len(),
        error = view.last_error.as_deref().unwrap_or(""),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "{}",
        what
    );
}

// ─── POST /api/sessions ──────────────────────────────────────────

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: u64,
    pub view: SessionView,
}

pub async fn create_session<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(options): Json<SessionOptions>,
) -> (StatusCode, Json<CreatedResponse>) {
    let start = Instant::now();
    let session = ResolverSession::open(Arc::clone(&state.source), Arc::clone(&state.coordinator), options).await;
    let view = session.view();
    let id = state.insert(session);
    log_request("POST /api/sessions", id, &view, start);
    (StatusCode::CREATED, Json(CreatedResponse { id, view }))
}

// ─── GET /api/sessions/{id} ──────────────────────────────────────

pub async fn get_session<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>, ApiError> {
    let shared = session(&state, id)?;
    let view = shared.lock().await.view();
    Ok(Json(view))
}

// ─── POST /api/sessions/{id}/select ──────────────────────────────

#[derive(Deserialize)]
pub struct SelectBody {
    pub name: String,
}

pub async fn select<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Json(body): Json<SelectBody>,
) -> Result<Json<SessionView>, ApiError> {
    let start = Instant::now();
    let shared = session(&state, id)?;
    let mut s = shared.lock().await;
    let done = s.select(&body.name).await?.is_some();
    let view = s.view();
    drop(s);
    if done {
        state.remove(id);
    }
    log_request("POST /api/sessions/{id}/select", id, &view, start);
    Ok(Json(view))
}

// ─── POST /api/sessions/{id}/back ────────────────────────────────

pub async fn back<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>, ApiError> {
    let shared = session(&state, id)?;
    let mut s = shared.lock().await;
    s.back().await;
    Ok(Json(s.view()))
}

// ─── POST /api/sessions/{id}/search ──────────────────────────────

#[derive(Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
}

pub async fn search<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SessionView>, ApiError> {
    let shared = session(&state, id)?;
    let mut s = shared.lock().await;
    s.set_search(body.query);
    Ok(Json(s.view()))
}

// ─── POST /api/sessions/{id}/retry ───────────────────────────────

pub async fn retry<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>, ApiError> {
    let start = Instant::now();
    let shared = session(&state, id)?;
    let mut s = shared.lock().await;
    s.retry().await;
    let view = s.view();
    log_request("POST /api/sessions/{id}/retry", id, &view, start);
    Ok(Json(view))
}

// ─── DELETE /api/sessions/{id} ───────────────────────────────────

pub async fn close_session<S: GeographySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let shared = state
        .remove(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown session {}", id)))?;
    shared.lock().await.close();
    Ok(StatusCode::NO_CONTENT)
}

// ─── GET /api/cache ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct CacheStats {
    pub entries: Vec<CacheEntryInfo>,
    pub in_flight: usize,
    pub sessions: usize,
}

pub async fn cache_stats<S: GeographySource + 'static>(State(state): State<Arc<AppState<S>>>) -> Json<CacheStats> {
    state.evict_idle();
    Json(CacheStats {
        entries: state.coordinator.cache().stats(),
        in_flight: state.coordinator.in_flight_count(),
        sessions: state.session_count(),
    })
}

// ─── GET /api/fallback ───────────────────────────────────────────

pub async fn fallback() -> Json<Vec<FallbackInfo>> {
    Json(fallback_records())
}
