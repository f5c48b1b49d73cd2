use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, Uri},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tableau_shared::types::{RoomCode, RoomType};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lifecycle::Coordinator;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/rooms/:room_id", get(room_info))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(api)
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin, unless a front end is configured. Then only its host and
/// hosts under one of the configured suffixes.
fn allowed_origins(config: &ServerConfig) -> AllowOrigin {
    let Some(frontend_host) = config.frontend_url.as_deref().and_then(origin_host) else {
        return AllowOrigin::from(Any);
    };
    let suffixes = config.cors_host_suffixes.clone();

    AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Some(host) = origin.to_str().ok().and_then(origin_host) else {
            return false;
        };
        host == frontend_host || suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
    })
}

fn origin_host(origin: &str) -> Option<String> {
    let uri = origin.trim_end_matches('/').parse::<Uri>().ok()?;
    uri.host().map(|h| h.to_ascii_lowercase())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomInfoResponse {
    room_id: RoomCode,
    room_type: RoomType,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    active: bool,
    participant_count: usize,
    active_room_count: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
    })
}

async fn room_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfoResponse>, ServerError> {
    let code = RoomCode::parse(&room_id).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let record = state
        .coordinator
        .store()
        .get(&code)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("Room {code}")))?;

    let registry = state.coordinator.registry();
    let participant_count = match registry.get(&code).await {
        Ok(room) => Some(room.member_count()),
        Err(_) => None,
    };

    Ok(Json(RoomInfoResponse {
        room_id: record.room_id,
        room_type: record.room_type,
        created_at: record.created_at,
        last_activity: record.last_activity,
        active: participant_count.is_some(),
        participant_count: participant_count.unwrap_or(0),
        active_room_count: registry.len().await,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP and WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
