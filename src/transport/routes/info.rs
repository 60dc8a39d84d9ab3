use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::{
    common::banner::BuildInfo,
    protocol::{ServerInfo, Stats},
    server::AppState,
};

/// GET /v1/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    tracing::debug!("GET /v1/info");
    Json(ServerInfo {
        name: env!("CARGO_PKG_NAME"),
        build: BuildInfo::default(),
        uptime: state.uptime_ms(),
    })
}

/// GET /v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    tracing::debug!("GET /v1/stats");
    Json(state.stats())
}

/// GET /version
pub async fn get_version() -> String {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}
