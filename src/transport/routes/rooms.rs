use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    common::{errors::ErrorResponse, types::RoomId},
    protocol::RoomSummary,
    server::AppState,
};

/// GET /v1/rooms
///
/// Lists public rooms, oldest first.
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummary>> {
    tracing::debug!("GET /v1/rooms");
    Json(state.registry.summaries(true))
}

/// GET /v1/rooms/{room_id}
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, (StatusCode, Json<ErrorResponse>)> {
    tracing::debug!("GET /v1/rooms/{}", room_id);
    let path = format!("/v1/rooms/{}", room_id);
    let room_id = RoomId::from(room_id);

    let summary = state.registry.get(&room_id).and_then(|handle| {
        let room = handle.lock();
        (!room.is_closed()).then(|| room.summary())
    });

    summary.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(
                format!("Room not found: {}", room_id),
                path,
            )),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{clock::ManualClock, types::ConnectionId},
        configs::Config,
        sources::SourceManager,
    };
    use std::time::Duration;

    fn state() -> Arc<AppState> {
        let config = Config::default();
        let sources = Arc::new(SourceManager::with_sources(Vec::new(), Duration::from_secs(1)));
        Arc::new(AppState::new(config, sources, Arc::new(ManualClock::new(0))).unwrap())
    }

    #[tokio::test]
    async fn unknown_room_is_404() {
        let err = get_room(State(state()), Path("MISSING".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert_eq!(err.1.path, "/v1/rooms/MISSING");
    }

    #[tokio::test]
    async fn listed_room_has_summary() {
        let state = state();
        let id = RoomId::from("LIVE");
        let (handle, _) = state.registry.get_or_create(&id, Some("Live".into()), "ana", 0);
        handle
            .lock()
            .join(ConnectionId::from("c"), None, "ana", 0)
            .unwrap();

        let Json(rooms) = list_rooms(State(state.clone())).await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].participants, 1);
        assert!(!rooms[0].is_playing);

        let Json(summary) = get_room(State(state), Path("LIVE".to_string())).await.unwrap();
        assert_eq!(summary.name, "Live");
        assert_eq!(summary.creator, "ana");
    }
}
