use serde::Serialize;

/// Rejections produced by the room state machine and the session gateway.
///
/// None of these are ever broadcast; the gateway reports them to the
/// originating connection only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full (max {max} participants)")]
    RoomFull { max: u32 },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Room not found: {0}")]
    UnknownRoom(String),

    #[error("Room has been closed")]
    RoomClosed,

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl RoomError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound(reason.into())
    }

    /// Errors after which the client no longer belongs to the room.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownRoom(_) | Self::RoomClosed | Self::TransportFailure(_)
        )
    }
}

/// JSON error body returned by the REST surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Bad Request").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl ErrorResponse {
    fn new(status: u16, error: &str, message: String, path: String) -> Self {
        Self {
            timestamp: crate::common::clock::now_ms(),
            status,
            error: error.into(),
            message,
            path,
        }
    }

    pub fn bad_request(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(400, "Bad Request", message.into(), path.into())
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(404, "Not Found", message.into(), path.into())
    }

    pub fn internal(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(500, "Internal Server Error", message.into(), path.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_room_level_failures_are_fatal() {
        assert!(RoomError::RoomClosed.is_fatal());
        assert!(RoomError::UnknownRoom("ABC".into()).is_fatal());
        assert!(RoomError::TransportFailure("reset".into()).is_fatal());
        assert!(!RoomError::RoomFull { max: 2 }.is_fatal());
        assert!(!RoomError::denied("admin only").is_fatal());
        assert!(!RoomError::not_found("participant").is_fatal());
    }

    #[test]
    fn error_response_serializes_camelcase() {
        let body = ErrorResponse::not_found("Room not found: X", "/v1/rooms/X");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], 404);
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["path"], "/v1/rooms/X");
        assert!(json.get("timestamp").is_some());
    }
}
