use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tableau_shared::error::ProtocolError;
use tableau_shared::types::{ConnectionId, RoomCode};
use thiserror::Error;

/// Why a room operation did nothing.
///
/// None of these are fatal. The lifecycle handler logs them and carries on;
/// only [`RoomError::NotFound`] on a join ever reaches the client, as a
/// `room-not-found` event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found: {0}")]
    NotFound(RoomCode),

    #[error("{actor} is not allowed to {action}")]
    Unauthorized {
        actor: ConnectionId,
        action: &'static str,
    },

    #[error("Connection {0} is no longer present")]
    StaleReference(ConnectionId),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Deletion was asked of a room that still has members.
    #[error("Room {0} still has members")]
    Occupied(RoomCode),
}

impl From<ProtocolError> for RoomError {
    fn from(e: ProtocolError) -> Self {
        RoomError::Malformed(e.to_string())
    }
}

/// Errors surfaced by the HTTP API and the metadata store.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Room store error: {0}")]
    Store(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Room store error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
