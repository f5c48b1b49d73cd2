use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),

    #[error("Invalid connection id: {0:?}")]
    InvalidConnectionId(String),

    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}
