//! Events exchanged over the room WebSocket.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<kebab-case name>", "data": <payload>}`. Payload fields are
//! camelCase to match what the browser client emits. Canvas payloads are
//! opaque [`serde_json::Value`]s produced by the drawing toolkit; the server
//! never looks inside them beyond the operation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{ConnectionId, Permission, Recipient, RoomCode, RoomType};

/// Events sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    CreateRoom(CreateRoom),
    JoinRoom(JoinRoom),
    ApproveJoinRequest(JoinDecision),
    RejectJoinRequest(JoinDecision),
    Drawing(DrawingOp),
    ClearCanvas(RoomRef),
    GetCanvasState(RoomRef),
    CanvasState(CanvasPush),
    SendMessage(SendMessage),
    LeaveRoom(RoomRef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoom {
    /// Omitted ⇒ the server picks an unused code.
    #[serde(default)]
    pub room_id: Option<RoomCode>,
    pub user_name: String,
    #[serde(default)]
    pub room_type: RoomType,
    /// Client's claim only. The room's creator field is authoritative.
    #[serde(default)]
    pub is_creator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: RoomCode,
    pub user_name: String,
    #[serde(default)]
    pub is_creator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDecision {
    pub room_id: RoomCode,
    pub request_socket_id: ConnectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingOp {
    pub room_id: RoomCode,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: RoomCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPush {
    pub room_id: RoomCode,
    pub state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub room_id: RoomCode,
    pub content: String,
    pub recipient: Recipient,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    RoomJoined(RoomJoined),
    UserJoined(UserJoined),
    UserLeft(UserLeft),
    RoomNotFound,
    JoinRequest(PendingJoin),
    WaitingForApproval,
    JoinRequestRejected,
    /// Incremental operation, relayed verbatim.
    Drawing(Value),
    ClearCanvas,
    /// Full snapshot.
    CanvasState(Value),
    NewMessage(ChatMessage),
    NewCreator(NewCreator),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    pub room: RoomSnapshot,
    pub users: Vec<UserView>,
    pub permission: Permission,
}

/// What a newly admitted member learns about the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomCode,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub creator_id: ConnectionId,
    pub canvas_data: Option<Value>,
    pub chat_messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: ConnectionId,
    pub name: String,
    pub is_creator: bool,
    pub permission: Permission,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJoined {
    pub users: Vec<UserView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub user_id: ConnectionId,
    pub users: Vec<UserView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJoin {
    pub request_socket_id: ConnectionId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCreator {
    pub new_creator_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: ConnectionId,
    pub sender_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The room this event targets, if it names one.
    pub fn room_id(&self) -> Option<&RoomCode> {
        match self {
            Self::CreateRoom(e) => e.room_id.as_ref(),
            Self::JoinRoom(e) => Some(&e.room_id),
            Self::ApproveJoinRequest(e) | Self::RejectJoinRequest(e) => Some(&e.room_id),
            Self::Drawing(e) => Some(&e.room_id),
            Self::ClearCanvas(e) | Self::GetCanvasState(e) | Self::LeaveRoom(e) => Some(&e.room_id),
            Self::CanvasState(e) => Some(&e.room_id),
            Self::SendMessage(e) => Some(&e.room_id),
        }
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create-room",
            Self::JoinRoom(_) => "join-room",
            Self::ApproveJoinRequest(_) => "approve-join-request",
            Self::RejectJoinRequest(_) => "reject-join-request",
            Self::Drawing(_) => "drawing",
            Self::ClearCanvas(_) => "clear-canvas",
            Self::GetCanvasState(_) => "get-canvas-state",
            Self::CanvasState(_) => "canvas-state",
            Self::SendMessage(_) => "send-message",
            Self::LeaveRoom(_) => "leave-room",
        }
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
