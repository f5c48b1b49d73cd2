use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tableau_shared::protocol::{ChatMessage, RoomSnapshot, ServerEvent, UserView};
use tableau_shared::types::{ConnectionId, Permission, RoomCode, RoomType};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// One encoded outbound frame. Encoded once, shared by every recipient.
pub type Frame = Arc<str>;

/// Sending half of one connection's outbound queue.
///
/// Delivery is fire-and-forget: a full or closed queue drops the frame.
/// Frames pushed through one handle arrive in push order.
#[derive(Debug, Clone)]
pub struct Outbound {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self { id, tx }
    }

    /// Handle plus the receiving end, for a connection with `buffer` slots.
    pub fn channel(id: ConnectionId, buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// False once the connection's writer has gone away.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn send(&self, event: &ServerEvent) -> bool {
        match encode(event) {
            Some(frame) => self.push(frame),
            None => false,
        }
    }

    pub(crate) fn push(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %self.id.short(), "Outbound queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %self.id.short(), "Connection gone, dropping event");
                false
            }
        }
    }
}

pub(crate) fn encode(event: &ServerEvent) -> Option<Frame> {
    match event.to_json() {
        Ok(text) => Some(Frame::from(text)),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound event");
            None
        }
    }
}

/// A member of a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub permission: Permission,
    pub joined_at: DateTime<Utc>,
    outbound: Outbound,
}

impl Participant {
    pub fn new(outbound: Outbound, name: String, permission: Permission) -> Self {
        Self {
            name,
            permission,
            joined_at: Utc::now(),
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.outbound.id()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}

/// A pending admission to a private room.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub name: String,
    pub requested_at: DateTime<Utc>,
    outbound: Outbound,
}

impl JoinRequest {
    pub fn new(outbound: Outbound, name: String, requested_at: DateTime<Utc>) -> Self {
        Self {
            name,
            requested_at,
            outbound,
        }
    }

    pub fn requester(&self) -> ConnectionId {
        self.outbound.id()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}

/// Live state of one room.
///
/// Members are kept in join order; the front member inherits the creator
/// role when the creator leaves. Whether a member is the creator is always
/// derived from `creator`, never stored per member.
#[derive(Debug)]
pub struct RoomState {
    code: RoomCode,
    room_type: RoomType,
    creator: ConnectionId,
    created_at: DateTime<Utc>,
    pub(crate) canvas: Option<Value>,
    pub(crate) members: Vec<Participant>,
    pub(crate) requests: Vec<JoinRequest>,
    chat: VecDeque<ChatMessage>,
    chat_limit: usize,
    closed: bool,
}

impl RoomState {
    pub fn new(code: RoomCode, room_type: RoomType, creator: ConnectionId, chat_limit: usize) -> Self {
        Self {
            code,
            room_type,
            creator,
            created_at: Utc::now(),
            canvas: None,
            members: Vec::new(),
            requests: Vec::new(),
            chat: VecDeque::new(),
            chat_limit,
            closed: false,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn room_type(&self) -> RoomType {
        self.room_type
    }

    pub fn creator(&self) -> ConnectionId {
        self.creator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_creator(&self, id: ConnectionId) -> bool {
        self.creator == id
    }

    pub(crate) fn set_creator(&mut self, id: ConnectionId) {
        self.creator = id;
    }

    pub fn canvas(&self) -> Option<&Value> {
        self.canvas.as_ref()
    }

    pub fn member(&self, id: ConnectionId) -> Option<&Participant> {
        self.members.iter().find(|p| p.id() == id)
    }

    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.member(id).is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn request(&self, requester: ConnectionId) -> Option<&JoinRequest> {
        self.requests.iter().find(|r| r.requester() == requester)
    }

    pub fn pending_requests(&self) -> &[JoinRequest] {
        &self.requests
    }

    pub(crate) fn take_request(&mut self, requester: ConnectionId) -> Option<JoinRequest> {
        let index = self.requests.iter().position(|r| r.requester() == requester)?;
        Some(self.requests.remove(index))
    }

    /// Deleted rooms stay closed; anyone still holding one treats it as gone.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub fn users(&self) -> Vec<UserView> {
        self.members
            .iter()
            .map(|p| UserView {
                id: p.id(),
                name: p.name.clone(),
                is_creator: self.is_creator(p.id()),
                permission: p.permission,
                is_online: p.outbound().is_connected(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.code.clone(),
            room_type: self.room_type,
            creator_id: self.creator,
            canvas_data: self.canvas.clone(),
            chat_messages: self.chat_log().cloned().collect(),
            created_at: self.created_at,
        }
    }

    pub fn chat_log(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    pub(crate) fn record_chat(&mut self, message: ChatMessage) {
        if self.chat_limit == 0 {
            return;
        }
        while self.chat.len() >= self.chat_limit {
            self.chat.pop_front();
        }
        self.chat.push_back(message);
    }

    /// Deliver to one member. Returns false if they are not a member.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> bool {
        match self.member(id) {
            Some(p) => p.outbound().send(event),
            None => false,
        }
    }

    /// Deliver to every member. Returns the number of frames queued.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.fan_out(event, None)
    }

    /// Deliver to every member except `sender`.
    pub fn broadcast_except(&self, sender: ConnectionId, event: &ServerEvent) -> usize {
        self.fan_out(event, Some(sender))
    }

    fn fan_out(&self, event: &ServerEvent, skip: Option<ConnectionId>) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        self.members
            .iter()
            .filter(|p| Some(p.id()) != skip)
            .map(|p| p.outbound().push(frame.clone()))
            .filter(|queued| *queued)
            .count()
    }
}
