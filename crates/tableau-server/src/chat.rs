use chrono::{DateTime, Utc};
use tableau_shared::protocol::{ChatMessage, ServerEvent};
use tableau_shared::types::{ConnectionId, Recipient};
use tracing::debug;

use crate::error::RoomError;
use crate::room::RoomState;

/// Who ended up with a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every member, sender included. Logged in the room history.
    Room(usize),
    /// Recipient plus an echo to the sender. Never logged.
    Direct(ConnectionId),
}

/// Relay a chat message from `sender`.
///
/// Senders that are not members, and direct messages to connections that
/// are not members, are dropped without telling anyone.
pub fn send(
    room: &mut RoomState,
    sender: ConnectionId,
    content: String,
    recipient: Recipient,
    now: DateTime<Utc>,
) -> Result<Delivery, RoomError> {
    let sender_name = room
        .member(sender)
        .map(|p| p.name.clone())
        .ok_or(RoomError::StaleReference(sender))?;

    match recipient {
        Recipient::Everyone => {
            let message = ChatMessage {
                sender_id: sender,
                sender_name,
                content,
                timestamp: now,
                is_private: false,
                recipient_name: None,
            };
            let delivered = room.broadcast(&ServerEvent::NewMessage(message.clone()));
            room.record_chat(message);
            Ok(Delivery::Room(delivered))
        }
        Recipient::Connection(target) => {
            let target_name = room
                .member(target)
                .map(|p| p.name.clone())
                .ok_or(RoomError::StaleReference(target))?;

            let event = ServerEvent::NewMessage(ChatMessage {
                sender_id: sender,
                sender_name,
                content,
                timestamp: now,
                is_private: true,
                recipient_name: Some(target_name),
            });
            room.send_to(target, &event);
            if target != sender {
                room.send_to(sender, &event);
            }

            debug!(
                room = %room.code(),
                from = %sender.short(),
                to = %target.short(),
                "Private message delivered"
            );
            Ok(Delivery::Direct(target))
        }
    }
}
