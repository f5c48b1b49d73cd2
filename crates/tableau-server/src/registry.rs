//! Process-wide table of live rooms.
//!
//! The map itself sits behind an `RwLock` that is only held to insert, look
//! up, or remove an entry. Each room has its own `Mutex`; whoever holds it
//! owns the room for the whole read-modify-broadcast sequence. Lock order is
//! room first, then the map or the connection index, never the reverse. Two
//! rooms are only ever held together through [`RoomRegistry::lock_pair`],
//! which takes them in code order.
//!
//! A deleted room is marked closed before its entry is removed, so a caller
//! that fetched the handle just before deletion sees it as gone.

use std::collections::HashMap;
use std::sync::Arc;

use tableau_shared::constants::DEFAULT_CHAT_HISTORY_LIMIT;
use tableau_shared::types::{ConnectionId, RoomCode, RoomType};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;

use crate::error::RoomError;
use crate::room::RoomState;

/// Exclusive access to one room.
pub type RoomGuard = OwnedMutexGuard<RoomState>;

type SharedRoom = Arc<Mutex<RoomState>>;

pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, SharedRoom>>,
    /// Connection → the room it is a member of or waiting to enter.
    presence: Mutex<HashMap<ConnectionId, RoomCode>>,
    chat_limit: usize,
}

impl RoomRegistry {
    pub fn new(chat_limit: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            presence: Mutex::new(HashMap::new()),
            chat_limit,
        }
    }

    /// Lock the room, creating it first if nobody has. An existing room is
    /// returned as is; its type and creator are not touched. The flag is
    /// true when this call created the room.
    pub async fn create_if_absent(
        &self,
        code: &RoomCode,
        room_type: RoomType,
        creator: ConnectionId,
    ) -> (RoomGuard, bool) {
        loop {
            let (shared, created) = {
                let mut rooms = self.rooms.write().await;
                match rooms.get(code) {
                    Some(existing) => (existing.clone(), false),
                    None => {
                        let state = RoomState::new(code.clone(), room_type, creator, self.chat_limit);
                        let shared = Arc::new(Mutex::new(state));
                        rooms.insert(code.clone(), shared.clone());
                        (shared, true)
                    }
                }
            };

            let guard = shared.lock_owned().await;
            if guard.is_closed() {
                // Deleted while we waited; its entry is gone now.
                continue;
            }
            if created {
                info!(room = %code, ?room_type, creator = %creator.short(), "Room created");
            }
            return (guard, created);
        }
    }

    /// Lock an existing room.
    pub async fn get(&self, code: &RoomCode) -> Result<RoomGuard, RoomError> {
        let shared = self
            .rooms
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let guard = shared.lock_owned().await;
        if guard.is_closed() {
            return Err(RoomError::NotFound(code.clone()));
        }
        Ok(guard)
    }

    /// Lock `target` together with `other`, the room a connection is about
    /// to leave. A missing or closed `target` is an error and leaves `other`
    /// unlocked; a missing or closed `other` comes back as `None`.
    pub async fn lock_pair(
        &self,
        target: &RoomCode,
        other: Option<&RoomCode>,
    ) -> Result<(RoomGuard, Option<RoomGuard>), RoomError> {
        let other = other.filter(|code| *code != target);
        let (target_room, other_room) = {
            let rooms = self.rooms.read().await;
            let target_room = rooms
                .get(target)
                .cloned()
                .ok_or_else(|| RoomError::NotFound(target.clone()))?;
            (target_room, other.and_then(|code| rooms.get(code).cloned()))
        };

        let (target_guard, other_guard) = match (other, other_room) {
            (Some(code), Some(other_room)) if code < target => {
                let other_guard = other_room.lock_owned().await;
                (target_room.lock_owned().await, Some(other_guard))
            }
            (_, Some(other_room)) => {
                let target_guard = target_room.lock_owned().await;
                (target_guard, Some(other_room.lock_owned().await))
            }
            (_, None) => (target_room.lock_owned().await, None),
        };

        if target_guard.is_closed() {
            return Err(RoomError::NotFound(target.clone()));
        }
        Ok((target_guard, other_guard.filter(|room| !room.is_closed())))
    }

    /// Remove a room that has no members left.
    pub async fn delete(&self, room: &mut RoomGuard) -> Result<(), RoomError> {
        if !room.is_empty() {
            return Err(RoomError::Occupied(room.code().clone()));
        }
        if room.is_closed() {
            return Ok(());
        }

        room.close();
        self.rooms.write().await.remove(room.code());

        let mut presence = self.presence.lock().await;
        presence.retain(|_, code| code != room.code());

        info!(room = %room.code(), "Room deleted, no members remaining");
        Ok(())
    }

    #[cfg(test)]
    pub async fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.read().await.contains_key(code)
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// A random code no live room is using.
    pub async fn unused_code(&self) -> RoomCode {
        let rooms = self.rooms.read().await;
        loop {
            let code = RoomCode::generate();
            if !rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Every live room code.
    pub async fn codes(&self) -> Vec<RoomCode> {
        self.rooms.read().await.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Connection index
    // -----------------------------------------------------------------------

    /// Record that `conn` now belongs to (or waits on) `code`. Call with the
    /// room locked.
    pub async fn bind(&self, conn: ConnectionId, code: &RoomCode) {
        self.presence.lock().await.insert(conn, code.clone());
    }

    /// Forget `conn`, but only if it is still bound to `code`.
    pub async fn unbind_from(&self, conn: ConnectionId, code: &RoomCode) {
        let mut presence = self.presence.lock().await;
        if presence.get(&conn) == Some(code) {
            presence.remove(&conn);
        }
    }

    /// Forget `conn` and return where it was.
    pub async fn unbind(&self, conn: ConnectionId) -> Option<RoomCode> {
        self.presence.lock().await.remove(&conn)
    }

    pub async fn room_of(&self, conn: ConnectionId) -> Option<RoomCode> {
        self.presence.lock().await.get(&conn).cloned()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_HISTORY_LIMIT)
    }
}
