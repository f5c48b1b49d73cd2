//! Binds inbound connection events to the room workflows.
//!
//! Each event does all of its mutation and fan-out under the lock of the room
//! it targets. A join that moves a connection between rooms holds both, so
//! a missing target leaves the old membership alone. The connection index is
//! only updated with the affected room locked, so a disconnect racing an
//! approval always ends with the connection gone from both.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tableau_shared::protocol::{
    CanvasPush, ClientEvent, CreateRoom, DrawingOp, JoinDecision, JoinRoom, RoomRef, SendMessage,
    ServerEvent,
};
use tableau_shared::types::{ConnectionId, RoomCode};
use tracing::{debug, info, warn};

use crate::approval::{self, Entry, RequestState, Resolution};
use crate::canvas;
use crate::chat;
use crate::error::RoomError;
use crate::membership::{self, Admission};
use crate::registry::{RoomGuard, RoomRegistry};
use crate::room::Outbound;
use crate::store::{RoomRecord, RoomStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

pub struct Coordinator {
    registry: Arc<RoomRegistry>,
    store: Arc<RoomStore>,
}

impl Coordinator {
    pub fn new(registry: Arc<RoomRegistry>, store: Arc<RoomStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    /// Handle one event from `conn`. Never fails: anything that cannot be
    /// applied is logged and dropped.
    pub async fn dispatch(&self, conn: &Outbound, event: ClientEvent) {
        let name = event.name();
        let room = event.room_id().map(ToString::to_string);

        let result = match event {
            ClientEvent::CreateRoom(create) => self.create_room(conn, create).await,
            ClientEvent::JoinRoom(join) => self.join_room(conn, join).await,
            ClientEvent::ApproveJoinRequest(decision) => {
                self.decide(conn.id(), decision, Decision::Approve).await
            }
            ClientEvent::RejectJoinRequest(decision) => {
                self.decide(conn.id(), decision, Decision::Reject).await
            }
            ClientEvent::Drawing(DrawingOp { room_id, data }) => {
                let room = self.registry.get(&room_id).await;
                room.and_then(|room| canvas::relay_op(&room, conn.id(), data).map(drop))
            }
            ClientEvent::GetCanvasState(RoomRef { room_id }) => {
                let room = self.registry.get(&room_id).await;
                room.and_then(|room| canvas::send_snapshot(&room, conn.id()).map(drop))
            }
            ClientEvent::CanvasState(CanvasPush { room_id, state }) => {
                let pushed = match self.registry.get(&room_id).await {
                    Ok(mut room) => canvas::push_snapshot(&mut room, conn.id(), state).map(drop),
                    Err(e) => Err(e),
                };
                self.touch_on_success(&room_id, pushed).await
            }
            ClientEvent::ClearCanvas(RoomRef { room_id }) => {
                let cleared = match self.registry.get(&room_id).await {
                    Ok(mut room) => canvas::clear(&mut room, conn.id()).map(drop),
                    Err(e) => Err(e),
                };
                self.touch_on_success(&room_id, cleared).await
            }
            ClientEvent::SendMessage(SendMessage {
                room_id,
                content,
                recipient,
            }) => match self.registry.get(&room_id).await {
                Ok(mut room) => {
                    chat::send(&mut room, conn.id(), content, recipient, Utc::now()).map(drop)
                }
                Err(e) => Err(e),
            },
            ClientEvent::LeaveRoom(RoomRef { room_id }) => self.leave_room(conn.id(), &room_id).await,
        };

        if let Err(e) = result {
            debug!(
                conn = %conn.id().short(),
                event = name,
                room = room.as_deref().unwrap_or("-"),
                error = %e,
                "Event ignored"
            );
        }
    }

    /// Remove a closed connection from wherever it was. Safe to call twice.
    pub async fn disconnect(&self, conn: ConnectionId) {
        match self.registry.unbind(conn).await {
            Some(code) => {
                info!(conn = %conn.short(), room = %code, "Connection closed, leaving room");
                self.detach(conn, &code).await;
            }
            None => debug!(conn = %conn.short(), "Connection closed outside any room"),
        }
    }

    /// Reject join requests older than `ttl`. Returns how many expired.
    pub async fn expire_requests(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let mut total = 0;
        for code in self.registry.codes().await {
            let Ok(mut room) = self.registry.get(&code).await else {
                continue;
            };
            let expired = approval::expire(&mut room, cutoff);
            for requester in &expired {
                self.registry.unbind_from(*requester, &code).await;
            }
            total += expired.len();
        }
        total
    }

    // -----------------------------------------------------------------------
    // Entry
    // -----------------------------------------------------------------------

    async fn create_room(&self, conn: &Outbound, create: CreateRoom) -> Result<(), RoomError> {
        require_name(&create.user_name)?;
        let code = match create.room_id {
            Some(code) => code,
            None => self.registry.unused_code().await,
        };
        self.detach_elsewhere(conn.id(), &code).await;

        let (mut room, created) = self
            .registry
            .create_if_absent(&code, create.room_type, conn.id())
            .await;
        if created {
            // Records for one code must land in creation order.
            let record = RoomRecord::new(code.clone(), room.room_type(), room.creator(), room.created_at());
            if let Err(e) = self.store.replace(record).await {
                warn!(room = %code, error = %e, "Failed to store room record");
            }
        }

        self.enter(&mut room, conn, &create.user_name, create.is_creator).await;
        Ok(())
    }

    async fn join_room(&self, conn: &Outbound, join: JoinRoom) -> Result<(), RoomError> {
        require_name(&join.user_name)?;
        let previous = self
            .registry
            .room_of(conn.id())
            .await
            .filter(|current| *current != join.room_id);

        let (mut room, old_room) = match self.registry.lock_pair(&join.room_id, previous.as_ref()).await {
            Ok(pair) => pair,
            Err(e) => {
                conn.send(&ServerEvent::RoomNotFound);
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            info!(conn = %conn.id().short(), from = %previous, to = %join.room_id, "Connection switching rooms");
            match old_room {
                Some(mut old_room) => self.detach_locked(&mut old_room, conn.id()).await,
                None => self.registry.unbind_from(conn.id(), &previous).await,
            }
        }

        self.enter(&mut room, conn, &join.user_name, join.is_creator).await;
        Ok(())
    }

    /// Let `conn` in, or queue it for approval.
    async fn enter(&self, room: &mut RoomGuard, conn: &Outbound, name: &str, claimed_creator: bool) {
        match approval::entry_for(room, conn.id()) {
            Entry::Admit => {
                let joined = membership::join(room, conn.clone(), name, claimed_creator, Admission::Direct);
                if !joined.fresh {
                    debug!(room = %room.code(), conn = %conn.id().short(), "Already a member, resending room state");
                }
                membership::announce(room, conn.id(), false);
                self.registry.bind(conn.id(), room.code()).await;
            }
            Entry::AwaitApproval => {
                if approval::request(room, conn.clone(), name, Utc::now()) == RequestState::Requested {
                    self.registry.bind(conn.id(), room.code()).await;
                }
            }
        }
    }

    async fn decide(
        &self,
        approver: ConnectionId,
        decision: JoinDecision,
        kind: Decision,
    ) -> Result<(), RoomError> {
        let mut room = self.registry.get(&decision.room_id).await?;
        let requester = decision.request_socket_id;

        let resolution = match kind {
            Decision::Approve => approval::approve(&mut room, approver, requester),
            Decision::Reject => approval::reject(&mut room, approver, requester),
        }?;

        match resolution {
            Resolution::Admitted(participant) => {
                info!(room = %room.code(), conn = %requester.short(), name = %participant.name, "Join request approved");
                self.registry.bind(requester, room.code()).await
            }
            Resolution::RequesterGone | Resolution::Rejected => {
                self.registry.unbind_from(requester, room.code()).await
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Exit
    // -----------------------------------------------------------------------

    async fn leave_room(&self, conn: ConnectionId, code: &RoomCode) -> Result<(), RoomError> {
        if self.registry.room_of(conn).await.as_ref() != Some(code) {
            return Err(RoomError::StaleReference(conn));
        }
        self.detach(conn, code).await;
        Ok(())
    }

    /// A connection lives in one room at a time; leave the old one first.
    async fn detach_elsewhere(&self, conn: ConnectionId, target: &RoomCode) {
        if let Some(current) = self.registry.room_of(conn).await {
            if current != *target {
                info!(conn = %conn.short(), from = %current, to = %target, "Connection switching rooms");
                self.detach(conn, &current).await;
            }
        }
    }

    async fn detach(&self, conn: ConnectionId, code: &RoomCode) {
        match self.registry.get(code).await {
            Ok(mut room) => self.detach_locked(&mut room, conn).await,
            Err(_) => self.registry.unbind_from(conn, code).await,
        }
    }

    /// Drop `conn` from the room as a member or a requester, and settle the
    /// consequences: creator handoff, or deleting the room once empty.
    async fn detach_locked(&self, room: &mut RoomGuard, conn: ConnectionId) {
        let code = room.code().clone();

        match approval::state_of(room, conn) {
            RequestState::Requested => {
                approval::cancel(room, conn);
            }
            RequestState::Approved => {
                if let Ok(departure) = membership::leave(room, conn) {
                    if departure.new_creator.is_some() {
                        approval::forward_pending(room);
                    }
                    if departure.emptied {
                        approval::reject_all(room);
                        if let Err(e) = self.registry.delete(room).await {
                            warn!(room = %code, error = %e, "Failed to delete empty room");
                        }
                    }
                }
            }
            RequestState::None | RequestState::Rejected => {}
        }

        self.registry.unbind_from(conn, &code).await;
    }

    async fn touch_on_success(&self, code: &RoomCode, result: Result<(), RoomError>) -> Result<(), RoomError> {
        if result.is_ok() {
            if let Err(e) = self.store.touch(code, Utc::now()).await {
                warn!(room = %code, error = %e, "Failed to record room activity");
            }
        }
        result
    }
}

/// A blank display name counts as a missing field.
fn require_name(name: &str) -> Result<(), RoomError> {
    if name.trim().is_empty() {
        return Err(RoomError::Malformed("userName is blank".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::testing::{connection, drain};
    use crate::room::Frame;
    use serde_json::json;
    use tableau_shared::protocol::{NewCreator, PendingJoin};
    use tableau_shared::types::{Permission, Recipient, RoomType};
    use tokio::sync::mpsc::Receiver;

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(RoomRegistry::default()), Arc::new(RoomStore::in_memory()))
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn create(room: &str, name: &str, room_type: RoomType) -> ClientEvent {
        ClientEvent::CreateRoom(CreateRoom {
            room_id: Some(code(room)),
            user_name: name.into(),
            room_type,
            is_creator: true,
        })
    }

    fn join(room: &str, name: &str) -> ClientEvent {
        ClientEvent::JoinRoom(JoinRoom {
            room_id: code(room),
            user_name: name.into(),
            is_creator: false,
        })
    }

    fn decision(room: &str, requester: ConnectionId) -> JoinDecision {
        JoinDecision {
            room_id: code(room),
            request_socket_id: requester,
        }
    }

    async fn members(coord: &Coordinator, room: &str) -> Vec<ConnectionId> {
        let room = coord.registry.get(&code(room)).await.unwrap();
        room.users().into_iter().map(|u| u.id).collect()
    }

    async fn creator_is_present(coord: &Coordinator, room: &str) -> bool {
        let room = coord.registry.get(&code(room)).await.unwrap();
        room.is_member(room.creator())
    }

    fn expect_room_joined(rx: &mut Receiver<Frame>) -> tableau_shared::protocol::RoomJoined {
        let events = drain(rx);
        events
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::RoomJoined(joined) => Some(joined),
                _ => None,
            })
            .expect("room-joined")
    }

    #[tokio::test]
    async fn test_create_room_joins_creator_and_stores_record() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();

        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;

        let joined = expect_room_joined(&mut a_rx);
        assert_eq!(joined.permission, Permission::Edit);
        assert_eq!(joined.room.creator_id, a.id());
        assert!(joined.users[0].is_creator);

        let record = coord.store.get(&code("R1R1R1")).await.unwrap();
        assert_eq!(record.creator_id, a.id());
        assert_eq!(coord.registry.room_of(a.id()).await, Some(code("R1R1R1")));
    }

    #[tokio::test]
    async fn test_create_room_without_code_generates_one() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();

        coord
            .dispatch(
                &a,
                ClientEvent::CreateRoom(CreateRoom {
                    room_id: None,
                    user_name: "A".into(),
                    room_type: RoomType::Public,
                    is_creator: true,
                }),
            )
            .await;

        let joined = expect_room_joined(&mut a_rx);
        assert!(coord.registry.contains(&joined.room.room_id).await);
    }

    #[tokio::test]
    async fn test_duplicate_join_does_not_duplicate_membership() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (b, _b_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;

        coord.dispatch(&b, join("R1R1R1", "B")).await;
        coord.dispatch(&b, join("R1R1R1", "B")).await;

        assert_eq!(members(&coord, "R1R1R1").await, vec![a.id(), b.id()]);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let coord = coordinator();
        let (b, mut b_rx) = connection();

        coord.dispatch(&b, join("NOPE00", "B")).await;

        assert_eq!(drain(&mut b_rx), vec![ServerEvent::RoomNotFound]);
        assert!(coord.registry.room_of(b.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_join_missing_room_keeps_current_membership() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (x, mut x_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&x, join("R1R1R1", "X")).await;
        drain(&mut x_rx);

        coord.dispatch(&x, join("NOPE00", "X")).await;

        assert_eq!(drain(&mut x_rx), vec![ServerEvent::RoomNotFound]);
        assert_eq!(members(&coord, "R1R1R1").await, vec![a.id(), x.id()]);
        assert_eq!(coord.registry.room_of(x.id()).await, Some(code("R1R1R1")));
    }

    #[tokio::test]
    async fn test_blank_name_is_ignored() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();
        let (b, mut b_rx) = connection();

        coord.dispatch(&a, create("R1R1R1", "  ", RoomType::Public)).await;
        assert!(drain(&mut a_rx).is_empty());
        assert!(!coord.registry.contains(&code("R1R1R1")).await);
        assert!(coord.store.get(&code("R1R1R1")).await.is_none());

        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, join("R1R1R1", "")).await;
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(members(&coord, "R1R1R1").await, vec![a.id()]);
        assert!(coord.registry.room_of(b.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_reused_code_gets_fresh_record() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (b, _b_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.disconnect(a.id()).await;
        assert!(!coord.registry.contains(&code("R1R1R1")).await);

        coord.dispatch(&b, create("R1R1R1", "B", RoomType::Private)).await;

        let record = coord.store.get(&code("R1R1R1")).await.unwrap();
        assert_eq!(record.room_type, RoomType::Private);
        assert_eq!(record.creator_id, b.id());

        let room = coord.registry.get(&code("R1R1R1")).await.unwrap();
        assert_eq!(record.room_type, room.room_type());
        assert_eq!(record.creator_id, room.creator());
        assert_eq!(record.created_at, room.created_at());
    }

    #[tokio::test]
    async fn test_creator_handoff_on_disconnect() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (b, mut b_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, join("R1R1R1", "B")).await;
        drain(&mut b_rx);

        coord.disconnect(a.id()).await;

        let events = drain(&mut b_rx);
        assert!(events.contains(&ServerEvent::NewCreator(NewCreator {
            new_creator_id: b.id()
        })));
        assert!(creator_is_present(&coord, "R1R1R1").await);
        let room = coord.registry.get(&code("R1R1R1")).await.unwrap();
        assert_eq!(room.creator(), b.id());
    }

    #[tokio::test]
    async fn test_room_deleted_when_last_member_leaves() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (b, _b_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, join("R1R1R1", "B")).await;

        coord.disconnect(b.id()).await;
        assert!(coord.registry.contains(&code("R1R1R1")).await);

        coord.disconnect(a.id()).await;
        assert!(!coord.registry.contains(&code("R1R1R1")).await);

        // Duplicate disconnects are harmless.
        coord.disconnect(a.id()).await;
        coord.disconnect(b.id()).await;
        assert_eq!(coord.registry.len().await, 0);

        // The metadata record outlives the live room.
        assert!(coord.store.get(&code("R1R1R1")).await.is_some());
    }

    #[tokio::test]
    async fn test_private_room_approval_scenario() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord
            .dispatch(
                &a,
                ClientEvent::CanvasState(CanvasPush {
                    room_id: code("P1P1P1"),
                    state: json!({"objects": [{"type": "circle"}]}),
                }),
            )
            .await;
        drain(&mut a_rx);

        coord.dispatch(&c, join("P1P1P1", "C")).await;
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerEvent::JoinRequest(PendingJoin {
                request_socket_id: c.id(),
                user_name: "C".into(),
            })]
        );
        assert_eq!(drain(&mut c_rx), vec![ServerEvent::WaitingForApproval]);
        assert_eq!(members(&coord, "P1P1P1").await, vec![a.id()]);

        coord
            .dispatch(&a, ClientEvent::ApproveJoinRequest(decision("P1P1P1", c.id())))
            .await;

        let joined = expect_room_joined(&mut c_rx);
        assert_eq!(joined.permission, Permission::Edit);
        assert_eq!(joined.room.canvas_data, Some(json!({"objects": [{"type": "circle"}]})));

        let room = coord.registry.get(&code("P1P1P1")).await.unwrap();
        assert!(room.pending_requests().is_empty());
        assert!(room.is_member(c.id()));
    }

    #[tokio::test]
    async fn test_create_room_on_existing_private_room_needs_approval() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;

        coord.dispatch(&c, create("P1P1P1", "C", RoomType::Public)).await;

        assert_eq!(drain(&mut c_rx), vec![ServerEvent::WaitingForApproval]);
        assert_eq!(members(&coord, "P1P1P1").await, vec![a.id()]);
    }

    #[tokio::test]
    async fn test_non_creator_cannot_approve() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (c, mut c_rx) = connection();
        let (d, mut d_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord.dispatch(&c, join("P1P1P1", "C")).await;
        coord.dispatch(&d, join("P1P1P1", "D")).await;
        drain(&mut c_rx);
        drain(&mut d_rx);

        coord
            .dispatch(&d, ClientEvent::ApproveJoinRequest(decision("P1P1P1", c.id())))
            .await;

        assert!(drain(&mut c_rx).is_empty());
        assert!(drain(&mut d_rx).is_empty());
        assert_eq!(members(&coord, "P1P1P1").await, vec![a.id()]);
    }

    #[tokio::test]
    async fn test_requester_disconnect_then_approve_is_noop() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();
        let (c, c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord.dispatch(&c, join("P1P1P1", "C")).await;
        drain(&mut a_rx);

        drop(c_rx);
        coord.disconnect(c.id()).await;
        coord
            .dispatch(&a, ClientEvent::ApproveJoinRequest(decision("P1P1P1", c.id())))
            .await;

        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(members(&coord, "P1P1P1").await, vec![a.id()]);
        let room = coord.registry.get(&code("P1P1P1")).await.unwrap();
        assert!(room.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn test_private_room_rejects_when_creator_offline() {
        let coord = coordinator();
        let (a, a_rx) = connection();
        let (b, _b_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord.dispatch(&b, create("P1P1P1", "B", RoomType::Private)).await;
        drop(a_rx);

        coord.dispatch(&c, join("P1P1P1", "C")).await;

        assert_eq!(drain(&mut c_rx), vec![ServerEvent::JoinRequestRejected]);
        assert!(coord.registry.room_of(c.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_then_late_joiner_gets_no_snapshot() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (z, mut z_rx) = connection();
        coord.dispatch(&a, create("R2R2R2", "A", RoomType::Public)).await;
        coord
            .dispatch(
                &a,
                ClientEvent::CanvasState(CanvasPush {
                    room_id: code("R2R2R2"),
                    state: json!({"objects": [1, 2, 3]}),
                }),
            )
            .await;

        coord
            .dispatch(&a, ClientEvent::ClearCanvas(RoomRef { room_id: code("R2R2R2") }))
            .await;
        {
            let room = coord.registry.get(&code("R2R2R2")).await.unwrap();
            assert!(room.canvas().is_none());
        }

        coord.dispatch(&z, join("R2R2R2", "Z")).await;
        let joined = expect_room_joined(&mut z_rx);
        assert!(joined.room.canvas_data.is_none());

        coord
            .dispatch(&z, ClientEvent::GetCanvasState(RoomRef { room_id: code("R2R2R2") }))
            .await;
        assert!(drain(&mut z_rx).is_empty());
    }

    #[tokio::test]
    async fn test_drawing_relayed_to_peers() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();
        let (b, mut b_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, join("R1R1R1", "B")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let op = json!({"type": "path", "drawingId": "p-1"});
        coord
            .dispatch(
                &a,
                ClientEvent::Drawing(DrawingOp {
                    room_id: code("R1R1R1"),
                    data: op.clone(),
                }),
            )
            .await;

        assert_eq!(drain(&mut b_rx), vec![ServerEvent::Drawing(op)]);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_private_chat_isolation() {
        let coord = coordinator();
        let (a, mut a_rx) = connection();
        let (b, mut b_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, join("R1R1R1", "B")).await;
        coord.dispatch(&c, join("R1R1R1", "C")).await;
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            drain(rx);
        }

        coord
            .dispatch(
                &a,
                ClientEvent::SendMessage(SendMessage {
                    room_id: code("R1R1R1"),
                    content: "just you".into(),
                    recipient: Recipient::Connection(b.id()),
                }),
            )
            .await;

        assert_eq!(drain(&mut a_rx).len(), 1);
        assert_eq!(drain(&mut b_rx).len(), 1);
        assert!(drain(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_the_old_one() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (b, _b_rx) = connection();
        let (x, _x_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;
        coord.dispatch(&b, create("R2R2R2", "B", RoomType::Public)).await;
        coord.dispatch(&x, join("R1R1R1", "X")).await;

        coord.dispatch(&x, join("R2R2R2", "X")).await;

        assert_eq!(members(&coord, "R1R1R1").await, vec![a.id()]);
        assert_eq!(members(&coord, "R2R2R2").await, vec![b.id(), x.id()]);
        assert_eq!(coord.registry.room_of(x.id()).await, Some(code("R2R2R2")));
    }

    #[tokio::test]
    async fn test_leave_room_event() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        coord.dispatch(&a, create("R1R1R1", "A", RoomType::Public)).await;

        coord
            .dispatch(&a, ClientEvent::LeaveRoom(RoomRef { room_id: code("R2R2R2") }))
            .await;
        assert!(coord.registry.contains(&code("R1R1R1")).await);

        coord
            .dispatch(&a, ClientEvent::LeaveRoom(RoomRef { room_id: code("R1R1R1") }))
            .await;
        assert!(!coord.registry.contains(&code("R1R1R1")).await);
        assert!(coord.registry.room_of(a.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_pending_requester_rejected_when_room_closes() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord.dispatch(&c, join("P1P1P1", "C")).await;
        drain(&mut c_rx);

        coord.disconnect(a.id()).await;

        assert_eq!(drain(&mut c_rx), vec![ServerEvent::JoinRequestRejected]);
        assert!(coord.registry.room_of(c.id()).await.is_none());
        assert!(!coord.registry.contains(&code("P1P1P1")).await);
    }

    #[tokio::test]
    async fn test_expire_requests() {
        let coord = coordinator();
        let (a, _a_rx) = connection();
        let (c, mut c_rx) = connection();
        coord.dispatch(&a, create("P1P1P1", "A", RoomType::Private)).await;
        coord.dispatch(&c, join("P1P1P1", "C")).await;
        drain(&mut c_rx);

        assert_eq!(coord.expire_requests(Duration::from_secs(3600)).await, 0);
        assert_eq!(coord.expire_requests(Duration::ZERO).await, 1);

        assert_eq!(drain(&mut c_rx), vec![ServerEvent::JoinRequestRejected]);
        assert!(coord.registry.room_of(c.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_non_empty_rooms_always_have_present_creator() {
        let coord = coordinator();
        let conns: Vec<_> = (0..4).map(|_| connection()).collect();
        coord.dispatch(&conns[0].0, create("R1R1R1", "0", RoomType::Public)).await;
        for (i, (conn, _)) in conns.iter().enumerate().skip(1) {
            coord.dispatch(conn, join("R1R1R1", &i.to_string())).await;
        }

        for (conn, _) in conns.iter().take(3) {
            coord.disconnect(conn.id()).await;
            assert!(creator_is_present(&coord, "R1R1R1").await);
        }

        coord.disconnect(conns[3].0.id()).await;
        assert!(!coord.registry.contains(&code("R1R1R1")).await);
    }
}
