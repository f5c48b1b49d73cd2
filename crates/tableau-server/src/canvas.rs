//! Canvas synchronisation: op relay, snapshot reconciliation, and clear.
//!
//! Ops and snapshots are opaque JSON from the drawing toolkit. Ops are only
//! relayed, never folded into the stored snapshot; clients push a fresh
//! snapshot themselves after undo/redo. Each connection's events are handled
//! in arrival order and its outbound queue is FIFO, so ops from one sender
//! reach every peer in submission order. Across senders the last op applied
//! wins.

use serde_json::Value;
use tableau_shared::constants::OP_ID_FIELD;
use tableau_shared::protocol::ServerEvent;
use tableau_shared::types::ConnectionId;
use tracing::{debug, info};

use crate::error::RoomError;
use crate::room::{Participant, RoomState};

/// The client-assigned id of an op, if it carries one.
pub fn op_id(op: &Value) -> Option<&str> {
    op.get(OP_ID_FIELD).and_then(Value::as_str)
}

fn require_member(room: &RoomState, id: ConnectionId) -> Result<&Participant, RoomError> {
    room.member(id).ok_or(RoomError::StaleReference(id))
}

fn require_editor(room: &RoomState, id: ConnectionId, action: &'static str) -> Result<(), RoomError> {
    let member = require_member(room, id)?;
    if member.permission.can_edit() {
        Ok(())
    } else {
        Err(RoomError::Unauthorized { actor: id, action })
    }
}

/// Forward one op to every other member. Returns how many got it.
pub fn relay_op(room: &RoomState, sender: ConnectionId, op: Value) -> Result<usize, RoomError> {
    require_editor(room, sender, "draw")?;

    let delivered = room.broadcast_except(sender, &ServerEvent::Drawing(op.clone()));
    debug!(
        room = %room.code(),
        conn = %sender.short(),
        op = op_id(&op).unwrap_or("-"),
        delivered,
        "Relayed drawing op"
    );
    Ok(delivered)
}

/// Send the stored snapshot to `requester` alone. Returns false when the
/// room has none.
pub fn send_snapshot(room: &RoomState, requester: ConnectionId) -> Result<bool, RoomError> {
    let member = require_member(room, requester)?;

    match room.canvas() {
        Some(snapshot) => Ok(member
            .outbound()
            .send(&ServerEvent::CanvasState(snapshot.clone()))),
        None => Ok(false),
    }
}

/// Replace the stored snapshot and relay it to every other member.
///
/// A `null` snapshot empties the canvas.
pub fn push_snapshot(room: &mut RoomState, sender: ConnectionId, state: Value) -> Result<usize, RoomError> {
    require_editor(room, sender, "replace the canvas")?;

    let delivered = room.broadcast_except(sender, &ServerEvent::CanvasState(state.clone()));
    room.canvas = (!state.is_null()).then_some(state);

    debug!(room = %room.code(), conn = %sender.short(), delivered, "Canvas snapshot replaced");
    Ok(delivered)
}

/// Empty the canvas and tell every other member.
pub fn clear(room: &mut RoomState, sender: ConnectionId) -> Result<usize, RoomError> {
    require_editor(room, sender, "clear the canvas")?;

    room.canvas = None;
    let delivered = room.broadcast_except(sender, &ServerEvent::ClearCanvas);

    info!(room = %room.code(), conn = %sender.short(), "Canvas cleared");
    Ok(delivered)
}
