//! Adding and removing room members, and creator handoff.

use chrono::Utc;
use tableau_shared::protocol::{NewCreator, RoomJoined, ServerEvent, UserJoined, UserLeft};
use tableau_shared::types::{ConnectionId, Permission};
use tracing::{debug, info};

use crate::error::RoomError;
use crate::room::{Outbound, Participant, RoomState};

/// How a connection got into the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Public room, or the creator entering their own room.
    Direct,
    /// Private room, after the creator approved the request.
    Approved,
}

/// The single place that decides what a new member may do.
///
/// Every admission path currently grants edit rights. Nothing hands out
/// [`Permission::View`] yet.
pub fn permission_for(admission: Admission) -> Permission {
    match admission {
        Admission::Direct | Admission::Approved => Permission::Edit,
    }
}

#[derive(Debug, Clone)]
pub struct Joined {
    pub participant: Participant,
    /// False when the connection was already a member.
    pub fresh: bool,
}

/// Add a connection to the room, or return its existing membership.
///
/// `claimed_creator` is what the client said about itself; it is logged when
/// it disagrees with the room but otherwise ignored.
pub fn join(
    room: &mut RoomState,
    outbound: Outbound,
    name: &str,
    claimed_creator: bool,
    admission: Admission,
) -> Joined {
    let id = outbound.id();

    if let Some(existing) = room.member(id) {
        return Joined {
            participant: existing.clone(),
            fresh: false,
        };
    }

    if claimed_creator && !room.is_creator(id) {
        debug!(room = %room.code(), conn = %id.short(), "Ignoring creator claim from non-creator");
    }

    let participant = Participant::new(outbound, name.to_string(), permission_for(admission));
    room.members.push(participant.clone());

    info!(
        room = %room.code(),
        conn = %id.short(),
        name = %participant.name,
        ?admission,
        members = room.member_count(),
        "Participant joined room"
    );

    Joined {
        participant,
        fresh: true,
    }
}

/// The `room-joined` event for one member.
pub fn room_joined(room: &RoomState, id: ConnectionId) -> Option<ServerEvent> {
    let participant = room.member(id)?;
    Some(ServerEvent::RoomJoined(RoomJoined {
        room: room.snapshot(),
        users: room.users(),
        permission: participant.permission,
    }))
}

/// Welcome a member and tell the others. With `include_newcomer` the
/// membership update also goes to the newcomer.
pub fn announce(room: &RoomState, id: ConnectionId, include_newcomer: bool) {
    if let Some(welcome) = room_joined(room, id) {
        room.send_to(id, &welcome);
    }

    let update = ServerEvent::UserJoined(UserJoined { users: room.users() });
    if include_newcomer {
        room.broadcast(&update);
    } else {
        room.broadcast_except(id, &update);
    }
}

#[derive(Debug, Clone)]
pub struct Departure {
    /// Set when the departing member was the creator and someone remains.
    pub new_creator: Option<ConnectionId>,
    /// The room has no members left and must be deleted.
    pub emptied: bool,
}

/// Remove a member, hand the creator role on if needed, and notify the rest.
pub fn leave(room: &mut RoomState, id: ConnectionId) -> Result<Departure, RoomError> {
    let index = room
        .members
        .iter()
        .position(|p| p.id() == id)
        .ok_or(RoomError::StaleReference(id))?;
    let removed = room.members.remove(index);

    let new_creator = if room.is_creator(id) {
        room.members.first().map(Participant::id)
    } else {
        None
    };
    if let Some(successor) = new_creator {
        room.set_creator(successor);
    }

    info!(
        room = %room.code(),
        conn = %id.short(),
        name = %removed.name,
        stayed_secs = (Utc::now() - removed.joined_at).num_seconds(),
        remaining = room.member_count(),
        "Participant left room"
    );

    room.broadcast(&ServerEvent::UserLeft(UserLeft {
        user_id: id,
        users: room.users(),
    }));

    if let Some(successor) = new_creator {
        info!(room = %room.code(), conn = %successor.short(), "Creator role handed off");
        room.broadcast(&ServerEvent::NewCreator(NewCreator {
            new_creator_id: successor,
        }));
    }

    Ok(Departure {
        new_creator,
        emptied: room.is_empty(),
    })
}
