//! Creator-gated entry into private rooms.
//!
//! A request moves `None → Requested → {Approved, Rejected}`. Requests are
//! removed from the room on every exit from `Requested`: approval, rejection,
//! expiry, or the requester going away. Approving or rejecting a requester
//! whose connection has closed only clears the request.

use chrono::{DateTime, Utc};
use tableau_shared::protocol::{PendingJoin, ServerEvent};
use tableau_shared::types::{ConnectionId, RoomType};
use tracing::{debug, info};

use crate::error::RoomError;
use crate::membership::{self, Admission};
use crate::room::{JoinRequest, Outbound, Participant, RoomState};

/// Whether a connection may walk straight in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Admit,
    AwaitApproval,
}

pub fn entry_for(room: &RoomState, id: ConnectionId) -> Entry {
    if room.room_type() == RoomType::Private && !room.is_creator(id) && !room.is_member(id) {
        Entry::AwaitApproval
    } else {
        Entry::Admit
    }
}

/// Where a connection stands with a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    None,
    Requested,
    Approved,
    Rejected,
}

pub fn state_of(room: &RoomState, id: ConnectionId) -> RequestState {
    if room.is_member(id) {
        RequestState::Approved
    } else if room.request(id).is_some() {
        RequestState::Requested
    } else {
        RequestState::None
    }
}

/// Ask the creator to let `outbound` in.
///
/// Returns [`RequestState::Rejected`] straight away when the creator cannot
/// be reached, otherwise [`RequestState::Requested`].
pub fn request(
    room: &mut RoomState,
    outbound: Outbound,
    name: &str,
    now: DateTime<Utc>,
) -> RequestState {
    let id = outbound.id();

    let creator_online = room
        .member(room.creator())
        .is_some_and(|creator| creator.outbound().is_connected());
    if !creator_online {
        info!(room = %room.code(), conn = %id.short(), "Creator offline, join request rejected");
        outbound.send(&ServerEvent::JoinRequestRejected);
        return RequestState::Rejected;
    }

    if room.request(id).is_none() {
        room.requests.push(JoinRequest::new(outbound.clone(), name.to_string(), now));
        room.send_to(
            room.creator(),
            &ServerEvent::JoinRequest(PendingJoin {
                request_socket_id: id,
                user_name: name.to_string(),
            }),
        );
        info!(
            room = %room.code(),
            conn = %id.short(),
            name,
            pending = room.pending_requests().len(),
            "Join request queued"
        );
    } else {
        debug!(room = %room.code(), conn = %id.short(), "Duplicate join request");
    }

    outbound.send(&ServerEvent::WaitingForApproval);
    RequestState::Requested
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Admitted(Participant),
    /// The requester disconnected before the decision; the request is gone.
    RequesterGone,
    Rejected,
}

fn authorize(room: &RoomState, approver: ConnectionId, action: &'static str) -> Result<(), RoomError> {
    if room.is_creator(approver) && room.is_member(approver) {
        Ok(())
    } else {
        Err(RoomError::Unauthorized {
            actor: approver,
            action,
        })
    }
}

fn take(room: &mut RoomState, requester: ConnectionId) -> Result<JoinRequest, RoomError> {
    room.take_request(requester)
        .ok_or(RoomError::StaleReference(requester))
}

pub fn approve(
    room: &mut RoomState,
    approver: ConnectionId,
    requester: ConnectionId,
) -> Result<Resolution, RoomError> {
    authorize(room, approver, "approve join requests")?;
    let request = take(room, requester)?;

    if !request.outbound().is_connected() {
        debug!(room = %room.code(), conn = %requester.short(), "Approved requester already gone");
        return Ok(Resolution::RequesterGone);
    }

    let joined = membership::join(
        room,
        request.outbound().clone(),
        &request.name,
        false,
        Admission::Approved,
    );
    membership::announce(room, requester, true);

    Ok(Resolution::Admitted(joined.participant))
}

pub fn reject(
    room: &mut RoomState,
    approver: ConnectionId,
    requester: ConnectionId,
) -> Result<Resolution, RoomError> {
    authorize(room, approver, "reject join requests")?;
    let request = take(room, requester)?;

    info!(room = %room.code(), conn = %requester.short(), "Join request rejected");

    // Best effort: a closed connection just drops it.
    request.outbound().send(&ServerEvent::JoinRequestRejected);
    Ok(Resolution::Rejected)
}

/// Drop a request without telling anyone; used when the requester leaves.
pub fn cancel(room: &mut RoomState, requester: ConnectionId) -> bool {
    let cancelled = room.take_request(requester).is_some();
    if cancelled {
        debug!(room = %room.code(), conn = %requester.short(), "Join request abandoned");
    }
    cancelled
}

/// Reject every request made before `cutoff`. Returns the requesters.
pub fn expire(room: &mut RoomState, cutoff: DateTime<Utc>) -> Vec<ConnectionId> {
    let expired = reject_where(room, |r| r.requested_at < cutoff);
    if !expired.is_empty() {
        info!(room = %room.code(), expired = expired.len(), "Expired join requests");
    }
    expired
}

/// Reject everything still pending; the room is going away.
pub fn reject_all(room: &mut RoomState) -> Vec<ConnectionId> {
    reject_where(room, |_| true)
}

fn reject_where(room: &mut RoomState, pred: impl Fn(&JoinRequest) -> bool) -> Vec<ConnectionId> {
    let (rejected, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut room.requests)
        .into_iter()
        .partition(|r| pred(r));
    room.requests = kept;

    for request in &rejected {
        request.outbound().send(&ServerEvent::JoinRequestRejected);
    }
    rejected.iter().map(JoinRequest::requester).collect()
}

/// Show every pending request to the current creator. A new creator never
/// saw the requests made to their predecessor.
pub fn forward_pending(room: &RoomState) -> usize {
    room.pending_requests()
        .iter()
        .map(|r| {
            room.send_to(
                room.creator(),
                &ServerEvent::JoinRequest(PendingJoin {
                    request_socket_id: r.requester(),
                    user_name: r.name.clone(),
                }),
            )
        })
        .filter(|sent| *sent)
        .count()
}
