//! Stateless per-message-kind handlers (spec.md §4.5). All state lives in
//! [`Hub`]/[`Room`]/[`ClientSession`]; this module only reads and mutates it.

use std::sync::Arc;

use tracing::debug;

use super::hub::Hub;
use super::protocol::{RawEnvelope, ServerMessage};
use super::session::ClientSession;

/// Dispatches one decoded envelope for `session`. Never returns an error:
/// every failure mode in spec.md §4.5/§7 is "log and drop", not propagated.
pub async fn dispatch(hub: &Hub, session: &Arc<ClientSession>, envelope: RawEnvelope) {
    match envelope.tag.as_str() {
        "join" => handle_join(hub, session, &envelope).await,
        "offer" => handle_relay(hub, session, &envelope, RelayKind::Offer).await,
        "answer" => handle_relay(hub, session, &envelope, RelayKind::Answer).await,
        "iceCandidate" => handle_relay(hub, session, &envelope, RelayKind::IceCandidate).await,
        "startScreenShare" => handle_start_screen_share(hub, session, &envelope).await,
        "stopScreenShare" => handle_stop_screen_share(hub, session, &envelope).await,
        "pong" => { /* keepalive reply; any inbound traffic already resets the deadline */ }
        other => debug!(tag = other, "unknown message tag, dropping"),
    }
}

async fn handle_join(hub: &Hub, session: &Arc<ClientSession>, envelope: &RawEnvelope) {
    let (Some(room_name), Some(peer_id)) = (
        envelope.str_field("roomId"),
        envelope.str_field("userId"),
    ) else {
        debug!("join dropped: missing roomId or userId");
        return;
    };
    if room_name.is_empty() || peer_id.is_empty() {
        debug!("join dropped: empty roomId or userId");
        return;
    }
    if session.is_joined().await {
        debug!(peer_id, "join dropped: session already joined");
        return;
    }

    let user_name = envelope
        .str_field("userName")
        .map(str::to_owned)
        .filter(|s| !s.is_empty());

    let room = hub.get_or_create(room_name);
    let evicted = room.add(peer_id.to_string(), Arc::clone(session));
    if !session.set_joined(Arc::clone(&room), peer_id.to_string()).await {
        // Lost a race against a concurrent join on this same session; undo
        // our own insert so we don't leave two entries for one peer id.
        room.remove(peer_id);
        hub.remove_if_empty(&room);
        return;
    }
    if let Some(evicted) = evicted {
        debug!(peer_id, room = room_name, "evicting prior session on join collision");
        evicted.clear_joined().await;
        evicted.close();
    }

    tracing::info!(peer_id, room = room_name, "joined");
    let overflowed = room.broadcast(
        &ServerMessage::UserJoined {
            user_id: peer_id.to_string(),
            user_name,
        },
        Some(peer_id),
    );
    for session in overflowed {
        handle_leave(hub, &session).await;
    }
}

enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

async fn handle_relay(hub: &Hub, session: &Arc<ClientSession>, envelope: &RawEnvelope, kind: RelayKind) {
    let Some(joined) = session.joined_state().await else {
        debug!("relay dropped: session not in a room");
        return;
    };
    let Some(target_id) = envelope.str_field("targetId").filter(|s| !s.is_empty()) else {
        debug!("relay dropped: missing or empty targetId");
        return;
    };

    let message = match kind {
        RelayKind::Offer => {
            let Some(sdp) = envelope.payload.get("sdp").cloned() else {
                debug!("offer dropped: missing sdp");
                return;
            };
            ServerMessage::Offer {
                sender_id: joined.peer_id.clone(),
                sdp,
            }
        }
        RelayKind::Answer => {
            let Some(sdp) = envelope.payload.get("sdp").cloned() else {
                debug!("answer dropped: missing sdp");
                return;
            };
            ServerMessage::Answer {
                sender_id: joined.peer_id.clone(),
                sdp,
            }
        }
        RelayKind::IceCandidate => {
            let Some(candidate) = envelope.payload.get("candidate").cloned() else {
                debug!("iceCandidate dropped: missing candidate");
                return;
            };
            ServerMessage::IceCandidate {
                sender_id: joined.peer_id.clone(),
                candidate,
            }
        }
    };

    if let Some(overflowed) = joined.room.deliver_to(target_id, message) {
        handle_leave(hub, &overflowed).await;
    }
}

async fn handle_start_screen_share(hub: &Hub, session: &Arc<ClientSession>, envelope: &RawEnvelope) {
    let Some(joined) = session.joined_state().await else {
        debug!("startScreenShare dropped: session not in a room");
        return;
    };
    if envelope.str_field("roomId") != Some(joined.room.name.as_str()) {
        debug!(room = %joined.room.name, "startScreenShare dropped: roomId mismatch");
        return;
    }

    joined.room.set_sharer(joined.peer_id.clone());
    let overflowed = joined.room.broadcast(
        &ServerMessage::ScreenShareActive {
            sharing_user_id: joined.peer_id.clone(),
        },
        Some(&joined.peer_id),
    );
    for session in overflowed {
        handle_leave(hub, &session).await;
    }
}

async fn handle_stop_screen_share(hub: &Hub, session: &Arc<ClientSession>, envelope: &RawEnvelope) {
    let Some(joined) = session.joined_state().await else {
        debug!("stopScreenShare dropped: session not in a room");
        return;
    };
    if envelope.str_field("roomId") != Some(joined.room.name.as_str()) {
        debug!(room = %joined.room.name, "stopScreenShare dropped: roomId mismatch");
        return;
    }

    joined.room.clear_sharer_if(&joined.peer_id);
    // Unconditional broadcast including self, so clients get the echo they
    // rely on (spec.md §4.5 StopScreenShare: "clients rely on this echo").
    let overflowed = joined.room.broadcast(
        &ServerMessage::ScreenShareStopped {
            stopped_user_id: joined.peer_id.clone(),
        },
        None,
    );
    for session in overflowed {
        handle_leave(hub, &session).await;
    }
}

/// The leave transition (spec.md §4.5 Leave / read EOF / fatal read error).
/// Idempotent and safe from any number of call sites: the session's read
/// pump calls it exactly once when its loop exits, and every overflow
/// eviction elsewhere in this module calls it too, so a session can never
/// be severed from its room without the rest of the room hearing about it.
/// A no-op if the session was never joined, or was already cleared out from
/// under it by an earlier call (e.g. its own eviction already ran).
///
/// A leave broadcast can itself overflow some other slow member; rather than
/// recurse (which async fns can't do without boxing), cascading evictions
/// are drained from a work queue.
pub async fn handle_leave(hub: &Hub, session: &Arc<ClientSession>) {
    let mut pending = vec![Arc::clone(session)];
    while let Some(session) = pending.pop() {
        let Some(joined) = session.clear_joined().await else {
            continue;
        };
        session.close();
        let now_empty = joined.room.remove(&joined.peer_id);
        if now_empty {
            hub.remove_if_empty(&joined.room);
        }
        tracing::info!(peer_id = %joined.peer_id, room = %joined.room.name, "left");
        let overflowed = joined.room.broadcast(
            &ServerMessage::UserLeft {
                user_id: joined.peer_id.clone(),
            },
            Some(&joined.peer_id),
        );
        pending.extend(overflowed);
    }
}
