//! A named room: a set of member sessions keyed by peer id, plus the
//! identifier of the currently active screen-sharer.
//!
//! Follows spec.md §5's locking discipline: reads (membership snapshot,
//! targeted lookup, sharer read) take the read guard; writes take the write
//! guard. Broadcasts copy the membership list under the read guard, release
//! it, then enqueue — a stream write never happens while any lock is held.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::protocol::ServerMessage;
use super::session::{ClientSession, DeliverOutcome};

struct RoomState {
    members: HashMap<String, Arc<ClientSession>>,
    sharer: Option<String>,
}

pub struct Room {
    pub name: String,
    state: RwLock<RoomState>,
}

impl Room {
    pub fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: RwLock::new(RoomState {
                members: HashMap::new(),
                sharer: None,
            }),
        })
    }

    /// Inserts `session` under `peer_id`. On collision, the prior session is
    /// evicted (spec.md §4.4 "on identifier collision... evict the prior
    /// session"). Returns the evicted session, if any, so the caller can
    /// finish tearing it down (clearing its joined state) outside any lock.
    pub fn add(&self, peer_id: String, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        let mut state = self.state.write().expect("room lock poisoned");
        state.members.insert(peer_id, session)
    }

    /// Removes `peer_id`. If it was the current sharer, the sharer resets to
    /// "none". Returns whether the room is now empty, so the hub can decide
    /// whether to delete it.
    pub fn remove(&self, peer_id: &str) -> bool {
        let mut state = self.state.write().expect("room lock poisoned");
        state.members.remove(peer_id);
        if state.sharer.as_deref() == Some(peer_id) {
            state.sharer = None;
        }
        state.members.is_empty()
    }

    /// Enqueues `envelope` on every member except `exclude_self`, if given.
    /// Members whose enqueue overflows are returned for eviction by the
    /// caller — evicting while iterating would re-enter the write lock this
    /// function never takes while it holds the read lock.
    pub fn broadcast(
        &self,
        envelope: &ServerMessage,
        exclude_self: Option<&str>,
    ) -> Vec<Arc<ClientSession>> {
        let members: Vec<(String, Arc<ClientSession>)> = {
            let state = self.state.read().expect("room lock poisoned");
            state
                .members
                .iter()
                .filter(|(id, _)| Some(id.as_str()) != exclude_self)
                .map(|(id, session)| (id.clone(), Arc::clone(session)))
                .collect()
        };

        let mut overflowed = Vec::new();
        for (id, session) in members {
            if session.deliver(envelope.clone()) == DeliverOutcome::Overflow {
                debug!(peer_id = %id, room = %self.name, "broadcast overflow, evicting");
                overflowed.push(session);
            }
        }
        overflowed
    }

    /// Enqueues `envelope` on exactly one member. Absent recipient is a
    /// silent no-op (spec.md §4.4 "this matches the use case where peers
    /// routinely race the presence view"). Returns whether the target
    /// overflowed, for the caller to evict.
    pub fn deliver_to(&self, peer_id: &str, envelope: ServerMessage) -> Option<Arc<ClientSession>> {
        let target = {
            let state = self.state.read().expect("room lock poisoned");
            state.members.get(peer_id).cloned()
        }?;
        if target.deliver(envelope) == DeliverOutcome::Overflow {
            Some(target)
        } else {
            None
        }
    }

    /// Sets the sharer unconditionally (spec.md §4.4: no prior-value check
    /// required, the client protocol already broadcasts a stop first).
    pub fn set_sharer(&self, peer_id: String) {
        self.state.write().expect("room lock poisoned").sharer = Some(peer_id);
    }

    /// Clears the sharer only if it currently equals `peer_id`.
    pub fn clear_sharer_if(&self, peer_id: &str) -> bool {
        let mut state = self.state.write().expect("room lock poisoned");
        if state.sharer.as_deref() == Some(peer_id) {
            state.sharer = None;
            true
        } else {
            false
        }
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.state
            .read()
            .expect("room lock poisoned")
            .members
            .keys()
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.state.read().expect("room lock poisoned").members.len()
    }

    pub fn is_member(&self, peer_id: &str) -> bool {
        self.state
            .read()
            .expect("room lock poisoned")
            .members
            .contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (Arc<ClientSession>, tokio::sync::mpsc::Receiver<ServerMessage>) {
        ClientSession::new(8)
    }

    #[test]
    fn add_then_remove_empties_room() {
        let room = Room::new("r1".into());
        let (s1, _rx1) = session();
        assert!(room.add("u1".into(), s1).is_none());
        assert_eq!(room.size(), 1);
        assert!(room.remove("u1"));
        assert_eq!(room.size(), 0);
    }

    #[test]
    fn add_collision_returns_prior_session_for_eviction() {
        let room = Room::new("r1".into());
        let (s1, _rx1) = session();
        let (s2, _rx2) = session();
        assert!(room.add("u1".into(), s1.clone()).is_none());
        let evicted = room.add("u1".into(), s2).unwrap();
        assert_eq!(evicted.connection_id, s1.connection_id);
        assert_eq!(room.size(), 1);
    }

    #[test]
    fn broadcast_excludes_sender_and_reports_overflow() {
        let room = Room::new("r1".into());
        let (s1, _rx1) = session();
        let (s2, mut rx2) = ClientSession::new(1);
        room.add("u1".into(), s1);
        room.add("u2".into(), s2.clone());

        let overflowed = room.broadcast(
            &ServerMessage::UserJoined {
                user_id: "u1".into(),
                user_name: None,
            },
            Some("u1"),
        );
        assert!(overflowed.is_empty());
        assert!(rx2.try_recv().is_ok());

        // Fill u2's queue (capacity 1, now 0 available after above recv... send twice to overflow)
        let _ = s2.deliver(ServerMessage::Ping);
        let overflowed = room.broadcast(&ServerMessage::Ping, None);
        assert_eq!(overflowed.len(), 1);
    }

    #[test]
    fn sharer_lifecycle() {
        let room = Room::new("r1".into());
        room.set_sharer("u1".into());
        assert!(!room.clear_sharer_if("u2"));
        assert!(room.clear_sharer_if("u1"));
    }
}
