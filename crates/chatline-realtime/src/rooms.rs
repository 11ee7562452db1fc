use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use chatline_core::ids::{RoomId, SessionId};

#[derive(Default)]
struct Membership {
    /// room -> subscribed sessions. A room exists only while non-empty.
    rooms: HashMap<RoomId, HashSet<SessionId>>,
    /// session -> joined rooms, so `leave_all` touches only those rooms.
    joined: HashMap<SessionId, HashSet<RoomId>>,
}

impl Membership {
    fn remove(&mut self, session_id: &SessionId, room_id: &RoomId) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(session_id);
        if members.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }
}

/// In-memory room membership shared by every connection handler.
///
/// Both directions of the mapping live behind one lock so a join can never
/// interleave with a `leave_all` and leave a stale member behind.
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Membership>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room. Returns false if it was already a member.
    pub fn join(&self, session_id: &SessionId, room_id: &RoomId) -> bool {
        let mut inner = self.inner.write();
        let added = inner
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(session_id.clone());
        inner
            .joined
            .entry(session_id.clone())
            .or_default()
            .insert(room_id.clone());
        added
    }

    /// Remove a session from one room. Returns false if it was not a member.
    pub fn leave(&self, session_id: &SessionId, room_id: &RoomId) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(rooms) = inner.joined.get_mut(session_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                inner.joined.remove(session_id);
            }
        }
        inner.remove(session_id, room_id)
    }

    /// Remove a session from every room it joined. Returns the rooms left.
    pub fn leave_all(&self, session_id: &SessionId) -> Vec<RoomId> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(rooms) = inner.joined.remove(session_id) else {
            return Vec::new();
        };
        let mut left: Vec<RoomId> = rooms
            .into_iter()
            .filter(|room_id| inner.remove(session_id, room_id))
            .collect();
        left.sort();
        left
    }

    /// Current subscribers of a room, possibly empty.
    pub fn subscribers(&self, room_id: &RoomId) -> Vec<SessionId> {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a session has joined, sorted.
    pub fn rooms_of(&self, session_id: &SessionId) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .inner
            .read()
            .joined
            .get(session_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn is_member(&self, session_id: &SessionId, room_id: &RoomId) -> bool {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .is_some_and(|members| members.contains(session_id))
    }

    /// Number of rooms with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }
}
