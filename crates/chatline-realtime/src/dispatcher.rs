//! Transport-agnostic handling of session events.
//!
//! A send is persisted first and broadcast only after the store confirms
//! it. Appends to the same room are linearized by a per-room lock held
//! across append and broadcast, so subscribers see a room's messages in
//! the order their appends completed. Different rooms never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatline_core::events::{ClientEvent, ServerEvent};
use chatline_core::ids::{RoomId, SessionId};
use chatline_core::{ChatError, Message, MessageStore, NewMessage};

use crate::rooms::RoomRegistry;
use crate::sessions::SessionRegistry;

/// Generic failure text sent to a session whose send failed.
pub const SEND_FAILED: &str = "Failed to send message";

pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    rooms: Arc<RoomRegistry>,
    sessions: Arc<SessionRegistry>,
    room_locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        rooms: Arc<RoomRegistry>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            store,
            rooms,
            sessions,
            room_locks: DashMap::new(),
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Register a new live session.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let (session_id, rx) = self.sessions.register();
        info!(session_id = %session_id, "session connected");
        (session_id, rx)
    }

    /// Route one inbound event by name.
    ///
    /// Membership changes apply before this returns, so a later event from
    /// the same session observes them. Sends run on their own task and keep
    /// going if the session disconnects; the handle is returned for callers
    /// that want to wait on it.
    pub fn dispatch(
        self: &Arc<Self>,
        session_id: &SessionId,
        event: ClientEvent,
    ) -> Option<JoinHandle<()>> {
        debug!(session_id = %session_id, event = event.name(), "dispatching event");
        match event {
            ClientEvent::JoinRoom(target) => {
                self.join_room(session_id, target.room_id());
                None
            }
            ClientEvent::LeaveRoom(target) => {
                self.leave_room(session_id, target.room_id());
                None
            }
            ClientEvent::SendMessage(message) => {
                let this = Arc::clone(self);
                let session_id = session_id.clone();
                Some(tokio::spawn(async move {
                    let _ = this.send_message(&session_id, message).await;
                }))
            }
        }
    }

    pub fn join_room(&self, session_id: &SessionId, room_id: &RoomId) {
        if self.rooms.join(session_id, room_id) {
            info!(session_id = %session_id, room_id = %room_id, "joined room");
        }
    }

    pub fn leave_room(&self, session_id: &SessionId, room_id: &RoomId) {
        if self.rooms.leave(session_id, room_id) {
            info!(session_id = %session_id, room_id = %room_id, "left room");
        }
    }

    /// Persist then broadcast on behalf of a session. On failure the
    /// session alone gets an `error` event and nothing is broadcast.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        message: NewMessage,
    ) -> Result<Message, ChatError> {
        let room_id = message.room_id.clone();
        match self.publish(message).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    room_id = %room_id,
                    kind = e.error_kind(),
                    error = %e,
                    "send_message failed"
                );
                self.sessions.send_to(session_id, ServerEvent::error(SEND_FAILED));
                Err(e)
            }
        }
    }

    /// Persist a message and deliver it to the room's current subscribers.
    pub async fn publish(&self, message: NewMessage) -> Result<Message, ChatError> {
        // Empty room ids are rejected by the store; skip the lock table.
        if message.room_id.is_empty() {
            return self.store.append(message).await;
        }

        let room_id = message.room_id.clone();
        let lock = self.room_lock(&room_id);
        let result = {
            let _guard = lock.lock().await;
            let result = self.store.append(message).await;
            if let Ok(stored) = &result {
                let delivered = self.broadcast(stored);
                debug!(
                    room_id = %room_id,
                    message_id = %stored.id,
                    delivered,
                    "message broadcast"
                );
            }
            result
        };
        // Released on failure too.
        drop(lock);
        self.release_room_lock(&room_id);
        result
    }

    /// Remove a session from every room and drop its outbound queue.
    pub fn disconnect(&self, session_id: &SessionId) {
        let left = self.rooms.leave_all(session_id);
        self.sessions.unregister(session_id);
        info!(session_id = %session_id, rooms_left = left.len(), "session disconnected");
    }

    /// Deliver to subscribers as of now. Returns how many accepted it.
    fn broadcast(&self, message: &Message) -> usize {
        let event = ServerEvent::ReceiveMessage(message.clone());
        self.rooms
            .subscribers(&message.room_id)
            .iter()
            .filter(|session_id| self.sessions.send_to(session_id, event.clone()))
            .count()
    }

    fn room_lock(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the room's lock entry once nobody else holds or awaits it.
    fn release_room_lock(&self, room_id: &RoomId) {
        self.room_locks
            .remove_if(room_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
