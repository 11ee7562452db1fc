use dashmap::DashMap;
use tokio::sync::mpsc;

use chatline_core::events::ServerEvent;
use chatline_core::ids::SessionId;

/// Outbound side of one live connection.
struct SessionHandle {
    tx: mpsc::Sender<ServerEvent>,
}

/// Registry of live sessions and their outbound queues.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    max_send_queue: usize,
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new session and return its id + outbound receiver.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.sessions.insert(id.clone(), SessionHandle { tx });
        (id, rx)
    }

    /// Remove a session. Dropping its sender closes the receiver.
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Queue an event for one session without waiting. A full or closed
    /// queue drops the event.
    pub fn send_to(&self, session_id: &SessionId, event: ServerEvent) -> bool {
        let Some(handle) = self.sessions.get(session_id) else {
            return false;
        };
        match handle.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    session_id = %session_id,
                    event = event.name(),
                    "send queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
