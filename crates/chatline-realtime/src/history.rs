use std::sync::Arc;

use tracing::warn;

use chatline_core::ids::RoomId;
use chatline_core::{ChatError, Message, MessageStore};

/// Read path for past messages. Takes no dispatcher locks, so reads see
/// whatever is durable at the time of the call.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn MessageStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// A room's messages, oldest first. Unknown rooms are empty.
    pub async fn get_history(&self, room_id: &RoomId) -> Result<Vec<Message>, ChatError> {
        self.store.list_by_room(room_id).await.inspect_err(|e| {
            warn!(room_id = %room_id, error = %e, "history read failed");
        })
    }
}
