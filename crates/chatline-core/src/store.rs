use async_trait::async_trait;

use crate::errors::ChatError;
use crate::ids::RoomId;
use crate::messages::{Message, NewMessage};

/// Durable, append-only record of chat messages.
///
/// Implementations assign `id` and `createdAt` on append and must not block
/// the async runtime while waiting on I/O.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Fails with `Validation` on an empty `senderId`,
    /// `content` or `roomId`, and with `Storage` if the write fails.
    async fn append(&self, message: NewMessage) -> Result<Message, ChatError>;

    /// All messages of a room, oldest first (ties in insertion order).
    /// Unknown rooms yield an empty list.
    async fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, ChatError>;
}
