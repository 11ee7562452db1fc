use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::{MessageId, RoomId, SenderId};

/// A persisted chat message. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: SenderId,
    pub content: String,
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unpersisted message as submitted by a client.
///
/// Missing fields deserialize as empty strings so that validation, not
/// parsing, reports them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default = "empty_sender")]
    pub sender_id: SenderId,
    #[serde(default)]
    pub content: String,
    #[serde(default = "empty_room")]
    pub room_id: RoomId,
}

fn empty_sender() -> SenderId {
    SenderId::from_raw("")
}

fn empty_room() -> RoomId {
    RoomId::from_raw("")
}

impl NewMessage {
    pub fn new(
        sender_id: impl Into<String>,
        content: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: SenderId::from_raw(sender_id),
            content: content.into(),
            room_id: RoomId::from_raw(room_id),
        }
    }

    /// Reject empty required fields, naming all of them.
    pub fn validate(&self) -> Result<(), ChatError> {
        let mut missing = Vec::new();
        if self.sender_id.is_empty() {
            missing.push("senderId");
        }
        if self.content.is_empty() {
            missing.push("content");
        }
        if self.room_id.is_empty() {
            missing.push("roomId");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ChatError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Stamp a validated message with its id and persistence time.
    pub fn into_message(self, id: MessageId, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            content: self.content,
            room_id: self.room_id,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Current time at the precision the store keeps (microseconds), so a
/// message read back from storage compares equal to the one broadcast.
pub fn persistence_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
