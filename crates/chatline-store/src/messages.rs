use async_trait::async_trait;
use tracing::{debug, instrument};

use chatline_core::ids::{MessageId, RoomId, SenderId};
use chatline_core::messages::persistence_timestamp;
use chatline_core::{ChatError, Message, MessageStore, NewMessage};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const SELECT_COLUMNS: &str = "id, sender_id, content, room_id, created_at, updated_at";

/// Synchronous message queries against the SQLite database.
#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate and insert a message. The id and timestamps are assigned
    /// while the connection lock is held, so `created_at` order follows
    /// insertion order.
    #[instrument(
        skip(self, message),
        fields(room_id = %message.room_id, sender_id = %message.sender_id)
    )]
    pub fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        message.validate().map_err(|e| match e {
            ChatError::Validation(detail) | ChatError::Storage(detail) => {
                StoreError::Invalid(detail)
            }
        })?;

        self.db.with_conn(|conn| {
            let id = MessageId::new();
            let now = persistence_timestamp();
            let stamp = row_helpers::format_timestamp(&now);

            conn.execute(
                "INSERT INTO messages (id, sender_id, content, room_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    message.sender_id.as_str(),
                    message.content,
                    message.room_id.as_str(),
                    stamp,
                    stamp,
                ],
            )?;

            debug!(message_id = %id, "message stored");
            Ok(message.into_message(id, now))
        })
    }

    /// All messages for a room, oldest first; ties keep insertion order.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM messages WHERE room_id = ?1
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let mut rows = stmt.query([room_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
    let created_raw: String = row_helpers::get(row, 4, "messages", "created_at")?;
    let updated_raw: String = row_helpers::get(row, 5, "messages", "updated_at")?;

    Ok(Message {
        id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "messages", "id")?),
        sender_id: SenderId::from_raw(row_helpers::get::<String>(row, 1, "messages", "sender_id")?),
        content: row_helpers::get(row, 2, "messages", "content")?,
        room_id: RoomId::from_raw(row_helpers::get::<String>(row, 3, "messages", "room_id")?),
        created_at: row_helpers::parse_timestamp(&created_raw, "messages", "created_at")?,
        updated_at: row_helpers::parse_timestamp(&updated_raw, "messages", "updated_at")?,
    })
}

/// [`MessageStore`] backed by SQLite. Queries run on tokio's blocking pool
/// so a slow disk stalls only the caller awaiting it.
#[derive(Clone)]
pub struct SqliteMessageStore {
    repo: MessageRepo,
}

impl SqliteMessageStore {
    pub fn new(db: Database) -> Self {
        Self {
            repo: MessageRepo::new(db),
        }
    }

    pub fn repo(&self) -> &MessageRepo {
        &self.repo
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, ChatError> {
        let repo = self.repo.clone();
        let stored = tokio::task::spawn_blocking(move || repo.append(message))
            .await
            .map_err(StoreError::from)??;
        Ok(stored)
    }

    async fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, ChatError> {
        let repo = self.repo.clone();
        let room_id = room_id.clone();
        let messages = tokio::task::spawn_blocking(move || repo.list_by_room(&room_id))
            .await
            .map_err(StoreError::from)??;
        Ok(messages)
    }
}
