use serde::{Deserialize, Serialize};

use crate::ids::RoomId;
use crate::messages::{Message, NewMessage};

/// Events a connected session sends to the server.
///
/// Wire form: `{"event": "<name>", "data": <payload>}`. Disconnect is not an
/// event on the wire; the transport reports it when the connection closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(RoomTarget),
    LeaveRoom(RoomTarget),
    SendMessage(NewMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::LeaveRoom(_) => "leave_room",
            Self::SendMessage(_) => "send_message",
        }
    }
}

/// Room payload of `join_room` / `leave_room`. Accepts either a bare string
/// or `{"roomId": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomTarget {
    Bare(RoomId),
    Object {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

impl RoomTarget {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Bare(id) | Self::Object { room_id: id } => id,
        }
    }

    pub fn into_room_id(self) -> RoomId {
        match self {
            Self::Bare(id) | Self::Object { room_id: id } => id,
        }
    }
}

impl From<RoomId> for RoomTarget {
    fn from(room_id: RoomId) -> Self {
        Self::Object { room_id }
    }
}

/// Events the server pushes to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A persisted message, delivered to every subscriber of its room.
    ReceiveMessage(Message),
    /// Generic failure notice, delivered to the originating session only.
    Error(ErrorPayload),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive_message",
            Self::Error(_) => "error",
        }
    }
}
