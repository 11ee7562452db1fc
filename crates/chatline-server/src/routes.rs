//! REST handlers for the message API and health check.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use chatline_core::ids::RoomId;
use chatline_core::NewMessage;
pub use chatline_realtime::dispatcher::SEND_FAILED;

use crate::server::AppState;

pub const LIST_FAILED: &str = "Failed to get messages";

/// `GET /api/chat/{room_id}`: the room's history, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let room_id = RoomId::from_raw(room_id);
    match state.history.get_history(&room_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "list messages failed");
            failure(LIST_FAILED)
        }
    }
}

/// `POST /api/chat`: persist a message and broadcast it to live subscribers.
///
/// Unreadable bodies get the same generic failure as rejected messages.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> Response {
    let message = match body {
        Ok(Json(message)) => message,
        Err(rejection) => {
            tracing::warn!(
                status = %rejection.status(),
                error = %rejection.body_text(),
                "send message body rejected"
            );
            return failure(SEND_FAILED);
        }
    };

    let room_id = message.room_id.clone();
    match state.dispatcher.publish(message).await {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(e) => {
            tracing::error!(
                room_id = %room_id,
                kind = e.error_kind(),
                error = %e,
                "send message failed"
            );
            failure(SEND_FAILED)
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "healthy",
        "sessions": state.dispatcher.sessions().count(),
        "rooms": state.dispatcher.rooms().room_count(),
    }))
    .into_response()
}

fn failure(message: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
}
