use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};

use chatline_core::events::{ClientEvent, ServerEvent};
use chatline_realtime::Dispatcher;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Error text for frames that are not a known event.
pub const INVALID_EVENT: &str = "Invalid event";

/// Drive one WebSocket connection: split into reader/writer, forward
/// inbound frames to the dispatcher and outbound events to the socket.
/// Closing either side is the session's disconnect.
pub async fn handle_ws_connection(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let (session_id, mut rx) = dispatcher.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued events to the socket + periodic ping
    let writer_sid = session_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(
                                session_id = %writer_sid,
                                error = %e,
                                "failed to encode event"
                            );
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(session_id = %writer_sid, "sent ping");
                }
            }
        }
    });

    // Reader task: parse frames into events and hand them to the dispatcher
    let reader_sid = session_id.clone();
    let reader_dispatcher = Arc::clone(&dispatcher);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => {
                        // Sends complete on their own task; not awaited here.
                        let _ = reader_dispatcher.dispatch(&reader_sid, event);
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %reader_sid, error = %e, "unparseable frame");
                        reader_dispatcher
                            .sessions()
                            .send_to(&reader_sid, ServerEvent::error(INVALID_EVENT));
                    }
                },
                WsMessage::Close(_) => break,
                _ => {} // axum answers pings itself
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    dispatcher.disconnect(&session_id);
}
