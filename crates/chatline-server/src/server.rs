use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use chatline_core::MessageStore;
use chatline_realtime::{Dispatcher, HistoryService, RoomRegistry, SessionRegistry};

use crate::{routes, ws};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound events buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9091,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub history: HistoryService,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, max_send_queue: usize) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::new(RoomRegistry::new()),
            Arc::new(SessionRegistry::new(max_send_queue)),
        );
        Self {
            dispatcher: Arc::new(dispatcher),
            history: HistoryService::new(store),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(routes::health))
        .route("/api/chat", post(routes::send_message))
        .route("/api/chat/{room_id}", get(routes::list_messages))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve in the background. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    store: Arc<dyn MessageStore>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(store, config.max_send_queue);
    let dispatcher = Arc::clone(&state.dispatcher);
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "chat server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        dispatcher,
        shutdown_tx: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by `start()`: keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.server).await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
        tracing::info!("chat server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_ws_connection(socket, state.dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chatline_core::ids::RoomId;
    use chatline_core::Message;
    use chatline_store::{Database, SqliteMessageStore};
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_test_server() -> (ServerHandle, Database) {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(SqliteMessageStore::new(db.clone()));
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        (start(config, store).await.unwrap(), db)
    }

    async fn connect(handle: &ServerHandle) -> Client {
        let url = format!("ws://127.0.0.1:{}/ws", handle.port);
        let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    async fn send(client: &mut Client, frame: Value) {
        client.send(WsMessage::text(frame.to_string())).await.unwrap();
    }

    async fn next_event(client: &mut Client) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await.unwrap().unwrap() {
                    WsMessage::Text(text) => {
                        return serde_json::from_str::<Value>(text.as_str()).unwrap();
                    }
                    _ => continue,
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn wait_for_subscribers(handle: &ServerHandle, room: &str, n: usize) {
        let room = RoomId::from_raw(room);
        for _ in 0..200 {
            if handle.dispatcher().rooms().subscribers(&room).len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {n} subscribers");
    }

    fn api(handle: &ServerHandle, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", handle.port)
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9091);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_send_queue, 256);
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (handle, _db) = start_test_server().await;
        assert!(handle.port > 0);

        let resp = reqwest::get(api(&handle, "/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 0);
        assert_eq!(body["rooms"], 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn post_then_list_round_trips() {
        let (handle, _db) = start_test_server().await;
        let http = reqwest::Client::new();

        let resp = http
            .post(api(&handle, "/api/chat"))
            .json(&json!({"senderId": "alice", "content": "hello", "roomId": "r1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Message = resp.json().await.unwrap();
        assert_eq!(created.content, "hello");
        assert!(created.id.as_str().starts_with("msg_"));

        let resp = reqwest::get(api(&handle, "/api/chat/r1")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let history: Vec<Message> = resp.json().await.unwrap();
        assert_eq!(history, vec![created]);

        let empty: Vec<Message> = reqwest::get(api(&handle, "/api/chat/unknown"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(empty.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn post_with_missing_fields_fails() {
        let (handle, _db) = start_test_server().await;

        let resp = reqwest::Client::new()
            .post(api(&handle, "/api/chat"))
            .json(&json!({"senderId": "alice", "roomId": "r1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Failed to send message"}));

        let history: Vec<Message> = reqwest::get(api(&handle, "/api/chat/r1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unreadable_bodies_get_generic_failure() {
        let (handle, _db) = start_test_server().await;
        let http = reqwest::Client::new();
        let url = api(&handle, "/api/chat");

        let no_content_type = http
            .post(&url)
            .body(r#"{"senderId":"a","content":"hi","roomId":"r1"}"#)
            .send()
            .await
            .unwrap();
        let empty = http
            .post(&url)
            .header("content-type", "application/json")
            .send()
            .await
            .unwrap();
        let wrong_type = http
            .post(&url)
            .json(&json!({"senderId": 5, "content": "hi", "roomId": "r1"}))
            .send()
            .await
            .unwrap();

        for resp in [no_content_type, empty, wrong_type] {
            assert_eq!(resp.status(), 500);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body, json!({"error": "Failed to send message"}));
        }

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn storage_failure_returns_500() {
        let (handle, db) = start_test_server().await;
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE messages")?;
            Ok(())
        })
        .unwrap();

        let resp = reqwest::get(api(&handle, "/api/chat/r1")).await.unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Failed to get messages"}));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn room_members_receive_broadcast_and_outsiders_do_not() {
        let (handle, _db) = start_test_server().await;
        let mut a = connect(&handle).await;
        let mut b = connect(&handle).await;
        let mut c = connect(&handle).await;

        send(&mut a, json!({"event": "join_room", "data": "r1"})).await;
        send(&mut b, json!({"event": "join_room", "data": {"roomId": "r1"}})).await;
        send(&mut c, json!({"event": "join_room", "data": "r2"})).await;
        wait_for_subscribers(&handle, "r1", 2).await;
        wait_for_subscribers(&handle, "r2", 1).await;

        send(
            &mut a,
            json!({
                "event": "send_message",
                "data": {"senderId": "A", "content": "hi", "roomId": "r1"}
            }),
        )
        .await;

        let to_a = next_event(&mut a).await;
        let to_b = next_event(&mut b).await;
        assert_eq!(to_a["event"], "receive_message");
        assert_eq!(to_a, to_b);
        assert_eq!(to_a["data"]["content"], "hi");
        assert_eq!(to_a["data"]["senderId"], "A");

        let outsider = tokio::time::timeout(Duration::from_millis(200), c.next()).await;
        assert!(outsider.is_err(), "r2 member must not receive r1 traffic");

        let history: Vec<Value> = reqwest::get(api(&handle, "/api/chat/r1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history, vec![to_a["data"].clone()]);
    }

    #[tokio::test]
    async fn rest_post_reaches_live_subscribers() {
        let (handle, _db) = start_test_server().await;
        let mut a = connect(&handle).await;
        send(&mut a, json!({"event": "join_room", "data": "r1"})).await;
        wait_for_subscribers(&handle, "r1", 1).await;

        let created: Value = reqwest::Client::new()
            .post(api(&handle, "/api/chat"))
            .json(&json!({"senderId": "bot", "content": "via rest", "roomId": "r1"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let event = next_event(&mut a).await;
        assert_eq!(event["event"], "receive_message");
        assert_eq!(event["data"], created);
    }

    #[tokio::test]
    async fn invalid_frames_get_error_event() {
        let (handle, _db) = start_test_server().await;
        let mut a = connect(&handle).await;

        a.send(WsMessage::text("not json")).await.unwrap();
        let event = next_event(&mut a).await;
        assert_eq!(event, json!({"event": "error", "data": {"message": "Invalid event"}}));

        send(&mut a, json!({"event": "dance", "data": {}})).await;
        let event = next_event(&mut a).await;
        assert_eq!(event["event"], "error");
    }

    #[tokio::test]
    async fn failed_send_errors_only_the_sender() {
        let (handle, _db) = start_test_server().await;
        let mut a = connect(&handle).await;
        let mut b = connect(&handle).await;
        send(&mut a, json!({"event": "join_room", "data": "r1"})).await;
        send(&mut b, json!({"event": "join_room", "data": "r1"})).await;
        wait_for_subscribers(&handle, "r1", 2).await;

        send(
            &mut a,
            json!({
                "event": "send_message",
                "data": {"senderId": "A", "content": "", "roomId": "r1"}
            }),
        )
        .await;

        let event = next_event(&mut a).await;
        assert_eq!(event, json!({"event": "error", "data": {"message": "Failed to send message"}}));
        let other = tokio::time::timeout(Duration::from_millis(200), b.next()).await;
        assert!(other.is_err());
    }

    #[tokio::test]
    async fn closing_socket_cleans_up_session() {
        let (handle, _db) = start_test_server().await;
        let mut a = connect(&handle).await;
        send(&mut a, json!({"event": "join_room", "data": "r1"})).await;
        wait_for_subscribers(&handle, "r1", 1).await;
        assert_eq!(handle.dispatcher().sessions().count(), 1);

        a.close(None).await.unwrap();
        wait_for_subscribers(&handle, "r1", 0).await;
        for _ in 0..200 {
            if handle.dispatcher().sessions().count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.dispatcher().sessions().count(), 0);
        assert_eq!(handle.dispatcher().rooms().room_count(), 0);
    }
}
