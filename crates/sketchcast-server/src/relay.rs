//! HTTP routes and the per-connection relay loop.

use crate::rooms::{AppState, Envelope};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use sketchcast_core::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "SketchCast Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Where a connection currently stands.
struct Connection {
    id: Uuid,
    /// Session identity announced in `join`.
    user_id: Option<String>,
    room: Option<String>,
    room_rx: Option<broadcast::Receiver<Envelope>>,
}

impl Connection {
    fn label(&self) -> &str {
        self.user_id.as_deref().unwrap_or("anonymous")
    }

    fn leave(&mut self, state: &AppState) {
        self.room_rx = None;
        if let Some(room) = self.room.take() {
            state.leave_room(&room, self.id);
            state.announce(
                &room,
                self.id,
                ServerMessage::PeerLeft {
                    user_id: self.label().to_string(),
                },
            );
            info!("Peer {} left room {}", self.label(), room);
        }
    }
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send; false means the socket is gone.
async fn send_message(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn send_error(sender: &mut Sender, message: impl Into<String>) -> bool {
    send_message(sender, &ServerMessage::Error { message: message.into() }).await
}

/// Next message from the joined room; never resolves before a join.
async fn next_envelope(room_rx: &mut Option<broadcast::Receiver<Envelope>>) -> Option<Envelope> {
    let Some(rx) = room_rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(envelope) => return Some(envelope),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Only the newest snapshot matters; keep going.
                debug!("Connection lagged, skipped {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Apply one client message. Returns false once the socket is gone.
async fn handle_client_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &AppState,
    sender: &mut Sender,
) -> bool {
    match msg {
        ClientMessage::Join { user_id, room } => {
            conn.leave(state);
            conn.user_id = Some(user_id);

            let membership = state.join_room(&room, conn.id);
            conn.room_rx = Some(membership.rx);
            conn.room = Some(room.clone());

            // Announced before confirming, so it precedes anything the
            // newcomer can trigger.
            state.announce(
                &room,
                conn.id,
                ServerMessage::PeerJoined {
                    user_id: conn.label().to_string(),
                },
            );
            info!("Peer {} joined room {} ({} peers)", conn.label(), room, membership.peer_count);

            send_message(
                sender,
                &ServerMessage::Joined {
                    room,
                    peer_count: membership.peer_count,
                    snapshot: membership.snapshot,
                },
            )
            .await
        }
        ClientMessage::Update { data_url, user_id } => match &conn.room {
            Some(room) => {
                // Snapshots are attributed to the identity given at join.
                let from = conn.label();
                if user_id != from {
                    debug!("Update from {} claims user_id {}", from, user_id);
                }
                if data_url.is_empty() {
                    info!("Peer {} cleared room {}", from, room);
                }
                state.publish(room, from, data_url);
                true
            }
            None => send_error(sender, "Join a room before sending updates").await,
        },
        ClientMessage::Leave => {
            conn.leave(state);
            true
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection {
        id: Uuid::new_v4(),
        user_id: None,
        room: None,
        room_rx: None,
    };
    info!("New connection: {}", conn.id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let alive = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(client_msg, &mut conn, &state, &mut sender).await
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn.id, e);
                                send_error(&mut sender, format!("Invalid message: {}", e)).await
                            }
                        };
                        if !alive {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        if !send_error(&mut sender, "Binary frames are not supported").await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.id, e);
                        break;
                    }
                }
            }

            envelope = next_envelope(&mut conn.room_rx) => {
                match envelope {
                    Some((skip, server_msg)) => {
                        if skip != Some(conn.id) && !send_message(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    None => conn.room_rx = None,
                }
            }
        }
    }

    conn.leave(&state);
    info!("Connection closed: {}", conn.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_relay() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(AppState::new()))).await.unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, msg: &ClientMessage) {
        let json = serde_json::to_string(msg).unwrap();
        ws.send(tungstenite::Message::text(json)).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for the relay")
                .unwrap()
                .unwrap();
            if let tungstenite::Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Skip presence notifications.
    async fn recv_snapshot(ws: &mut Client) -> ServerMessage {
        loop {
            match recv(ws).await {
                ServerMessage::PeerJoined { .. } | ServerMessage::PeerLeft { .. } => continue,
                other => return other,
            }
        }
    }

    async fn join(ws: &mut Client, user_id: &str, room: &str) -> ServerMessage {
        send(
            ws,
            &ClientMessage::Join {
                user_id: user_id.to_string(),
                room: room.to_string(),
            },
        )
        .await;
        recv(ws).await
    }

    fn update(data_url: &str, user_id: &str) -> ClientMessage {
        ClientMessage::Update {
            data_url: data_url.to_string(),
            user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let addr = spawn_relay().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok"));
    }

    #[tokio::test]
    async fn test_update_reaches_everyone_in_room() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        let mut carol = connect(addr).await;

        assert_eq!(
            join(&mut alice, "alice", "studio").await,
            ServerMessage::Joined { room: "studio".to_string(), peer_count: 1, snapshot: None }
        );
        assert!(matches!(join(&mut bob, "bob", "studio").await, ServerMessage::Joined { peer_count: 2, .. }));
        assert_eq!(recv(&mut alice).await, ServerMessage::PeerJoined { user_id: "bob".to_string() });
        join(&mut carol, "carol", "elsewhere").await;

        send(&mut alice, &update("data:image/png;base64,AAAA", "alice")).await;
        let expected = ServerMessage::Snapshot {
            data_url: "data:image/png;base64,AAAA".to_string(),
            from: Some("alice".to_string()),
        };
        assert_eq!(recv_snapshot(&mut alice).await, expected);
        assert_eq!(recv_snapshot(&mut bob).await, expected);

        // Other rooms stay quiet.
        let quiet = tokio::time::timeout(Duration::from_millis(200), carol.next()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_late_joiner_and_clear() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr).await;
        join(&mut alice, "alice", "studio").await;

        send(&mut alice, &update("data:image/png;base64,AAAA", "alice")).await;
        recv_snapshot(&mut alice).await;

        let mut bob = connect(addr).await;
        assert_eq!(
            join(&mut bob, "bob", "studio").await,
            ServerMessage::Joined {
                room: "studio".to_string(),
                peer_count: 2,
                snapshot: Some("data:image/png;base64,AAAA".to_string()),
            }
        );

        send(&mut alice, &update("", "alice")).await;
        let cleared = ServerMessage::Snapshot { data_url: String::new(), from: Some("alice".to_string()) };
        assert_eq!(recv_snapshot(&mut bob).await, cleared);
        assert_eq!(recv_snapshot(&mut alice).await, cleared);

        let mut carol = connect(addr).await;
        assert!(matches!(
            join(&mut carol, "carol", "studio").await,
            ServerMessage::Joined { snapshot: None, peer_count: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_peer_left_on_disconnect() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        join(&mut alice, "alice", "studio").await;
        join(&mut bob, "bob", "studio").await;
        recv(&mut alice).await;

        bob.close(None).await.unwrap();
        assert_eq!(recv(&mut alice).await, ServerMessage::PeerLeft { user_id: "bob".to_string() });
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let addr = spawn_relay().await;
        let mut ws = connect(addr).await;

        send(&mut ws, &update("data:image/png;base64,AAAA", "alice")).await;
        assert!(matches!(recv(&mut ws).await, ServerMessage::Error { .. }));

        ws.send(tungstenite::Message::text("not json")).await.unwrap();
        assert!(matches!(recv(&mut ws).await, ServerMessage::Error { .. }));

        // The connection survives both.
        assert!(matches!(join(&mut ws, "alice", "studio").await, ServerMessage::Joined { .. }));
    }

    #[tokio::test]
    async fn test_join_defaults_to_lobby() {
        let addr = spawn_relay().await;
        let mut ws = connect(addr).await;
        ws.send(tungstenite::Message::text(r#"{"type":"join","user_id":"alice"}"#))
            .await
            .unwrap();
        assert!(matches!(recv(&mut ws).await, ServerMessage::Joined { room, .. } if room == "lobby"));
    }

    #[tokio::test]
    async fn test_snapshot_attributed_to_joined_identity() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr).await;
        join(&mut alice, "alice", "studio").await;

        send(&mut alice, &update("data:image/png;base64,AAAA", "mallory")).await;
        assert_eq!(
            recv_snapshot(&mut alice).await,
            ServerMessage::Snapshot {
                data_url: "data:image/png;base64,AAAA".to_string(),
                from: Some("alice".to_string()),
            }
        );
    }
}
