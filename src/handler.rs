//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! frame parsing, and bidirectional communication through a `Session`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::session::{Session, SessionContext};
use crate::types::ConnectionId;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, runs the session until either side
/// closes, then reports the disconnect.
pub async fn handle_connection(
    stream: TcpStream,
    ctx: SessionContext,
    outbound_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);
    let mut session = Session::new(connection_id, ctx, msg_tx);

    // Write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Read loop (WebSocket -> Session), ends early if the writer dies
    loop {
        let msg_result = tokio::select! {
            next = ws_receiver.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut write_task => {
                debug!("Write task completed for {}", connection_id);
                break;
            }
        };

        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => match session.handle(client_msg).await {
                    Ok(()) => {}
                    Err(AppError::ChannelSend) => {
                        error!("ChatServer closed, dropping connection {}", connection_id);
                        break;
                    }
                    Err(e) => {
                        warn!("Rejected event from {}: {}", connection_id, e);
                    }
                },
                Err(e) => {
                    warn!("Invalid event from {}: {}", connection_id, e);
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close frame", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite
                debug!("Ping from {}", connection_id);
            }
            Ok(_) => {
                // Binary or other message types - ignore
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    session.disconnect().await;
    // Dropping the session releases the last outbound sender once the
    // actor has processed the leave, which ends the write task.
    drop(session);
    if !write_task.is_finished() {
        let _ = write_task.await;
    }

    info!("Connection {} closed", connection_id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::server::ChatServer;
    use crate::session::SessionSettings;
    use crate::store::MemoryStore;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<TcpStream>,
    >;

    async fn start() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (commands, receiver) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(receiver).run());
        let ctx = SessionContext {
            commands,
            store: Arc::new(MemoryStore::new()),
            settings: SessionSettings::default(),
        };

        let outbound_buffer = Config::default().outbound_buffer;
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, ctx.clone(), outbound_buffer));
            }
        });

        format!("ws://{}", addr)
    }

    async fn send(client: &mut Client, json: &str) {
        client.send(Message::Text(json.to_string().into())).await.unwrap();
    }

    async fn recv(client: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_chat_over_websocket() {
        let url = start().await;
        let (mut alice, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut bob, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        // Garbage and pre-join events are ignored without closing the socket.
        send(&mut alice, "not json").await;
        send(&mut alice, r#"{"event":"message_to_all","data":{"text":"early"}}"#).await;
        send(&mut alice, r#"{"event":"join","data":{"username":"alice"}}"#).await;
        assert_eq!(recv(&mut alice).await, ServerMessage::HistoryPublic(Vec::new()));
        assert_eq!(
            recv(&mut alice).await,
            ServerMessage::JoinSuccess {
                username: "alice".to_string()
            }
        );
        assert!(matches!(
            recv(&mut alice).await,
            ServerMessage::OnlineUsersUpdate(users) if users.len() == 1
        ));

        send(&mut bob, r#"{"event":"join","data":{"username":"bob"}}"#).await;
        for _ in 0..3 {
            recv(&mut bob).await;
        }
        assert!(matches!(
            recv(&mut alice).await,
            ServerMessage::OnlineUsersUpdate(users) if users.len() == 2
        ));
        assert_eq!(
            recv(&mut alice).await,
            ServerMessage::UserJoined {
                username: "bob".to_string()
            }
        );

        send(&mut alice, r#"{"event":"message_to_all","data":{"text":"hi"}}"#).await;
        for client in [&mut alice, &mut bob] {
            match recv(client).await {
                ServerMessage::NewMessage(m) => assert_eq!((m.from.as_str(), m.text.as_str()), ("alice", "hi")),
                other => panic!("expected new_message, got {:?}", other),
            }
        }

        alice.close(None).await.unwrap();
        assert!(matches!(
            recv(&mut bob).await,
            ServerMessage::OnlineUsersUpdate(users) if users.len() == 1
        ));
        assert_eq!(
            recv(&mut bob).await,
            ServerMessage::UserLeft {
                username: "alice".to_string()
            }
        );
    }
}
