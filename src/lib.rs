//! Multi-user WebSocket Chat Server Library
//!
//! A single-room chat server built with tokio-tungstenite: users join with a
//! display name, exchange public and private messages, see who is online and
//! who is typing, and get message history from a SQLite-backed store.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor; it owns the `Router`, which owns the
//!   `PresenceRegistry` of joined connections
//! - Each connection runs a `Session` state machine (`Unjoined -> Joined ->
//!   Closed`) in its own task
//! - Sessions write to the `MessageStore` themselves, then ask the actor to
//!   route, so slow persistence never stalls other connections
//!
//! # Protocol
//! Every WebSocket text frame is `{"event": "<name>", "data": <payload>}`.
//! Inbound: `join`, `message_to_all`, `private_message`,
//! `get_private_history`, `typing`. Outbound: `history_public`,
//! `history_private`, `new_message`, `private_message_received`,
//! `join_success`, `user_joined`, `user_left`, `online_users_update`,
//! `user_typing`.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use lobby_chat::{handle_connection, ChatServer, MemoryStore, SessionContext, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     let (commands, cmd_rx) = mpsc::channel(256);
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     let ctx = SessionContext {
//!         commands,
//!         store: Arc::new(MemoryStore::new()),
//!         settings: SessionSettings::default(),
//!     };
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, ctx.clone(), 64));
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod presence;
pub mod router;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{Config, StoreKind};
pub use connection::Connection;
pub use error::{AppError, SendError, StoreError};
pub use handler::handle_connection;
pub use message::{ClientMessage, OnlineUser, PrivateMessage, PublicMessage, ServerMessage};
pub use presence::PresenceRegistry;
pub use router::Router;
pub use server::{ChatServer, ServerCommand};
pub use session::{Session, SessionContext, SessionSettings, SessionState};
pub use store::{MemoryStore, MessageStore, SqliteStore};
pub use types::{ConnectionId, Identity};
