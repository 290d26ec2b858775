//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol. Every frame is a named event
//! with a payload, `{"event": "...", "data": ...}`, using Serde's adjacently
//! tagged enums for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

/// A broadcast chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMessage {
    pub from: String,
    pub text: String,
    pub time: String,
}

/// A direct message between two users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub from: String,
    pub to: String,
    pub text: String,
    pub time: String,
}

/// One entry of the online users list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub username: String,
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

/// Client → Server message
///
/// All events a client may send. Disconnect is not a frame: the
/// transport reports it when the socket closes.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a display name to this connection
    Join { username: String },
    /// Send a message to everyone
    MessageToAll { text: String },
    /// Send a direct message to a user by name
    PrivateMessage { to: String, text: String },
    /// Request the conversation with another user
    GetPrivateHistory(String),
    /// Typing indicator
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Recent public messages, oldest first
    HistoryPublic(Vec<PublicMessage>),
    /// Conversation with one user, oldest first
    HistoryPrivate(Vec<PrivateMessage>),
    /// A public message was sent
    NewMessage(PublicMessage),
    /// A private message was sent by or to this connection
    PrivateMessageReceived(PrivateMessage),
    /// Join accepted
    JoinSuccess { username: String },
    /// Another user joined
    UserJoined { username: String },
    /// A user left
    UserLeft { username: String },
    /// Current presence list
    OnlineUsersUpdate(Vec<OnlineUser>),
    /// Another user started or stopped typing
    UserTyping {
        username: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}
