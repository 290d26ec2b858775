//! Error types for the chat server
//!
//! Defines application-level errors, store errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// session-local errors that are logged and recovered from.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Username empty after trimming
    #[error("Username must not be empty")]
    InvalidJoin,

    /// Connection already bound to an identity
    #[error("Connection already joined")]
    AlreadyJoined,

    /// Message store could not be reached
    #[error("Message store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store did not answer within the configured wait
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed or full channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The receiver is not keeping up; the message was dropped
    #[error("Channel full")]
    Full,
}
