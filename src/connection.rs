//! Connection struct definition
//!
//! Represents a joined connection with its identity, typing state and
//! outbound message channel.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{ConnectionId, Identity};

/// Joined connection information
///
/// Created when a join succeeds and dropped on disconnect, so every
/// `Connection` carries an identity.
#[derive(Debug)]
pub struct Connection {
    /// Transport-assigned identifier
    pub id: ConnectionId,
    /// Display name bound at join
    pub identity: Identity,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Currently typing flag
    pub is_typing: bool,
    /// Join order within the registry
    pub(crate) seq: u64,
}

impl Connection {
    /// Create a new connection entry with typing cleared
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
        seq: u64,
    ) -> Self {
        Self {
            id,
            identity,
            sender,
            is_typing: false,
            seq,
        }
    }

    /// Queue a message for this connection without waiting
    ///
    /// Returns `Full` if the client is not draining its buffer (the message
    /// is dropped) and `ChannelClosed` if the client disconnected.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Set typing status
    pub fn set_typing(&mut self, is_typing: bool) {
        self.is_typing = is_typing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let conn = Connection::new(ConnectionId::new(), Identity::parse("Alice").unwrap(), tx, 0);

        assert_eq!(conn.identity.as_str(), "Alice");
        assert!(!conn.is_typing);
    }

    fn joined() -> ServerMessage {
        ServerMessage::JoinSuccess {
            username: "Alice".to_string(),
        }
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::new(ConnectionId::new(), Identity::parse("Alice").unwrap(), tx, 0);
        drop(rx);

        assert!(matches!(conn.send(joined()), Err(SendError::ChannelClosed)));
    }

    #[test]
    fn test_send_to_full_buffer_does_not_wait() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), Identity::parse("Alice").unwrap(), tx, 0);

        assert!(conn.send(joined()).is_ok());
        assert!(matches!(conn.send(joined()), Err(SendError::Full)));

        assert_eq!(rx.try_recv().unwrap(), joined());
        assert!(conn.send(joined()).is_ok());
    }
}
