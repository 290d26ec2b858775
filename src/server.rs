//! ChatServer Actor implementation
//!
//! The central actor that owns the router and with it the presence registry.
//! Sessions never touch shared state directly: they send `ServerCommand`s
//! over an mpsc channel and the actor applies them one at a time.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::AppError;
use crate::message::{PrivateMessage, PublicMessage, ServerMessage};
use crate::router::Router;
use crate::types::{ConnectionId, Identity};

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Bind an identity to a connection and announce it
    Join {
        connection_id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
        history: Vec<PublicMessage>,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    /// Connection closed
    Leave {
        connection_id: ConnectionId,
    },
    /// Broadcast an already-persisted public message
    Public {
        connection_id: ConnectionId,
        message: PublicMessage,
    },
    /// Route an already-persisted private message
    Private {
        connection_id: ConnectionId,
        message: PrivateMessage,
    },
    /// Typing indicator changed
    Typing {
        connection_id: ConnectionId,
        is_typing: bool,
    },
}

/// The main ChatServer actor
///
/// Processes commands sequentially, so registry mutations never race. No
/// command handler awaits: store I/O happens in the sessions and delivery
/// to connections never blocks.
pub struct ChatServer {
    router: Router,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            router: Router::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                connection_id,
                identity,
                sender,
                history,
                reply,
            } => {
                let result = self.handle_join(connection_id, identity, sender, history);
                // The session may have gone away while waiting; nothing to undo.
                let _ = reply.send(result);
            }
            ServerCommand::Leave { connection_id } => {
                self.handle_leave(connection_id);
            }
            ServerCommand::Public {
                connection_id,
                message,
            } => {
                if self.router.registry().contains(connection_id) {
                    self.router.broadcast_public(message);
                }
            }
            ServerCommand::Private {
                connection_id,
                message,
            } => {
                if self.router.registry().contains(connection_id) {
                    self.router.route_private(connection_id, message);
                }
            }
            ServerCommand::Typing {
                connection_id,
                is_typing,
            } => {
                self.router.typing(connection_id, is_typing);
            }
        }
    }

    /// Handle a join request
    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
        history: Vec<PublicMessage>,
    ) -> Result<(), AppError> {
        let name = identity.clone();
        self.router.join(connection_id, identity, sender, history)?;

        info!("Connection {} joined as '{}'", connection_id, name);
        debug!("Online users: {}", self.router.registry().len());
        Ok(())
    }

    /// Handle connection close
    fn handle_leave(&mut self, connection_id: ConnectionId) {
        if let Some(identity) = self.router.leave(connection_id) {
            info!("'{}' left (connection {})", identity, connection_id);
            debug!("Online users: {}", self.router.registry().len());
        }
    }
}
