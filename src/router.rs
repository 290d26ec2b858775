//! Router / broadcast engine
//!
//! Decides which joined connections receive each outbound event. The
//! router owns the presence registry; only the `ChatServer` actor holds a
//! `Router`, so every mutation is serialized through the actor.
//!
//! Delivery never waits: a connection whose outbound buffer is full misses
//! the event, so one client that stops reading cannot stall the others.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppError, SendError};
use crate::message::{PrivateMessage, PublicMessage, ServerMessage};
use crate::presence::PresenceRegistry;
use crate::types::{ConnectionId, Identity};

/// Fan-out over the presence registry
#[derive(Debug, Default)]
pub struct Router {
    registry: PresenceRegistry,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the registry
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Register a connection and announce it
    ///
    /// The joiner gets `history_public` then `join_success`; everyone gets
    /// the new presence list; everyone else gets `user_joined`.
    pub fn join(
        &mut self,
        id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
        history: Vec<PublicMessage>,
    ) -> Result<(), AppError> {
        self.registry.register(id, identity.clone(), sender)?;

        self.deliver(id, ServerMessage::HistoryPublic(history));
        self.deliver(
            id,
            ServerMessage::JoinSuccess {
                username: identity.to_string(),
            },
        );

        self.broadcast_presence();
        self.notify_joined(id, &identity);
        Ok(())
    }

    /// Unregister a connection and announce the departure
    ///
    /// Returns the identity that left, or `None` if the connection never
    /// joined or already left.
    pub fn leave(&mut self, id: ConnectionId) -> Option<Identity> {
        let identity = self.registry.unregister(id)?;
        self.broadcast_presence();
        self.notify_left(&identity);
        Some(identity)
    }

    /// Record a typing change and tell everyone else
    ///
    /// Presence is not re-broadcast for typing changes.
    pub fn typing(&mut self, id: ConnectionId, is_typing: bool) {
        self.registry.set_typing(id, is_typing);
        let Some(identity) = self.registry.get(id).map(|c| c.identity.clone()) else {
            return;
        };
        self.broadcast_typing(id, &identity, is_typing);
    }

    /// Deliver a public message to every joined connection, sender included
    pub fn broadcast_public(&self, message: PublicMessage) {
        self.fan_out(ServerMessage::NewMessage(message), None);
    }

    /// Echo a private message to its sender and deliver it to the recipient
    ///
    /// The recipient is the first connection joined under `message.to`; if
    /// nobody by that name is online only the sender sees it.
    pub fn route_private(&self, origin: ConnectionId, message: PrivateMessage) {
        let recipient = self.registry.find_by_name(&message.to);
        let event = ServerMessage::PrivateMessageReceived(message);

        match recipient {
            Some(to) if to != origin => {
                self.deliver(origin, event.clone());
                self.deliver(to, event);
            }
            Some(_) => self.deliver(origin, event),
            None => {
                debug!(connection = %origin, "Private message recipient offline");
                self.deliver(origin, event);
            }
        }
    }

    /// Tell every connection except `origin` that `identity` is (not) typing
    pub fn broadcast_typing(
        &self,
        origin: ConnectionId,
        identity: &Identity,
        is_typing: bool,
    ) {
        let event = ServerMessage::UserTyping {
            username: identity.to_string(),
            is_typing,
        };
        self.fan_out(event, Some(origin));
    }

    /// Send the current presence list to every connection
    pub fn broadcast_presence(&self) {
        let snapshot = self.registry.snapshot();
        self.fan_out(ServerMessage::OnlineUsersUpdate(snapshot), None);
    }

    /// Announce a join to everyone but the joiner
    pub fn notify_joined(&self, joined: ConnectionId, identity: &Identity) {
        let event = ServerMessage::UserJoined {
            username: identity.to_string(),
        };
        self.fan_out(event, Some(joined));
    }

    /// Announce a departure to everyone still joined
    pub fn notify_left(&self, identity: &Identity) {
        let event = ServerMessage::UserLeft {
            username: identity.to_string(),
        };
        self.fan_out(event, None);
    }

    /// Send to one joined connection
    pub fn deliver(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(conn) = self.registry.get(id) {
            report(id, conn.send(msg));
        }
    }

    fn fan_out(&self, msg: ServerMessage, except: Option<ConnectionId>) {
        for conn in self.registry.ordered() {
            if Some(conn.id) == except {
                continue;
            }
            report(conn.id, conn.send(msg.clone()));
        }
    }
}

fn report(id: ConnectionId, result: Result<(), SendError>) {
    match result {
        Ok(()) => {}
        Err(SendError::Full) => {
            warn!(connection = %id, "Outbound buffer full, dropping event");
        }
        Err(SendError::ChannelClosed) => {
            debug!(connection = %id, "Outbound channel closed");
        }
    }
}
