//! Per-connection session gateway
//!
//! A `Session` is the state machine of one connection:
//! `Unjoined -> Joined -> Closed`. It validates inbound events, performs
//! message store I/O (outside the actor, with a bounded wait) and then hands
//! routing over to the `ChatServer` actor. Because a session processes its
//! events one at a time and the command channel is FIFO, messages from one
//! sender reach every recipient in the order they were sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, PrivateMessage, PublicMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::store::{with_deadline, MessageStore};
use crate::types::{ConnectionId, Identity};

/// Observable lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined,
    Closed,
}

#[derive(Debug)]
enum State {
    Unjoined,
    Joined(Identity),
    Closed,
}

/// Tunables shared by every session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Number of public messages sent on join
    pub history_limit: u32,
    /// Longest wait for a single store operation
    pub store_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            store_timeout: Duration::from_secs(2),
        }
    }
}

/// Handles shared by every session: the actor channel and the store
#[derive(Clone)]
pub struct SessionContext {
    pub commands: mpsc::Sender<ServerCommand>,
    pub store: Arc<dyn MessageStore>,
    pub settings: SessionSettings,
}

/// State machine for one connection
pub struct Session {
    id: ConnectionId,
    ctx: SessionContext,
    outbound: mpsc::Sender<ServerMessage>,
    state: State,
}

/// Wall-clock display time stamped on each message
fn display_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

impl Session {
    /// Create an unjoined session delivering to `outbound`
    pub fn new(
        id: ConnectionId,
        ctx: SessionContext,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            ctx,
            outbound,
            state: State::Unjoined,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Unjoined => SessionState::Unjoined,
            State::Joined(_) => SessionState::Joined,
            State::Closed => SessionState::Closed,
        }
    }

    /// Identity bound at join, if joined
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            State::Joined(identity) => Some(identity),
            _ => None,
        }
    }

    /// Process one inbound event
    ///
    /// Only `join` is meaningful before joining; everything else is ignored
    /// until then. Errors are local to this connection: `InvalidJoin` and
    /// `AlreadyJoined` leave the session as it was, `ChannelSend` means the
    /// actor is gone.
    pub async fn handle(&mut self, msg: ClientMessage) -> Result<(), AppError> {
        let identity = match &self.state {
            State::Closed => return Ok(()),
            State::Unjoined => {
                return match msg {
                    ClientMessage::Join { username } => self.join(&username).await,
                    other => {
                        debug!("Ignoring {:?} from unjoined connection {}", other, self.id);
                        Ok(())
                    }
                };
            }
            State::Joined(identity) => identity.clone(),
        };

        match msg {
            ClientMessage::Join { .. } => Err(AppError::AlreadyJoined),
            ClientMessage::MessageToAll { text } => self.send_public(&identity, text).await,
            ClientMessage::PrivateMessage { to, text } => {
                self.send_private(&identity, to, text).await
            }
            ClientMessage::GetPrivateHistory(other) => {
                self.private_history(&identity, &other).await
            }
            ClientMessage::Typing { is_typing } => {
                self.command(ServerCommand::Typing {
                    connection_id: self.id,
                    is_typing,
                })
                .await
            }
        }
    }

    /// Transport closed; announce the departure if joined
    ///
    /// Safe to call in any state and more than once.
    pub async fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, State::Closed);
        if let State::Joined(identity) = previous {
            debug!("Session for '{}' closing", identity);
            let _ = self
                .command(ServerCommand::Leave {
                    connection_id: self.id,
                })
                .await;
        }
    }

    async fn join(&mut self, username: &str) -> Result<(), AppError> {
        let identity = Identity::parse(username)?;

        let history = match with_deadline(
            self.ctx.settings.store_timeout,
            self.ctx.store.recent_public(self.ctx.settings.history_limit),
        )
        .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("{}; joining {} with empty history", AppError::from(e), self.id);
                Vec::new()
            }
        };

        let (reply, joined) = oneshot::channel();
        self.command(ServerCommand::Join {
            connection_id: self.id,
            identity: identity.clone(),
            sender: self.outbound.clone(),
            history,
            reply,
        })
        .await?;
        joined.await.map_err(|_| AppError::ChannelSend)??;

        info!("Session {} joined as '{}'", self.id, identity);
        self.state = State::Joined(identity);
        Ok(())
    }

    async fn send_public(&self, identity: &Identity, text: String) -> Result<(), AppError> {
        let time = display_time();

        if let Err(e) = with_deadline(
            self.ctx.settings.store_timeout,
            self.ctx.store.append_public(identity.as_str(), &text, &time),
        )
        .await
        {
            warn!("{}; public message from '{}' not persisted", AppError::from(e), identity);
        }

        self.command(ServerCommand::Public {
            connection_id: self.id,
            message: PublicMessage {
                from: identity.to_string(),
                text,
                time,
            },
        })
        .await
    }

    async fn send_private(
        &self,
        identity: &Identity,
        to: String,
        text: String,
    ) -> Result<(), AppError> {
        let time = display_time();

        if let Err(e) = with_deadline(
            self.ctx.settings.store_timeout,
            self.ctx
                .store
                .append_private(identity.as_str(), &to, &text, &time),
        )
        .await
        {
            warn!(
                "{}; private message '{}' -> '{}' not persisted",
                AppError::from(e),
                identity,
                to
            );
        }

        self.command(ServerCommand::Private {
            connection_id: self.id,
            message: PrivateMessage {
                from: identity.to_string(),
                to,
                text,
                time,
            },
        })
        .await
    }

    async fn private_history(&self, identity: &Identity, other: &str) -> Result<(), AppError> {
        let thread = match with_deadline(
            self.ctx.settings.store_timeout,
            self.ctx.store.private_thread(identity.as_str(), other),
        )
        .await
        {
            Ok(thread) => thread,
            Err(e) => {
                warn!("{}; empty private history for '{}'", AppError::from(e), identity);
                Vec::new()
            }
        };

        self.outbound
            .send(ServerMessage::HistoryPrivate(thread))
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    async fn command(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.ctx
            .commands
            .send(cmd)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}
