//! Presence registry
//!
//! Live mapping of joined connections to identities and typing state.
//! Entries are ordered by join sequence so snapshots and name lookups
//! follow join order.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{OnlineUser, ServerMessage};
use crate::types::{ConnectionId, Identity};

/// Registry of joined connections
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<ConnectionId, Connection>,
    /// Join sequence -> connection, kept in step with `entries`
    order: BTreeMap<u64, ConnectionId>,
    next_seq: u64,
}

impl PresenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of joined connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if a connection has joined
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Look up a joined connection
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.entries.get(&id)
    }

    /// Bind `identity` to a connection
    ///
    /// A connection may join at most once; a second attempt fails with
    /// `AlreadyJoined` and leaves the first identity in place.
    pub fn register(
        &mut self,
        id: ConnectionId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), AppError> {
        if self.entries.contains_key(&id) {
            return Err(AppError::AlreadyJoined);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        debug!(connection = %id, identity = %identity, "Presence: registered");
        self.order.insert(seq, id);
        self.entries
            .insert(id, Connection::new(id, identity, sender, seq));
        Ok(())
    }

    /// Remove a connection, returning its identity
    ///
    /// Unknown connections are a no-op, so disconnect before join and
    /// repeated disconnects are safe.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Identity> {
        let conn = self.entries.remove(&id)?;
        self.order.remove(&conn.seq);
        debug!(connection = %id, identity = %conn.identity, "Presence: unregistered");
        Some(conn.identity)
    }

    /// First connection (in join order) registered under `name`
    ///
    /// Display names are not unique; among duplicates the earliest join wins.
    pub fn find_by_name(&self, name: &str) -> Option<ConnectionId> {
        self.ordered()
            .find(|c| c.identity.as_str() == name)
            .map(|c| c.id)
    }

    /// Update the typing flag; absent connections are ignored
    pub fn set_typing(&mut self, id: ConnectionId, is_typing: bool) {
        if let Some(conn) = self.entries.get_mut(&id) {
            conn.set_typing(is_typing);
        }
    }

    /// Current members as `{username, isTyping}` in join order
    pub fn snapshot(&self) -> Vec<OnlineUser> {
        self.ordered()
            .map(|c| OnlineUser {
                username: c.identity.to_string(),
                is_typing: c.is_typing,
            })
            .collect()
    }

    /// All connections in join order, for fan-out
    pub(crate) fn ordered(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.order.values().filter_map(|id| self.entries.get(id))
    }
}
