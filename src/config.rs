//! Server configuration
//!
//! Defaults are overridden by environment variables (a `.env` file is
//! loaded by the binary), and the bind address by the first CLI argument.

use std::time::Duration;

use crate::session::SessionSettings;

/// Which message store backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on
    pub addr: String,
    /// SQLite connection URL
    pub database_url: String,
    /// SQLite pool size
    pub max_db_connections: u32,
    pub store: StoreKind,
    /// Public messages sent to a joining user
    pub history_limit: u32,
    /// Longest wait for one store operation, in milliseconds
    pub store_timeout_ms: u64,
    /// ChatServer command channel size
    pub command_buffer: usize,
    /// Per-connection outbound channel size
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
            database_url: "sqlite://chat.db".to_string(),
            max_db_connections: 8,
            store: StoreKind::Sqlite,
            history_limit: 50,
            store_timeout_ms: 2_000,
            command_buffer: 256,
            outbound_buffer: 64,
        }
    }
}

impl Config {
    /// Defaults overridden by `CHAT_*` / `DATABASE_URL` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns
    ///
    /// Unparsable values are ignored and the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("CHAT_ADDR") {
            config.addr = addr;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(store) = lookup("CHAT_STORE") {
            match store.to_ascii_lowercase().as_str() {
                "memory" => config.store = StoreKind::Memory,
                "sqlite" => config.store = StoreKind::Sqlite,
                _ => {}
            }
        }
        parse_into(&lookup, "CHAT_DB_CONNECTIONS", &mut config.max_db_connections);
        parse_into(&lookup, "CHAT_HISTORY_LIMIT", &mut config.history_limit);
        parse_into(&lookup, "CHAT_STORE_TIMEOUT_MS", &mut config.store_timeout_ms);
        parse_into(&lookup, "CHAT_COMMAND_BUFFER", &mut config.command_buffer);
        parse_into(&lookup, "CHAT_OUTBOUND_BUFFER", &mut config.outbound_buffer);

        config
    }

    /// Override the bind address (from the command line)
    pub fn with_addr(mut self, addr: Option<String>) -> Self {
        if let Some(addr) = addr {
            self.addr = addr;
        }
        self
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            history_limit: self.history_limit,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(value) = lookup(key).and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.addr, "127.0.0.1:3000");
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.session_settings().history_limit, 50);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_ADDR", "0.0.0.0:9000"),
            ("CHAT_STORE", "Memory"),
            ("CHAT_HISTORY_LIMIT", "20"),
            ("CHAT_STORE_TIMEOUT_MS", "250"),
        ]));

        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.history_limit, 20);
        assert_eq!(
            config.session_settings().store_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_HISTORY_LIMIT", "lots"),
            ("CHAT_STORE", "redis"),
        ]));
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.store, StoreKind::Sqlite);
    }

    #[test]
    fn test_cli_addr_wins() {
        let config = Config::from_lookup(lookup(&[("CHAT_ADDR", "0.0.0.0:9000")]))
            .with_addr(Some("127.0.0.1:4000".to_string()));
        assert_eq!(config.addr, "127.0.0.1:4000");
    }
}
