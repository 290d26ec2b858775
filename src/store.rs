//! Message store
//!
//! Append-only log of public and private messages behind the
//! `MessageStore` trait. `SqliteStore` persists to SQLite through sqlx;
//! `MemoryStore` keeps everything in process.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;
use crate::message::{PrivateMessage, PublicMessage};

/// Durable message log
///
/// Public and private messages use independent, increasing id sequences.
/// Queries return messages oldest first.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a public message, returning its id
    async fn append_public(&self, username: &str, text: &str, time: &str)
        -> Result<i64, StoreError>;

    /// Append a private message, returning its id
    async fn append_private(
        &self,
        from: &str,
        to: &str,
        text: &str,
        time: &str,
    ) -> Result<i64, StoreError>;

    /// The `limit` most recent public messages, oldest first
    async fn recent_public(&self, limit: u32) -> Result<Vec<PublicMessage>, StoreError>;

    /// Every private message exchanged between `user_a` and `user_b`, oldest first
    async fn private_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<PrivateMessage>, StoreError>;
}

/// Run a store operation, giving up after `wait`
pub async fn with_deadline<T, F>(wait: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(wait, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(wait)),
    }
}

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS public_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        text TEXT NOT NULL,
        time TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS private_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_user TEXT NOT NULL,
        to_user TEXT NOT NULL,
        text TEXT NOT NULL,
        time TEXT NOT NULL
    )",
];

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!("Message store opened at {}", url);
        Ok(store)
    }

    /// Wrap an existing pool, creating the tables if missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append_public(
        &self,
        username: &str,
        text: &str,
        time: &str,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query("INSERT INTO public_messages (username, text, time) VALUES (?, ?, ?)")
            .bind(username)
            .bind(text)
            .bind(time)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    async fn append_private(
        &self,
        from: &str,
        to: &str,
        text: &str,
        time: &str,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query(
            "INSERT INTO private_messages (from_user, to_user, text, time) VALUES (?, ?, ?, ?)",
        )
        .bind(from)
        .bind(to)
        .bind(text)
        .bind(time)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn recent_public(&self, limit: u32) -> Result<Vec<PublicMessage>, StoreError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT username, text, time FROM (
                SELECT id, username, text, time FROM public_messages ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(from, text, time)| PublicMessage { from, text, time })
            .collect())
    }

    async fn private_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<PrivateMessage>, StoreError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT from_user, to_user, text, time FROM private_messages
             WHERE (from_user = ? AND to_user = ?) OR (from_user = ? AND to_user = ?)
             ORDER BY id ASC",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(from, to, text, time)| PrivateMessage { from, to, text, time })
            .collect())
    }
}

/// In-process store; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    public: Mutex<Vec<PublicMessage>>,
    private: Mutex<Vec<PrivateMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_public(
        &self,
        username: &str,
        text: &str,
        time: &str,
    ) -> Result<i64, StoreError> {
        let mut public = self.public.lock().await;
        public.push(PublicMessage {
            from: username.to_string(),
            text: text.to_string(),
            time: time.to_string(),
        });
        Ok(public.len() as i64)
    }

    async fn append_private(
        &self,
        from: &str,
        to: &str,
        text: &str,
        time: &str,
    ) -> Result<i64, StoreError> {
        let mut private = self.private.lock().await;
        private.push(PrivateMessage {
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
            time: time.to_string(),
        });
        Ok(private.len() as i64)
    }

    async fn recent_public(&self, limit: u32) -> Result<Vec<PublicMessage>, StoreError> {
        let public = self.public.lock().await;
        let skip = public.len().saturating_sub(limit as usize);
        Ok(public[skip..].to_vec())
    }

    async fn private_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<PrivateMessage>, StoreError> {
        let private = self.private.lock().await;
        Ok(private
            .iter()
            .filter(|m| {
                (m.from == user_a && m.to == user_b) || (m.from == user_b && m.to == user_a)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sqlite() -> SqliteStore {
        // A single long-lived connection keeps the in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStore::from_pool(pool).await.unwrap()
    }

    async fn check_recent_public_window(store: &dyn MessageStore) {
        assert!(store.recent_public(50).await.unwrap().is_empty());

        let mut last_id = 0;
        for i in 0..60 {
            let id = store
                .append_public("alice", &format!("msg {i}"), "12:00:00")
                .await
                .unwrap();
            assert!(id > last_id);
            last_id = id;
        }

        let recent = store.recent_public(50).await.unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent.first().unwrap().text, "msg 10");
        assert_eq!(recent.last().unwrap().text, "msg 59");

        let few = store.recent_public(3).await.unwrap();
        let texts: Vec<&str> = few.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 57", "msg 58", "msg 59"]);
    }

    async fn check_private_thread(store: &dyn MessageStore) {
        store.append_private("alice", "bob", "yo", "12:00:00").await.unwrap();
        store.append_private("carol", "bob", "hey", "12:00:01").await.unwrap();
        store.append_private("bob", "alice", "sup", "12:00:02").await.unwrap();
        store.append_private("alice", "carol", "hi", "12:00:03").await.unwrap();

        let ab = store.private_thread("alice", "bob").await.unwrap();
        let ba = store.private_thread("bob", "alice").await.unwrap();
        assert_eq!(ab, ba);

        let texts: Vec<&str> = ab.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["yo", "sup"]);
        assert_eq!(ab[0].from, "alice");
        assert_eq!(ab[0].to, "bob");
    }

    #[tokio::test]
    async fn test_memory_recent_public() {
        check_recent_public_window(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_private_thread() {
        check_private_thread(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_recent_public() {
        check_recent_public_window(&sqlite().await).await;
    }

    #[tokio::test]
    async fn test_sqlite_private_thread() {
        check_private_thread(&sqlite().await).await;
    }

    #[tokio::test]
    async fn test_sqlite_public_and_private_ids_are_independent() {
        let store = sqlite().await;
        assert_eq!(store.append_public("alice", "a", "t").await.unwrap(), 1);
        assert_eq!(store.append_public("alice", "b", "t").await.unwrap(), 2);
        assert_eq!(store.append_private("alice", "bob", "c", "t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let wait = Duration::from_millis(10);
        let result: Result<(), StoreError> = with_deadline(wait, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
