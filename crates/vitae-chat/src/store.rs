//! Durable dialogue history keyed by conversation id.
//!
//! A turn is one (user, assistant) pair appended atomically: a partially
//! written turn must never be observable, whatever crashes mid-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use vitae_core::{Result, VitaeError};

/// One completed (user, assistant) exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// Storage for conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn, creating the conversation record if absent.
    async fn save_turn(&self, conversation_id: &str, question: &str, answer: &str) -> Result<()>;

    /// The most recent `limit` complete turns, in chronological order.
    async fn get_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>>;
}

/// Turns kept per conversation by the volatile store.
const MEMORY_STORE_CAP: usize = 10;

/// In-process store for tests and credential-less development runs.
///
/// A per-store mutex serializes writers; the full turn is constructed
/// before insertion, so readers only ever observe complete turns.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<String, Vec<Turn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn save_turn(&self, conversation_id: &str, question: &str, answer: &str) -> Result<()> {
        let turn = Turn {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        };
        let mut conversations = self.conversations.lock();
        let turns = conversations
            .entry(conversation_id.to_string())
            .or_default();
        turns.push(turn);
        if turns.len() > MEMORY_STORE_CAP {
            let excess = turns.len() - MEMORY_STORE_CAP;
            turns.drain(..excess);
        }
        Ok(())
    }

    async fn get_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let conversations = self.conversations.lock();
        let turns = conversations
            .get(conversation_id)
            .map(|t| t.as_slice())
            .unwrap_or(&[]);
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}

/// SQLite-backed store for production.
pub struct SqliteConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open or create the conversation database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening conversation store");
        let conn = Connection::open(path).map_err(|e| VitaeError::Storage(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| VitaeError::Storage(e.to_string()))?;
        Self::with_connection(Arc::new(Mutex::new(conn)))
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| VitaeError::Storage(e.to_string()))?;
        Self::with_connection(Arc::new(Mutex::new(conn)))
    }

    /// Share an already-open connection with the vector repository.
    pub fn with_connection(db: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let conn = db.lock();
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages(conversation_id, created_at);
                ",
            )
            .map_err(|e| VitaeError::Storage(e.to_string()))?;
        }
        Ok(Self { db })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn save_turn(&self, conversation_id: &str, question: &str, answer: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut db = self.db.lock();
        // Both message rows and the conversation upsert commit together; a
        // crash mid-turn rolls the whole append back.
        let tx = db
            .transaction()
            .map_err(|e| VitaeError::Storage(e.to_string()))?;
        tx.execute(
            "INSERT INTO conversations (id, created_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            rusqlite::params![conversation_id, now],
        )
        .map_err(|e| VitaeError::Storage(e.to_string()))?;
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, 'user', ?2, ?3)",
            rusqlite::params![conversation_id, question, now],
        )
        .map_err(|e| VitaeError::Storage(e.to_string()))?;
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, 'assistant', ?2, ?3)",
            rusqlite::params![conversation_id, answer, now],
        )
        .map_err(|e| VitaeError::Storage(e.to_string()))?;
        tx.commit().map_err(|e| VitaeError::Storage(e.to_string()))
    }

    async fn get_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let rows: Vec<(String, String, String)> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(
                    "SELECT role, content, created_at FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                )
                .map_err(|e| VitaeError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id, (limit * 2) as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .map_err(|e| VitaeError::Storage(e.to_string()))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        // Rows arrive newest-first; pair them up chronologically.
        let chronological: Vec<_> = rows.into_iter().rev().collect();
        let mut turns = Vec::new();
        let mut i = 0;
        while i + 1 < chronological.len() {
            let (role_a, content_a, ts_a) = &chronological[i];
            let (role_b, content_b, _) = &chronological[i + 1];
            if role_a == "user" && role_b == "assistant" {
                turns.push(Turn {
                    question: content_a.clone(),
                    answer: content_b.clone(),
                    timestamp: DateTime::parse_from_rfc3339(ts_a)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                });
                i += 2;
            } else {
                i += 1;
            }
        }

        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}
