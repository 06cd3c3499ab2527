//! Session memory: per-thread ordered message history

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::agent::{Message, Role, ToolCallRequest};
use crate::{Error, Result};

/// Persistence boundary for conversation history
///
/// A thread's session is created by its first append and never deleted here.
pub trait SessionStore: Send + Sync {
    /// Load a thread's messages in the order they were appended
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn load(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Append one message to a thread
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written
    fn append(&self, thread_id: &str, message: &Message) -> Result<()>;
}

/// Stored thread with its activity timestamps
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `SQLite`-backed session repository
#[derive(Clone)]
pub struct SessionRepo {
    pool: DbPool,
}

impl SessionRepo {
    /// Create a new session repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List stored threads, most recently active first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT s.thread_id, s.created_at, s.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.thread_id = s.thread_id)
                 FROM sessions s ORDER BY s.updated_at DESC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let threads = stmt
            .query_map([], |row| {
                Ok(ThreadSummary {
                    thread_id: row.get(0)?,
                    created_at: parse_datetime(&row.get::<_, String>(1)?),
                    updated_at: parse_datetime(&row.get::<_, String>(2)?),
                    message_count: usize::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(threads)
    }

    /// Number of messages stored for a thread
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn message_count(&self, thread_id: &str) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
            [thread_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl SessionStore for SessionRepo {
    fn load(&self, thread_id: &str) -> Result<Vec<Message>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT role, content, tool_calls, tool_call_id, is_error
                 FROM messages WHERE thread_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let rows = stmt
            .query_map([thread_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, tool_calls, tool_call_id, is_error) = row?;
            let role = Role::parse(&role)
                .ok_or_else(|| Error::Database(format!("unknown role in history: {role}")))?;
            let tool_calls: Vec<ToolCallRequest> = match tool_calls {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            };

            messages.push(Message {
                role,
                content,
                tool_calls,
                tool_call_id,
                is_error,
            });
        }

        Ok(messages)
    }

    fn append(&self, thread_id: &str, message: &Message) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&message.tool_calls)?)
        };

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (thread_id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(thread_id) DO UPDATE SET updated_at = excluded.updated_at",
            rusqlite::params![thread_id, now],
        )?;
        tx.execute(
            "INSERT INTO messages (thread_id, role, content, tool_calls, tool_call_id, is_error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                thread_id,
                message.role.as_str(),
                message.content,
                tool_calls,
                message.tool_call_id,
                message.is_error,
                now,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(thread_id, role = message.role.as_str(), "message stored");
        Ok(())
    }
}

/// Volatile session store used when memory is disabled
#[derive(Default)]
pub struct MemorySessionStore {
    threads: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, thread_id: &str) -> Result<Vec<Message>> {
        let threads = self
            .threads
            .lock()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    fn append(&self, thread_id: &str, message: &Message) -> Result<()> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|e| Error::Database(e.to_string()))?;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
