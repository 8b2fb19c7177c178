//! SQLite-backed users and conversation history.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  telegram_id INTEGER NOT NULL UNIQUE,
  username TEXT,
  first_name TEXT,
  last_name TEXT,
  current_model TEXT NOT NULL DEFAULT 'chatgpt',
  is_active INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  last_activity TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL REFERENCES users(id),
  user_message TEXT NOT NULL,
  ai_response TEXT,
  ai_model_used TEXT NOT NULL,
  telegram_message_id INTEGER,
  processing_time_ms INTEGER,
  archived INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_user_recent ON messages(user_id, archived, id);
"#;

/// Profile fields copied from the platform on every interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub current_model: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_activity: String,
}

/// One request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user_message: String,
    pub ai_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    pub user_id: i64,
    pub user_message: String,
    pub ai_response: String,
    pub model: String,
    pub telegram_message_id: Option<i64>,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    pub total_turns: u64,
    /// Turns that still feed the conversation context.
    pub context_turns: u64,
    /// `(model key, turns)`, most used first.
    pub per_model: Vec<(String, u64)>,
    pub avg_processing_ms: Option<f64>,
    pub first_turn_at: Option<String>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Upsert by platform id; refreshes profile fields and `last_activity`.
    async fn get_or_create_user(&self, profile: UserProfile) -> Result<UserRecord>;

    /// Last `limit` non-archived answered turns, oldest first.
    async fn get_recent_turns(&self, user_id: i64, limit: usize) -> Result<Vec<Turn>>;

    async fn record_turn(&self, turn: NewTurn) -> Result<i64>;

    async fn get_user_model(&self, telegram_id: i64) -> Result<Option<String>>;

    /// Returns false when no such user exists.
    async fn set_user_model(&self, telegram_id: i64, model: &str) -> Result<bool>;

    /// Archive every active turn; returns how many were archived.
    async fn clear_context(&self, user_id: i64) -> Result<usize>;

    async fn user_stats(&self, user_id: i64) -> Result<UserStats>;
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    default_model: String,
}

impl SqliteStore {
    pub fn open(path: &Path, default_model: &str) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        Self::with_connection(conn, default_model)
    }

    pub fn open_in_memory(default_model: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        Self::with_connection(conn, default_model)
    }

    fn with_connection(conn: Connection, default_model: &str) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(1000))
            .context("set sqlite busy timeout")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enable foreign keys")?;
        conn.execute_batch(SCHEMA).context("apply schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_model: default_model.to_string(),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .context("sqlite task panicked")?
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn load_user(conn: &Connection, telegram_id: i64) -> rusqlite::Result<Option<UserRecord>> {
    conn.query_row(
        "SELECT id, telegram_id, username, first_name, last_name, current_model, is_active,
                created_at, last_activity
         FROM users WHERE telegram_id = ?1",
        params![telegram_id],
        |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                telegram_id: row.get(1)?,
                username: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
                current_model: row.get(5)?,
                is_active: row.get::<_, i64>(6)? != 0,
                created_at: row.get(7)?,
                last_activity: row.get(8)?,
            })
        },
    )
    .optional()
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_or_create_user(&self, profile: UserProfile) -> Result<UserRecord> {
        let default_model = self.default_model.clone();
        self.with_conn(move |conn| {
            let ts = now();
            let tx = conn.transaction()?;
            let existed = load_user(&tx, profile.telegram_id)?.is_some();
            tx.execute(
                "INSERT INTO users (telegram_id, username, first_name, last_name, current_model,
                                    created_at, updated_at, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)
                 ON CONFLICT(telegram_id) DO UPDATE SET
                   username = excluded.username,
                   first_name = excluded.first_name,
                   last_name = excluded.last_name,
                   updated_at = excluded.updated_at,
                   last_activity = excluded.last_activity",
                params![
                    profile.telegram_id,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    default_model,
                    ts
                ],
            )?;
            let user = load_user(&tx, profile.telegram_id)?
                .ok_or_else(|| anyhow::anyhow!("user {} missing after upsert", profile.telegram_id))?;
            tx.commit()?;
            if !existed {
                tracing::info!(telegram_id = user.telegram_id, model = %user.current_model, "user created");
            }
            Ok(user)
        })
        .await
    }

    async fn get_recent_turns(&self, user_id: i64, limit: usize) -> Result<Vec<Turn>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT user_message, ai_response FROM messages
                 WHERE user_id = ?1 AND archived = 0 AND ai_response IS NOT NULL
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit as i64], |row| {
                Ok(Turn {
                    user_message: row.get(0)?,
                    ai_response: row.get(1)?,
                })
            })?;
            let mut turns = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            turns.reverse();
            Ok(turns)
        })
        .await
    }

    async fn record_turn(&self, turn: NewTurn) -> Result<i64> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (user_id, user_message, ai_response, ai_model_used,
                                       telegram_message_id, processing_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    turn.user_id,
                    turn.user_message,
                    turn.ai_response,
                    turn.model,
                    turn.telegram_message_id,
                    turn.processing_time.as_millis() as i64,
                    now()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_user_model(&self, telegram_id: i64) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            let model = conn
                .query_row(
                    "SELECT current_model FROM users WHERE telegram_id = ?1",
                    params![telegram_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(model)
        })
        .await
    }

    async fn set_user_model(&self, telegram_id: i64, model: &str) -> Result<bool> {
        let model = model.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET current_model = ?2, updated_at = ?3 WHERE telegram_id = ?1",
                params![telegram_id, model, now()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn clear_context(&self, user_id: i64) -> Result<usize> {
        self.with_conn(move |conn| {
            let archived = conn.execute(
                "UPDATE messages SET archived = 1 WHERE user_id = ?1 AND archived = 0",
                params![user_id],
            )?;
            Ok(archived)
        })
        .await
    }

    async fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        self.with_conn(move |conn| {
            let (total, context, avg, first): (i64, i64, Option<f64>, Option<String>) = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN archived = 0 THEN 1 ELSE 0 END), 0),
                            AVG(processing_time_ms),
                            MIN(created_at)
                     FROM messages WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;

            let mut stmt = conn.prepare_cached(
                "SELECT ai_model_used, COUNT(*) AS n FROM messages
                 WHERE user_id = ?1
                 GROUP BY ai_model_used
                 ORDER BY n DESC, ai_model_used ASC",
            )?;
            let per_model = stmt
                .query_map(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(UserStats {
                total_turns: total as u64,
                context_turns: context as u64,
                per_model,
                avg_processing_ms: avg,
                first_turn_at: first,
            })
        })
        .await
    }
}
