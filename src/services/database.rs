use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::task;

use super::diagnostics::ConversationHealth;
use super::store::ConversationStore;
use crate::models::{Conversation, ConversationQuery, Emotion, Message, Sender};

/// SQLite-backed conversation store.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Fixed-width RFC 3339 so that text order in SQL is time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

const CONVERSATION_COLUMNS: &str =
    "id, owner_id, is_anonymous, is_archived, title, last_message, created_at, last_updated";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender, text, emotion, timestamp, sort_order";

impl Database {
    pub fn conn_ref(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let path: PathBuf = path.to_path_buf();
        task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory: {}", parent.display())
                })?;
            }

            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;

            let db = Database {
                conn: Arc::new(Mutex::new(conn)),
            };
            db.run_migrations()?;
            Ok(db)
        })
        .await?
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = lock(&self.conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // No foreign keys: messages outlive their conversation unless removed
        // explicitly, and the flags stay nullable so records written before a
        // field existed can still be loaded and repaired.
        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    is_anonymous INTEGER,
                    is_archived INTEGER,
                    title TEXT NOT NULL,
                    last_message TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    last_updated TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    text TEXT NOT NULL,
                    emotion TEXT,
                    timestamp TEXT NOT NULL,
                    sort_order INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX idx_conversations_owner ON conversations(owner_id);
                CREATE INDEX idx_messages_conversation ON messages(conversation_id);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "CREATE INDEX idx_conversations_listing
                    ON conversations(owner_id, is_anonymous, is_archived, last_updated DESC);
                 CREATE INDEX idx_messages_ordering
                    ON messages(conversation_id, timestamp, sort_order);

                 UPDATE schema_version SET version = 2;",
            )?;
        }

        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            f(&conn)
        })
        .await?
    }

    // --- Maintenance ---

    /// Per-conversation health rows for one owner, including legacy records
    /// that a filtered listing would skip.
    pub async fn conversation_health(&self, owner_id: &str) -> Result<Vec<ConversationHealth>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.is_anonymous, c.is_archived, c.last_updated,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c WHERE c.owner_id = ?1 ORDER BY c.last_updated DESC",
            )?;
            let rows = stmt
                .query_map(params![owner_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i32>>(2)?,
                        row.get::<_, Option<i32>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, title, anonymous, archived, updated, count)| {
                    Ok(ConversationHealth {
                        id,
                        title,
                        is_anonymous: anonymous.map(|v| v != 0),
                        is_archived: archived.map(|v| v != 0),
                        last_updated: parse_timestamp(&updated)?,
                        message_count: count as usize,
                    })
                })
                .collect()
        })
        .await
    }

    /// Default absent `is_anonymous` / `is_archived` flags to false. Returns
    /// the number of conversations touched.
    pub async fn repair_missing_flags(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations
                 SET is_anonymous = COALESCE(is_anonymous, 0),
                     is_archived = COALESCE(is_archived, 0)
                 WHERE is_anonymous IS NULL OR is_archived IS NULL",
                [],
            )?;
            Ok(updated)
        })
        .await
    }

    pub async fn orphaned_message_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id FROM messages m
                 WHERE NOT EXISTS (SELECT 1 FROM conversations c WHERE c.id = m.conversation_id)
                 ORDER BY m.timestamp ASC",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
    }

    pub async fn purge_orphaned_messages(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages
                 WHERE NOT EXISTS (SELECT 1 FROM conversations c WHERE c.id = messages.conversation_id)",
                [],
            )?;
            Ok(deleted)
        })
        .await
    }

    // --- Row helpers ---

    fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation> {
        let is_anonymous: Option<i32> = row.get(2)?;
        let is_archived: Option<i32> = row.get(3)?;
        let created_str: String = row.get(6)?;
        let updated_str: String = row.get(7)?;

        Ok(Conversation {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            is_anonymous: is_anonymous.unwrap_or(0) != 0,
            is_archived: is_archived.unwrap_or(0) != 0,
            title: row.get(4)?,
            last_message: row.get(5)?,
            created_at: parse_timestamp(&created_str)?,
            last_updated: parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let sender_str: String = row.get(2)?;
        let emotion_str: Option<String> = row.get(4)?;
        let timestamp_str: String = row.get(5)?;

        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender: Sender::from_str(&sender_str)
                .ok_or_else(|| anyhow!("Unknown sender: {}", sender_str))?,
            text: row.get(3)?,
            emotion: emotion_str.as_deref().map(Emotion::from_label),
            timestamp: parse_timestamp(&timestamp_str)?,
            order: row.get(6)?,
        })
    }
}

#[async_trait]
impl ConversationStore for Database {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conv = conversation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, owner_id, is_anonymous, is_archived, title, last_message, created_at, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conv.id,
                    conv.owner_id,
                    conv.is_anonymous as i32,
                    conv.is_archived as i32,
                    conv.title,
                    conv.last_message,
                    format_timestamp(&conv.created_at),
                    format_timestamp(&conv.last_updated),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversations WHERE id = ?1",
                CONVERSATION_COLUMNS
            ))?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_conversation(row)))
                .optional()?;
            result.transpose()
        })
        .await
    }

    async fn list_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM conversations WHERE owner_id = ?1",
                CONVERSATION_COLUMNS
            );
            let mut values = vec![Value::Text(query.owner_id)];

            // `col = ?` never matches NULL, so records missing a flag stay
            // out of every listing that filters on it.
            if let Some(anonymous) = query.is_anonymous {
                values.push(Value::Integer(anonymous as i64));
                sql.push_str(&format!(" AND is_anonymous = ?{}", values.len()));
            }
            if let Some(archived) = query.is_archived {
                values.push(Value::Integer(archived as i64));
                sql.push_str(&format!(" AND is_archived = ?{}", values.len()));
            }
            sql.push_str(" ORDER BY last_updated DESC");

            let mut stmt = conn.prepare(&sql)?;
            let conversations = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(Self::row_to_conversation(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
    }

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<bool> {
        let id = id.to_string();
        let title = title.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn set_conversation_archived(
        &self,
        id: &str,
        archived: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE conversations SET is_archived = ?1, last_updated = ?2 WHERE id = ?3",
                params![archived as i32, format_timestamp(&at), id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn touch_conversation(
        &self,
        id: &str,
        at: DateTime<Utc>,
        last_message: &str,
    ) -> Result<bool> {
        let id = id.to_string();
        let last_message = last_message.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE conversations SET last_updated = ?1, last_message = ?2 WHERE id = ?3",
                params![format_timestamp(&at), last_message, id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let msg = message.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender, text, emotion, timestamp, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender.as_str(),
                    msg.text,
                    msg.emotion.map(|e| e.as_str()),
                    format_timestamp(&msg.timestamp),
                    msg.order,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1
                 ORDER BY timestamp ASC, sort_order ASC",
                MESSAGE_COLUMNS
            ))?;
            let messages = stmt
                .query_map(params![conversation_id], |row| {
                    Ok(Self::row_to_message(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }
}
