use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;
use uuid::Uuid;

use crate::models::{Conversation, ConversationStatus, Message, Role, User, UserRole};

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Fixed-width RFC 3339 so that stored timestamps sort lexicographically.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let path = path.to_path_buf();
        let conn = task::spawn_blocking(move || {
            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            Ok::<_, anyhow::Error>(conn)
        })
        .await??;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
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

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'student',
                    created_at TEXT NOT NULL,
                    last_login TEXT
                );

                CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT,
                    status TEXT NOT NULL DEFAULT 'active',
                    last_message TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (conversation_id, seq),
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_conversations_user_updated ON conversations(user_id, updated_at DESC);
                CREATE INDEX idx_conversations_status ON conversations(status);
                CREATE INDEX idx_messages_conversation ON messages(conversation_id, seq);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "ALTER TABLE users ADD COLUMN password_hash TEXT;

                INSERT INTO schema_version (version) VALUES (2);",
            )?;
        }

        Ok(())
    }

    // --- Users ---

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.clone();
        let user = user.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO users (id, email, role, created_at, last_login)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.email,
                    user.role.as_str(),
                    ts(&user.created_at),
                    user.last_login.as_ref().map(ts),
                ],
            )
            .with_context(|| format!("Failed to add user {}", user.email))?;
            Ok(())
        })
        .await?
    }

    /// Replace the stored PHC password hash for `user_id`.
    pub async fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<()> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        let hash = hash.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let updated = conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, user_id],
            )?;
            if updated == 0 {
                return Err(anyhow!("User not found: {}", user_id));
            }
            Ok(())
        })
        .await?
    }

    /// `None` when the user does not exist or has never been given a password.
    pub async fn get_password_hash(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let hash: Option<Option<String>> = conn
                .query_row(
                    "SELECT password_hash FROM users WHERE id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hash.flatten())
        })
        .await?
    }

    /// Emails compare case-insensitively.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.clone();
        let email = email.trim().to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.query_row(
                "SELECT id, email, role, created_at, last_login FROM users
                 WHERE email = ?1 COLLATE NOCASE LIMIT 1",
                params![email],
                |row| Ok(Self::row_to_user(row)),
            )
            .optional()?
            .transpose()
        })
        .await?
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, email, role, created_at, last_login FROM users ORDER BY email",
            )?;
            let users = stmt
                .query_map([], |row| Ok(Self::row_to_user(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await?
    }

    pub async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![ts(&at), user_id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM users", Vec::new()).await
    }

    // --- Conversations ---

    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.clone();
        let conv = conversation.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, status, last_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    conv.id,
                    conv.user_id,
                    conv.title,
                    conv.status.as_str(),
                    conv.last_message,
                    ts(&conv.created_at),
                    ts(&conv.updated_at),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.query_row(
                "SELECT id, user_id, title, status, last_message, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id],
                |row| Ok(Self::row_to_conversation(row)),
            )
            .optional()?
            .transpose()
        })
        .await?
    }

    /// A user's conversations, most recently updated first. `limit = None`
    /// returns everything from `offset` on.
    pub async fn list_conversations_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let offset = offset as i64;
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, status, last_message, created_at, updated_at
                 FROM conversations WHERE user_id = ?1
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let conversations = stmt
                .query_map(params![user_id, limit, offset], |row| {
                    Ok(Self::row_to_conversation(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await?
    }

    pub async fn count_conversations_for_user(&self, user_id: &str) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM conversations WHERE user_id = ?1",
            vec![user_id.to_string()],
        )
        .await
    }

    pub async fn count_conversations(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM conversations", Vec::new()).await
    }

    pub async fn count_conversations_with_status(&self, status: ConversationStatus) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM conversations WHERE status = ?1",
            vec![status.as_str().to_string()],
        )
        .await
    }

    pub async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let n = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await?
    }

    pub async fn delete_conversations_for_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let n = conn.execute(
                "DELETE FROM conversations WHERE user_id = ?1",
                params![user_id],
            )?;
            Ok(n)
        })
        .await?
    }

    // --- Messages ---

    /// Append a message and refresh the conversation's denormalized fields in
    /// one transaction. `updated_at` never moves backwards. Returns the
    /// conversation's message count after the append.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
        preview: &str,
    ) -> Result<u64> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        let msg = message.clone();
        let preview = preview.to_string();
        task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            let tx = conn.transaction()?;

            let next_seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            let created_at = ts(&msg.created_at);

            tx.execute(
                "INSERT INTO messages (id, conversation_id, seq, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    conversation_id,
                    next_seq,
                    msg.role.as_str(),
                    msg.content,
                    created_at,
                ],
            )?;

            tx.execute(
                "UPDATE conversations
                 SET updated_at = MAX(updated_at, ?1), last_message = ?2
                 WHERE id = ?3",
                params![created_at, preview, conversation_id],
            )?;

            tx.commit()?;
            Ok(next_seq as u64)
        })
        .await?
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT role, content, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY seq ASC",
            )?;
            let messages = stmt
                .query_map(params![conversation_id], |row| {
                    Ok(Self::row_to_message(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    // --- Helpers ---

    async fn count(&self, sql: &'static str, args: Vec<String>) -> Result<u64> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let n: i64 = conn.query_row(sql, rusqlite::params_from_iter(args), |row| row.get(0))?;
            Ok(n as u64)
        })
        .await?
    }

    fn row_to_user(row: &rusqlite::Row) -> Result<User> {
        let role_str: String = row.get(2)?;
        let created_str: String = row.get(3)?;
        let last_login: Option<String> = row.get(4)?;

        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            role: UserRole::from_str(&role_str)
                .ok_or_else(|| anyhow!("Unknown role: {}", role_str))?,
            created_at: parse_ts(&created_str)?,
            last_login: last_login.as_deref().map(parse_ts).transpose()?,
        })
    }

    fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation> {
        let status_str: String = row.get(3)?;
        let created_str: String = row.get(5)?;
        let updated_str: String = row.get(6)?;

        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            status: ConversationStatus::from_str(&status_str)
                .ok_or_else(|| anyhow!("Unknown status: {}", status_str))?,
            last_message: row.get(4)?,
            created_at: parse_ts(&created_str)?,
            updated_at: parse_ts(&updated_str)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(0)?;
        let created_str: String = row.get(2)?;

        Ok(Message {
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("Unknown role: {}", role_str))?,
            content: row.get(1)?,
            created_at: parse_ts(&created_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: UserRole::Student,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    fn conversation(user_id: &str, at: DateTime<Utc>) -> Conversation {
        Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: Some("Test Chat".to_string()),
            status: ConversationStatus::Active,
            last_message: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.list_users().await.unwrap().is_empty());
        assert_eq!(db.count_conversations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_lookup_is_case_insensitive() {
        let db = Database::new_in_memory().unwrap();
        let u = user("Student@Example.ac.uk");
        db.insert_user(&u).await.unwrap();

        let found = db.get_user_by_email("student@example.ac.uk").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(u.id.clone()));
        assert!(db.get_user_by_email("nobody@example.ac.uk").await.unwrap().is_none());

        let at = Utc::now();
        db.record_login(&u.id, at).await.unwrap();
        let fetched = db.get_user_by_email(&u.email).await.unwrap().unwrap();
        assert_eq!(
            fetched.last_login.map(|t| t.timestamp_micros()),
            Some(at.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_password_hash_is_stored_per_user() {
        let db = Database::new_in_memory().unwrap();
        let a = user("a@example.ac.uk");
        let b = user("b@example.ac.uk");
        db.insert_user(&a).await.unwrap();
        db.insert_user(&b).await.unwrap();

        assert!(db.get_password_hash(&a.id).await.unwrap().is_none());
        db.set_password_hash(&a.id, "$argon2id$stub").await.unwrap();
        assert_eq!(
            db.get_password_hash(&a.id).await.unwrap().as_deref(),
            Some("$argon2id$stub")
        );
        assert!(db.get_password_hash(&b.id).await.unwrap().is_none());
        assert!(db.set_password_hash("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let db = Database::new_in_memory().unwrap();
        db.insert_user(&user("a@example.ac.uk")).await.unwrap();
        assert!(db.insert_user(&user("a@example.ac.uk")).await.is_err());
    }

    #[tokio::test]
    async fn test_append_keeps_order_and_refreshes_conversation() {
        let db = Database::new_in_memory().unwrap();
        let u = user("a@example.ac.uk");
        db.insert_user(&u).await.unwrap();
        let start = Utc::now();
        let conv = conversation(&u.id, start);
        db.insert_conversation(&conv).await.unwrap();

        let first = Message::user("Hello!", start);
        // Same instant as the first message: order must still follow append order.
        let second = Message::assistant("Hi, how can I help?", start);
        assert_eq!(db.append_message(&conv.id, &first, "Hello!").await.unwrap(), 1);
        assert_eq!(
            db.append_message(&conv.id, &second, "Hi, how can I help?")
                .await
                .unwrap(),
            2
        );

        let messages = db.list_messages(&conv.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello!");
        assert_eq!(messages[1].role, Role::Assistant);

        let stored = db.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message.as_deref(), Some("Hi, how can I help?"));
    }

    #[tokio::test]
    async fn test_updated_at_never_moves_backwards() {
        let db = Database::new_in_memory().unwrap();
        let u = user("a@example.ac.uk");
        db.insert_user(&u).await.unwrap();
        let start = Utc::now();
        let conv = conversation(&u.id, start);
        db.insert_conversation(&conv).await.unwrap();

        let later = start + Duration::seconds(10);
        db.append_message(&conv.id, &Message::user("late", later), "late")
            .await
            .unwrap();
        db.append_message(&conv.id, &Message::user("early", start), "early")
            .await
            .unwrap();

        let stored = db.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at.timestamp_micros(), later.timestamp_micros());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_messages() {
        let db = Database::new_in_memory().unwrap();
        let u = user("a@example.ac.uk");
        db.insert_user(&u).await.unwrap();
        let now = Utc::now();
        let conv = conversation(&u.id, now);
        db.insert_conversation(&conv).await.unwrap();
        db.append_message(&conv.id, &Message::user("Hello!", now), "Hello!")
            .await
            .unwrap();

        assert!(db.delete_conversation(&conv.id).await.unwrap());
        assert!(!db.delete_conversation(&conv.id).await.unwrap());
        assert!(db.list_messages(&conv.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counts_and_bulk_delete() {
        let db = Database::new_in_memory().unwrap();
        let a = user("a@example.ac.uk");
        let b = user("b@example.ac.uk");
        db.insert_user(&a).await.unwrap();
        db.insert_user(&b).await.unwrap();
        let now = Utc::now();
        for _ in 0..3 {
            db.insert_conversation(&conversation(&a.id, now)).await.unwrap();
        }
        let mut archived = conversation(&b.id, now);
        archived.status = ConversationStatus::Archived;
        db.insert_conversation(&archived).await.unwrap();

        assert_eq!(db.count_users().await.unwrap(), 2);
        assert_eq!(db.count_conversations().await.unwrap(), 4);
        assert_eq!(
            db.count_conversations_with_status(ConversationStatus::Active)
                .await
                .unwrap(),
            3
        );
        assert_eq!(db.count_conversations_for_user(&a.id).await.unwrap(), 3);

        assert_eq!(db.delete_conversations_for_user(&a.id).await.unwrap(), 3);
        assert_eq!(db.count_conversations().await.unwrap(), 1);
    }
}
