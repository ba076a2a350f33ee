//! SQLite store on an `sqlx` pool.
//!
//! Tables mirror the platform's relational schema for the parts chat needs:
//! `users`, `chama_members` and `messages`.

use super::{
    MembershipDirectory, MessageStore, NewMessage, StoredMessage, UserDirectory, UserProfile,
};
use async_trait::async_trait;
use chama_core::{ChamaError, ChamaResult, GroupId, MessageId, UserId};
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, chama_id, content, sent_at, read";

fn store_err(e: sqlx::Error) -> ChamaError {
    ChamaError::Store(e.to_string())
}

/// Store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> ChamaResult<Self> {
        let in_memory = url.contains(":memory:");
        if !in_memory && !Sqlite::database_exists(url).await.unwrap_or(false) {
            info!(url = %url, "creating database");
            Sqlite::create_database(url).await.map_err(store_err)?;
        }

        // Each in-memory connection is its own database, so keep exactly one.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> ChamaResult<()> {
        debug!("running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chama_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chama_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id),
                role TEXT NOT NULL DEFAULT 'member'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS unique_membership
            ON chama_members(chama_id, user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                recipient_id INTEGER REFERENCES users(id),
                chama_id INTEGER,
                content TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chama ON messages(chama_id);")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    /// Insert or rename a user.
    pub async fn upsert_user(&self, id: UserId, display_name: &str) -> ChamaResult<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(id.get())
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// Add `user` to `group`. Adding an existing member is a no-op.
    pub async fn add_member(&self, group: GroupId, user: UserId) -> ChamaResult<()> {
        sqlx::query("INSERT OR IGNORE INTO chama_members (chama_id, user_id) VALUES (?1, ?2)")
            .bind(group.get())
            .bind(user.get())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn fetch_message(&self, id: MessageId) -> ChamaResult<Option<StoredMessage>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(message_from_row).transpose()
    }
}

fn message_from_row(row: &SqliteRow) -> ChamaResult<StoredMessage> {
    Ok(StoredMessage {
        id: MessageId(row.try_get("id").map_err(store_err)?),
        sender_id: UserId(row.try_get("sender_id").map_err(store_err)?),
        recipient_user_id: row
            .try_get::<Option<i64>, _>("recipient_id")
            .map_err(store_err)?
            .map(UserId),
        group_id: row
            .try_get::<Option<i64>, _>("chama_id")
            .map_err(store_err)?
            .map(GroupId),
        content: row.try_get("content").map_err(store_err)?,
        sent_at: row
            .try_get::<DateTime<Utc>, _>("sent_at")
            .map_err(store_err)?,
        read: row.try_get("read").map_err(store_err)?,
    })
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get_user(&self, id: UserId) -> ChamaResult<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, display_name FROM users WHERE id = ?1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(|row| {
            Ok(UserProfile {
                id: UserId(row.try_get("id").map_err(store_err)?),
                display_name: row.try_get("display_name").map_err(store_err)?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl MembershipDirectory for SqliteStore {
    async fn get_group_members(&self, group: GroupId) -> ChamaResult<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM chama_members WHERE chama_id = ?1 ORDER BY user_id")
            .bind(group.get())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("user_id").map(UserId).map_err(store_err))
            .collect()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(&self, msg: NewMessage) -> ChamaResult<StoredMessage> {
        let sent_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO messages (sender_id, recipient_id, chama_id, content, sent_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        )
        .bind(msg.sender_id.get())
        .bind(msg.target.recipient_user_id().map(UserId::get))
        .bind(msg.target.group_id().map(GroupId::get))
        .bind(&msg.content)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        let id = MessageId(result.last_insert_rowid());
        debug!(message_id = %id, sender_id = %msg.sender_id, "message stored");

        Ok(StoredMessage {
            id,
            sender_id: msg.sender_id,
            recipient_user_id: msg.target.recipient_user_id(),
            group_id: msg.target.group_id(),
            content: msg.content,
            sent_at,
            read: false,
        })
    }

    async fn user_messages(&self, user: UserId) -> ChamaResult<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sender_id = ?1 OR recipient_id = ?1
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(user.get())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(message_from_row).collect()
    }

    async fn group_messages(&self, group: GroupId) -> ChamaResult<Vec<StoredMessage>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE chama_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(group.get())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(message_from_row).collect()
    }

    async fn mark_read(&self, id: MessageId) -> ChamaResult<Option<StoredMessage>> {
        let result = sqlx::query("UPDATE messages SET read = 1 WHERE id = ?1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_message(id).await
    }
}
