use std::{
    collections::HashSet,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use sqlx::{Row, SqlitePool, sqlite::SqliteConnectOptions};

use crate::error::Result;

/// The single in-flight OAuth login, if any.
///
/// The slot is global, not per-chat: a new `/auth login` replaces it
/// wholesale, and an empty `login_id` column means "no pending login" even
/// when the URL columns still hold stale values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub login_id: String,
    pub auth_url: Option<String>,
    pub expected_redirect_uri: Option<String>,
}

/// SQLite-backed storage for chat sessions and auth state.
pub struct SessionStore {
    pool: SqlitePool,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl SessionStore {
    /// Open (creating if missing) the database at `path` and migrate it.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::with_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The caller is responsible for [`migrate`].
    ///
    /// [`migrate`]: SessionStore::migrate
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema and add any columns missing from older databases.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_sessions (
                chat_id    TEXT PRIMARY KEY,
                thread_id  TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS auth_login_state (
                id                    INTEGER PRIMARY KEY CHECK (id = 1),
                login_id              TEXT,
                auth_url              TEXT,
                expected_redirect_uri TEXT,
                updated_at            INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        self.ensure_auth_login_columns().await
    }

    /// Databases written before the relay stored URLs lack the two URL
    /// columns; add them in place without touching existing rows.
    async fn ensure_auth_login_columns(&self) -> Result<()> {
        let rows = sqlx::query("PRAGMA table_info(auth_login_state)")
            .fetch_all(&self.pool)
            .await?;
        let mut columns = HashSet::new();
        for row in &rows {
            columns.insert(row.try_get::<String, _>("name")?);
        }

        if !columns.contains("auth_url") {
            tracing::info!("adding auth_url column to auth_login_state");
            sqlx::query("ALTER TABLE auth_login_state ADD COLUMN auth_url TEXT")
                .execute(&self.pool)
                .await?;
        }
        if !columns.contains("expected_redirect_uri") {
            tracing::info!("adding expected_redirect_uri column to auth_login_state");
            sqlx::query("ALTER TABLE auth_login_state ADD COLUMN expected_redirect_uri TEXT")
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Get the thread id for a chat, or `None` if the chat has no session.
    pub async fn thread_for_chat(&self, chat_id: &str) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT thread_id FROM chat_sessions WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Set the thread id for a chat. Upsert; last write wins.
    pub async fn set_thread_for_chat(&self, chat_id: &str, thread_id: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (chat_id, thread_id, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(chat_id) DO UPDATE SET
                 thread_id = excluded.thread_id,
                 updated_at = excluded.updated_at"#,
        )
        .bind(chat_id)
        .bind(thread_id)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read the pending-login slot; `None` when empty.
    pub async fn pending_login(&self) -> Result<Option<PendingLogin>> {
        let row = sqlx::query(
            "SELECT login_id, auth_url, expected_redirect_uri FROM auth_login_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Some(login_id) = row.try_get::<Option<String>, _>("login_id")? else {
            return Ok(None);
        };
        Ok(Some(PendingLogin {
            login_id,
            auth_url: row.try_get("auth_url")?,
            expected_redirect_uri: row.try_get("expected_redirect_uri")?,
        }))
    }

    /// Replace the pending-login slot wholesale.
    pub async fn set_pending_login(
        &self,
        login_id: &str,
        auth_url: Option<&str>,
        expected_redirect_uri: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO auth_login_state (id, login_id, auth_url, expected_redirect_uri, updated_at)
               VALUES (1, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 login_id = excluded.login_id,
                 auth_url = excluded.auth_url,
                 expected_redirect_uri = excluded.expected_redirect_uri,
                 updated_at = excluded.updated_at"#,
        )
        .bind(login_id)
        .bind(auth_url)
        .bind(expected_redirect_uri)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Empty the pending-login slot, keeping the row.
    pub async fn clear_pending_login(&self) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO auth_login_state (id, login_id, auth_url, expected_redirect_uri, updated_at)
               VALUES (1, NULL, NULL, NULL, ?)
               ON CONFLICT(id) DO UPDATE SET
                 login_id = NULL,
                 auth_url = NULL,
                 expected_redirect_uri = NULL,
                 updated_at = excluded.updated_at"#,
        )
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
