//! SQLite-backed conversation store.

use async_trait::async_trait;
use iris_core::{config::MemoryConfig, error::IrisError, shellexpand, traits::ConversationStore};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Conversation store persisted in SQLite.
///
/// Shares its pool with [`crate::TelemetryLog`] when telemetry persistence is on.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `config.db_path`, running migrations.
    pub async fn new(config: &MemoryConfig) -> Result<Self, IrisError> {
        let db_path = shellexpand(&config.db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IrisError::Memory(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| IrisError::Memory(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| IrisError::Memory(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Conversation store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// Open a private in-memory database. Each call yields an empty store.
    pub async fn in_memory() -> Result<Self, IrisError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| IrisError::Memory(format!("invalid db path: {e}")))?;
        // One connection: every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| IrisError::Memory(format!("failed to connect to sqlite: {e}")))?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), IrisError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| IrisError::Memory(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[
            (
                "001_conversation_state",
                include_str!("../migrations/001_conversation_state.sql"),
            ),
            (
                "002_telemetry_events",
                include_str!("../migrations/002_telemetry_events.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        IrisError::Memory(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| IrisError::Memory(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    IrisError::Memory(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get(&self, conversation_key: &str, slot: &str) -> Result<Option<Value>, IrisError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM conversation_state WHERE conversation_key = ? AND slot = ?",
        )
        .bind(conversation_key)
        .bind(slot)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IrisError::Memory(format!("query failed: {e}")))?;

        row.map(|(raw,)| serde_json::from_str(&raw).map_err(IrisError::from))
            .transpose()
    }

    async fn put(
        &self,
        conversation_key: &str,
        slot: &str,
        value: Value,
    ) -> Result<(), IrisError> {
        sqlx::query(
            "INSERT INTO conversation_state (conversation_key, slot, value, updated_at) \
             VALUES (?, ?, ?, datetime('now')) \
             ON CONFLICT(conversation_key, slot) DO UPDATE SET \
             value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(conversation_key)
        .bind(slot)
        .bind(value.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| IrisError::Memory(format!("upsert failed: {e}")))?;
        Ok(())
    }

    async fn remove(&self, conversation_key: &str, slot: &str) -> Result<(), IrisError> {
        sqlx::query("DELETE FROM conversation_state WHERE conversation_key = ? AND slot = ?")
            .bind(conversation_key)
            .bind(slot)
            .execute(&self.pool)
            .await
            .map_err(|e| IrisError::Memory(format!("delete failed: {e}")))?;
        Ok(())
    }

    async fn remove_if(
        &self,
        conversation_key: &str,
        slot: &str,
        expected: &Value,
    ) -> Result<bool, IrisError> {
        let result = sqlx::query(
            "DELETE FROM conversation_state \
             WHERE conversation_key = ? AND slot = ? AND value = ?",
        )
        .bind(conversation_key)
        .bind(slot)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| IrisError::Memory(format!("delete failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
