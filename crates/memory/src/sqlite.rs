//! SQLite thread backend with compare-and-swap updates.
//!
//! One table, one row per thread:
//! - `version`: bumped by every conditional write
//! - `expires_at`: unix milliseconds; rows at or past it are treated as absent
//! - `body`: the JSON-serialized thread
//!
//! Every conditional write checks version and expiry in the same statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use continuum_core::error::StoreError;
use continuum_core::store::{StoredThread, ThreadBackend, WriteOutcome};
use continuum_core::thread::{Thread, ThreadId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// A SQLite-backed thread store.
pub struct SqliteBackend {
    pool: SqlitePool,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(now: i64, ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(ttl)
}

fn db_err(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {e}"))
}

impl SqliteBackend {
    /// Create a new SQLite backend from a connection string such as
    /// `sqlite://threads.db`.
    ///
    /// The database and table are created automatically.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_err("Failed to open SQLite", e))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite thread backend initialized at {label}");
        Ok(backend)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id             TEXT PRIMARY KEY NOT NULL,
                version        INTEGER NOT NULL,
                expires_at     INTEGER NOT NULL,
                last_active_at TEXT NOT NULL,
                body           TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_expires_at ON threads(expires_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("expires_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> Result<StoredThread, StoreError> {
        let id: String = row.try_get("id").map_err(|e| db_err("id column", e))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| db_err("version column", e))?;
        let body: String = row.try_get("body").map_err(|e| db_err("body column", e))?;
        let last_active: String = row
            .try_get("last_active_at")
            .map_err(|e| db_err("last_active_at column", e))?;

        let mut thread: Thread =
            serde_json::from_str(&body).map_err(|e| StoreError::Corrupted {
                thread_id: id.clone(),
                reason: e.to_string(),
            })?;

        // Touches only update the column, not the body.
        if let Ok(ts) = DateTime::parse_from_rfc3339(&last_active) {
            thread.last_active_at = ts.with_timezone(&Utc);
        }

        Ok(StoredThread {
            thread,
            version: u64::try_from(version).unwrap_or_default(),
        })
    }

    fn encode(thread: &Thread) -> Result<String, StoreError> {
        serde_json::to_string(thread)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize thread: {e}")))
    }

    /// Version of the live row, if any.
    async fn live_version(&self, id: &ThreadId, now: i64) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT version FROM threads WHERE id = ?1 AND expires_at > ?2")
            .bind(id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("Version lookup failed", e))?;

        row.map(|r| {
            r.try_get::<i64, _>("version")
                .map(|v| u64::try_from(v).unwrap_or_default())
                .map_err(|e| db_err("version column", e))
        })
        .transpose()
    }
}

#[async_trait]
impl ThreadBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &ThreadId) -> Result<Option<StoredThread>, StoreError> {
        let row = sqlx::query(
            "SELECT id, version, last_active_at, body FROM threads WHERE id = ?1 AND expires_at > ?2",
        )
        .bind(id.as_str())
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Load failed", e))?;

        row.as_ref().map(Self::row_to_stored).transpose()
    }

    async fn store(
        &self,
        thread: &Thread,
        expected: Option<u64>,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError> {
        let now = now_ms();
        let expires_at = expiry_ms(now, ttl);
        let body = Self::encode(thread)?;
        let last_active = thread.last_active_at.to_rfc3339();

        match expected {
            None => {
                // Insert, or replace a row that has already expired.
                let result = sqlx::query(
                    r#"
                    INSERT INTO threads (id, version, expires_at, last_active_at, body)
                    VALUES (?1, 1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        version = 1,
                        expires_at = excluded.expires_at,
                        last_active_at = excluded.last_active_at,
                        body = excluded.body
                    WHERE threads.expires_at <= ?5
                    "#,
                )
                .bind(thread.id.as_str())
                .bind(expires_at)
                .bind(&last_active)
                .bind(&body)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("Insert failed", e))?;

                if result.rows_affected() == 1 {
                    return Ok(WriteOutcome::Written { version: 1 });
                }
                Ok(match self.live_version(&thread.id, now).await? {
                    Some(current) => WriteOutcome::Conflict { current },
                    None => WriteOutcome::Missing,
                })
            }
            Some(version) => {
                let expected_version = i64::try_from(version)
                    .map_err(|_| StoreError::Backend(format!("Version {version} out of range")))?;
                let result = sqlx::query(
                    r#"
                    UPDATE threads
                    SET version = version + 1, expires_at = ?1, last_active_at = ?2, body = ?3
                    WHERE id = ?4 AND version = ?5 AND expires_at > ?6
                    "#,
                )
                .bind(expires_at)
                .bind(&last_active)
                .bind(&body)
                .bind(thread.id.as_str())
                .bind(expected_version)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("Update failed", e))?;

                if result.rows_affected() == 1 {
                    return Ok(WriteOutcome::Written {
                        version: version + 1,
                    });
                }
                Ok(match self.live_version(&thread.id, now).await? {
                    Some(current) => WriteOutcome::Conflict { current },
                    None => WriteOutcome::Missing,
                })
            }
        }
    }

    async fn touch(&self, id: &ThreadId, ttl: Duration) -> Result<bool, StoreError> {
        let now = now_ms();
        let result = sqlx::query(
            "UPDATE threads SET expires_at = ?1, last_active_at = ?2 WHERE id = ?3 AND expires_at > ?4",
        )
        .bind(expiry_ms(now, ttl))
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Touch failed", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &ThreadId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM threads WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Delete failed", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM threads WHERE expires_at <= ?1")
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Purge failed", e))?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM threads WHERE expires_at > ?1")
            .bind(now_ms())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("Count failed", e))?;
        let n: i64 = row.try_get("n").map_err(|e| db_err("count column", e))?;
        Ok(n as usize)
    }
}
