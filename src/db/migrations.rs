//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// In-memory database for tests and ephemeral runs
    pub async fn in_memory() -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse in-memory database options: {}",
                    e
                )))
            })?
            .foreign_keys(true);

        // A single connection keeps the in-memory database alive and shared
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to open in-memory database: {}",
                    e
                )))
            })?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create initial schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            Self::create_download_schema(conn).await?;
            Self::create_sync_schema(conn).await?;
            Self::create_move_and_app_schema(conn).await?;
            Self::create_tracked_schema(conn).await?;
            Self::create_events_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    async fn create_download_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE download_jobs (
                id TEXT PRIMARY KEY,
                downloader TEXT NOT NULL,
                remote_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                previous_category TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                progress REAL NOT NULL DEFAULT 0.0,
                download_speed INTEGER NOT NULL DEFAULT 0,
                save_path TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                discovered_at INTEGER NOT NULL,
                downloaded_at INTEGER,
                removed_at INTEGER,
                UNIQUE (downloader, remote_id)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create download_jobs table", e))?;

        sqlx::query("CREATE INDEX idx_download_jobs_downloader ON download_jobs(downloader)")
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("create download_jobs index", e))?;

        sqlx::query(
            r#"
            CREATE TABLE download_files (
                id TEXT PRIMARY KEY,
                download_id TEXT NOT NULL REFERENCES download_jobs(id),
                relative_path TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                progress REAL NOT NULL DEFAULT 0.0,
                priority INTEGER NOT NULL DEFAULT 1,
                state INTEGER NOT NULL DEFAULT 0,
                UNIQUE (download_id, relative_path)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create download_files table", e))?;

        Ok(())
    }

    async fn create_sync_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE sync_jobs (
                id TEXT PRIMARY KEY,
                download_id TEXT NOT NULL REFERENCES download_jobs(id),
                remote_base TEXT NOT NULL DEFAULT '',
                local_base TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                cancelled_at INTEGER,
                deleted_at INTEGER
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create sync_jobs table", e))?;

        sqlx::query("CREATE INDEX idx_sync_jobs_download ON sync_jobs(download_id)")
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("create sync_jobs index", e))?;

        sqlx::query(
            r#"
            CREATE TABLE sync_files (
                id TEXT PRIMARY KEY,
                sync_job_id TEXT NOT NULL REFERENCES sync_jobs(id),
                download_file_id TEXT NOT NULL REFERENCES download_files(id),
                relative_path TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                synced_size INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                deleted_at INTEGER,
                UNIQUE (sync_job_id, relative_path)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create sync_files table", e))?;

        Ok(())
    }

    async fn create_move_and_app_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE move_jobs (
                id TEXT PRIMARY KEY,
                download_id TEXT NOT NULL REFERENCES download_jobs(id),
                source_path TEXT NOT NULL DEFAULT '',
                destination_path TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create move_jobs table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE app_jobs (
                id TEXT PRIMARY KEY,
                download_id TEXT NOT NULL REFERENCES download_jobs(id),
                app_name TEXT NOT NULL,
                path TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create app_jobs table", e))?;

        Ok(())
    }

    async fn create_tracked_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE tracked_downloads (
                download_id TEXT PRIMARY KEY REFERENCES download_jobs(id),
                downloader TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                app_name TEXT,
                state INTEGER NOT NULL DEFAULT 0,
                total_size INTEGER NOT NULL DEFAULT 0,
                completed_size INTEGER NOT NULL DEFAULT 0,
                total_files INTEGER NOT NULL DEFAULT 0,
                discovered_at INTEGER NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create tracked_downloads table", e))?;

        Ok(())
    }

    async fn create_events_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE events (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                subject_type TEXT NOT NULL,
                subject_id TEXT,
                app_name TEXT,
                message TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("create events table", e))?;

        sqlx::query("CREATE INDEX idx_events_timestamp ON events(timestamp)")
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("create events index", e))?;

        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("record migration", e))?;
        Ok(())
    }
}

fn migration_failed(step: &str, e: sqlx::Error) -> Error {
    Error::Database(DatabaseError::MigrationFailed(format!(
        "Failed to {}: {}",
        step, e
    )))
}
