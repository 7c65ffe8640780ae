//! Sync file CRUD operations (written by the filesync controller only).

use crate::error::DatabaseError;
use crate::types::{Id, SyncFileStatus};
use crate::{Error, Result};

use super::{Database, NewSyncFile, SyncFile};

const SYNC_FILE_COLUMNS: &str = r#"
    id, sync_job_id, download_file_id, relative_path, size, synced_size,
    status, error_message, deleted_at
"#;

impl Database {
    /// Insert a new sync file (status pending) and return it
    pub async fn insert_sync_file(&self, new: &NewSyncFile) -> Result<SyncFile> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO sync_files (
                id, sync_job_id, download_file_id, relative_path, size, status
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(new.sync_job_id)
        .bind(new.download_file_id)
        .bind(&new.relative_path)
        .bind(new.size)
        .bind(SyncFileStatus::Pending.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert sync file: {}",
                e
            )))
        })?;

        self.get_sync_file_by_id(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "sync file {} vanished after insert",
                id
            )))
        })
    }

    /// Get a sync file by ID (soft-deleted included; callers check
    /// `deleted_at` when it matters)
    pub async fn get_sync_file_by_id(&self, id: Id) -> Result<Option<SyncFile>> {
        let row = sqlx::query_as::<_, SyncFile>(&format!(
            "SELECT {SYNC_FILE_COLUMNS} FROM sync_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get the active sync file for (job, relative path), if any.
    ///
    /// This lookup is the idempotency guard for concurrent file-completed
    /// announcements.
    pub async fn get_sync_file(
        &self,
        sync_job_id: Id,
        relative_path: &str,
    ) -> Result<Option<SyncFile>> {
        let row = sqlx::query_as::<_, SyncFile>(&format!(
            r#"
            SELECT {SYNC_FILE_COLUMNS} FROM sync_files
            WHERE sync_job_id = ? AND relative_path = ? AND deleted_at IS NULL
            "#
        ))
        .bind(sync_job_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync file by path: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List the active sync files of a job
    pub async fn list_sync_files(&self, sync_job_id: Id) -> Result<Vec<SyncFile>> {
        let rows = sqlx::query_as::<_, SyncFile>(&format!(
            r#"
            SELECT {SYNC_FILE_COLUMNS} FROM sync_files
            WHERE sync_job_id = ? AND deleted_at IS NULL
            ORDER BY relative_path ASC
            "#
        ))
        .bind(sync_job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list sync files: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update the mutable fields of a sync file row
    pub async fn update_sync_file(&self, file: &SyncFile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_files SET
                size = ?, synced_size = ?, status = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(file.size)
        .bind(file.synced_size)
        .bind(file.status)
        .bind(&file.error_message)
        .bind(file.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update sync file: {}",
                e
            )))
        })?;

        Ok(())
    }
}
