//! Sync job CRUD and soft-delete operations (written by the filesync
//! controller only).
//!
//! Soft delete hides rows from the default queries via `deleted_at`; the
//! `_any` variants bypass the filter so a soft-deleted job can be found and
//! revived with its original ids.

use crate::error::DatabaseError;
use crate::types::{Id, SyncStatus};
use crate::{Error, Result};

use super::{Database, NewSyncJob, SyncJob, SyncJobWithFiles, now_ts};

const SYNC_JOB_COLUMNS: &str = r#"
    id, download_id, remote_base, local_base, status, error_message,
    created_at, started_at, completed_at, cancelled_at, deleted_at
"#;

impl Database {
    /// Insert a new sync job (status pending, empty local base) and return it
    pub async fn insert_sync_job(&self, new: &NewSyncJob) -> Result<SyncJob> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO sync_jobs (id, download_id, remote_base, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(new.download_id)
        .bind(&new.remote_base)
        .bind(SyncStatus::Pending.to_i32())
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert sync job: {}",
                e
            )))
        })?;

        self.get_sync_job(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "sync job {} vanished after insert",
                id
            )))
        })
    }

    /// Get a sync job by ID (soft-deleted included; lookups by id are explicit)
    pub async fn get_sync_job(&self, id: Id) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJob>(&format!(
            "SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get the active (non-soft-deleted) sync job for a download, if any.
    ///
    /// At most one exists per download by construction.
    pub async fn get_sync_job_for_download(&self, download_id: Id) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJob>(&format!(
            r#"
            SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs
            WHERE download_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync job for download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get the latest sync job for a download, bypassing the soft-delete
    /// filter (used to revive a soft-deleted job with its ids intact)
    pub async fn get_sync_job_for_download_any(&self, download_id: Id) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJob>(&format!(
            r#"
            SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs
            WHERE download_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync job (any) for download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Update every mutable field of a sync job row
    pub async fn update_sync_job(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_jobs SET
                remote_base = ?, local_base = ?, status = ?, error_message = ?,
                started_at = ?, completed_at = ?, cancelled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.remote_base)
        .bind(&job.local_base)
        .bind(job.status)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.cancelled_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update sync job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Soft-delete a sync job and all its files in one logical step.
    ///
    /// Ids are preserved so a later reactivation restores the same rows.
    pub async fn soft_delete_sync_job(&self, id: Id) -> Result<()> {
        let now = now_ts();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin soft-delete transaction: {}",
                e
            )))
        })?;

        sqlx::query("UPDATE sync_jobs SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to soft-delete sync job: {}",
                    e
                )))
            })?;

        sqlx::query(
            "UPDATE sync_files SET deleted_at = ? WHERE sync_job_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to soft-delete sync files: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit soft-delete: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Reactivate a soft-deleted sync job and all its files, preserving ids
    pub async fn restore_sync_job(&self, id: Id) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin restore transaction: {}",
                e
            )))
        })?;

        sqlx::query("UPDATE sync_jobs SET deleted_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to restore sync job: {}",
                    e
                )))
            })?;

        sqlx::query("UPDATE sync_files SET deleted_at = NULL WHERE sync_job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to restore sync files: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit restore: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a sync job with its non-soft-deleted file rows preloaded
    pub async fn get_sync_job_with_files(&self, id: Id) -> Result<Option<SyncJobWithFiles>> {
        let Some(job) = self.get_sync_job(id).await? else {
            return Ok(None);
        };
        let files = self.list_sync_files(id).await?;
        Ok(Some(SyncJobWithFiles { job, files }))
    }
}
