//! Download job CRUD operations (written by the download controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{Database, DownloadFile, DownloadJob, DownloadWithFiles, NewDownloadJob, now_ts};

const DOWNLOAD_JOB_COLUMNS: &str = r#"
    id, downloader, remote_id, name, category, previous_category,
    size, downloaded, progress, download_speed, save_path, status,
    error_message, discovered_at, downloaded_at, removed_at
"#;

impl Database {
    /// Insert a new download job record and return it
    pub async fn insert_download_job(&self, new: &NewDownloadJob) -> Result<DownloadJob> {
        let id = Id::generate();
        let now = now_ts();

        sqlx::query(
            r#"
            INSERT INTO download_jobs (
                id, downloader, remote_id, name, category,
                size, downloaded, progress, download_speed, save_path,
                status, discovered_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&new.downloader)
        .bind(&new.remote_id)
        .bind(&new.name)
        .bind(&new.category)
        .bind(new.size)
        .bind(new.downloaded)
        .bind(new.progress)
        .bind(new.download_speed)
        .bind(&new.save_path)
        .bind(new.status)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download job: {}",
                e
            )))
        })?;

        self.get_download_job(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "download job {} vanished after insert",
                id
            )))
        })
    }

    /// Get a download job by ID (regardless of removal)
    pub async fn get_download_job(&self, id: Id) -> Result<Option<DownloadJob>> {
        let row = sqlx::query_as::<_, DownloadJob>(&format!(
            "SELECT {DOWNLOAD_JOB_COLUMNS} FROM download_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a download job by its downloader and remote id, regardless of
    /// removal status.
    ///
    /// Deliberately unfiltered: the download controller inspects
    /// `removed_at` on the result to detect a removed download
    /// re-appearing at the client. Adding a `removed_at IS NULL` filter
    /// here would silently break rediscovery.
    pub async fn get_download_job_by_remote(
        &self,
        downloader: &str,
        remote_id: &str,
    ) -> Result<Option<DownloadJob>> {
        let row = sqlx::query_as::<_, DownloadJob>(&format!(
            r#"
            SELECT {DOWNLOAD_JOB_COLUMNS} FROM download_jobs
            WHERE downloader = ? AND remote_id = ?
            "#
        ))
        .bind(downloader)
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download job by remote id: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all non-removed download jobs for a downloader
    pub async fn list_download_jobs(&self, downloader: &str) -> Result<Vec<DownloadJob>> {
        let rows = sqlx::query_as::<_, DownloadJob>(&format!(
            r#"
            SELECT {DOWNLOAD_JOB_COLUMNS} FROM download_jobs
            WHERE downloader = ? AND removed_at IS NULL
            ORDER BY discovered_at ASC
            "#
        ))
        .bind(downloader)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list download jobs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update every mutable field of a download job row.
    ///
    /// Removal state is not touched here; it changes only through
    /// [`mark_download_removed`](Self::mark_download_removed) and
    /// [`mark_download_restored`](Self::mark_download_restored).
    pub async fn update_download_job(&self, job: &DownloadJob) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE download_jobs SET
                name = ?, category = ?, previous_category = ?,
                size = ?, downloaded = ?, progress = ?, download_speed = ?,
                save_path = ?, status = ?, error_message = ?,
                downloaded_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.name)
        .bind(&job.category)
        .bind(&job.previous_category)
        .bind(job.size)
        .bind(job.downloaded)
        .bind(job.progress)
        .bind(job.download_speed)
        .bind(&job.save_path)
        .bind(job.status)
        .bind(&job.error_message)
        .bind(job.downloaded_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a download job as removed from the remote client.
    ///
    /// The row is kept (timeline and sync rows reference it); default
    /// listings hide it, and a later re-appearance clears the marker.
    pub async fn mark_download_removed(&self, id: Id) -> Result<()> {
        sqlx::query("UPDATE download_jobs SET removed_at = ? WHERE id = ?")
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark download removed: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Clear the removal marker when a download re-appears remotely
    pub async fn mark_download_restored(&self, id: Id) -> Result<()> {
        sqlx::query("UPDATE download_jobs SET removed_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to restore download: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Get a download job with its file rows preloaded
    pub async fn get_download_with_files(&self, id: Id) -> Result<Option<DownloadWithFiles>> {
        let Some(job) = self.get_download_job(id).await? else {
            return Ok(None);
        };
        let files = self.list_download_files(id).await?;
        Ok(Some(DownloadWithFiles { job, files }))
    }

    /// List the file rows of a download job
    pub async fn list_download_files(&self, download_id: Id) -> Result<Vec<DownloadFile>> {
        let rows = sqlx::query_as::<_, DownloadFile>(
            r#"
            SELECT id, download_id, relative_path, size, downloaded, progress, priority, state
            FROM download_files
            WHERE download_id = ?
            ORDER BY relative_path ASC
            "#,
        )
        .bind(download_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list download files: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
