//! Download file CRUD operations (written by the download controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{Database, DownloadFile, NewDownloadFile};

impl Database {
    /// Insert a new download file record and return it
    pub async fn insert_download_file(&self, new: &NewDownloadFile) -> Result<DownloadFile> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO download_files (
                id, download_id, relative_path, size, downloaded, progress, priority, state
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(new.download_id)
        .bind(&new.relative_path)
        .bind(new.size)
        .bind(new.downloaded)
        .bind(new.progress)
        .bind(new.priority)
        .bind(new.state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download file: {}",
                e
            )))
        })?;

        self.get_download_file(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "download file {} vanished after insert",
                id
            )))
        })
    }

    /// Get a download file by ID
    pub async fn get_download_file(&self, id: Id) -> Result<Option<DownloadFile>> {
        let row = sqlx::query_as::<_, DownloadFile>(
            r#"
            SELECT id, download_id, relative_path, size, downloaded, progress, priority, state
            FROM download_files
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a download file by its job and relative path
    pub async fn get_download_file_by_path(
        &self,
        download_id: Id,
        relative_path: &str,
    ) -> Result<Option<DownloadFile>> {
        let row = sqlx::query_as::<_, DownloadFile>(
            r#"
            SELECT id, download_id, relative_path, size, downloaded, progress, priority, state
            FROM download_files
            WHERE download_id = ? AND relative_path = ?
            "#,
        )
        .bind(download_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download file by path: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Update the mutable fields of a download file row
    pub async fn update_download_file(&self, file: &DownloadFile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE download_files SET
                size = ?, downloaded = ?, progress = ?, priority = ?, state = ?
            WHERE id = ?
            "#,
        )
        .bind(file.size)
        .bind(file.downloaded)
        .bind(file.progress)
        .bind(file.priority)
        .bind(file.state)
        .bind(file.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download file: {}",
                e
            )))
        })?;

        Ok(())
    }
}
