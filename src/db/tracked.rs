//! Tracked download upserts (written by the tracker controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{Database, TrackedDownload};

const TRACKED_COLUMNS: &str = r#"
    download_id, downloader, name, category, app_name, state,
    total_size, completed_size, total_files, discovered_at, error_message
"#;

impl Database {
    /// Insert or replace the tracked row for a download
    pub async fn upsert_tracked(&self, row: &TrackedDownload) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_downloads (
                download_id, downloader, name, category, app_name, state,
                total_size, completed_size, total_files, discovered_at, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (download_id) DO UPDATE SET
                downloader = excluded.downloader,
                name = excluded.name,
                category = excluded.category,
                app_name = excluded.app_name,
                state = excluded.state,
                total_size = excluded.total_size,
                completed_size = excluded.completed_size,
                total_files = excluded.total_files,
                discovered_at = excluded.discovered_at,
                error_message = excluded.error_message
            "#,
        )
        .bind(row.download_id)
        .bind(&row.downloader)
        .bind(&row.name)
        .bind(&row.category)
        .bind(&row.app_name)
        .bind(row.state)
        .bind(row.total_size)
        .bind(row.completed_size)
        .bind(row.total_files)
        .bind(row.discovered_at)
        .bind(&row.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert tracked download: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the tracked row for a download
    pub async fn get_tracked(&self, download_id: Id) -> Result<Option<TrackedDownload>> {
        let row = sqlx::query_as::<_, TrackedDownload>(&format!(
            "SELECT {TRACKED_COLUMNS} FROM tracked_downloads WHERE download_id = ?"
        ))
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get tracked download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List every tracked download, newest first
    pub async fn list_tracked(&self) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query_as::<_, TrackedDownload>(&format!(
            r#"
            SELECT {TRACKED_COLUMNS} FROM tracked_downloads
            ORDER BY discovered_at DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tracked downloads: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete the tracked row for a download (on removal)
    pub async fn delete_tracked(&self, download_id: Id) -> Result<()> {
        sqlx::query("DELETE FROM tracked_downloads WHERE download_id = ?")
            .bind(download_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete tracked download: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
