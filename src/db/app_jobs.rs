//! App job CRUD operations (written by the app controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{AppJob, Database, NewAppJob, now_ts};

const APP_JOB_COLUMNS: &str = r#"
    id, download_id, app_name, path, status, error_message, created_at, completed_at
"#;

impl Database {
    /// Insert a new app job and return it
    pub async fn insert_app_job(&self, new: &NewAppJob) -> Result<AppJob> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO app_jobs (id, download_id, app_name, path, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(new.download_id)
        .bind(&new.app_name)
        .bind(&new.path)
        .bind(new.status)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert app job: {}",
                e
            )))
        })?;

        self.get_app_job(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "app job {} vanished after insert",
                id
            )))
        })
    }

    /// Get an app job by ID
    pub async fn get_app_job(&self, id: Id) -> Result<Option<AppJob>> {
        let row = sqlx::query_as::<_, AppJob>(&format!(
            "SELECT {APP_JOB_COLUMNS} FROM app_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get app job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List the app jobs of a download, newest first
    pub async fn list_app_jobs(&self, download_id: Id) -> Result<Vec<AppJob>> {
        let rows = sqlx::query_as::<_, AppJob>(&format!(
            r#"
            SELECT {APP_JOB_COLUMNS} FROM app_jobs
            WHERE download_id = ?
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(download_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list app jobs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update the mutable fields of an app job row
    pub async fn update_app_job(&self, job: &AppJob) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE app_jobs SET
                status = ?, error_message = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status)
        .bind(&job.error_message)
        .bind(job.completed_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update app job: {}",
                e
            )))
        })?;

        Ok(())
    }
}
