//! Move job CRUD operations (written by the filesync controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{Database, MoveJob, NewMoveJob, now_ts};

const MOVE_JOB_COLUMNS: &str = r#"
    id, download_id, source_path, destination_path, status, error_message,
    created_at, completed_at
"#;

impl Database {
    /// Insert a new move job and return it
    pub async fn insert_move_job(&self, new: &NewMoveJob) -> Result<MoveJob> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO move_jobs (
                id, download_id, source_path, destination_path, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(new.download_id)
        .bind(&new.source_path)
        .bind(&new.destination_path)
        .bind(new.status)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert move job: {}",
                e
            )))
        })?;

        self.get_move_job(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "move job {} vanished after insert",
                id
            )))
        })
    }

    /// Get a move job by ID
    pub async fn get_move_job(&self, id: Id) -> Result<Option<MoveJob>> {
        let row = sqlx::query_as::<_, MoveJob>(&format!(
            "SELECT {MOVE_JOB_COLUMNS} FROM move_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get move job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get the most recent move job for a download, if any
    pub async fn get_latest_move_job(&self, download_id: Id) -> Result<Option<MoveJob>> {
        let row = sqlx::query_as::<_, MoveJob>(&format!(
            r#"
            SELECT {MOVE_JOB_COLUMNS} FROM move_jobs
            WHERE download_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get latest move job: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Update the mutable fields of a move job row
    pub async fn update_move_job(&self, job: &MoveJob) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE move_jobs SET
                source_path = ?, destination_path = ?, status = ?,
                error_message = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.source_path)
        .bind(&job.destination_path)
        .bind(job.status)
        .bind(&job.error_message)
        .bind(job.completed_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update move job: {}",
                e
            )))
        })?;

        Ok(())
    }
}
