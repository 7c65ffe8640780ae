//! Append-only timeline records (written by the timeline controller only).

use crate::error::DatabaseError;
use crate::types::Id;
use crate::{Error, Result};

use super::{Database, EventRecord, NewEventRecord};

const EVENT_COLUMNS: &str = r#"
    id, kind, timestamp, subject_type, subject_id, app_name, message, details
"#;

impl Database {
    /// Append a timeline record and return its id
    pub async fn insert_event(&self, new: &NewEventRecord) -> Result<Id> {
        let id = Id::generate();

        sqlx::query(
            r#"
            INSERT INTO events (
                id, kind, timestamp, subject_type, subject_id, app_name, message, details
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&new.kind)
        .bind(new.timestamp)
        .bind(&new.subject_type)
        .bind(&new.subject_id)
        .bind(&new.app_name)
        .bind(&new.message)
        .bind(&new.details)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert event: {}",
                e
            )))
        })?;

        Ok(id)
    }

    /// List the most recent timeline records, newest first
    pub async fn list_events(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list events: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List the most recent timeline records for one subject, newest first
    pub async fn list_events_for_subject(
        &self,
        subject_id: Id,
        limit: i64,
    ) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE subject_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(subject_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list events for subject: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
