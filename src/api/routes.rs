//! Read API handlers and response shapes.
//!
//! The API never mutates domain state; it reads the store and the live
//! progress index, and relays bus events over SSE.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::{AppJob, DownloadFile, DownloadJob, EventRecord, MoveJob, SyncFile, SyncJob, TrackedDownload};
use crate::progress::DownloadProgress;
use crate::types::{
    AppJobStatus, DownloadStatus, FileState, MoveStatus, SyncFileStatus, SyncStatus, TrackedState,
};

use super::state::ApiState;

/// Error payload returned on failures
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message
    pub error: String,
}

type ApiResult<T> = std::result::Result<T, (StatusCode, Json<ErrorBody>)>;

fn internal(e: crate::Error) -> (StatusCode, Json<ErrorBody>) {
    tracing::error!(error = %e, "API query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

fn not_found(what: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: format!("{what} not found"),
        }),
    )
}

/// A tracked download as served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackedDownloadDto {
    /// Download job id
    pub download_id: String,
    /// Downloader name
    pub downloader: String,
    /// Display name
    pub name: String,
    /// Current category
    pub category: String,
    /// First matching enabled app
    pub app_name: Option<String>,
    /// Pipeline state
    pub state: TrackedState,
    /// Total size in bytes
    pub total_size: i64,
    /// Completed size in bytes
    pub completed_size: i64,
    /// Number of files
    pub total_files: i64,
    /// Unix timestamp when first observed
    pub discovered_at: i64,
    /// Latest error across the pipeline, if any
    pub error_message: Option<String>,
}

impl From<TrackedDownload> for TrackedDownloadDto {
    fn from(row: TrackedDownload) -> Self {
        Self {
            download_id: row.download_id.to_string(),
            downloader: row.downloader.clone(),
            name: row.name.clone(),
            category: row.category.clone(),
            app_name: row.app_name.clone(),
            state: row.state(),
            total_size: row.total_size,
            completed_size: row.completed_size,
            total_files: row.total_files,
            discovered_at: row.discovered_at,
            error_message: row.error_message,
        }
    }
}

/// A download job with its pipeline children
#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadDetailDto {
    /// Derived UI row
    pub tracked: Option<TrackedDownloadDto>,
    /// The download job
    pub download: DownloadJobDto,
    /// Its files
    pub files: Vec<DownloadFileDto>,
    /// Active sync job, if any
    pub sync_job: Option<SyncJobDto>,
    /// Sync files of the active job
    pub sync_files: Vec<SyncFileDto>,
    /// Latest move job, if any
    pub move_job: Option<MoveJobDto>,
    /// App notifications, newest first
    pub app_jobs: Vec<AppJobDto>,
    /// Recent timeline records for this download, newest first
    pub events: Vec<EventDto>,
}

/// Download job fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadJobDto {
    /// Row id
    pub id: String,
    /// Remote id at the downloader
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: String,
    /// Previous category (before the last rename)
    pub previous_category: Option<String>,
    /// Status
    pub status: DownloadStatus,
    /// Total size in bytes
    pub size: i64,
    /// Downloaded bytes
    pub downloaded: i64,
    /// Progress (0.0-100.0)
    pub progress: f32,
    /// Remote download speed (bytes/sec)
    pub download_speed: i64,
    /// Remote base directory
    pub save_path: String,
    /// Error reported by the remote client
    pub error_message: Option<String>,
}

impl From<&DownloadJob> for DownloadJobDto {
    fn from(job: &DownloadJob) -> Self {
        Self {
            id: job.id.to_string(),
            remote_id: job.remote_id.clone(),
            name: job.name.clone(),
            category: job.category.clone(),
            previous_category: job.previous_category.clone(),
            status: job.status(),
            size: job.size,
            downloaded: job.downloaded,
            progress: job.progress,
            download_speed: job.download_speed,
            save_path: job.save_path.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Download file fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadFileDto {
    /// Row id
    pub id: String,
    /// Path relative to the save path
    pub relative_path: String,
    /// Size in bytes
    pub size: i64,
    /// Downloaded bytes
    pub downloaded: i64,
    /// Remote state
    pub state: FileState,
    /// Priority (0 = deselected)
    pub priority: i32,
}

impl From<&DownloadFile> for DownloadFileDto {
    fn from(file: &DownloadFile) -> Self {
        Self {
            id: file.id.to_string(),
            relative_path: file.relative_path.clone(),
            size: file.size,
            downloaded: file.downloaded,
            state: file.state(),
            priority: file.priority,
        }
    }
}

/// Sync job fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncJobDto {
    /// Row id
    pub id: String,
    /// Status
    pub status: SyncStatus,
    /// Remote base directory
    pub remote_base: String,
    /// Local staging directory
    pub local_base: String,
    /// Unix timestamps
    pub started_at: Option<i64>,
    /// When every file finished
    pub completed_at: Option<i64>,
    /// When cancelled
    pub cancelled_at: Option<i64>,
    /// Last transfer error
    pub error_message: Option<String>,
}

impl From<&SyncJob> for SyncJobDto {
    fn from(job: &SyncJob) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status(),
            remote_base: job.remote_base.clone(),
            local_base: job.local_base.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            cancelled_at: job.cancelled_at,
            error_message: job.error_message.clone(),
        }
    }
}

/// Sync file fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncFileDto {
    /// Row id
    pub id: String,
    /// Path relative to the sync bases
    pub relative_path: String,
    /// Expected size in bytes
    pub size: i64,
    /// Bytes synced
    pub synced_size: i64,
    /// Status
    pub status: SyncFileStatus,
    /// Last transfer error
    pub error_message: Option<String>,
}

impl From<&SyncFile> for SyncFileDto {
    fn from(file: &SyncFile) -> Self {
        Self {
            id: file.id.to_string(),
            relative_path: file.relative_path.clone(),
            size: file.size,
            synced_size: file.synced_size,
            status: file.status(),
            error_message: file.error_message.clone(),
        }
    }
}

/// Move job fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct MoveJobDto {
    /// Row id
    pub id: String,
    /// Source tree
    pub source_path: String,
    /// Destination tree
    pub destination_path: String,
    /// Status
    pub status: MoveStatus,
    /// Error, if the move failed
    pub error_message: Option<String>,
}

impl From<&MoveJob> for MoveJobDto {
    fn from(job: &MoveJob) -> Self {
        Self {
            id: job.id.to_string(),
            source_path: job.source_path.clone(),
            destination_path: job.destination_path.clone(),
            status: job.status(),
            error_message: job.error_message.clone(),
        }
    }
}

/// App job fields served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct AppJobDto {
    /// Row id
    pub id: String,
    /// App that was notified
    pub app_name: String,
    /// Path handed to the app
    pub path: String,
    /// Status
    pub status: AppJobStatus,
    /// Error, if the trigger failed
    pub error_message: Option<String>,
}

impl From<&AppJob> for AppJobDto {
    fn from(job: &AppJob) -> Self {
        Self {
            id: job.id.to_string(),
            app_name: job.app_name.clone(),
            path: job.path.clone(),
            status: job.status(),
            error_message: job.error_message.clone(),
        }
    }
}

/// A timeline record served to the UI
#[derive(Debug, Serialize, ToSchema)]
pub struct EventDto {
    /// Row id
    pub id: String,
    /// Dotted event kind
    pub kind: String,
    /// Unix timestamp
    pub timestamp: i64,
    /// Subject type tag
    pub subject_type: String,
    /// Subject entity id
    pub subject_id: Option<String>,
    /// App name, when relevant
    pub app_name: Option<String>,
    /// Rendered message
    pub message: String,
    /// Structured payload (JSON text)
    pub details: String,
}

impl From<EventRecord> for EventDto {
    fn from(record: EventRecord) -> Self {
        Self {
            id: record.id.to_string(),
            kind: record.kind,
            timestamp: record.timestamp,
            subject_type: record.subject_type,
            subject_id: record.subject_id,
            app_name: record.app_name,
            message: record.message,
            details: record.details,
        }
    }
}

/// Query parameters for the timeline listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Maximum rows to return (default 100, capped at 1000)
    pub limit: Option<i64>,
}

/// List tracked downloads
#[utoipa::path(
    get,
    path = "/api/v1/downloads",
    responses((status = 200, description = "Tracked downloads", body = [TrackedDownloadDto]))
)]
pub async fn list_downloads(
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<TrackedDownloadDto>>> {
    let rows = state.db.list_tracked().await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Fetch one download with its pipeline children
#[utoipa::path(
    get,
    path = "/api/v1/downloads/{id}",
    params(("id" = String, Path, description = "Download job id")),
    responses(
        (status = 200, description = "Download detail", body = DownloadDetailDto),
        (status = 404, description = "Unknown download", body = ErrorBody)
    )
)]
pub async fn get_download(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DownloadDetailDto>> {
    let id: crate::types::Id = id.parse().map_err(|_| not_found("download"))?;
    let Some(with_files) = state.db.get_download_with_files(id).await.map_err(internal)? else {
        return Err(not_found("download"));
    };

    let tracked = state.db.get_tracked(id).await.map_err(internal)?;
    let sync_job = state
        .db
        .get_sync_job_for_download(id)
        .await
        .map_err(internal)?;
    let sync_files = match &sync_job {
        Some(job) => state.db.list_sync_files(job.id).await.map_err(internal)?,
        None => Vec::new(),
    };
    let move_job = state.db.get_latest_move_job(id).await.map_err(internal)?;
    let app_jobs = state.db.list_app_jobs(id).await.map_err(internal)?;
    let events = state
        .db
        .list_events_for_subject(id, 50)
        .await
        .map_err(internal)?;

    Ok(Json(DownloadDetailDto {
        tracked: tracked.map(Into::into),
        download: (&with_files.job).into(),
        files: with_files.files.iter().map(Into::into).collect(),
        sync_job: sync_job.as_ref().map(Into::into),
        sync_files: sync_files.iter().map(Into::into).collect(),
        move_job: move_job.as_ref().map(Into::into),
        app_jobs: app_jobs.iter().map(Into::into).collect(),
        events: events.into_iter().map(Into::into).collect(),
    }))
}

/// Live progress of every in-flight sync
#[utoipa::path(
    get,
    path = "/api/v1/progress",
    responses((status = 200, description = "All in-flight syncs", body = [DownloadProgress]))
)]
pub async fn list_progress(State(state): State<ApiState>) -> Json<Vec<DownloadProgress>> {
    Json(state.index.list())
}

/// Live progress of one in-flight sync.
///
/// Each poll appends a speed sample for sparkline rendering.
#[utoipa::path(
    get,
    path = "/api/v1/progress/{downloader}/{remote_id}",
    params(
        ("downloader" = String, Path, description = "Downloader name"),
        ("remote_id" = String, Path, description = "Remote download id")
    ),
    responses(
        (status = 200, description = "Live progress", body = DownloadProgress),
        (status = 404, description = "No in-flight sync", body = ErrorBody)
    )
)]
pub async fn get_progress(
    State(state): State<ApiState>,
    Path((downloader, remote_id)): Path<(String, String)>,
) -> ApiResult<Json<DownloadProgress>> {
    match state.index.snapshot(&(downloader, remote_id)) {
        Some(progress) => Ok(Json(progress)),
        None => Err(not_found("progress")),
    }
}

/// List recent timeline records, newest first
#[utoipa::path(
    get,
    path = "/api/v1/events",
    params(EventsQuery),
    responses((status = 200, description = "Timeline records", body = [EventDto]))
)]
pub async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<EventDto>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let rows = state.db.list_events(limit).await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Relay bus events as Server-Sent Events
#[utoipa::path(
    get,
    path = "/api/v1/stream",
    responses((status = 200, description = "SSE stream of pipeline events"))
)]
pub async fn stream_events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let subscription = state.bus.subscribe(&[]);
    let stream = subscription.into_stream().map(|event| {
        let payload = serde_json::json!({
            "kind": event.kind.as_str(),
            "timestamp": event.timestamp.to_rfc3339(),
            "subject_type": event.subject.type_str(),
            "subject_id": event.subject.id().map(|id| id.to_string()),
            "data": event.data,
        });
        Ok(SseEvent::default()
            .event(event.kind.as_str())
            .data(payload.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
