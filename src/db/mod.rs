//! Database layer for seedreap
//!
//! Handles SQLite persistence for the pipeline entities. The store is the
//! only shared mutable state between controllers; each entity class has
//! exactly one writing controller (its mutation helpers are called from that
//! controller only), while any controller may read any row.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by entity:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`download_jobs`] / [`download_files`] — remote download mirror (download controller)
//! - [`sync_jobs`] / [`sync_files`] — sync pipeline state, soft-deletable (filesync controller)
//! - [`move_jobs`] — staging-to-final transitions (filesync controller)
//! - [`app_jobs`] — app notifications (app controller)
//! - [`tracked`] — derived UI state (tracker controller)
//! - [`timeline`] — append-only event records (timeline controller)

use sqlx::{FromRow, sqlite::SqlitePool};

use crate::types::{
    AppJobStatus, DownloadStatus, FileState, Id, MoveStatus, SyncFileStatus, SyncStatus,
    TrackedState,
};

mod app_jobs;
mod download_files;
mod download_jobs;
mod migrations;
mod move_jobs;
mod sync_files;
mod sync_jobs;
mod timeline;
mod tracked;

/// New download job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewDownloadJob {
    /// Name of the downloader that reported this download
    pub downloader: String,
    /// The downloader's native identifier (e.g. torrent hash)
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Category tag
    pub category: String,
    /// Total size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Remote progress (0.0-100.0)
    pub progress: f32,
    /// Remote download speed in bytes per second
    pub download_speed: i64,
    /// Remote base directory holding the download
    pub save_path: String,
    /// Status code (see [`DownloadStatus`])
    pub status: i32,
}

/// Download job record: one row per (downloader, remote id) observed
#[derive(Debug, Clone, FromRow)]
pub struct DownloadJob {
    /// Unique database ID
    pub id: Id,
    /// Name of the downloader that reported this download
    pub downloader: String,
    /// The downloader's native identifier (e.g. torrent hash)
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Category tag
    pub category: String,
    /// Category value before the last rename
    pub previous_category: Option<String>,
    /// Total size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Remote progress (0.0-100.0)
    pub progress: f32,
    /// Remote download speed in bytes per second
    pub download_speed: i64,
    /// Remote base directory holding the download
    pub save_path: String,
    /// Status code (see [`DownloadStatus`])
    pub status: i32,
    /// Error message reported by the remote client
    pub error_message: Option<String>,
    /// Unix timestamp when first observed
    pub discovered_at: i64,
    /// Unix timestamp when the remote download completed
    pub downloaded_at: Option<i64>,
    /// Unix timestamp when the download disappeared from the remote client
    pub removed_at: Option<i64>,
}

impl DownloadJob {
    /// Typed status
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::from_i32(self.status)
    }
}

/// New download file to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewDownloadFile {
    /// Download this file belongs to
    pub download_id: Id,
    /// Path relative to the download's save path (includes the download's
    /// folder name for multi-file downloads)
    pub relative_path: String,
    /// Size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Remote progress (0.0-100.0)
    pub progress: f32,
    /// Remote priority; 0 = deselected, excluded from syncing
    pub priority: i32,
    /// State code (see [`FileState`])
    pub state: i32,
}

/// Download file record: one row per file inside a download job
#[derive(Debug, Clone, FromRow)]
pub struct DownloadFile {
    /// Unique database ID
    pub id: Id,
    /// Download this file belongs to
    pub download_id: Id,
    /// Path relative to the download's save path
    pub relative_path: String,
    /// Size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Remote progress (0.0-100.0)
    pub progress: f32,
    /// Remote priority; 0 = deselected, excluded from syncing
    pub priority: i32,
    /// State code (see [`FileState`])
    pub state: i32,
}

impl DownloadFile {
    /// Typed state
    pub fn state(&self) -> FileState {
        FileState::from_i32(self.state)
    }

    /// Whether the file participates in syncing
    pub fn is_selected(&self) -> bool {
        self.priority > 0
    }
}

/// New sync job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    /// Download this job syncs
    pub download_id: Id,
    /// Remote base directory (the download's save path at creation time)
    pub remote_base: String,
}

/// Sync job record: at most one non-soft-deleted row per download job
#[derive(Debug, Clone, FromRow)]
pub struct SyncJob {
    /// Unique database ID
    pub id: Id,
    /// Download this job syncs
    pub download_id: Id,
    /// Remote base directory
    pub remote_base: String,
    /// Local staging directory; empty until the first transfer starts
    pub local_base: String,
    /// Status code (see [`SyncStatus`])
    pub status: i32,
    /// Error message from the last failed transfer
    pub error_message: Option<String>,
    /// Unix timestamp when created
    pub created_at: i64,
    /// Unix timestamp when the first transfer started
    pub started_at: Option<i64>,
    /// Unix timestamp when every file finished
    pub completed_at: Option<i64>,
    /// Unix timestamp when cancelled
    pub cancelled_at: Option<i64>,
    /// Soft-delete marker; hidden from default queries when set
    pub deleted_at: Option<i64>,
}

impl SyncJob {
    /// Typed status
    pub fn status(&self) -> SyncStatus {
        SyncStatus::from_i32(self.status)
    }

    /// Whether the row is soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// New sync file to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewSyncFile {
    /// Sync job this file belongs to
    pub sync_job_id: Id,
    /// The download file this row mirrors (required link)
    pub download_file_id: Id,
    /// Path relative to the job's bases
    pub relative_path: String,
    /// Expected size in bytes
    pub size: i64,
}

/// Sync file record: one row per file to sync within a job
#[derive(Debug, Clone, FromRow)]
pub struct SyncFile {
    /// Unique database ID
    pub id: Id,
    /// Sync job this file belongs to
    pub sync_job_id: Id,
    /// The download file this row mirrors
    pub download_file_id: Id,
    /// Path relative to the job's bases
    pub relative_path: String,
    /// Expected size in bytes
    pub size: i64,
    /// Bytes transferred so far (persisted on completion, live in the
    /// progress index during transfer)
    pub synced_size: i64,
    /// Status code (see [`SyncFileStatus`])
    pub status: i32,
    /// Error message from the last failed transfer
    pub error_message: Option<String>,
    /// Soft-delete marker; set/cleared together with the owning job
    pub deleted_at: Option<i64>,
}

impl SyncFile {
    /// Typed status
    pub fn status(&self) -> SyncFileStatus {
        SyncFileStatus::from_i32(self.status)
    }
}

/// New move job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewMoveJob {
    /// Download whose files move
    pub download_id: Id,
    /// Source tree (staging base, or the old final path for migrations)
    pub source_path: String,
    /// Destination tree
    pub destination_path: String,
    /// Initial status code (see [`MoveStatus`])
    pub status: i32,
}

/// Move job record: one row per staging-to-final (or migration) transition
#[derive(Debug, Clone, FromRow)]
pub struct MoveJob {
    /// Unique database ID
    pub id: Id,
    /// Download whose files move
    pub download_id: Id,
    /// Source tree
    pub source_path: String,
    /// Destination tree
    pub destination_path: String,
    /// Status code (see [`MoveStatus`])
    pub status: i32,
    /// Error message if the move failed
    pub error_message: Option<String>,
    /// Unix timestamp when created
    pub created_at: i64,
    /// Unix timestamp when finished
    pub completed_at: Option<i64>,
}

impl MoveJob {
    /// Typed status
    pub fn status(&self) -> MoveStatus {
        MoveStatus::from_i32(self.status)
    }
}

/// New app job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewAppJob {
    /// Download that was imported
    pub download_id: Id,
    /// App that was notified
    pub app_name: String,
    /// Path handed to the app
    pub path: String,
    /// Initial status code (see [`AppJobStatus`])
    pub status: i32,
}

/// App job record: one row per app notification
#[derive(Debug, Clone, FromRow)]
pub struct AppJob {
    /// Unique database ID
    pub id: Id,
    /// Download that was imported
    pub download_id: Id,
    /// App that was notified
    pub app_name: String,
    /// Path handed to the app
    pub path: String,
    /// Status code (see [`AppJobStatus`])
    pub status: i32,
    /// Error message if the trigger failed
    pub error_message: Option<String>,
    /// Unix timestamp when created
    pub created_at: i64,
    /// Unix timestamp when finished
    pub completed_at: Option<i64>,
}

impl AppJob {
    /// Typed status
    pub fn status(&self) -> AppJobStatus {
        AppJobStatus::from_i32(self.status)
    }
}

/// Derived per-download state row driving the UI (tracker controller owned)
#[derive(Debug, Clone, FromRow)]
pub struct TrackedDownload {
    /// The download this row tracks (primary key)
    pub download_id: Id,
    /// Downloader name
    pub downloader: String,
    /// Display name
    pub name: String,
    /// Current category
    pub category: String,
    /// First matching enabled app, if any
    pub app_name: Option<String>,
    /// State code (see [`TrackedState`])
    pub state: i32,
    /// Total size across files in bytes
    pub total_size: i64,
    /// Completed size across files in bytes
    pub completed_size: i64,
    /// Number of files
    pub total_files: i64,
    /// Unix timestamp when first observed
    pub discovered_at: i64,
    /// Latest error message across the pipeline, if any
    pub error_message: Option<String>,
}

impl TrackedDownload {
    /// Typed state
    pub fn state(&self) -> TrackedState {
        TrackedState::from_i32(self.state)
    }
}

/// New timeline record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    /// Dotted event kind (e.g. `download.discovered`)
    pub kind: String,
    /// Unix timestamp of the event
    pub timestamp: i64,
    /// Subject type tag (system|download|downloader|app|sync-job|move-job|app-job)
    pub subject_type: String,
    /// Subject entity id, if any
    pub subject_id: Option<String>,
    /// App name, when the event concerns one
    pub app_name: Option<String>,
    /// Rendered human-readable message
    pub message: String,
    /// Serialized structured payload (JSON object)
    pub details: String,
}

/// Timeline record from the database (append-only)
#[derive(Debug, Clone, FromRow)]
pub struct EventRecord {
    /// Unique database ID (sorts by insertion time)
    pub id: Id,
    /// Dotted event kind
    pub kind: String,
    /// Unix timestamp of the event
    pub timestamp: i64,
    /// Subject type tag
    pub subject_type: String,
    /// Subject entity id, if any
    pub subject_id: Option<String>,
    /// App name, when the event concerns one
    pub app_name: Option<String>,
    /// Rendered human-readable message
    pub message: String,
    /// Serialized structured payload
    pub details: String,
}

/// A download job preloaded with its file rows
#[derive(Debug, Clone)]
pub struct DownloadWithFiles {
    /// The job row
    pub job: DownloadJob,
    /// Its file rows
    pub files: Vec<DownloadFile>,
}

/// A sync job preloaded with its (non-soft-deleted) file rows
#[derive(Debug, Clone)]
pub struct SyncJobWithFiles {
    /// The job row
    pub job: SyncJob,
    /// Its file rows
    pub files: Vec<SyncFile>,
}

/// Database handle for seedreap
pub struct Database {
    pool: SqlitePool,
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
