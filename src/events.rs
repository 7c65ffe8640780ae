//! Event vocabulary for the pipeline bus.
//!
//! Every event is an envelope of `{kind, timestamp, subject, data}`. The
//! subject is a typed variant holding the entity the event is about; the data
//! map carries the per-kind payload keys documented on [`EventKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AppConfig, DownloaderConfig};
use crate::db::{AppJob, DownloadJob, MoveJob, SyncJob};
use crate::types::Id;

/// Domain event type.
///
/// The serialized form is the dotted wire name (`download.discovered`, …)
/// used on the bus, in the timeline store and over SSE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The daemon started
    #[serde(rename = "system.started")]
    SystemStarted,
    /// A configured downloader answered its connection test
    #[serde(rename = "downloader.connected")]
    DownloaderConnected,
    /// A configured app answered its connection test
    #[serde(rename = "app.connected")]
    AppConnected,
    /// A download was observed for the first time. Data: `save_path`,
    /// optional `final_path`
    #[serde(rename = "download.discovered")]
    DownloadDiscovered,
    /// Size/speed/progress drifted beyond the configured threshold
    #[serde(rename = "download.updated")]
    DownloadUpdated,
    /// The remote client paused the download
    #[serde(rename = "download.paused")]
    DownloadPaused,
    /// The remote client resumed the download
    #[serde(rename = "download.resumed")]
    DownloadResumed,
    /// The download disappeared from the remote client
    #[serde(rename = "download.removed")]
    DownloadRemoved,
    /// The remote client reported an error
    #[serde(rename = "download.error")]
    DownloadError,
    /// All pieces present on the seedbox
    #[serde(rename = "download.complete")]
    DownloadComplete,
    /// The category tag changed. Data: `old_category`, `new_category`
    #[serde(rename = "category.changed")]
    CategoryChanged,
    /// A single remote file finished downloading. Data: `file_path`,
    /// `file_size`, `download_file_id`
    #[serde(rename = "file.completed")]
    FileCompleted,
    /// A sync job was created. Data: `sync_job_id`, optional `final_path`
    #[serde(rename = "sync.job.created")]
    SyncJobCreated,
    /// A sync file is ready to transfer. Data: `sync_job_id`, `sync_file_id`,
    /// `file_path`, `file_size`
    #[serde(rename = "sync.file.created")]
    SyncFileCreated,
    /// First transfer of the job started. Data: `sync_job_id`, `local_base`
    #[serde(rename = "sync.started")]
    SyncStarted,
    /// A file transfer started. Data: `sync_job_id`, `file_path`, `file_size`
    #[serde(rename = "sync.file.started")]
    SyncFileStarted,
    /// A file finished syncing. Data: `sync_job_id`, `file_path`,
    /// `file_size`, optional `already_synced`
    #[serde(rename = "sync.file.complete")]
    SyncFileComplete,
    /// Every file of the job synced. Data: `sync_job_id`, `local_base`,
    /// `final_path`
    #[serde(rename = "sync.complete")]
    SyncComplete,
    /// A transfer failed. Data: `sync_job_id`, `error`
    #[serde(rename = "sync.failed")]
    SyncFailed,
    /// The sync job was cancelled. Data: `sync_job_id`, `reason`
    #[serde(rename = "sync.cancelled")]
    SyncCancelled,
    /// Staged tree started moving. Data: `move_job_id`, `final_path`,
    /// optional `is_migrate`
    #[serde(rename = "move.started")]
    MoveStarted,
    /// Move finished. Data: `move_job_id`, `final_path`, optional
    /// `is_migrate`, optional `already_at_final`
    #[serde(rename = "move.complete")]
    MoveComplete,
    /// Move failed. Data: `move_job_id`, `error`
    #[serde(rename = "move.failed")]
    MoveFailed,
    /// App trigger started. Data: `app_name`, `path`
    #[serde(rename = "app.notify.started")]
    AppNotifyStarted,
    /// App trigger succeeded. Data: `app_name`, `path`
    #[serde(rename = "app.notify.complete")]
    AppNotifyComplete,
    /// App trigger failed. Data: `app_name`, `path`, `error`
    #[serde(rename = "app.notify.failed")]
    AppNotifyFailed,
    /// Final files were deleted by a cleanup rule. Data: `path`
    #[serde(rename = "cleanup")]
    Cleanup,
}

impl EventKind {
    /// The dotted wire name, e.g. `download.discovered`
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SystemStarted => "system.started",
            EventKind::DownloaderConnected => "downloader.connected",
            EventKind::AppConnected => "app.connected",
            EventKind::DownloadDiscovered => "download.discovered",
            EventKind::DownloadUpdated => "download.updated",
            EventKind::DownloadPaused => "download.paused",
            EventKind::DownloadResumed => "download.resumed",
            EventKind::DownloadRemoved => "download.removed",
            EventKind::DownloadError => "download.error",
            EventKind::DownloadComplete => "download.complete",
            EventKind::CategoryChanged => "category.changed",
            EventKind::FileCompleted => "file.completed",
            EventKind::SyncJobCreated => "sync.job.created",
            EventKind::SyncFileCreated => "sync.file.created",
            EventKind::SyncStarted => "sync.started",
            EventKind::SyncFileStarted => "sync.file.started",
            EventKind::SyncFileComplete => "sync.file.complete",
            EventKind::SyncComplete => "sync.complete",
            EventKind::SyncFailed => "sync.failed",
            EventKind::SyncCancelled => "sync.cancelled",
            EventKind::MoveStarted => "move.started",
            EventKind::MoveComplete => "move.complete",
            EventKind::MoveFailed => "move.failed",
            EventKind::AppNotifyStarted => "app.notify.started",
            EventKind::AppNotifyComplete => "app.notify.complete",
            EventKind::AppNotifyFailed => "app.notify.failed",
            EventKind::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity an event is about.
///
/// Consumed by type switch in the timeline controller and anywhere the
/// embedded row is needed without a store round-trip.
#[derive(Clone, Debug)]
pub enum Subject {
    /// Process-level event, no entity
    System,
    /// A download job row (the subject of every pipeline event)
    Download(DownloadJob),
    /// A configured downloader
    Downloader(DownloaderConfig),
    /// A configured app
    App(AppConfig),
    /// A sync job row
    SyncJob(SyncJob),
    /// A move job row
    MoveJob(MoveJob),
    /// An app job row
    AppJob(AppJob),
}

impl Subject {
    /// Stable subject-type tag persisted on timeline rows
    pub fn type_str(&self) -> &'static str {
        match self {
            Subject::System => "system",
            Subject::Download(_) => "download",
            Subject::Downloader(_) => "downloader",
            Subject::App(_) => "app",
            Subject::SyncJob(_) => "sync-job",
            Subject::MoveJob(_) => "move-job",
            Subject::AppJob(_) => "app-job",
        }
    }

    /// The subject entity's id, if it has one
    pub fn id(&self) -> Option<Id> {
        match self {
            Subject::System | Subject::Downloader(_) | Subject::App(_) => None,
            Subject::Download(job) => Some(job.id),
            Subject::SyncJob(job) => Some(job.id),
            Subject::MoveJob(job) => Some(job.id),
            Subject::AppJob(job) => Some(job.id),
        }
    }

    /// Human name used in timeline messages
    pub fn name(&self) -> &str {
        match self {
            Subject::System => "system",
            Subject::Download(job) => &job.name,
            Subject::Downloader(d) => &d.name,
            Subject::App(a) => &a.name,
            Subject::SyncJob(_) => "sync job",
            Subject::MoveJob(_) => "move job",
            Subject::AppJob(job) => &job.app_name,
        }
    }

    /// The embedded download job, when this subject carries one
    pub fn download(&self) -> Option<&DownloadJob> {
        match self {
            Subject::Download(job) => Some(job),
            _ => None,
        }
    }
}

/// Structured event payload: a flat JSON object with typed accessors
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventData(pub serde_json::Map<String, Value>);

impl EventData {
    /// Empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// String value for `key`
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Integer value for `key`
    pub fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Boolean value for `key`
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Id value for `key` (stored as its string form)
    pub fn id(&self, key: &str) -> Option<Id> {
        self.str(key).and_then(|s| s.parse().ok())
    }

    /// Whether the payload has no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single event on the bus
#[derive(Clone, Debug)]
pub struct Event {
    /// Domain event type
    pub kind: EventKind,
    /// Publish time (stamped by the bus when left at the epoch zero value)
    pub timestamp: DateTime<Utc>,
    /// The entity this event is about
    pub subject: Subject,
    /// Per-kind payload
    pub data: EventData,
}

impl Event {
    /// New event with an unset (epoch-zero) timestamp; the bus stamps it on
    /// publish
    pub fn new(kind: EventKind, subject: Subject) -> Self {
        Self {
            kind,
            timestamp: DateTime::UNIX_EPOCH,
            subject,
            data: EventData::new(),
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Shorthand for a download-subject event
    pub fn download(kind: EventKind, job: DownloadJob) -> Self {
        Self::new(kind, Subject::Download(job))
    }
}
