//! Downloader client contract: the remote torrent client boundary.

use async_trait::async_trait;

use crate::Result;
use crate::types::{DownloadStatus, FileState};

/// A download as reported by the remote client
#[derive(Clone, Debug)]
pub struct RemoteDownload {
    /// The client's native identifier (e.g. torrent hash)
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Category tag (empty when uncategorized)
    pub category: String,
    /// Mapped status
    pub status: DownloadStatus,
    /// Remote base directory holding the download
    pub save_path: String,
    /// Total size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Progress (0.0-100.0)
    pub progress: f32,
    /// Download speed in bytes per second
    pub download_speed: i64,
    /// Error message, when the status is [`DownloadStatus::Error`]
    pub error_message: Option<String>,
}

/// A file inside a remote download
#[derive(Clone, Debug)]
pub struct RemoteFile {
    /// Path relative to the download's save path (includes the download's
    /// folder name for multi-file downloads)
    pub relative_path: String,
    /// Size in bytes
    pub size: i64,
    /// Bytes downloaded on the seedbox
    pub downloaded: i64,
    /// Progress (0.0-100.0)
    pub progress: f32,
    /// Priority; 0 = deselected
    pub priority: i32,
    /// Mapped state
    pub state: FileState,
}

/// Remote torrent client boundary.
///
/// Implementations are free to ignore the category filter and return
/// everything; the download controller diffs against the store either way.
#[async_trait]
pub trait DownloaderClient: Send + Sync {
    /// Configured name of this downloader
    fn name(&self) -> &str;

    /// Establish/verify the connection (e.g. WebUI login)
    async fn connect(&self) -> Result<()>;

    /// List downloads, optionally narrowed to the given categories
    /// (empty slice = all)
    async fn list(&self, categories: &[String]) -> Result<Vec<RemoteDownload>>;

    /// List the files of one download
    async fn get_files(&self, remote_id: &str) -> Result<Vec<RemoteFile>>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}
