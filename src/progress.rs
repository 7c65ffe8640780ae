//! Live progress index: an in-memory mirror of in-flight syncs for UI polling.
//!
//! Updated by the filesync controller on every transfer progress callback and
//! status change; read by the HTTP API. Discarded on process exit;
//! correctness after restart comes from the store and the filesystem.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use serde::Serialize;
use utoipa::ToSchema;

use crate::types::SyncFileStatus;

/// Maximum number of speed samples kept for sparkline rendering
pub const SPEED_HISTORY_LIMIT: usize = 100;

/// Index key: the downloader's name plus the download's remote id
pub type ProgressKey = (String, String);

/// Live state of one file transfer
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct FileProgress {
    /// Path relative to the sync bases
    pub relative_path: String,
    /// Expected size in bytes
    pub size: i64,
    /// Bytes transferred so far
    pub transferred: i64,
    /// Current transfer speed in bytes per second
    pub bytes_per_sec: u64,
    /// Transfer status
    pub status: SyncFileStatus,
}

/// Live state of one in-flight sync
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DownloadProgress {
    /// Downloader name
    pub downloader: String,
    /// Remote id of the download
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Total size across files in bytes
    pub total_size: i64,
    /// Number of files in the sync
    pub total_files: usize,
    /// Per-file transfer state, keyed by relative path
    pub files: HashMap<String, FileProgress>,
    /// Aggregate speed samples, oldest first (appended on each API poll)
    pub speed_history: Vec<u64>,
}

struct Entry {
    name: String,
    total_size: i64,
    total_files: usize,
    files: HashMap<String, FileProgress>,
    speed_history: VecDeque<u64>,
}

impl Entry {
    fn aggregate_speed(&self) -> u64 {
        self.files
            .values()
            .filter(|f| f.status == SyncFileStatus::Syncing)
            .map(|f| f.bytes_per_sec)
            .sum()
    }
}

/// In-memory map of in-flight syncs, keyed by (downloader, remote id)
#[derive(Default)]
pub struct ProgressIndex {
    inner: RwLock<HashMap<ProgressKey, Entry>>,
}

impl ProgressIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the entry for a download
    pub fn init_download(&self, key: &ProgressKey, name: &str, total_size: i64, total_files: usize) {
        let mut inner = self.write();
        let entry = inner.entry(key.clone()).or_insert_with(|| Entry {
            name: name.to_string(),
            total_size,
            total_files,
            files: HashMap::new(),
            speed_history: VecDeque::new(),
        });
        entry.name = name.to_string();
        entry.total_size = total_size;
        entry.total_files = total_files;
    }

    /// Set a file's status, creating the file slot if needed
    pub fn set_file_status(
        &self,
        key: &ProgressKey,
        relative_path: &str,
        size: i64,
        status: SyncFileStatus,
    ) {
        let mut inner = self.write();
        let entry = inner.entry(key.clone()).or_insert_with(|| Entry {
            name: String::new(),
            total_size: 0,
            total_files: 0,
            files: HashMap::new(),
            speed_history: VecDeque::new(),
        });
        let file = entry
            .files
            .entry(relative_path.to_string())
            .or_insert_with(|| FileProgress {
                relative_path: relative_path.to_string(),
                size,
                transferred: 0,
                bytes_per_sec: 0,
                status,
            });
        file.size = size;
        file.status = status;
        if status == SyncFileStatus::Complete {
            file.transferred = size;
            file.bytes_per_sec = 0;
        }
    }

    /// Record transfer progress for a file (called from the backend's
    /// progress callback; never touches the store)
    pub fn record_transfer(
        &self,
        key: &ProgressKey,
        relative_path: &str,
        transferred: i64,
        bytes_per_sec: u64,
    ) {
        let mut inner = self.write();
        if let Some(entry) = inner.get_mut(key) {
            if let Some(file) = entry.files.get_mut(relative_path) {
                file.transferred = transferred;
                file.bytes_per_sec = bytes_per_sec;
            }
        }
    }

    /// Drop the entry for a download (on removal)
    pub fn remove(&self, key: &ProgressKey) {
        self.write().remove(key);
    }

    /// Snapshot one download's live state.
    ///
    /// Appends the current aggregate speed to the ring buffer; polling is
    /// what drives the sparkline.
    pub fn snapshot(&self, key: &ProgressKey) -> Option<DownloadProgress> {
        let mut inner = self.write();
        let entry = inner.get_mut(key)?;
        let speed = entry.aggregate_speed();
        entry.speed_history.push_back(speed);
        while entry.speed_history.len() > SPEED_HISTORY_LIMIT {
            entry.speed_history.pop_front();
        }
        Some(DownloadProgress {
            downloader: key.0.clone(),
            remote_id: key.1.clone(),
            name: entry.name.clone(),
            total_size: entry.total_size,
            total_files: entry.total_files,
            files: entry.files.clone(),
            speed_history: entry.speed_history.iter().copied().collect(),
        })
    }

    /// Snapshot every in-flight sync without touching speed histories
    pub fn list(&self) -> Vec<DownloadProgress> {
        let inner = self.read();
        inner
            .iter()
            .map(|(key, entry)| DownloadProgress {
                downloader: key.0.clone(),
                remote_id: key.1.clone(),
                name: entry.name.clone(),
                total_size: entry.total_size,
                total_files: entry.total_files,
                files: entry.files.clone(),
                speed_history: entry.speed_history.iter().copied().collect(),
            })
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ProgressKey, Entry>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ProgressKey, Entry>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
