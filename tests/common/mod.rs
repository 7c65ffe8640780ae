//! Shared pipeline harness: mock downloader, transfer backend and app, plus
//! a fully wired daemon over an in-memory store and temp filesystems.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use seedreap::clients::app::AppClient;
use seedreap::clients::downloader::{DownloaderClient, RemoteDownload, RemoteFile};
use seedreap::config::{ApiConfig, AppConfig, AppKind, Config, SyncConfig};
use seedreap::error::TransferError;
use seedreap::transfer::{ProgressCallback, TransferBackend, TransferProgress, TransferRequest};
use seedreap::types::{DownloadStatus, FileState};
use seedreap::{Database, Event, EventKind, SeedReap};

pub const DOWNLOADER: &str = "seedbox";

/// In-memory fake of a remote torrent client
pub struct MockDownloader {
    name: String,
    state: Mutex<BTreeMap<String, (RemoteDownload, Vec<RemoteFile>)>>,
}

impl MockDownloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            name: DOWNLOADER.to_string(),
            state: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn insert(&self, download: RemoteDownload, files: Vec<RemoteFile>) {
        self.state
            .lock()
            .unwrap()
            .insert(download.remote_id.clone(), (download, files));
    }

    pub fn remove(&self, remote_id: &str) {
        self.state.lock().unwrap().remove(remote_id);
    }

    pub fn set_category(&self, remote_id: &str, category: &str) {
        if let Some((download, _)) = self.state.lock().unwrap().get_mut(remote_id) {
            download.category = category.to_string();
        }
    }

    pub fn set_status(&self, remote_id: &str, status: DownloadStatus) {
        if let Some((download, _)) = self.state.lock().unwrap().get_mut(remote_id) {
            download.status = status;
            if status == DownloadStatus::Complete {
                download.progress = 100.0;
                download.downloaded = download.size;
            }
        }
    }

    pub fn set_file_complete(&self, remote_id: &str, relative_path: &str) {
        if let Some((_, files)) = self.state.lock().unwrap().get_mut(remote_id) {
            if let Some(file) = files.iter_mut().find(|f| f.relative_path == relative_path) {
                file.state = FileState::Complete;
                file.progress = 100.0;
                file.downloaded = file.size;
            }
        }
    }
}

#[async_trait]
impl DownloaderClient for MockDownloader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> seedreap::Result<()> {
        Ok(())
    }

    async fn list(&self, _categories: &[String]) -> seedreap::Result<Vec<RemoteDownload>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .values()
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn get_files(&self, remote_id: &str) -> seedreap::Result<Vec<RemoteFile>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(remote_id)
            .map(|(_, files)| files.clone())
            .unwrap_or_default())
    }

    async fn close(&self) -> seedreap::Result<()> {
        Ok(())
    }
}

/// Transfer backend that "downloads" by copying from a local directory
/// standing in for the seedbox filesystem
pub struct MockTransfer {
    pub invocations: AtomicUsize,
    pub fail_next: AtomicUsize,
}

impl MockTransfer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        })
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Make the next `n` transfers fail with a transient error
    pub fn fail_times(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferBackend for MockTransfer {
    async fn transfer(
        &self,
        token: &CancellationToken,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> seedreap::Result<()> {
        if token.is_cancelled() {
            return Err(seedreap::Error::Transfer(TransferError::Cancelled));
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(seedreap::Error::Transfer(TransferError::RemoteRead {
                path: request.remote_path.clone(),
                reason: "injected transient failure".to_string(),
            }));
        }

        let data = tokio::fs::read(&request.remote_path).await.map_err(|e| {
            seedreap::Error::Transfer(TransferError::RemoteRead {
                path: request.remote_path.clone(),
                reason: e.to_string(),
            })
        })?;

        progress(TransferProgress {
            transferred: (data.len() / 2) as u64,
            bytes_per_sec: 1_000_000,
        });

        if let Some(parent) = request.local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(seedreap::Error::Io)?;
        }
        tokio::fs::write(&request.local_path, &data).await.map_err(|e| {
            seedreap::Error::Transfer(TransferError::LocalWrite {
                path: request.local_path.clone(),
                reason: e.to_string(),
            })
        })?;

        progress(TransferProgress {
            transferred: data.len() as u64,
            bytes_per_sec: 0,
        });
        Ok(())
    }

    fn speed(&self) -> u64 {
        0
    }

    async fn prepare_shutdown(&self) {}

    async fn close(&self) {}
}

/// App client that records triggered imports
pub struct MockApp {
    config: AppConfig,
    pub triggered: Mutex<Vec<PathBuf>>,
}

impl MockApp {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            triggered: Mutex::new(Vec::new()),
        })
    }

    pub fn triggered_paths(&self) -> Vec<PathBuf> {
        self.triggered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppClient for MockApp {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AppKind {
        self.config.kind
    }

    fn category(&self) -> &str {
        &self.config.category
    }

    fn downloads_path(&self) -> Option<&Path> {
        self.config.downloads_path.as_deref()
    }

    fn cleanup_on_category_change(&self) -> bool {
        self.config.cleanup_on_category_change
    }

    fn cleanup_on_remove(&self) -> bool {
        self.config.cleanup_on_remove
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn test_connection(&self) -> seedreap::Result<()> {
        Ok(())
    }

    async fn trigger_import(&self, path: &Path) -> seedreap::Result<()> {
        self.triggered.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Collected bus events for order and count assertions
#[derive(Clone)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.0.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.0.lock().unwrap().iter().filter(|e| e.kind == kind).count()
    }

    pub fn find(&self, kind: EventKind) -> Option<Event> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == kind)
            .cloned()
    }

    pub fn last(&self, kind: EventKind) -> Option<Event> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .cloned()
    }

    /// Assert `expected` appears as a subsequence of the observed kinds
    pub fn assert_subsequence(&self, expected: &[EventKind]) {
        let observed = self.kinds();
        let mut it = observed.iter();
        for want in expected {
            assert!(
                it.any(|k| k == want),
                "expected {want:?} (in order {expected:?}) within observed {observed:?}"
            );
        }
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// A wired pipeline over temp directories and an in-memory store
pub struct Pipeline {
    pub daemon: SeedReap,
    pub downloader: Arc<MockDownloader>,
    pub transfer: Arc<MockTransfer>,
    pub apps: Vec<Arc<MockApp>>,
    pub events: EventLog,
    pub remote_root: PathBuf,
    pub syncing: PathBuf,
    pub downloads: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl Pipeline {
    /// Drive one deterministic poll pass
    pub async fn tick(&self) {
        self.daemon.download_controller().tick().await;
    }

    /// Remote save path handed to mock downloads
    pub fn save_path(&self) -> String {
        self.remote_root.display().to_string()
    }

    /// Materialize a remote file of `size` bytes
    pub async fn write_remote_file(&self, relative_path: &str, size: usize) {
        let path = self.remote_root.join(relative_path);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, vec![0xABu8; size]).await.unwrap();
    }

    /// Default final base for a category under the global downloads path
    pub fn final_base(&self, category: &str) -> PathBuf {
        self.downloads.join(DOWNLOADER).join(category)
    }

    pub fn db(&self) -> Arc<Database> {
        self.daemon.db()
    }
}

/// Poll an async condition until it holds or a 5 s deadline passes.
///
/// Expands inline so the condition may borrow test locals freely.
macro_rules! wait_until {
    ($what:expr, $cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if $cond {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {}",
                $what
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }};
}

/// A complete single-file remote download
pub fn remote_download(remote_id: &str, name: &str, category: &str, save_path: &str, size: i64) -> RemoteDownload {
    RemoteDownload {
        remote_id: remote_id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        status: DownloadStatus::Complete,
        save_path: save_path.to_string(),
        size,
        downloaded: size,
        progress: 100.0,
        download_speed: 0,
        error_message: None,
    }
}

/// A complete remote file entry
pub fn remote_file(relative_path: &str, size: i64, complete: bool) -> RemoteFile {
    RemoteFile {
        relative_path: relative_path.to_string(),
        size,
        downloaded: if complete { size } else { 0 },
        progress: if complete { 100.0 } else { 0.0 },
        priority: 1,
        state: if complete {
            FileState::Complete
        } else {
            FileState::Downloading
        },
    }
}

/// Build and start a pipeline with the given app configurations.
///
/// The first automatic poll tick runs against an empty mock, so tests stay
/// deterministic by inserting downloads afterwards and calling `tick()`.
pub async fn start_pipeline(app_configs: Vec<AppConfig>) -> Pipeline {
    let tempdir = tempfile::tempdir().unwrap();
    let remote_root = tempdir.path().join("remote");
    let syncing = tempdir.path().join("syncing");
    let downloads = tempdir.path().join("downloads");
    tokio::fs::create_dir_all(&remote_root).await.unwrap();
    tokio::fs::create_dir_all(&downloads).await.unwrap();

    let config = Config {
        downloaders: Vec::new(),
        apps: app_configs.clone(),
        sync: SyncConfig {
            syncing_path: syncing.clone(),
            downloads_path: Some(downloads.clone()),
            poll_interval_secs: 3600,
            ..SyncConfig::default()
        },
        persistence: Default::default(),
        server: ApiConfig {
            enabled: false,
            ..ApiConfig::default()
        },
    };

    let db = Arc::new(Database::in_memory().await.unwrap());
    let downloader = MockDownloader::new();
    let transfer = MockTransfer::new();
    let apps: Vec<Arc<MockApp>> = app_configs.iter().map(|c| MockApp::new(c.clone())).collect();

    let mut backends: HashMap<String, Arc<dyn TransferBackend>> = HashMap::new();
    backends.insert(
        DOWNLOADER.to_string(),
        transfer.clone() as Arc<dyn TransferBackend>,
    );

    let daemon = SeedReap::with_collaborators(
        config,
        db,
        vec![downloader.clone() as Arc<dyn DownloaderClient>],
        apps.iter()
            .map(|a| a.clone() as Arc<dyn AppClient>)
            .collect(),
        backends,
    )
    .unwrap();

    // Collect every event before the controllers start
    let log = EventLog(Arc::new(Mutex::new(Vec::new())));
    let mut sub = daemon.bus().subscribe(&[]);
    let sink = log.clone();
    tokio::spawn(async move {
        while let Some(event) = sub.recv().await {
            sink.0.lock().unwrap().push(event);
        }
    });

    daemon.start().await.unwrap();

    Pipeline {
        daemon,
        downloader,
        transfer,
        apps,
        events: log,
        remote_root,
        syncing,
        downloads,
        _tempdir: tempdir,
    }
}

/// Passthrough-style app config for tests (import recorded by [`MockApp`])
pub fn app_config(name: &str, category: &str) -> AppConfig {
    AppConfig {
        name: name.to_string(),
        kind: AppKind::Passthrough,
        url: None,
        api_key: None,
        category: category.to_string(),
        downloads_path: None,
        cleanup_on_category_change: false,
        cleanup_on_remove: false,
        enabled: true,
    }
}
