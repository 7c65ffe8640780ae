//! Daemon assembly: wiring the store, bus, collaborators and controllers
//! together, with ordered startup and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use crate::api::{ApiState, start_api_server};
use crate::bus::EventBus;
use crate::clients::app::{AppClient, PassthroughApp};
use crate::clients::arr::ArrApp;
use crate::clients::downloader::DownloaderClient;
use crate::clients::qbittorrent::QbittorrentClient;
use crate::config::{AppKind, Config, DownloaderKind};
use crate::controllers::app_notify::AppNotifyController;
use crate::controllers::download::DownloadController;
use crate::controllers::filesync::FileSyncController;
use crate::controllers::timeline::TimelineController;
use crate::controllers::tracker::TrackerController;
use crate::db::Database;
use crate::events::{Event, EventKind, Subject};
use crate::progress::ProgressIndex;
use crate::transfer::{SftpBackend, TransferBackend};
use crate::{Error, Result};

/// The assembled pipeline.
///
/// Controllers communicate only through the bus and the store; this struct
/// owns their lifecycles and the collaborator clients.
pub struct SeedReap {
    config: Arc<Config>,
    db: Arc<Database>,
    bus: Arc<EventBus>,
    index: Arc<ProgressIndex>,
    downloaders: Vec<Arc<dyn DownloaderClient>>,
    apps: Vec<Arc<dyn AppClient>>,
    backends: HashMap<String, Arc<dyn TransferBackend>>,
    download: Arc<DownloadController>,
    filesync: Arc<FileSyncController>,
    app_notify: Arc<AppNotifyController>,
    tracker: Arc<TrackerController>,
    timeline: Arc<TimelineController>,
    graceful: Arc<AtomicBool>,
    api_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SeedReap {
    /// Build the daemon from configuration, constructing the real HTTP and
    /// SFTP collaborators.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut downloaders: Vec<Arc<dyn DownloaderClient>> = Vec::new();
        let mut backends: HashMap<String, Arc<dyn TransferBackend>> = HashMap::new();
        for dl in config.downloaders.iter().filter(|d| d.enabled) {
            match dl.kind {
                DownloaderKind::Qbittorrent => {
                    downloaders.push(Arc::new(QbittorrentClient::new(dl.clone())?));
                }
            }
            backends.insert(
                dl.name.clone(),
                Arc::new(SftpBackend::new(
                    dl.ssh.clone(),
                    config.sync.parallel_connections,
                )) as Arc<dyn TransferBackend>,
            );
        }

        let mut apps: Vec<Arc<dyn AppClient>> = Vec::new();
        for app in &config.apps {
            match app.kind {
                AppKind::Passthrough => apps.push(Arc::new(PassthroughApp::new(app.clone()))),
                AppKind::Sonarr | AppKind::Radarr => apps.push(Arc::new(ArrApp::new(app.clone())?)),
            }
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        Self::assemble(config, db, downloaders, apps, backends)
    }

    /// Build the daemon with injected collaborators (embedders and tests)
    pub fn with_collaborators(
        config: Config,
        db: Arc<Database>,
        downloaders: Vec<Arc<dyn DownloaderClient>>,
        apps: Vec<Arc<dyn AppClient>>,
        backends: HashMap<String, Arc<dyn TransferBackend>>,
    ) -> Result<Self> {
        Self::assemble(config, db, downloaders, apps, backends)
    }

    fn assemble(
        config: Config,
        db: Arc<Database>,
        downloaders: Vec<Arc<dyn DownloaderClient>>,
        apps: Vec<Arc<dyn AppClient>>,
        backends: HashMap<String, Arc<dyn TransferBackend>>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::new());
        let index = Arc::new(ProgressIndex::new());
        let graceful = Arc::new(AtomicBool::new(false));

        let timeline = TimelineController::new(db.clone(), bus.clone());
        let tracker = TrackerController::new(db.clone(), bus.clone(), apps.clone());
        let app_notify = AppNotifyController::new(db.clone(), bus.clone(), apps.clone());
        let filesync = FileSyncController::new(
            db.clone(),
            bus.clone(),
            apps.clone(),
            backends.clone(),
            index.clone(),
            config.sync.clone(),
            graceful.clone(),
        );
        let download = DownloadController::new(
            db.clone(),
            bus.clone(),
            downloaders.clone(),
            apps.clone(),
            config.enabled_categories(),
            config.sync.clone(),
        );

        Ok(Self {
            config,
            db,
            bus,
            index,
            downloaders,
            apps,
            backends,
            download,
            filesync,
            app_notify,
            tracker,
            timeline,
            graceful,
            api_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Start the pipeline: timeline first (so nothing is missed), the
    /// download poller last (so consumers exist before the first tick).
    pub async fn start(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.sync.syncing_path).await?;

        self.timeline.start().await;
        self.bus
            .publish(Event::new(EventKind::SystemStarted, Subject::System));

        for client in &self.downloaders {
            match client.connect().await {
                Ok(()) => {
                    tracing::info!(downloader = client.name(), "downloader connected");
                    if let Some(cfg) = self
                        .config
                        .downloaders
                        .iter()
                        .find(|d| d.name == client.name())
                    {
                        self.bus.publish(Event::new(
                            EventKind::DownloaderConnected,
                            Subject::Downloader(cfg.clone()),
                        ));
                    }
                }
                Err(e) => {
                    tracing::warn!(downloader = client.name(), error = %e, "downloader connection failed, will retry on poll");
                }
            }
        }
        for app in &self.apps {
            if !app.enabled() {
                continue;
            }
            match app.test_connection().await {
                Ok(()) => {
                    tracing::info!(app = app.name(), "app connected");
                    if let Some(cfg) = self.config.apps.iter().find(|a| a.name == app.name()) {
                        self.bus
                            .publish(Event::new(EventKind::AppConnected, Subject::App(cfg.clone())));
                    }
                }
                Err(e) => {
                    tracing::warn!(app = app.name(), error = %e, "app connection test failed");
                }
            }
        }

        self.tracker.start().await;
        self.app_notify.start().await;
        self.filesync.start().await;
        self.download.start().await;

        if self.config.server.enabled {
            let state = ApiState {
                db: self.db.clone(),
                index: self.index.clone(),
                bus: self.bus.clone(),
            };
            let addr = self.config.server.bind_addr;
            let task = tokio::spawn(async move {
                if let Err(e) = start_api_server(state, addr).await {
                    tracing::error!(error = %e, "API server exited");
                }
            });
            *self.api_task.lock().await = Some(task);
        }

        tracing::info!("seedreap started");
        Ok(())
    }

    /// Ordered shutdown: stop the event source first, drain transfers, then
    /// the remaining consumers, the timeline last.
    pub async fn shutdown(&self) -> Result<()> {
        self.graceful.store(true, Ordering::Relaxed);
        tracing::info!("shutting down");

        self.download.stop().await;
        self.filesync.stop().await;
        self.app_notify.stop().await;
        self.tracker.stop().await;
        self.timeline.stop().await;

        if let Some(task) = self.api_task.lock().await.take() {
            task.abort();
        }

        for backend in self.backends.values() {
            backend.prepare_shutdown().await;
            backend.close().await;
        }
        for client in &self.downloaders {
            if let Err(e) = client.close().await {
                tracing::debug!(downloader = client.name(), error = %e, "close failed");
            }
        }

        self.bus.close();
        self.db.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }

    /// The store handle
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// The event bus
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// The live progress index
    pub fn progress(&self) -> Arc<ProgressIndex> {
        self.index.clone()
    }

    /// The download controller (exposed so embedders can force a poll)
    pub fn download_controller(&self) -> Arc<DownloadController> {
        self.download.clone()
    }

    /// The effective configuration
    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Whether a graceful shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.graceful.load(Ordering::Relaxed)
    }

    /// Test a configured app by name (used by setup flows)
    pub async fn test_app(&self, name: &str) -> Result<()> {
        let app = self
            .apps
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::NotFound(format!("app {name}")))?;
        app.test_connection().await
    }
}
