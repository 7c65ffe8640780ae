//! Download controller: polls the remote clients and is the pipeline's only
//! source of "world changed" events.
//!
//! Each tick lists every enabled downloader, upserts the observed downloads
//! and files into the store, diffs them against the previous rows and emits
//! the corresponding events. Downloads present in the store but absent from
//! the listing are announced as removed. Store writes always commit before
//! the event is published.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::clients::app::AppClient;
use crate::clients::downloader::{DownloaderClient, RemoteDownload};
use crate::config::SyncConfig;
use crate::db::{Database, DownloadFile, DownloadJob, NewDownloadFile, NewDownloadJob};
use crate::events::{Event, EventData, EventKind};
use crate::paths::resolve_final_base;
use crate::types::{DownloadStatus, FileState};

use super::DispatchHandle;

/// Polls downloaders and emits discovery/update/completion events
pub struct DownloadController {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    clients: Vec<Arc<dyn DownloaderClient>>,
    apps: Vec<Arc<dyn AppClient>>,
    categories: Vec<String>,
    cfg: SyncConfig,
    /// A tick is never concurrent with itself, whether driven by the
    /// interval or by an embedder calling [`tick`](Self::tick)
    tick_lock: tokio::sync::Mutex<()>,
    dispatch: DispatchHandle,
}

impl DownloadController {
    /// Build the controller. `categories` is the union of enabled-app
    /// categories handed to the clients as a listing filter hint.
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        clients: Vec<Arc<dyn DownloaderClient>>,
        apps: Vec<Arc<dyn AppClient>>,
        categories: Vec<String>,
        cfg: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            bus,
            clients,
            apps,
            categories,
            cfg,
            tick_lock: tokio::sync::Mutex::new(()),
            dispatch: DispatchHandle::new(),
        })
    }

    /// Start the polling loop. The first tick runs immediately so restarts
    /// re-derive their state without waiting a full interval.
    pub async fn start(self: &Arc<Self>) {
        if self.dispatch.is_running().await {
            return;
        }
        let token = self.dispatch.token();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.cfg.poll_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => this.tick().await,
                }
            }
        });
        self.dispatch.register_task(task).await;
    }

    /// Stop the polling loop; idempotent
    pub async fn stop(&self) {
        self.dispatch.stop(&self.bus).await;
    }

    /// One poll pass over every downloader. Public so embedders and tests
    /// can drive the pipeline without waiting for the interval.
    pub async fn tick(&self) {
        let _guard = self.tick_lock.lock().await;
        for client in &self.clients {
            if let Err(e) = self.poll_downloader(client.as_ref()).await {
                tracing::warn!(
                    downloader = client.name(),
                    error = %e,
                    "poll failed, skipping this tick"
                );
            }
        }
    }

    async fn poll_downloader(&self, client: &dyn DownloaderClient) -> crate::Result<()> {
        let listed = client.list(&self.categories).await?;
        let known = self.db.list_download_jobs(client.name()).await?;

        let mut seen: HashSet<String> = HashSet::with_capacity(listed.len());
        for remote in &listed {
            seen.insert(remote.remote_id.clone());
            if let Err(e) = self.process_remote(client, remote).await {
                tracing::warn!(
                    downloader = client.name(),
                    remote_id = %remote.remote_id,
                    error = %e,
                    "failed to process download"
                );
            }
        }

        // Known rows missing from the listing are gone from the client
        for job in known {
            if !seen.contains(&job.remote_id) {
                if let Err(e) = self.handle_removed(job).await {
                    tracing::warn!(downloader = client.name(), error = %e, "removal handling failed");
                }
            }
        }

        Ok(())
    }

    async fn handle_removed(&self, mut job: DownloadJob) -> crate::Result<()> {
        self.db.mark_download_removed(job.id).await?;
        job.removed_at = Some(chrono::Utc::now().timestamp());
        tracing::info!(download = %job.name, downloader = %job.downloader, "download removed remotely");
        self.bus
            .publish(Event::download(EventKind::DownloadRemoved, job));
        Ok(())
    }

    async fn process_remote(
        &self,
        client: &dyn DownloaderClient,
        remote: &RemoteDownload,
    ) -> crate::Result<()> {
        match self
            .db
            .get_download_job_by_remote(client.name(), &remote.remote_id)
            .await?
        {
            None => self.discover(client, remote).await,
            Some(existing) => self.refresh(client, remote, existing).await,
        }
    }

    /// First observation of a download: persist rows, then announce
    async fn discover(
        &self,
        client: &dyn DownloaderClient,
        remote: &RemoteDownload,
    ) -> crate::Result<()> {
        let mut job = self
            .db
            .insert_download_job(&NewDownloadJob {
                downloader: client.name().to_string(),
                remote_id: remote.remote_id.clone(),
                name: remote.name.clone(),
                category: remote.category.clone(),
                size: remote.size,
                downloaded: remote.downloaded,
                progress: remote.progress,
                download_speed: remote.download_speed,
                save_path: remote.save_path.clone(),
                status: remote.status.to_i32(),
            })
            .await?;

        if remote.status == DownloadStatus::Complete {
            job.downloaded_at = Some(chrono::Utc::now().timestamp());
            self.db.update_download_job(&job).await?;
        }

        let completed_files = self.sync_file_rows(client, &job).await?;

        tracing::info!(
            download = %job.name,
            downloader = client.name(),
            category = %job.category,
            "discovered download"
        );
        self.bus.publish(
            Event::download(EventKind::DownloadDiscovered, job.clone())
                .with_data(self.discovery_data(&job)),
        );
        self.emit_file_completions(&job, &completed_files);
        Ok(())
    }

    /// Subsequent observation: diff against the stored row
    async fn refresh(
        &self,
        client: &dyn DownloaderClient,
        remote: &RemoteDownload,
        existing: DownloadJob,
    ) -> crate::Result<()> {
        let mut job = existing.clone();
        let rediscovered = job.removed_at.is_some();
        if rediscovered {
            self.db.mark_download_restored(job.id).await?;
            // Keep the embedded subject consistent with the store
            job.removed_at = None;
        }

        let old_status = existing.status();
        let category_changed = job.category != remote.category;
        if category_changed {
            job.previous_category = Some(job.category.clone());
            job.category = remote.category.clone();
        }

        let drifted = (remote.progress - existing.progress).abs()
            >= self.cfg.progress_drift_percent
            || (remote.downloaded - existing.downloaded).abs() >= self.cfg.size_drift_bytes;

        job.name = remote.name.clone();
        job.size = remote.size;
        job.downloaded = remote.downloaded;
        job.progress = remote.progress;
        job.download_speed = remote.download_speed;
        job.save_path = remote.save_path.clone();
        job.status = remote.status.to_i32();
        job.error_message = remote.error_message.clone();
        if remote.status == DownloadStatus::Complete && job.downloaded_at.is_none() {
            job.downloaded_at = Some(chrono::Utc::now().timestamp());
        }
        self.db.update_download_job(&job).await?;

        let mut completed_files = self.sync_file_rows(client, &job).await?;

        // Re-announce complete files whose sync previously failed; the
        // filesync controller resets them to pending and retries
        for retry in self.errored_sync_retries(&job).await? {
            if !completed_files.iter().any(|f| f.id == retry.id) {
                completed_files.push(retry);
            }
        }

        if rediscovered {
            self.bus.publish(
                Event::download(EventKind::DownloadDiscovered, job.clone())
                    .with_data(self.discovery_data(&job)),
            );
        }
        if category_changed {
            self.bus.publish(
                Event::download(EventKind::CategoryChanged, job.clone()).with_data(
                    EventData::new()
                        .with(
                            "old_category",
                            job.previous_category.clone().unwrap_or_default(),
                        )
                        .with("new_category", job.category.clone()),
                ),
            );
        }

        let new_status = remote.status;
        if new_status != old_status {
            let kind = match new_status {
                DownloadStatus::Complete => Some(EventKind::DownloadComplete),
                DownloadStatus::Paused => Some(EventKind::DownloadPaused),
                DownloadStatus::Error => Some(EventKind::DownloadError),
                DownloadStatus::Downloading if old_status == DownloadStatus::Paused => {
                    Some(EventKind::DownloadResumed)
                }
                DownloadStatus::Downloading => None,
            };
            if let Some(kind) = kind {
                self.bus.publish(Event::download(kind, job.clone()));
            }
        } else if drifted {
            self.bus
                .publish(Event::download(EventKind::DownloadUpdated, job.clone()));
        }

        self.emit_file_completions(&job, &completed_files);
        Ok(())
    }

    /// Upsert file rows from the client and return those that newly reached
    /// the complete state (selected files only)
    async fn sync_file_rows(
        &self,
        client: &dyn DownloaderClient,
        job: &DownloadJob,
    ) -> crate::Result<Vec<DownloadFile>> {
        let remote_files = client.get_files(&job.remote_id).await?;
        let existing = self.db.list_download_files(job.id).await?;
        let by_path: std::collections::HashMap<&str, &DownloadFile> = existing
            .iter()
            .map(|f| (f.relative_path.as_str(), f))
            .collect();

        let mut newly_completed = Vec::new();
        for rf in remote_files {
            match by_path.get(rf.relative_path.as_str()) {
                None => {
                    let row = self
                        .db
                        .insert_download_file(&NewDownloadFile {
                            download_id: job.id,
                            relative_path: rf.relative_path.clone(),
                            size: rf.size,
                            downloaded: rf.downloaded,
                            progress: rf.progress,
                            priority: rf.priority,
                            state: rf.state.to_i32(),
                        })
                        .await?;
                    if rf.state == FileState::Complete && row.is_selected() {
                        newly_completed.push(row);
                    }
                }
                Some(old) => {
                    let was_complete = old.state() == FileState::Complete;
                    let mut row = (*old).clone();
                    row.size = rf.size;
                    row.downloaded = rf.downloaded;
                    row.progress = rf.progress;
                    row.priority = rf.priority;
                    row.state = rf.state.to_i32();
                    self.db.update_download_file(&row).await?;
                    if !was_complete && rf.state == FileState::Complete && row.is_selected() {
                        newly_completed.push(row);
                    }
                }
            }
        }

        Ok(newly_completed)
    }

    /// Complete, selected files whose sync row sits in error, candidates
    /// for a retry announcement
    async fn errored_sync_retries(&self, job: &DownloadJob) -> crate::Result<Vec<DownloadFile>> {
        let Some(sync_job) = self.db.get_sync_job_for_download(job.id).await? else {
            return Ok(Vec::new());
        };
        let errored: HashSet<String> = self
            .db
            .list_sync_files(sync_job.id)
            .await?
            .into_iter()
            .filter(|f| f.status() == crate::types::SyncFileStatus::Error)
            .map(|f| f.relative_path)
            .collect();
        if errored.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .db
            .list_download_files(job.id)
            .await?
            .into_iter()
            .filter(|f| {
                f.is_selected()
                    && f.state() == FileState::Complete
                    && errored.contains(&f.relative_path)
            })
            .collect())
    }

    fn emit_file_completions(&self, job: &DownloadJob, files: &[DownloadFile]) {
        for file in files {
            self.bus.publish(
                Event::download(EventKind::FileCompleted, job.clone()).with_data(
                    EventData::new()
                        .with("file_path", file.relative_path.clone())
                        .with("file_size", file.size)
                        .with("download_file_id", file.id.to_string()),
                ),
            );
        }
    }

    fn discovery_data(&self, job: &DownloadJob) -> EventData {
        let mut data = EventData::new().with("save_path", job.save_path.clone());
        if let Some(final_base) = resolve_final_base(
            &self.apps,
            self.cfg.downloads_path.as_deref(),
            &job.downloader,
            &job.category,
        ) {
            data = data.with("final_path", final_base.display().to_string());
        }
        data
    }
}
