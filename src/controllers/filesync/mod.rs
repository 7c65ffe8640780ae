//! FileSync controller: owns the sync pipeline from discovery to final move.
//!
//! Split into focused submodules:
//! - [`mod@self`] — dispatch loop, sync job/file lifecycle (discovery,
//!   file completions, reactivation)
//! - [`transfer`] — per-file transfer tasks with idempotency checks
//! - [`mover`] — staged-tree move to the final destination
//! - [`cleanup`] — removal handling, category-change cleanup and migration
//!
//! Every handler re-reads the store for the rows it touches; the embedded
//! event subject is only a key. Mutations of download rows stay with the
//! download controller; this controller never writes them.

mod cleanup;
mod mover;
mod transfer;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::EventBus;
use crate::clients::app::AppClient;
use crate::config::SyncConfig;
use crate::db::{Database, DownloadJob, NewSyncJob, SyncFile, SyncJob};
use crate::events::{Event, EventData, EventKind};
use crate::paths::{apps_for_category, resolve_final_base};
use crate::progress::ProgressIndex;
use crate::transfer::TransferBackend;
use crate::types::{Id, SyncFileStatus, SyncStatus};

/// Kinds this controller reacts to
const SYNC_KINDS: &[EventKind] = &[
    EventKind::DownloadDiscovered,
    EventKind::FileCompleted,
    EventKind::SyncFileCreated,
    EventKind::SyncComplete,
    EventKind::DownloadRemoved,
    EventKind::CategoryChanged,
];

/// Creates sync jobs, transfers completed files, moves staged trees and
/// cleans up after removals and category changes
pub struct FileSyncController {
    pub(crate) db: Arc<Database>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) apps: Vec<Arc<dyn AppClient>>,
    pub(crate) backends: HashMap<String, Arc<dyn TransferBackend>>,
    pub(crate) index: Arc<ProgressIndex>,
    pub(crate) cfg: SyncConfig,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) transfers: TaskTracker,
    pub(crate) job_tokens: tokio::sync::Mutex<HashMap<Id, CancellationToken>>,
    /// Serializes the first-transfer bookkeeping of a job (started-at,
    /// local base) so concurrent transfers emit one sync.started
    pub(crate) job_start_lock: tokio::sync::Mutex<()>,
    pub(crate) root_token: CancellationToken,
    pub(crate) graceful: Arc<AtomicBool>,
    dispatch: super::DispatchHandle,
}

impl FileSyncController {
    /// Build the controller
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        apps: Vec<Arc<dyn AppClient>>,
        backends: HashMap<String, Arc<dyn TransferBackend>>,
        index: Arc<ProgressIndex>,
        cfg: SyncConfig,
        graceful: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let max_concurrent = cfg.max_concurrent.max(1);
        Arc::new(Self {
            db,
            bus,
            apps,
            backends,
            index,
            cfg,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            transfers: TaskTracker::new(),
            job_tokens: tokio::sync::Mutex::new(HashMap::new()),
            job_start_lock: tokio::sync::Mutex::new(()),
            root_token: CancellationToken::new(),
            graceful,
            dispatch: super::DispatchHandle::new(),
        })
    }

    /// Subscribe to the sync-relevant kinds and start the dispatch task
    pub async fn start(self: &Arc<Self>) {
        if self.dispatch.is_running().await {
            return;
        }
        let mut sub = self.bus.subscribe(SYNC_KINDS);
        let sub_id = sub.id();
        let token = self.dispatch.token();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = sub.recv() => match maybe {
                        Some(event) => this.handle_event(event).await,
                        None => break,
                    },
                }
            }
        });
        self.dispatch.register(sub_id, task).await;
    }

    /// Stop dispatching, then drain in-flight transfers; after the drain
    /// timeout the remaining transfers are cancelled. Idempotent.
    pub async fn stop(&self) {
        self.dispatch.stop(&self.bus).await;
        self.transfers.close();
        if tokio::time::timeout(self.cfg.drain_timeout(), self.transfers.wait())
            .await
            .is_err()
        {
            tracing::warn!("in-flight transfers did not drain in time, cancelling");
            self.root_token.cancel();
            let _ = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                self.transfers.wait(),
            )
            .await;
        }
    }

    async fn handle_event(self: &Arc<Self>, event: Event) {
        let Some(job) = event.subject.download().cloned() else {
            return;
        };
        let result = match event.kind {
            EventKind::DownloadDiscovered => self.on_discovered(&job).await,
            EventKind::FileCompleted => self.on_file_completed(&job, &event.data).await,
            EventKind::SyncFileCreated => {
                self.spawn_transfer(&job, &event.data);
                Ok(())
            }
            EventKind::SyncComplete => self.on_sync_complete(&job, &event.data).await,
            EventKind::DownloadRemoved => self.on_removed(&job).await,
            EventKind::CategoryChanged => self.on_category_changed(&job, &event.data).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(
                kind = %event.kind,
                download = %job.name,
                error = %e,
                "filesync handler failed"
            );
        }
    }

    /// Create or revive the sync job when a matching app exists
    async fn on_discovered(&self, job: &DownloadJob) -> crate::Result<()> {
        if apps_for_category(&self.apps, &job.category).is_empty() {
            tracing::debug!(
                download = %job.name,
                category = %job.category,
                "no enabled app for category, not syncing"
            );
            return Ok(());
        }
        self.ensure_sync_job(job).await.map(|_| ())
    }

    /// Find the active sync job, revive a soft-deleted one, or create a new
    /// one (emitting sync.job.created)
    pub(crate) async fn ensure_sync_job(&self, job: &DownloadJob) -> crate::Result<SyncJob> {
        if let Some(active) = self.db.get_sync_job_for_download(job.id).await? {
            return Ok(active);
        }

        if let Some(deleted) = self.db.get_sync_job_for_download_any(job.id).await? {
            if deleted.is_deleted() {
                self.db.restore_sync_job(deleted.id).await?;
                tracing::info!(
                    download = %job.name,
                    sync_job = %deleted.id,
                    "reactivated soft-deleted sync job"
                );
                if let Some(revived) = self.db.get_sync_job(deleted.id).await? {
                    return Ok(revived);
                }
            }
        }

        let created = self
            .db
            .insert_sync_job(&NewSyncJob {
                download_id: job.id,
                remote_base: job.save_path.clone(),
            })
            .await?;

        let mut data = EventData::new().with("sync_job_id", created.id.to_string());
        if let Some(final_base) = self.final_base_for(job) {
            data = data.with("final_path", final_base.display().to_string());
        }
        self.bus
            .publish(Event::download(EventKind::SyncJobCreated, job.clone()).with_data(data));
        Ok(created)
    }

    /// Create or re-trigger the sync file for a completed remote file
    async fn on_file_completed(&self, job: &DownloadJob, data: &EventData) -> crate::Result<()> {
        let Some(sync_job) = self.db.get_sync_job_for_download(job.id).await? else {
            tracing::debug!(
                download = %job.name,
                "file completed but no sync job (no matching app)"
            );
            return Ok(());
        };

        let Some(file_id) = data.id("download_file_id") else {
            tracing::warn!(download = %job.name, "file.completed without download_file_id");
            return Ok(());
        };
        let Some(dl_file) = self.db.get_download_file(file_id).await? else {
            tracing::debug!(download = %job.name, %file_id, "download file row missing");
            return Ok(());
        };
        if !dl_file.is_selected() {
            tracing::debug!(
                download = %job.name,
                file = %dl_file.relative_path,
                "deselected file, not syncing"
            );
            return Ok(());
        }

        match self
            .db
            .get_sync_file(sync_job.id, &dl_file.relative_path)
            .await?
        {
            Some(existing) => match existing.status() {
                SyncFileStatus::Syncing | SyncFileStatus::Complete => Ok(()),
                SyncFileStatus::Error => {
                    // A fresh completion announcement re-queues an errored file
                    let mut file = existing;
                    file.status = SyncFileStatus::Pending.to_i32();
                    file.error_message = None;
                    self.db.update_sync_file(&file).await?;
                    self.clear_job_error(&sync_job).await?;
                    self.publish_sync_file_created(job, &sync_job, &file);
                    Ok(())
                }
                SyncFileStatus::Pending => {
                    self.publish_sync_file_created(job, &sync_job, &existing);
                    Ok(())
                }
            },
            None => {
                let file = self
                    .db
                    .insert_sync_file(&crate::db::NewSyncFile {
                        sync_job_id: sync_job.id,
                        download_file_id: dl_file.id,
                        relative_path: dl_file.relative_path.clone(),
                        size: dl_file.size,
                    })
                    .await?;
                self.publish_sync_file_created(job, &sync_job, &file);
                Ok(())
            }
        }
    }

    /// Reset a job that went to error back into the syncing flow when one of
    /// its files is re-queued
    async fn clear_job_error(&self, sync_job: &SyncJob) -> crate::Result<()> {
        if sync_job.status() != SyncStatus::Error {
            return Ok(());
        }
        let mut job = sync_job.clone();
        job.status = if job.started_at.is_some() {
            SyncStatus::Syncing.to_i32()
        } else {
            SyncStatus::Pending.to_i32()
        };
        job.error_message = None;
        self.db.update_sync_job(&job).await
    }

    fn publish_sync_file_created(&self, job: &DownloadJob, sync_job: &SyncJob, file: &SyncFile) {
        self.bus.publish(
            Event::download(EventKind::SyncFileCreated, job.clone()).with_data(
                EventData::new()
                    .with("sync_job_id", sync_job.id.to_string())
                    .with("sync_file_id", file.id.to_string())
                    .with("file_path", file.relative_path.clone())
                    .with("file_size", file.size),
            ),
        );
    }

    /// Final base directory for a download's current category
    pub(crate) fn final_base_for(&self, job: &DownloadJob) -> Option<PathBuf> {
        resolve_final_base(
            &self.apps,
            self.cfg.downloads_path.as_deref(),
            &job.downloader,
            &job.category,
        )
    }

    /// Cancellation token scoped to one sync job (child of the root token)
    pub(crate) async fn job_token(&self, sync_job_id: Id) -> CancellationToken {
        let mut tokens = self.job_tokens.lock().await;
        tokens
            .entry(sync_job_id)
            .or_insert_with(|| self.root_token.child_token())
            .clone()
    }

    /// Cancel and forget the token of one sync job
    pub(crate) async fn cancel_job_token(&self, sync_job_id: Id) {
        if let Some(token) = self.job_tokens.lock().await.remove(&sync_job_id) {
            token.cancel();
        }
    }
}
