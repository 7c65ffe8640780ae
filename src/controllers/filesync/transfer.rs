//! Per-file transfer tasks: idempotency checks, the transfer itself, size
//! verification and sync-job completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::db::{DownloadJob, SyncFile};
use crate::error::SyncError;
use crate::events::{Event, EventData, EventKind};
use crate::paths::staging_base;
use crate::progress::ProgressKey;
use crate::transfer::{ProgressCallback, TransferRequest, sftp::remote_join};
use crate::types::{DownloadStatus, SyncFileStatus, SyncStatus};
use crate::utils;

use super::FileSyncController;

impl FileSyncController {
    /// Spawn a tracked transfer task for a sync.file.created event.
    ///
    /// One task per event; concurrency is bounded by the semaphore inside
    /// the task so queued transfers stay cancellable.
    pub(crate) fn spawn_transfer(self: &Arc<Self>, job: &DownloadJob, data: &EventData) {
        let Some(sync_file_id) = data.id("sync_file_id") else {
            tracing::warn!(download = %job.name, "sync.file.created without sync_file_id");
            return;
        };
        if self.transfers.is_closed() {
            tracing::debug!(download = %job.name, "shutting down, not starting transfer");
            return;
        }
        let this = Arc::clone(self);
        let job = job.clone();
        self.transfers.spawn(async move {
            if let Err(e) = this.run_transfer(&job, sync_file_id).await {
                tracing::error!(
                    download = %job.name,
                    error = %e,
                    "transfer task failed"
                );
            }
        });
    }

    /// Transfer one sync file, honoring the pre-transfer idempotency checks
    async fn run_transfer(&self, job: &DownloadJob, sync_file_id: crate::types::Id) -> crate::Result<()> {
        // Re-read everything; the triggering event may be stale
        let Some(mut sync_file) = self.db.get_sync_file_by_id(sync_file_id).await? else {
            return Ok(());
        };
        if sync_file.deleted_at.is_some() {
            return Ok(());
        }
        let Some(sync_job) = self.db.get_sync_job(sync_file.sync_job_id).await? else {
            return Ok(());
        };
        if sync_job.is_deleted() || sync_job.status() == SyncStatus::Cancelled {
            tracing::debug!(download = %job.name, "sync job cancelled, skipping transfer");
            return Ok(());
        }
        if sync_file.status() == SyncFileStatus::Complete {
            return Ok(());
        }

        let key: ProgressKey = (job.downloader.clone(), job.remote_id.clone());
        self.refresh_index_entry(&key, job).await?;
        let rel = sync_file.relative_path.clone();

        // 1. Already at the final destination with the right size?
        if let Some(final_base) = self.final_base_for(job) {
            let dest = final_base.join(&rel);
            if utils::file_matches_size(&dest, sync_file.size).await {
                tracing::debug!(file = %rel, "already at final destination, skipping transfer");
                self.complete_sync_file(job, sync_job.id, &mut sync_file, &key, true)
                    .await?;
                return Ok(());
            }
        }

        // 2. Already staged with the right size?
        let local_base = if sync_job.local_base.is_empty() {
            staging_base(&self.cfg.syncing_path, sync_job.id)
        } else {
            PathBuf::from(&sync_job.local_base)
        };
        let staged = local_base.join(&rel);
        if utils::file_matches_size(&staged, sync_file.size).await {
            if sync_job.local_base.is_empty() {
                let mut sync_job = sync_job.clone();
                sync_job.local_base = local_base.display().to_string();
                self.db.update_sync_job(&sync_job).await?;
            }
            tracing::debug!(file = %rel, "already staged, skipping transfer");
            self.complete_sync_file(job, sync_job.id, &mut sync_file, &key, true)
                .await?;
            return Ok(());
        }

        // 3. Real transfer, bounded by the semaphore
        let permit = tokio::select! {
            _ = self.root_token.cancelled() => return Ok(()),
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Ok(()), // semaphore closed: shutting down
            },
        };
        let token = self.job_token(sync_job.id).await;

        sync_file.status = SyncFileStatus::Syncing.to_i32();
        self.db.update_sync_file(&sync_file).await?;
        self.index
            .set_file_status(&key, &rel, sync_file.size, SyncFileStatus::Syncing);

        self.note_job_started(job, sync_job.id, &local_base).await?;
        self.bus.publish(
            Event::download(EventKind::SyncFileStarted, job.clone()).with_data(
                EventData::new()
                    .with("sync_job_id", sync_job.id.to_string())
                    .with("file_path", rel.clone())
                    .with("file_size", sync_file.size),
            ),
        );

        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let backend = match self.backends.get(&job.downloader) {
            Some(backend) => Arc::clone(backend),
            None => {
                let err = crate::Error::Sync(SyncError::NoBackend(job.downloader.clone()));
                drop(permit);
                return self
                    .fail_sync_file(job, sync_job.id, &mut sync_file, &key, err)
                    .await;
            }
        };

        let request = TransferRequest {
            remote_path: remote_join(&sync_job.remote_base, &rel),
            local_path: staged.clone(),
            size: sync_file.size,
        };
        let progress: ProgressCallback = {
            let index = Arc::clone(&self.index);
            let key = key.clone();
            let rel = rel.clone();
            Box::new(move |p| {
                index.record_transfer(&key, &rel, p.transferred as i64, p.bytes_per_sec);
            })
        };

        let result = backend.transfer(&token, &request, progress).await;
        drop(permit);

        match result {
            Err(e) if e.is_cancelled() => {
                // The cancellation path (removal or shutdown) owns the status
                if self.graceful.load(Ordering::Relaxed) {
                    tracing::debug!(file = %rel, "transfer cancelled during shutdown");
                } else {
                    tracing::info!(file = %rel, "transfer cancelled");
                }
                Ok(())
            }
            Err(e) => {
                self.fail_sync_file(job, sync_job.id, &mut sync_file, &key, e)
                    .await
            }
            Ok(()) => {
                // Exact size or it did not happen
                match utils::file_size(&staged).await {
                    Some(len) if len as i64 == sync_file.size => {
                        self.complete_sync_file(job, sync_job.id, &mut sync_file, &key, false)
                            .await
                    }
                    other => {
                        let err = crate::Error::Sync(SyncError::SizeMismatch {
                            path: staged.clone(),
                            expected: sync_file.size,
                            actual: other.map(|l| l as i64).unwrap_or(-1),
                        });
                        self.fail_sync_file(job, sync_job.id, &mut sync_file, &key, err)
                            .await
                    }
                }
            }
        }
    }

    /// First-transfer bookkeeping: set the job's local base, started-at and
    /// syncing status exactly once, emitting sync.started
    async fn note_job_started(
        &self,
        job: &DownloadJob,
        sync_job_id: crate::types::Id,
        local_base: &std::path::Path,
    ) -> crate::Result<()> {
        let _guard = self.job_start_lock.lock().await;
        let Some(mut sync_job) = self.db.get_sync_job(sync_job_id).await? else {
            return Ok(());
        };
        if sync_job.started_at.is_some() {
            return Ok(());
        }
        if sync_job.local_base.is_empty() {
            sync_job.local_base = local_base.display().to_string();
        }
        sync_job.started_at = Some(chrono::Utc::now().timestamp());
        sync_job.status = SyncStatus::Syncing.to_i32();
        self.db.update_sync_job(&sync_job).await?;
        self.bus.publish(
            Event::download(EventKind::SyncStarted, job.clone()).with_data(
                EventData::new()
                    .with("sync_job_id", sync_job.id.to_string())
                    .with("local_base", sync_job.local_base.clone()),
            ),
        );
        Ok(())
    }

    /// Mark a sync file complete, emit sync.file.complete and check whether
    /// the whole job is now done
    pub(crate) async fn complete_sync_file(
        &self,
        job: &DownloadJob,
        sync_job_id: crate::types::Id,
        sync_file: &mut SyncFile,
        key: &ProgressKey,
        already_synced: bool,
    ) -> crate::Result<()> {
        sync_file.status = SyncFileStatus::Complete.to_i32();
        sync_file.synced_size = sync_file.size;
        sync_file.error_message = None;
        self.db.update_sync_file(sync_file).await?;
        self.index.set_file_status(
            key,
            &sync_file.relative_path,
            sync_file.size,
            SyncFileStatus::Complete,
        );

        let mut data = EventData::new()
            .with("sync_job_id", sync_job_id.to_string())
            .with("file_path", sync_file.relative_path.clone())
            .with("file_size", sync_file.size);
        if already_synced {
            data = data.with("already_synced", true);
        }
        self.bus
            .publish(Event::download(EventKind::SyncFileComplete, job.clone()).with_data(data));

        self.check_job_completion(job, sync_job_id).await
    }

    /// Mark a sync file (and its job) errored and emit sync.failed
    pub(crate) async fn fail_sync_file(
        &self,
        job: &DownloadJob,
        sync_job_id: crate::types::Id,
        sync_file: &mut SyncFile,
        key: &ProgressKey,
        err: crate::Error,
    ) -> crate::Result<()> {
        tracing::warn!(
            download = %job.name,
            file = %sync_file.relative_path,
            error = %err,
            "sync file failed"
        );
        sync_file.status = SyncFileStatus::Error.to_i32();
        sync_file.error_message = Some(err.to_string());
        self.db.update_sync_file(sync_file).await?;
        self.index.set_file_status(
            key,
            &sync_file.relative_path,
            sync_file.size,
            SyncFileStatus::Error,
        );

        if let Some(mut sync_job) = self.db.get_sync_job(sync_job_id).await? {
            if !sync_job.is_deleted() && sync_job.status() != SyncStatus::Cancelled {
                sync_job.status = SyncStatus::Error.to_i32();
                sync_job.error_message = Some(err.to_string());
                self.db.update_sync_job(&sync_job).await?;
            }
        }

        self.bus.publish(
            Event::download(EventKind::SyncFailed, job.clone()).with_data(
                EventData::new()
                    .with("sync_job_id", sync_job_id.to_string())
                    .with("error", err.to_string()),
            ),
        );
        Ok(())
    }

    /// Complete the job once the remote download is complete and
    /// every selected file has a complete sync row
    pub(crate) async fn check_job_completion(
        &self,
        job: &DownloadJob,
        sync_job_id: crate::types::Id,
    ) -> crate::Result<()> {
        // Serialized so two transfers finishing together emit one
        // sync.complete
        let _guard = self.job_start_lock.lock().await;
        let Some(loaded) = self.db.get_sync_job_with_files(sync_job_id).await? else {
            return Ok(());
        };
        let mut sync_job = loaded.job;
        if sync_job.is_deleted()
            || matches!(sync_job.status(), SyncStatus::Cancelled | SyncStatus::Complete)
        {
            return Ok(());
        }
        if loaded.files.is_empty() {
            return Ok(());
        }
        if !loaded
            .files
            .iter()
            .all(|f| f.status() == SyncFileStatus::Complete)
        {
            return Ok(());
        }

        // The remote download must itself be done, and every selected remote
        // file must have a synced counterpart; completing earlier would cut
        // off files that have not been announced yet.
        let Some(download) = self.db.get_download_job(job.id).await? else {
            return Ok(());
        };
        if download.status() != DownloadStatus::Complete {
            return Ok(());
        }
        let selected = self
            .db
            .list_download_files(download.id)
            .await?
            .into_iter()
            .filter(|f| f.is_selected())
            .collect::<Vec<_>>();
        let synced_paths: std::collections::HashSet<&str> = loaded
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        if !selected
            .iter()
            .all(|f| synced_paths.contains(f.relative_path.as_str()))
        {
            return Ok(());
        }

        sync_job.status = SyncStatus::Complete.to_i32();
        sync_job.completed_at = Some(chrono::Utc::now().timestamp());
        sync_job.error_message = None;
        self.db.update_sync_job(&sync_job).await?;

        let final_path = self
            .final_base_for(&download)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        tracing::info!(download = %download.name, sync_job = %sync_job.id, "sync complete");
        self.bus.publish(
            Event::download(EventKind::SyncComplete, download.clone()).with_data(
                EventData::new()
                    .with("sync_job_id", sync_job.id.to_string())
                    .with("local_base", sync_job.local_base.clone())
                    .with("final_path", final_path),
            ),
        );
        Ok(())
    }

    /// Refresh the live-progress entry's totals from the store
    async fn refresh_index_entry(&self, key: &ProgressKey, job: &DownloadJob) -> crate::Result<()> {
        let files = self.db.list_download_files(job.id).await?;
        let selected: Vec<_> = files.into_iter().filter(|f| f.is_selected()).collect();
        let total_size = selected.iter().map(|f| f.size).sum();
        self.index
            .init_download(key, &job.name, total_size, selected.len());
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use crate::db::SyncJob;
    use crate::types::{Id, SyncStatus};

    // Behavior-level coverage of the transfer flow lives in the integration
    // suite (tests/pipeline.rs); the helpers here are exercised through it.

    #[test]
    fn deleted_jobs_read_as_deleted() {
        let job = SyncJob {
            id: Id::generate(),
            download_id: Id::generate(),
            remote_base: "/remote".into(),
            local_base: String::new(),
            status: SyncStatus::Pending.to_i32(),
            error_message: None,
            created_at: 0,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            deleted_at: Some(1),
        };
        assert!(job.is_deleted());
    }
}
