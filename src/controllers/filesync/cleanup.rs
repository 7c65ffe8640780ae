//! Removal and category-change handling: cancellation, staging cleanup,
//! final-file cleanup, soft delete/revival and migration.

use std::path::{Path, PathBuf};

use crate::db::DownloadJob;
use crate::events::{Event, EventData, EventKind};
use crate::paths::{apps_for_category, resolve_final_base, staging_base};
use crate::types::SyncStatus;
use crate::utils;

use super::FileSyncController;

impl FileSyncController {
    /// The download disappeared from the remote client
    pub(crate) async fn on_removed(&self, job: &DownloadJob) -> crate::Result<()> {
        let key = (job.downloader.clone(), job.remote_id.clone());
        self.index.remove(&key);

        if let Some(sync_job) = self.db.get_sync_job_for_download_any(job.id).await? {
            self.cancel_job_token(sync_job.id).await;

            if !sync_job.is_deleted() && sync_job.status() != SyncStatus::Cancelled {
                let mut sync_job = sync_job.clone();
                sync_job.status = SyncStatus::Cancelled.to_i32();
                sync_job.cancelled_at = Some(chrono::Utc::now().timestamp());
                self.db.update_sync_job(&sync_job).await?;

                let staging = if sync_job.local_base.is_empty() {
                    staging_base(&self.cfg.syncing_path, sync_job.id)
                } else {
                    PathBuf::from(&sync_job.local_base)
                };
                utils::remove_tree(&staging).await?;

                self.bus.publish(
                    Event::download(EventKind::SyncCancelled, job.clone()).with_data(
                        EventData::new()
                            .with("sync_job_id", sync_job.id.to_string())
                            .with("reason", "download removed"),
                    ),
                );
            }
        }

        // Cleanup rules match against the pre-rename category when a rename
        // preceded the removal
        let category = job
            .previous_category
            .clone()
            .unwrap_or_else(|| job.category.clone());
        let apps = apps_for_category(&self.apps, &category);
        if apps.iter().any(|a| a.cleanup_on_remove()) {
            if let Some(final_base) = resolve_final_base(
                &self.apps,
                self.cfg.downloads_path.as_deref(),
                &job.downloader,
                &category,
            ) {
                for removed in self.remove_final_entries(job, &final_base).await? {
                    self.bus.publish(
                        Event::download(EventKind::Cleanup, job.clone())
                            .with_data(EventData::new().with("path", removed.display().to_string())),
                    );
                }
            }
        }

        Ok(())
    }

    /// The category tag changed on the remote client
    pub(crate) async fn on_category_changed(
        &self,
        job: &DownloadJob,
        data: &EventData,
    ) -> crate::Result<()> {
        let old_category = data
            .str("old_category")
            .map(str::to_string)
            .or_else(|| job.previous_category.clone())
            .unwrap_or_default();
        let new_category = data
            .str("new_category")
            .unwrap_or(&job.category)
            .to_string();

        let old_final = resolve_final_base(
            &self.apps,
            self.cfg.downloads_path.as_deref(),
            &job.downloader,
            &old_category,
        );
        let new_final = resolve_final_base(
            &self.apps,
            self.cfg.downloads_path.as_deref(),
            &job.downloader,
            &new_category,
        );

        // Old-category cleanup rules fire first; migration then finds only
        // what survived
        let old_apps = apps_for_category(&self.apps, &old_category);
        if old_apps.iter().any(|a| a.cleanup_on_category_change()) {
            if let Some(old_base) = &old_final {
                for removed in self.remove_final_entries(job, old_base).await? {
                    self.bus.publish(
                        Event::download(EventKind::Cleanup, job.clone())
                            .with_data(EventData::new().with("path", removed.display().to_string())),
                    );
                }
            }
        }

        let new_apps = apps_for_category(&self.apps, &new_category);
        if new_apps.is_empty() {
            // Nothing consumes this category anymore; park the sync state
            // for a possible rename back
            if let Some(sync_job) = self.db.get_sync_job_for_download(job.id).await? {
                self.cancel_job_token(sync_job.id).await;
                self.db.soft_delete_sync_job(sync_job.id).await?;
                tracing::info!(
                    download = %job.name,
                    sync_job = %sync_job.id,
                    category = %new_category,
                    "category untracked, sync job parked"
                );
            }
            return Ok(());
        }

        // The new category is consumed: make sure a sync job exists (reviving
        // a parked one keeps its ids)
        self.ensure_sync_job(job).await?;

        // Migrate files already imported under the old final path
        if let (Some(old_base), Some(new_base)) = (&old_final, &new_final) {
            if old_base != new_base {
                let sources = self.existing_final_entries(job, old_base).await?;
                if !sources.is_empty() {
                    self.run_migration(job, &sources, old_base, new_base).await?;
                }
            }
        }

        Ok(())
    }

    /// Entries (top-level files or folders) this download occupies under a
    /// final base, as currently present on disk
    async fn existing_final_entries(
        &self,
        job: &DownloadJob,
        final_base: &Path,
    ) -> crate::Result<Vec<PathBuf>> {
        let mut names: Vec<String> = Vec::new();
        for file in self.db.list_download_files(job.id).await? {
            if let Some(top) = utils::top_component(&file.relative_path) {
                if !names.iter().any(|n| n == top) {
                    names.push(top.to_string());
                }
            }
        }
        if names.is_empty() {
            // No file rows (e.g. store rebuilt); fall back to the download's
            // folder name
            names.push(job.name.clone());
        }

        let mut existing = Vec::new();
        for name in names {
            let path = final_base.join(&name);
            if tokio::fs::metadata(&path).await.is_ok() {
                existing.push(path);
            }
        }
        Ok(existing)
    }

    /// Delete this download's entries under a final base; returns what was
    /// removed
    async fn remove_final_entries(
        &self,
        job: &DownloadJob,
        final_base: &Path,
    ) -> crate::Result<Vec<PathBuf>> {
        let entries = self.existing_final_entries(job, final_base).await?;
        for path in &entries {
            utils::remove_entry(path).await?;
            tracing::info!(path = %path.display(), download = %job.name, "cleaned up final files");
        }
        Ok(entries)
    }
}
