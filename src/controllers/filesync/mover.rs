//! Move stage: relocate a completed sync job's staged tree to its final
//! destination.

use std::path::Path;

use crate::db::{DownloadJob, NewMoveJob, SyncFile};
use crate::events::{Event, EventData, EventKind};
use crate::types::{MoveStatus, SyncFileStatus};
use crate::utils;

use super::FileSyncController;

impl FileSyncController {
    /// Move the staged tree once the sync completes
    pub(crate) async fn on_sync_complete(
        &self,
        job: &DownloadJob,
        data: &crate::events::EventData,
    ) -> crate::Result<()> {
        let Some(sync_job_id) = data.id("sync_job_id") else {
            return Ok(());
        };
        let Some(loaded) = self.db.get_sync_job_with_files(sync_job_id).await? else {
            return Ok(());
        };

        let Some(final_base) = self.final_base_for(job) else {
            tracing::warn!(
                download = %job.name,
                "sync complete but no final path configured, leaving files in staging"
            );
            return Ok(());
        };

        if loaded.job.local_base.is_empty() {
            // Every file was already at the final destination (or the store
            // was rebuilt); record the transition without touching the disk
            let mut move_job = self
                .db
                .insert_move_job(&NewMoveJob {
                    download_id: job.id,
                    source_path: String::new(),
                    destination_path: final_base.display().to_string(),
                    status: MoveStatus::Complete.to_i32(),
                })
                .await?;
            move_job.completed_at = Some(chrono::Utc::now().timestamp());
            self.db.update_move_job(&move_job).await?;

            self.bus.publish(
                Event::download(EventKind::MoveComplete, job.clone()).with_data(
                    EventData::new()
                        .with("move_job_id", move_job.id.to_string())
                        .with("final_path", final_base.display().to_string())
                        .with("already_at_final", true),
                ),
            );
            return Ok(());
        }

        self.run_move(job, &loaded.job.local_base, &loaded.files, &final_base)
            .await
    }

    async fn run_move(
        &self,
        job: &DownloadJob,
        local_base: &str,
        files: &[SyncFile],
        final_base: &Path,
    ) -> crate::Result<()> {
        let mut move_job = self
            .db
            .insert_move_job(&NewMoveJob {
                download_id: job.id,
                source_path: local_base.to_string(),
                destination_path: final_base.display().to_string(),
                status: MoveStatus::Pending.to_i32(),
            })
            .await?;

        self.bus.publish(
            Event::download(EventKind::MoveStarted, job.clone()).with_data(
                EventData::new()
                    .with("move_job_id", move_job.id.to_string())
                    .with("final_path", final_base.display().to_string()),
            ),
        );
        move_job.status = MoveStatus::Moving.to_i32();
        self.db.update_move_job(&move_job).await?;

        match move_staged_files(local_base, files, final_base).await {
            Ok(()) => {
                move_job.status = MoveStatus::Complete.to_i32();
                move_job.completed_at = Some(chrono::Utc::now().timestamp());
                self.db.update_move_job(&move_job).await?;
                tracing::info!(
                    download = %job.name,
                    destination = %final_base.display(),
                    "move complete"
                );
                self.bus.publish(
                    Event::download(EventKind::MoveComplete, job.clone()).with_data(
                        EventData::new()
                            .with("move_job_id", move_job.id.to_string())
                            .with("final_path", final_base.display().to_string()),
                    ),
                );
            }
            Err(e) => {
                tracing::error!(download = %job.name, error = %e, "move failed");
                move_job.status = MoveStatus::Error.to_i32();
                move_job.error_message = Some(e.to_string());
                move_job.completed_at = Some(chrono::Utc::now().timestamp());
                self.db.update_move_job(&move_job).await?;
                self.bus.publish(
                    Event::download(EventKind::MoveFailed, job.clone()).with_data(
                        EventData::new()
                            .with("move_job_id", move_job.id.to_string())
                            .with("error", e.to_string()),
                    ),
                );
            }
        }
        Ok(())
    }

    /// Record and emit a migration move (category change relocating already
    /// final files)
    pub(crate) async fn run_migration(
        &self,
        job: &DownloadJob,
        sources: &[std::path::PathBuf],
        old_base: &Path,
        new_base: &Path,
    ) -> crate::Result<()> {
        let mut move_job = self
            .db
            .insert_move_job(&NewMoveJob {
                download_id: job.id,
                source_path: old_base.display().to_string(),
                destination_path: new_base.display().to_string(),
                status: MoveStatus::Pending.to_i32(),
            })
            .await?;

        self.bus.publish(
            Event::download(EventKind::MoveStarted, job.clone()).with_data(
                EventData::new()
                    .with("move_job_id", move_job.id.to_string())
                    .with("final_path", new_base.display().to_string())
                    .with("is_migrate", true),
            ),
        );
        move_job.status = MoveStatus::Moving.to_i32();
        self.db.update_move_job(&move_job).await?;

        let result: crate::Result<()> = async {
            tokio::fs::create_dir_all(new_base).await?;
            for source in sources {
                let Some(name) = source.file_name() else {
                    continue;
                };
                utils::move_entry(source, &new_base.join(name)).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                move_job.status = MoveStatus::Complete.to_i32();
                move_job.completed_at = Some(chrono::Utc::now().timestamp());
                self.db.update_move_job(&move_job).await?;
                self.bus.publish(
                    Event::download(EventKind::MoveComplete, job.clone()).with_data(
                        EventData::new()
                            .with("move_job_id", move_job.id.to_string())
                            .with("final_path", new_base.display().to_string())
                            .with("is_migrate", true),
                    ),
                );
            }
            Err(e) => {
                tracing::error!(download = %job.name, error = %e, "migration failed");
                move_job.status = MoveStatus::Error.to_i32();
                move_job.error_message = Some(e.to_string());
                move_job.completed_at = Some(chrono::Utc::now().timestamp());
                self.db.update_move_job(&move_job).await?;
                self.bus.publish(
                    Event::download(EventKind::MoveFailed, job.clone()).with_data(
                        EventData::new()
                            .with("move_job_id", move_job.id.to_string())
                            .with("error", e.to_string()),
                    ),
                );
            }
        }
        Ok(())
    }
}

/// Move every complete sync file from the staging base to the final base,
/// then drop the emptied staging tree.
///
/// Files missing from staging are fine when the destination already holds
/// them at the right size (pre-transfer checks short-circuit staging).
async fn move_staged_files(
    local_base: &str,
    files: &[SyncFile],
    final_base: &Path,
) -> crate::Result<()> {
    tokio::fs::create_dir_all(final_base).await?;

    for file in files {
        if file.status() != SyncFileStatus::Complete {
            continue;
        }
        let src = Path::new(local_base).join(&file.relative_path);
        let dest = final_base.join(&file.relative_path);

        if !src.exists() {
            if utils::file_matches_size(&dest, file.size).await {
                continue;
            }
            return Err(crate::Error::Sync(crate::error::SyncError::MoveFailed {
                path: src,
                reason: "staged file missing and destination incomplete".to_string(),
            }));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        utils::move_file(&src, &dest).await?;
    }

    utils::remove_tree(Path::new(local_base)).await?;
    Ok(())
}
