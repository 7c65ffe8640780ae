//! Store tests against in-memory SQLite.

use super::*;
use crate::types::{
    AppJobStatus, DownloadStatus, FileState, MoveStatus, SyncFileStatus, SyncStatus, TrackedState,
};

mod downloads;
mod moves_apps;
mod tracked_timeline;

async fn test_db() -> Database {
    Database::in_memory().await.expect("in-memory database")
}

fn new_job(downloader: &str, remote_id: &str) -> NewDownloadJob {
    NewDownloadJob {
        downloader: downloader.to_string(),
        remote_id: remote_id.to_string(),
        name: format!("download-{remote_id}"),
        category: "movies".to_string(),
        size: 1000,
        downloaded: 0,
        progress: 0.0,
        download_speed: 0,
        save_path: "/remote/downloads".to_string(),
        status: DownloadStatus::Downloading.to_i32(),
    }
}

async fn seeded_job(db: &Database) -> DownloadJob {
    db.insert_download_job(&new_job("seedbox", "hash-1"))
        .await
        .expect("insert download job")
}

async fn seeded_file(db: &Database, job: &DownloadJob, rel: &str) -> DownloadFile {
    db.insert_download_file(&NewDownloadFile {
        download_id: job.id,
        relative_path: rel.to_string(),
        size: 100,
        downloaded: 0,
        progress: 0.0,
        priority: 1,
        state: FileState::Downloading.to_i32(),
    })
    .await
    .expect("insert download file")
}

async fn seeded_sync_job(db: &Database, job: &DownloadJob) -> SyncJob {
    db.insert_sync_job(&NewSyncJob {
        download_id: job.id,
        remote_base: job.save_path.clone(),
    })
    .await
    .expect("insert sync job")
}
