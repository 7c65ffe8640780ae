//! Tracker controller: maintains the derived per-download state row that
//! drives the UI.
//!
//! The state is a pure function of the current statuses of the download,
//! sync, move and app jobs; the controller re-reads all of them from the
//! store on every relevant event and recomputes, so missed intermediate
//! events cannot leave the row stale for long.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::clients::app::AppClient;
use crate::db::{AppJob, Database, DownloadJob, TrackedDownload};
use crate::events::{Event, EventKind};
use crate::paths::first_app_for_category;
use crate::types::{AppJobStatus, DownloadStatus, MoveStatus, SyncStatus, TrackedState};

use super::DispatchHandle;

/// Every kind that can change the derived state
const TRACKED_KINDS: &[EventKind] = &[
    EventKind::DownloadDiscovered,
    EventKind::DownloadUpdated,
    EventKind::DownloadPaused,
    EventKind::DownloadResumed,
    EventKind::DownloadRemoved,
    EventKind::DownloadError,
    EventKind::DownloadComplete,
    EventKind::CategoryChanged,
    EventKind::FileCompleted,
    EventKind::SyncJobCreated,
    EventKind::SyncStarted,
    EventKind::SyncFileComplete,
    EventKind::SyncComplete,
    EventKind::SyncFailed,
    EventKind::SyncCancelled,
    EventKind::MoveStarted,
    EventKind::MoveComplete,
    EventKind::MoveFailed,
    EventKind::AppNotifyStarted,
    EventKind::AppNotifyComplete,
    EventKind::AppNotifyFailed,
];

/// Folds pipeline events into [`TrackedDownload`] rows
pub struct TrackerController {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    apps: Vec<Arc<dyn AppClient>>,
    dispatch: DispatchHandle,
}

impl TrackerController {
    /// Build the controller
    pub fn new(db: Arc<Database>, bus: Arc<EventBus>, apps: Vec<Arc<dyn AppClient>>) -> Arc<Self> {
        Arc::new(Self {
            db,
            bus,
            apps,
            dispatch: DispatchHandle::new(),
        })
    }

    /// Subscribe to the state-relevant kinds and start the dispatch task
    pub async fn start(self: &Arc<Self>) {
        if self.dispatch.is_running().await {
            return;
        }
        let mut sub = self.bus.subscribe(TRACKED_KINDS);
        let sub_id = sub.id();
        let token = self.dispatch.token();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = sub.recv() => match maybe {
                        Some(event) => {
                            if let Err(e) = this.handle_event(&event).await {
                                tracing::error!(kind = %event.kind, error = %e, "tracker update failed");
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        self.dispatch.register(sub_id, task).await;
    }

    /// Stop the dispatch task; idempotent
    pub async fn stop(&self) {
        self.dispatch.stop(&self.bus).await;
    }

    async fn handle_event(&self, event: &Event) -> crate::Result<()> {
        let Some(subject) = event.subject.download() else {
            return Ok(());
        };

        if event.kind == EventKind::DownloadRemoved {
            self.db.delete_tracked(subject.id).await?;
            return Ok(());
        }

        // Re-read everything; the event's embedded row may be stale
        let Some(job) = self.db.get_download_job(subject.id).await? else {
            self.db.delete_tracked(subject.id).await?;
            return Ok(());
        };
        if job.removed_at.is_some() {
            self.db.delete_tracked(job.id).await?;
            return Ok(());
        }

        let sync = self.db.get_sync_job_for_download(job.id).await?;
        let move_job = self.db.get_latest_move_job(job.id).await?;
        let app_jobs = self.db.list_app_jobs(job.id).await?;

        let state = compute_state(
            Some(job.status()),
            sync.as_ref().map(|s| s.status()),
            move_job.as_ref().map(|m| m.status()),
            aggregate_app_status(&app_jobs),
        );

        let row = self.build_row(&job, state, &sync, &move_job, &app_jobs).await?;
        self.db.upsert_tracked(&row).await?;
        Ok(())
    }

    async fn build_row(
        &self,
        job: &DownloadJob,
        state: TrackedState,
        sync: &Option<crate::db::SyncJob>,
        move_job: &Option<crate::db::MoveJob>,
        app_jobs: &[AppJob],
    ) -> crate::Result<TrackedDownload> {
        let files = self.db.list_download_files(job.id).await?;
        let selected: Vec<_> = files.iter().filter(|f| f.is_selected()).collect();
        let (total_size, completed_size, total_files) = if selected.is_empty() {
            (job.size, job.downloaded, 0)
        } else {
            (
                selected.iter().map(|f| f.size).sum(),
                selected.iter().map(|f| f.downloaded).sum(),
                selected.len() as i64,
            )
        };

        let error_message = job
            .error_message
            .clone()
            .or_else(|| sync.as_ref().and_then(|s| s.error_message.clone()))
            .or_else(|| move_job.as_ref().and_then(|m| m.error_message.clone()))
            .or_else(|| app_jobs.iter().find_map(|a| a.error_message.clone()));

        Ok(TrackedDownload {
            download_id: job.id,
            downloader: job.downloader.clone(),
            name: job.name.clone(),
            category: job.category.clone(),
            app_name: first_app_for_category(&self.apps, &job.category)
                .map(|app| app.name().to_string()),
            state: state.to_i32(),
            total_size,
            completed_size,
            total_files,
            discovered_at: job.discovered_at,
            error_message,
        })
    }
}

/// Collapse a download's app jobs into one status: any error wins, then any
/// still-running, then complete.
pub fn aggregate_app_status(jobs: &[AppJob]) -> Option<AppJobStatus> {
    if jobs.is_empty() {
        return None;
    }
    if jobs.iter().any(|j| j.status() == AppJobStatus::Error) {
        return Some(AppJobStatus::Error);
    }
    if jobs
        .iter()
        .any(|j| matches!(j.status(), AppJobStatus::Pending | AppJobStatus::Running))
    {
        return Some(AppJobStatus::Running);
    }
    Some(AppJobStatus::Complete)
}

/// Derive the UI state from the current child job statuses.
///
/// Pure and total: every combination maps to exactly one state.
pub fn compute_state(
    download: Option<DownloadStatus>,
    sync: Option<SyncStatus>,
    move_job: Option<MoveStatus>,
    app: Option<AppJobStatus>,
) -> TrackedState {
    let Some(download) = download else {
        return TrackedState::Discovered;
    };

    // Cancellation and errors outrank everything else
    if sync == Some(SyncStatus::Cancelled) {
        return TrackedState::Cancelled;
    }
    if download == DownloadStatus::Error
        || sync == Some(SyncStatus::Error)
        || move_job == Some(MoveStatus::Error)
        || app == Some(AppJobStatus::Error)
    {
        return TrackedState::Error;
    }

    match download {
        DownloadStatus::Paused => TrackedState::Paused,
        DownloadStatus::Downloading => {
            if sync == Some(SyncStatus::Syncing) {
                TrackedState::DownloadingSyncing
            } else {
                TrackedState::Downloading
            }
        }
        DownloadStatus::Complete => match sync {
            None => TrackedState::Complete,
            Some(SyncStatus::Pending) | Some(SyncStatus::Syncing) => TrackedState::Syncing,
            Some(SyncStatus::Complete) => match move_job {
                None => TrackedState::Synced,
                Some(MoveStatus::Pending) | Some(MoveStatus::Moving) => TrackedState::Moving,
                Some(MoveStatus::Complete) => {
                    if app == Some(AppJobStatus::Complete) {
                        TrackedState::Imported
                    } else {
                        // Move done, notify pending or absent
                        TrackedState::Synced
                    }
                }
                Some(MoveStatus::Error) => TrackedState::Error,
            },
            Some(SyncStatus::Cancelled) => TrackedState::Cancelled,
            Some(SyncStatus::Error) => TrackedState::Error,
        },
        DownloadStatus::Error => TrackedState::Error,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DownloadStatus as D;

    #[test]
    fn state_table_from_child_statuses() {
        use crate::types::AppJobStatus as A;
        use crate::types::MoveStatus as M;
        use crate::types::SyncStatus as S;
        use crate::types::TrackedState as T;

        let cases: &[(Option<D>, Option<S>, Option<M>, Option<A>, T)] = &[
            (None, None, None, None, T::Discovered),
            (Some(D::Downloading), None, None, None, T::Downloading),
            (Some(D::Paused), None, None, None, T::Paused),
            (Some(D::Downloading), Some(S::Syncing), None, None, T::DownloadingSyncing),
            (Some(D::Downloading), Some(S::Pending), None, None, T::Downloading),
            (Some(D::Complete), None, None, None, T::Complete),
            (Some(D::Complete), Some(S::Pending), None, None, T::Syncing),
            (Some(D::Complete), Some(S::Syncing), None, None, T::Syncing),
            (Some(D::Complete), Some(S::Complete), None, None, T::Synced),
            (Some(D::Complete), Some(S::Complete), Some(M::Pending), None, T::Moving),
            (Some(D::Complete), Some(S::Complete), Some(M::Moving), None, T::Moving),
            (Some(D::Complete), Some(S::Complete), Some(M::Complete), None, T::Synced),
            (
                Some(D::Complete),
                Some(S::Complete),
                Some(M::Complete),
                Some(A::Running),
                T::Synced,
            ),
            (
                Some(D::Complete),
                Some(S::Complete),
                Some(M::Complete),
                Some(A::Complete),
                T::Imported,
            ),
            (Some(D::Downloading), Some(S::Cancelled), None, None, T::Cancelled),
            (Some(D::Complete), Some(S::Cancelled), None, None, T::Cancelled),
            (Some(D::Error), None, None, None, T::Error),
            (Some(D::Complete), Some(S::Error), None, None, T::Error),
            (Some(D::Complete), Some(S::Complete), Some(M::Error), None, T::Error),
            (
                Some(D::Complete),
                Some(S::Complete),
                Some(M::Complete),
                Some(A::Error),
                T::Error,
            ),
        ];

        for (download, sync, mv, app, expected) in cases {
            assert_eq!(
                compute_state(*download, *sync, *mv, *app),
                *expected,
                "({download:?}, {sync:?}, {mv:?}, {app:?}) must map to {expected:?}"
            );
        }
    }

    #[test]
    fn cancelled_sync_outranks_errors_elsewhere() {
        // The table lists cancellation before the error row; a cancelled job
        // whose downloader also errored is presented as cancelled.
        assert_eq!(
            compute_state(
                Some(D::Error),
                Some(SyncStatus::Cancelled),
                None,
                None
            ),
            TrackedState::Cancelled
        );
    }

    #[test]
    fn compute_state_is_deterministic_for_repeated_inputs() {
        let a = compute_state(Some(D::Complete), Some(SyncStatus::Syncing), None, None);
        let b = compute_state(Some(D::Complete), Some(SyncStatus::Syncing), None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn aggregate_app_status_prefers_error_then_running() {
        use crate::types::Id;
        let job = |status: AppJobStatus| AppJob {
            id: Id::generate(),
            download_id: Id::generate(),
            app_name: "radarr".into(),
            path: "/library".into(),
            status: status.to_i32(),
            error_message: None,
            created_at: 0,
            completed_at: None,
        };

        assert_eq!(aggregate_app_status(&[]), None);
        assert_eq!(
            aggregate_app_status(&[job(AppJobStatus::Complete), job(AppJobStatus::Error)]),
            Some(AppJobStatus::Error)
        );
        assert_eq!(
            aggregate_app_status(&[job(AppJobStatus::Complete), job(AppJobStatus::Running)]),
            Some(AppJobStatus::Running)
        );
        assert_eq!(
            aggregate_app_status(&[job(AppJobStatus::Complete), job(AppJobStatus::Complete)]),
            Some(AppJobStatus::Complete)
        );
    }
}
