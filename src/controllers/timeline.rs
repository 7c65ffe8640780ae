//! Timeline controller: renders every bus event into an append-only,
//! human-readable timeline record.
//!
//! Timeline loss must never block the pipeline: store failures are logged
//! and the record is dropped.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::db::{Database, NewEventRecord};
use crate::events::{Event, EventKind, Subject};

use super::DispatchHandle;

/// Records every event to the timeline store
pub struct TimelineController {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    dispatch: DispatchHandle,
}

impl TimelineController {
    /// Build the controller
    pub fn new(db: Arc<Database>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            db,
            bus,
            dispatch: DispatchHandle::new(),
        })
    }

    /// Subscribe to every event kind and start the dispatch task
    pub async fn start(self: &Arc<Self>) {
        if self.dispatch.is_running().await {
            return;
        }
        let mut sub = self.bus.subscribe(&[]);
        let sub_id = sub.id();
        let token = self.dispatch.token();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = sub.recv() => match maybe {
                        Some(event) => this.record(event).await,
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

    async fn record(&self, event: Event) {
        let record = NewEventRecord {
            kind: event.kind.as_str().to_string(),
            timestamp: event.timestamp.timestamp(),
            subject_type: event.subject.type_str().to_string(),
            subject_id: event.subject.id().map(|id| id.to_string()),
            app_name: app_name_of(&event),
            message: render_message(&event),
            details: serde_json::to_string(&event.data).unwrap_or_else(|_| "{}".to_string()),
        };
        if let Err(e) = self.db.insert_event(&record).await {
            tracing::error!(kind = %event.kind, error = %e, "failed to persist timeline record");
        }
    }
}

fn app_name_of(event: &Event) -> Option<String> {
    if let Some(name) = event.data.str("app_name") {
        return Some(name.to_string());
    }
    match &event.subject {
        Subject::App(app) => Some(app.name.clone()),
        Subject::AppJob(job) => Some(job.app_name.clone()),
        _ => None,
    }
}

/// Render the per-kind human message from the subject name and payload
pub(crate) fn render_message(event: &Event) -> String {
    let name = event.subject.name();
    let data = &event.data;
    match event.kind {
        EventKind::SystemStarted => "SeedReap started".to_string(),
        EventKind::DownloaderConnected => format!("Connected to downloader {name}"),
        EventKind::AppConnected => format!("Connected to app {name}"),
        EventKind::DownloadDiscovered => format!("Discovered {name}"),
        EventKind::DownloadUpdated => format!("{name} updated"),
        EventKind::DownloadPaused => format!("{name} paused"),
        EventKind::DownloadResumed => format!("{name} resumed"),
        EventKind::DownloadRemoved => format!("{name} removed from downloader"),
        EventKind::DownloadError => match event.subject.download().and_then(|j| j.error_message.as_deref()) {
            Some(err) => format!("{name} errored: {err}"),
            None => format!("{name} errored"),
        },
        EventKind::DownloadComplete => format!("{name} finished downloading"),
        EventKind::CategoryChanged => format!(
            "{name} moved from category '{}' to '{}'",
            data.str("old_category").unwrap_or(""),
            data.str("new_category").unwrap_or("")
        ),
        EventKind::FileCompleted => format!(
            "{} finished downloading for {name}",
            data.str("file_path").unwrap_or("a file")
        ),
        EventKind::SyncJobCreated => format!("Sync job created for {name}"),
        EventKind::SyncFileCreated => format!(
            "Queued {} for sync",
            data.str("file_path").unwrap_or("a file")
        ),
        EventKind::SyncStarted => format!("Sync started for {name}"),
        EventKind::SyncFileStarted => {
            format!("Syncing {}", data.str("file_path").unwrap_or("a file"))
        }
        EventKind::SyncFileComplete => {
            let file = data.str("file_path").unwrap_or("a file");
            if data.bool("already_synced").unwrap_or(false) {
                format!("{file} already synced")
            } else {
                format!("{file} synced")
            }
        }
        EventKind::SyncComplete => format!("Sync complete for {name}"),
        EventKind::SyncFailed => format!(
            "Sync failed for {name}: {}",
            data.str("error").unwrap_or("unknown error")
        ),
        EventKind::SyncCancelled => format!("Sync cancelled for {name}"),
        EventKind::MoveStarted => {
            let dest = data.str("final_path").unwrap_or("");
            if data.bool("is_migrate").unwrap_or(false) {
                format!("Migrating {name} to {dest}")
            } else {
                format!("Moving {name} to {dest}")
            }
        }
        EventKind::MoveComplete => {
            let dest = data.str("final_path").unwrap_or("");
            if data.bool("already_at_final").unwrap_or(false) {
                format!("{name} already at {dest}")
            } else {
                format!("Moved {name} to {dest}")
            }
        }
        EventKind::MoveFailed => format!(
            "Move failed for {name}: {}",
            data.str("error").unwrap_or("unknown error")
        ),
        EventKind::AppNotifyStarted => format!(
            "Notifying {} about {name}",
            data.str("app_name").unwrap_or("app")
        ),
        EventKind::AppNotifyComplete => format!(
            "{} accepted import of {name}",
            data.str("app_name").unwrap_or("app")
        ),
        EventKind::AppNotifyFailed => format!(
            "Notifying {} about {name} failed: {}",
            data.str("app_name").unwrap_or("app"),
            data.str("error").unwrap_or("unknown error")
        ),
        EventKind::Cleanup => format!("Cleaned up {}", data.str("path").unwrap_or("")),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DownloadJob;
    use crate::events::EventData;
    use crate::types::{DownloadStatus, Id};

    fn job(name: &str) -> DownloadJob {
        DownloadJob {
            id: Id::generate(),
            downloader: "seedbox".into(),
            remote_id: "hash-1".into(),
            name: name.into(),
            category: "movies".into(),
            previous_category: None,
            size: 1000,
            downloaded: 1000,
            progress: 100.0,
            download_speed: 0,
            save_path: "/remote/dl".into(),
            status: DownloadStatus::Complete.to_i32(),
            error_message: None,
            discovered_at: 0,
            downloaded_at: None,
            removed_at: None,
        }
    }

    #[test]
    fn category_change_message_names_both_categories() {
        let event = Event::download(EventKind::CategoryChanged, job("Movie.2024")).with_data(
            EventData::new()
                .with("old_category", "movies")
                .with("new_category", "untracked"),
        );
        assert_eq!(
            render_message(&event),
            "Movie.2024 moved from category 'movies' to 'untracked'"
        );
    }

    #[test]
    fn already_synced_files_render_distinctly() {
        let event = Event::download(EventKind::SyncFileComplete, job("Movie.2024")).with_data(
            EventData::new()
                .with("file_path", "Movie.2024/movie.mkv")
                .with("already_synced", true),
        );
        assert_eq!(render_message(&event), "Movie.2024/movie.mkv already synced");
    }

    #[test]
    fn app_name_is_derived_from_payload_for_notify_events() {
        let event = Event::download(EventKind::AppNotifyStarted, job("Movie.2024"))
            .with_data(EventData::new().with("app_name", "radarr"));
        assert_eq!(app_name_of(&event), Some("radarr".to_string()));
        assert_eq!(render_message(&event), "Notifying radarr about Movie.2024");
    }

    #[tokio::test]
    async fn records_events_to_the_store_until_stopped() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let bus = Arc::new(EventBus::new());
        let controller = TimelineController::new(db.clone(), bus.clone());
        controller.start().await;

        bus.publish(Event::new(EventKind::SystemStarted, Subject::System));
        bus.publish(Event::download(
            EventKind::DownloadDiscovered,
            job("Movie.2024"),
        ));

        // Give the dispatch task a moment to drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        controller.stop().await;
        controller.stop().await; // idempotent

        let events = db.list_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.kind == "system.started"));
        assert!(
            events
                .iter()
                .any(|e| e.kind == "download.discovered" && e.message == "Discovered Movie.2024")
        );
    }
}
