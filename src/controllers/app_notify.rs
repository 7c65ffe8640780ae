//! App controller: notifies downstream apps after a move completes.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::clients::app::AppClient;
use crate::db::{Database, NewAppJob};
use crate::events::{Event, EventData, EventKind};
use crate::paths::apps_for_category;
use crate::types::AppJobStatus;

use super::DispatchHandle;

/// Triggers app imports on `move.complete` and records app-job rows
pub struct AppNotifyController {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    apps: Vec<Arc<dyn AppClient>>,
    dispatch: DispatchHandle,
}

impl AppNotifyController {
    /// Build the controller
    pub fn new(db: Arc<Database>, bus: Arc<EventBus>, apps: Vec<Arc<dyn AppClient>>) -> Arc<Self> {
        Arc::new(Self {
            db,
            bus,
            apps,
            dispatch: DispatchHandle::new(),
        })
    }

    /// Subscribe to `move.complete` and start the dispatch task
    pub async fn start(self: &Arc<Self>) {
        if self.dispatch.is_running().await {
            return;
        }
        let mut sub = self.bus.subscribe(&[EventKind::MoveComplete]);
        let sub_id = sub.id();
        let token = self.dispatch.token();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = sub.recv() => match maybe {
                        Some(event) => {
                            if let Err(e) = this.handle_move_complete(&event).await {
                                tracing::error!(error = %e, "app notification failed");
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

    async fn handle_move_complete(&self, event: &Event) -> crate::Result<()> {
        let Some(job) = event.subject.download() else {
            return Ok(());
        };
        let Some(final_path) = event.data.str("final_path").map(PathBuf::from) else {
            tracing::debug!(download = %job.name, "move.complete without final path, nothing to notify");
            return Ok(());
        };

        for app in apps_for_category(&self.apps, &job.category) {
            let mut app_job = self
                .db
                .insert_app_job(&NewAppJob {
                    download_id: job.id,
                    app_name: app.name().to_string(),
                    path: final_path.display().to_string(),
                    status: AppJobStatus::Running.to_i32(),
                })
                .await?;

            self.bus.publish(
                Event::download(EventKind::AppNotifyStarted, job.clone()).with_data(
                    EventData::new()
                        .with("app_name", app.name())
                        .with("path", final_path.display().to_string()),
                ),
            );

            match app.trigger_import(&final_path).await {
                Ok(()) => {
                    app_job.status = AppJobStatus::Complete.to_i32();
                    app_job.completed_at = Some(chrono::Utc::now().timestamp());
                    self.db.update_app_job(&app_job).await?;
                    self.bus.publish(
                        Event::download(EventKind::AppNotifyComplete, job.clone()).with_data(
                            EventData::new()
                                .with("app_name", app.name())
                                .with("path", final_path.display().to_string()),
                        ),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        app = app.name(),
                        download = %job.name,
                        error = %e,
                        "import trigger failed"
                    );
                    app_job.status = AppJobStatus::Error.to_i32();
                    app_job.error_message = Some(e.to_string());
                    app_job.completed_at = Some(chrono::Utc::now().timestamp());
                    self.db.update_app_job(&app_job).await?;
                    self.bus.publish(
                        Event::download(EventKind::AppNotifyFailed, job.clone()).with_data(
                            EventData::new()
                                .with("app_name", app.name())
                                .with("path", final_path.display().to_string())
                                .with("error", e.to_string()),
                        ),
                    );
                }
            }
        }

        Ok(())
    }
}
