//! Pipeline controllers.
//!
//! Five controllers cooperate through the bus and the store, with no direct
//! calls between them:
//! - [`download`] polls the remote clients and is the only source of
//!   "world changed" events
//! - [`filesync`] turns completions into transfers, moves and cleanups
//! - [`app_notify`] triggers downstream imports
//! - [`tracker`] folds events into the derived UI state row
//! - [`timeline`] records every event as a human-readable timeline entry
//!
//! Each controller spawns one dispatch task reading its bus subscription;
//! `stop` cancels the task's token, unsubscribes so the stream ends, and
//! waits for the task. Stops are idempotent.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;

pub mod app_notify;
pub mod download;
pub mod filesync;
pub mod timeline;
pub mod tracker;

const NO_SUBSCRIPTION: u64 = u64::MAX;

/// Lifecycle state shared by every controller's dispatch task
pub(crate) struct DispatchHandle {
    token: CancellationToken,
    subscription_id: AtomicU64,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DispatchHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            subscription_id: AtomicU64::new(NO_SUBSCRIPTION),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Token observed by the dispatch loop
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Record the running dispatch task and its subscription
    pub(crate) async fn register(&self, subscription_id: u64, task: JoinHandle<()>) {
        self.subscription_id.store(subscription_id, Ordering::SeqCst);
        *self.task.lock().await = Some(task);
    }

    /// Record a dispatch task that has no bus subscription (polling loops)
    pub(crate) async fn register_task(&self, task: JoinHandle<()>) {
        *self.task.lock().await = Some(task);
    }

    /// Whether a dispatch task has been registered and not yet stopped
    pub(crate) async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Cancel, unsubscribe and wait for the dispatch task. Idempotent.
    pub(crate) async fn stop(&self, bus: &EventBus) {
        self.token.cancel();
        let sub_id = self.subscription_id.swap(NO_SUBSCRIPTION, Ordering::SeqCst);
        if sub_id != NO_SUBSCRIPTION {
            bus.unsubscribe_id(sub_id);
        }
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "dispatch task ended abnormally");
                }
            }
        }
    }
}
