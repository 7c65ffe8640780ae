//! Shared state handed to every API handler.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::db::Database;
use crate::progress::ProgressIndex;

/// Read-only handles the API serves from
#[derive(Clone)]
pub struct ApiState {
    /// The store (read-only from here)
    pub db: Arc<Database>,
    /// Live progress index
    pub index: Arc<ProgressIndex>,
    /// Event bus (for the SSE stream)
    pub bus: Arc<EventBus>,
}
