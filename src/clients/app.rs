//! App client contract: the downstream media-manager boundary.

use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::config::{AppConfig, AppKind};

/// Downstream media-manager boundary.
///
/// Accessors expose the configuration the pipeline needs for category
/// matching, path resolution and cleanup decisions; `trigger_import` is the
/// only action.
#[async_trait]
pub trait AppClient: Send + Sync {
    /// Configured name of this app
    fn name(&self) -> &str;

    /// App kind
    fn kind(&self) -> AppKind;

    /// Category tag matching downloads to this app
    fn category(&self) -> &str;

    /// Final-destination override, when configured
    fn downloads_path(&self) -> Option<&Path>;

    /// Whether imported files are deleted when a download leaves this
    /// category
    fn cleanup_on_category_change(&self) -> bool;

    /// Whether imported files are deleted when the download is removed
    /// remotely
    fn cleanup_on_remove(&self) -> bool;

    /// Whether this app participates in category matching
    fn enabled(&self) -> bool;

    /// Verify the app is reachable
    async fn test_connection(&self) -> Result<()>;

    /// Ask the app to scan and import the given path
    async fn trigger_import(&self, path: &Path) -> Result<()>;
}

/// App with no downstream scanner.
///
/// Used when cleanup rules are wanted but nothing consumes the files; the
/// trigger is a no-op and always succeeds, so app jobs still appear for
/// observability.
pub struct PassthroughApp {
    config: AppConfig,
}

impl PassthroughApp {
    /// Build a passthrough app from its configuration
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AppClient for PassthroughApp {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AppKind {
        AppKind::Passthrough
    }

    fn category(&self) -> &str {
        &self.config.category
    }

    fn downloads_path(&self) -> Option<&Path> {
        self.config.downloads_path.as_deref()
    }

    fn cleanup_on_category_change(&self) -> bool {
        self.config.cleanup_on_category_change
    }

    fn cleanup_on_remove(&self) -> bool {
        self.config.cleanup_on_remove
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn trigger_import(&self, path: &Path) -> Result<()> {
        tracing::debug!(app = self.name(), path = %path.display(), "passthrough import, nothing to trigger");
        Ok(())
    }
}
