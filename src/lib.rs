//! # seedreap
//!
//! Seedbox-to-library sync daemon. SeedReap watches remote torrent clients
//! ("downloaders") holding completed files on a seedbox, syncs those files
//! to local staging over SFTP as each file completes, moves finished
//! downloads to a per-app final destination and notifies the downstream
//! media manager ("app") to import them.
//!
//! ## Design Philosophy
//!
//! - **Event-driven** - five controllers cooperate over an in-process bus;
//!   the store is the only shared mutable state
//! - **Restart-safe** - state derives from the store and the filesystem,
//!   never from memory; transfers are idempotent
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Thin collaborators** - torrent clients, apps and the transfer
//!   backend sit behind narrow traits chosen at configuration time
//!
//! ## Quick Start
//!
//! ```no_run
//! use seedreap::{Config, SeedReap, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config: Config = serde_json::from_str(&std::fs::read_to_string("seedreap.json")?)?;
//!     let daemon = SeedReap::new(config).await?;
//!     daemon.start().await?;
//!
//!     // Blocks until SIGTERM/SIGINT, then drains the pipeline
//!     run_with_shutdown(daemon).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST read API module
pub mod api;
/// In-process pub/sub event bus
pub mod bus;
/// Downloader and app client boundaries
pub mod clients;
/// Configuration types
pub mod config;
/// Pipeline controllers
pub mod controllers;
/// Daemon assembly and lifecycle
pub mod daemon;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Event vocabulary
pub mod events;
/// Staging and final path resolution
pub mod paths;
/// Live progress index
pub mod progress;
/// File transfer backends
pub mod transfer;
/// Core types and identifiers
pub mod types;
/// Filesystem helpers
pub mod utils;

// Re-export commonly used types
pub use bus::{EventBus, Subscription};
pub use config::{AppConfig, AppKind, Config, DownloaderConfig, SyncConfig};
pub use daemon::SeedReap;
pub use db::Database;
pub use error::{ClientError, DatabaseError, Error, Result, SyncError, TransferError};
pub use events::{Event, EventData, EventKind, Subject};
pub use progress::ProgressIndex;
pub use types::{DownloadStatus, Id, SyncStatus, TrackedState};

/// Helper function to run the daemon with graceful signal handling.
///
/// Waits for a termination signal and then calls the daemon's `shutdown()`
/// method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(daemon: SeedReap) -> Result<()> {
    wait_for_signal().await;
    daemon.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
