//! Error types for seedreap
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Client, Transfer, Sync, Database, etc.)
//! - Context information (paths, entity ids, remote ids)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seedreap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seedreap
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "syncing_path")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Downloader or app client error
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Remote file transfer error
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Sync pipeline error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors talking to a remote torrent client or a media-manager app
#[derive(Debug, Error)]
pub enum ClientError {
    /// Authentication with the remote endpoint failed
    #[error("authentication failed for {name}: {reason}")]
    AuthFailed {
        /// Configured collaborator name
        name: String,
        /// Why authentication failed
        reason: String,
    },

    /// The remote endpoint returned an unexpected status
    #[error("{name} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        /// Configured collaborator name
        name: String,
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// The remote endpoint could not be reached
    #[error("{name} unreachable: {reason}")]
    Unreachable {
        /// Configured collaborator name
        name: String,
        /// Underlying connection error
        reason: String,
    },

    /// Response body did not parse
    #[error("invalid response from {name}: {reason}")]
    InvalidResponse {
        /// Configured collaborator name
        name: String,
        /// What failed to parse
        reason: String,
    },
}

/// Errors from the file transfer backend
#[derive(Debug, Error)]
pub enum TransferError {
    /// SSH session establishment failed
    #[error("SSH connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// Underlying failure
        reason: String,
    },

    /// SSH authentication failed
    #[error("SSH authentication failed for {user}@{host}: {reason}")]
    AuthFailed {
        /// SSH user
        user: String,
        /// Remote host
        host: String,
        /// Underlying failure
        reason: String,
    },

    /// Host key verification failed under the strict known-hosts policy
    #[error("host key verification failed for {host}")]
    HostKeyMismatch {
        /// Remote host
        host: String,
    },

    /// Remote file could not be opened or read
    #[error("remote read failed for {path}: {reason}")]
    RemoteRead {
        /// Remote path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Local file could not be written
    #[error("local write failed for {path}: {reason}")]
    LocalWrite {
        /// Local path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The transfer was cancelled
    #[error("transfer cancelled")]
    Cancelled,
}

/// Errors in the sync pipeline
#[derive(Debug, Error)]
pub enum SyncError {
    /// File size on disk did not match the expected size after transfer
    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The file whose size was verified
        path: PathBuf,
        /// Expected size in bytes
        expected: i64,
        /// Actual size in bytes
        actual: i64,
    },

    /// Moving staged files to the final destination failed
    #[error("move failed for {path}: {reason}")]
    MoveFailed {
        /// The path being moved
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// No transfer backend configured for the downloader
    #[error("no transfer backend for downloader {0}")]
    NoBackend(String),
}

impl Error {
    /// Whether this error is a transfer cancellation.
    ///
    /// Cancellations are expected during shutdown and download removal and are
    /// suppressed from the error paths.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transfer(TransferError::Cancelled))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_detected_through_the_top_level_error() {
        let err = Error::Transfer(TransferError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn other_transfer_errors_are_not_cancelled() {
        let err = Error::Transfer(TransferError::HostKeyMismatch {
            host: "seedbox.example".into(),
        });
        assert!(!err.is_cancelled());
        let err = Error::Other("boom".into());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn size_mismatch_message_names_both_sizes() {
        let err = Error::Sync(SyncError::SizeMismatch {
            path: PathBuf::from("/staging/job_1/a.mkv"),
            expected: 100,
            actual: 99,
        });
        let msg = err.to_string();
        assert!(msg.contains("expected 100"), "got: {msg}");
        assert!(msg.contains("got 99"), "got: {msg}");
    }
}
