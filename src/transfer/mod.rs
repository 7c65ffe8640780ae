//! File transfer backend contract.
//!
//! The filesync controller hands a backend one `(remote, local, size)`
//! request at a time and receives progress callbacks at backend-chosen
//! intervals. How a backend parallelizes a single file internally is opaque
//! to the caller.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

pub mod sftp;

pub use sftp::SftpBackend;

/// One file to transfer
#[derive(Clone, Debug)]
pub struct TransferRequest {
    /// Absolute path on the remote side
    pub remote_path: PathBuf,
    /// Absolute path on the local side
    pub local_path: PathBuf,
    /// Expected size in bytes
    pub size: i64,
}

/// A progress sample delivered to the progress callback
#[derive(Clone, Copy, Debug)]
pub struct TransferProgress {
    /// Bytes transferred so far
    pub transferred: u64,
    /// Current speed in bytes per second
    pub bytes_per_sec: u64,
}

/// Progress callback invoked at backend-chosen intervals
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send + Sync>;

/// Remote-to-local file transfer boundary
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Transfer one file. Cancelling the token aborts the in-flight
    /// streams and yields [`TransferError::Cancelled`](crate::error::TransferError::Cancelled).
    async fn transfer(
        &self,
        token: &CancellationToken,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> Result<()>;

    /// Current aggregate speed of this backend in bytes per second
    fn speed(&self) -> u64;

    /// Stop accepting new transfers (in-flight ones continue until drained
    /// or cancelled)
    async fn prepare_shutdown(&self);

    /// Release any held resources
    async fn close(&self);
}
