//! SFTP transfer backend over ssh2.
//!
//! ssh2 sessions are blocking, so every stream runs on the blocking thread
//! pool. A file is split into up to `parallel_connections` contiguous
//! ranges, each fetched over its own SSH session into the pre-allocated
//! local file. A sampler task turns the shared byte counter into progress
//! callbacks; cancellation flips a flag the readers check between chunks.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SshConfig;
use crate::error::TransferError;
use crate::{Error, Result};

use super::{ProgressCallback, TransferBackend, TransferProgress, TransferRequest};

/// Read granularity per stream
const CHUNK_SIZE: usize = 64 * 1024;

/// Ranges below this size are not worth an extra SSH session
const MIN_RANGE_BYTES: u64 = 4 * 1024 * 1024;

/// Progress sampling interval
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// SFTP transfer backend for one downloader's seedbox
pub struct SftpBackend {
    ssh: SshConfig,
    parallel_connections: usize,
    speed: Arc<AtomicU64>,
    shutting_down: Arc<AtomicBool>,
}

impl SftpBackend {
    /// Build a backend for the given SSH endpoint
    pub fn new(ssh: SshConfig, parallel_connections: usize) -> Self {
        Self {
            ssh,
            parallel_connections: parallel_connections.max(1),
            speed: Arc::new(AtomicU64::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Split `size` bytes into up to `parallel` contiguous `(offset, len)`
/// ranges, each at least [`MIN_RANGE_BYTES`] long (except the only range of
/// a small file).
fn plan_ranges(size: u64, parallel: usize) -> Vec<(u64, u64)> {
    if size == 0 {
        return Vec::new();
    }
    let streams = size
        .div_ceil(MIN_RANGE_BYTES)
        .min(parallel as u64)
        .max(1);
    let base = size / streams;
    let remainder = size % streams;
    let mut ranges = Vec::with_capacity(streams as usize);
    let mut offset = 0u64;
    for i in 0..streams {
        let len = base + if i < remainder { 1 } else { 0 };
        ranges.push((offset, len));
        offset += len;
    }
    ranges
}

fn connect_session(ssh: &SshConfig) -> std::result::Result<ssh2::Session, TransferError> {
    let tcp = std::net::TcpStream::connect((ssh.host.as_str(), ssh.port)).map_err(|e| {
        TransferError::ConnectionFailed {
            host: ssh.host.clone(),
            port: ssh.port,
            reason: e.to_string(),
        }
    })?;

    let mut session = ssh2::Session::new().map_err(|e| TransferError::ConnectionFailed {
        host: ssh.host.clone(),
        port: ssh.port,
        reason: e.to_string(),
    })?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| TransferError::ConnectionFailed {
        host: ssh.host.clone(),
        port: ssh.port,
        reason: e.to_string(),
    })?;

    if ssh.strict_host_key {
        verify_host_key(&session, ssh)?;
    }

    if let Some(key_file) = &ssh.key_file {
        session
            .userauth_pubkey_file(&ssh.username, None, key_file, None)
            .map_err(|e| TransferError::AuthFailed {
                user: ssh.username.clone(),
                host: ssh.host.clone(),
                reason: e.to_string(),
            })?;
    } else if let Some(password) = &ssh.password {
        session
            .userauth_password(&ssh.username, password)
            .map_err(|e| TransferError::AuthFailed {
                user: ssh.username.clone(),
                host: ssh.host.clone(),
                reason: e.to_string(),
            })?;
    } else {
        return Err(TransferError::AuthFailed {
            user: ssh.username.clone(),
            host: ssh.host.clone(),
            reason: "no key file or password configured".to_string(),
        });
    }

    if !session.authenticated() {
        return Err(TransferError::AuthFailed {
            user: ssh.username.clone(),
            host: ssh.host.clone(),
            reason: "authentication rejected".to_string(),
        });
    }

    Ok(session)
}

fn verify_host_key(
    session: &ssh2::Session,
    ssh: &SshConfig,
) -> std::result::Result<(), TransferError> {
    use ssh2::{CheckResult, KnownHostFileKind};

    let known_hosts_path = ssh.known_hosts_file.clone().or_else(|| {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
    });
    let Some(path) = known_hosts_path else {
        return Err(TransferError::HostKeyMismatch {
            host: ssh.host.clone(),
        });
    };

    let mismatch = || TransferError::HostKeyMismatch {
        host: ssh.host.clone(),
    };

    let mut known_hosts = session.known_hosts().map_err(|_| mismatch())?;
    known_hosts
        .read_file(&path, KnownHostFileKind::OpenSSH)
        .map_err(|_| mismatch())?;
    let (key, _key_type) = session.host_key().ok_or_else(mismatch)?;
    match known_hosts.check_port(&ssh.host, ssh.port, key) {
        CheckResult::Match => Ok(()),
        _ => Err(mismatch()),
    }
}

/// Fetch one `(offset, len)` range over its own SSH session (blocking)
fn fetch_range(
    ssh: SshConfig,
    remote_path: PathBuf,
    local_path: PathBuf,
    offset: u64,
    len: u64,
    transferred: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
) -> std::result::Result<(), TransferError> {
    let session = connect_session(&ssh)?;
    let sftp = session.sftp().map_err(|e| TransferError::RemoteRead {
        path: remote_path.clone(),
        reason: e.to_string(),
    })?;

    let mut remote = sftp.open(&remote_path).map_err(|e| TransferError::RemoteRead {
        path: remote_path.clone(),
        reason: e.to_string(),
    })?;
    remote
        .seek(SeekFrom::Start(offset))
        .map_err(|e| TransferError::RemoteRead {
            path: remote_path.clone(),
            reason: e.to_string(),
        })?;

    let mut local = std::fs::OpenOptions::new()
        .write(true)
        .open(&local_path)
        .map_err(|e| TransferError::LocalWrite {
            path: local_path.clone(),
            reason: e.to_string(),
        })?;
    local
        .seek(SeekFrom::Start(offset))
        .map_err(|e| TransferError::LocalWrite {
            path: local_path.clone(),
            reason: e.to_string(),
        })?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        if cancelled.load(Ordering::Relaxed) {
            return Err(TransferError::Cancelled);
        }
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = remote
            .read(&mut buf[..want])
            .map_err(|e| TransferError::RemoteRead {
                path: remote_path.clone(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            // Remote file shorter than expected; the caller's size
            // verification reports it
            break;
        }
        local
            .write_all(&buf[..n])
            .map_err(|e| TransferError::LocalWrite {
                path: local_path.clone(),
                reason: e.to_string(),
            })?;
        transferred.fetch_add(n as u64, Ordering::Relaxed);
        remaining -= n as u64;
    }

    Ok(())
}

#[async_trait]
impl TransferBackend for SftpBackend {
    async fn transfer(
        &self,
        token: &CancellationToken,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> Result<()> {
        if self.shutting_down.load(Ordering::Relaxed) || token.is_cancelled() {
            return Err(Error::Transfer(TransferError::Cancelled));
        }

        let size = u64::try_from(request.size).unwrap_or(0);
        let local_path = request.local_path.clone();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Pre-allocate so every range writes into its own region
        {
            let path = local_path.clone();
            tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(false)
                    .open(&path)?;
                file.set_len(size)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::Other(format!("preallocation task failed: {e}")))??;
        }

        let progress: Arc<ProgressCallback> = Arc::new(progress);
        let transferred = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));

        // Flip the shared flag when the token fires so blocking readers
        // stop at the next chunk boundary
        let watcher = tokio::spawn({
            let token = token.clone();
            let cancelled = cancelled.clone();
            async move {
                token.cancelled().await;
                cancelled.store(true, Ordering::Relaxed);
            }
        });

        let sampler = tokio::spawn({
            let transferred = transferred.clone();
            let speed = self.speed.clone();
            let progress = progress.clone();
            async move {
                let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                let mut last = 0u64;
                loop {
                    interval.tick().await;
                    let now = transferred.load(Ordering::Relaxed);
                    let bytes_per_sec =
                        ((now - last) as f64 / SAMPLE_INTERVAL.as_secs_f64()) as u64;
                    last = now;
                    speed.store(bytes_per_sec, Ordering::Relaxed);
                    progress(TransferProgress {
                        transferred: now,
                        bytes_per_sec,
                    });
                }
            }
        });

        let workers: Vec<_> = plan_ranges(size, self.parallel_connections)
            .into_iter()
            .map(|(offset, len)| {
                let ssh = self.ssh.clone();
                let remote_path = request.remote_path.clone();
                let local_path = local_path.clone();
                let transferred = transferred.clone();
                let cancelled = cancelled.clone();
                tokio::task::spawn_blocking(move || {
                    fetch_range(ssh, remote_path, local_path, offset, len, transferred, cancelled)
                })
            })
            .collect();

        let results = futures::future::join_all(workers).await;
        sampler.abort();
        watcher.abort();
        self.speed.store(0, Ordering::Relaxed);

        if cancelled.load(Ordering::Relaxed) {
            return Err(Error::Transfer(TransferError::Cancelled));
        }
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Error::Transfer(e)),
                Err(join_err) => {
                    return Err(Error::Other(format!("transfer stream panicked: {join_err}")));
                }
            }
        }

        progress(TransferProgress {
            transferred: transferred.load(Ordering::Relaxed),
            bytes_per_sec: 0,
        });
        Ok(())
    }

    fn speed(&self) -> u64 {
        self.speed.load(Ordering::Relaxed)
    }

    async fn prepare_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    async fn close(&self) {
        // Sessions are per-transfer; nothing persistent to release
        self.shutting_down.store(true, Ordering::Relaxed);
    }
}

/// Local path helper used by the filesync controller to build the remote
/// absolute path `<remote_base>/<relative_path>` with forward slashes,
/// whatever the local OS separator is.
pub fn remote_join(remote_base: &str, relative_path: &str) -> PathBuf {
    let mut joined = remote_base.trim_end_matches('/').to_string();
    joined.push('/');
    joined.push_str(relative_path);
    PathBuf::from(joined)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_files_get_a_single_range() {
        let ranges = plan_ranges(1000, 8);
        assert_eq!(ranges, vec![(0, 1000)]);
    }

    #[test]
    fn empty_files_get_no_ranges() {
        assert!(plan_ranges(0, 8).is_empty());
    }

    #[test]
    fn large_files_split_into_contiguous_full_cover() {
        let size = 64 * 1024 * 1024 + 17;
        let ranges = plan_ranges(size, 8);
        assert_eq!(ranges.len(), 8);

        let mut expected_offset = 0u64;
        let mut total = 0u64;
        for (offset, len) in &ranges {
            assert_eq!(*offset, expected_offset, "ranges must be contiguous");
            assert!(*len >= 1);
            expected_offset += len;
            total += len;
        }
        assert_eq!(total, size, "ranges must cover the file exactly");
    }

    #[test]
    fn stream_count_respects_the_minimum_range_size() {
        // 6 MiB: only one extra stream is justified at a 4 MiB minimum
        let ranges = plan_ranges(6 * 1024 * 1024, 8);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn remote_join_normalizes_the_base_slash() {
        assert_eq!(
            remote_join("/remote/dl/", "Movie.2024/movie.mkv"),
            PathBuf::from("/remote/dl/Movie.2024/movie.mkv")
        );
        assert_eq!(
            remote_join("/remote/dl", "movie.mkv"),
            PathBuf::from("/remote/dl/movie.mkv")
        );
    }

    #[tokio::test]
    async fn transfer_after_prepare_shutdown_is_cancelled() {
        let backend = SftpBackend::new(
            SshConfig {
                host: "127.0.0.1".into(),
                port: 22,
                username: "nobody".into(),
                key_file: None,
                password: Some("x".into()),
                strict_host_key: false,
                known_hosts_file: None,
            },
            2,
        );
        backend.prepare_shutdown().await;

        let err = backend
            .transfer(
                &CancellationToken::new(),
                &TransferRequest {
                    remote_path: PathBuf::from("/remote/file"),
                    local_path: PathBuf::from("/tmp/never-written"),
                    size: 10,
                },
                Box::new(|_| {}),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn transfer_with_cancelled_token_short_circuits() {
        let backend = SftpBackend::new(
            SshConfig {
                host: "127.0.0.1".into(),
                port: 22,
                username: "nobody".into(),
                key_file: None,
                password: Some("x".into()),
                strict_host_key: false,
                known_hosts_file: None,
            },
            2,
        );
        let token = CancellationToken::new();
        token.cancel();

        let err = backend
            .transfer(
                &token,
                &TransferRequest {
                    remote_path: PathBuf::from("/remote/file"),
                    local_path: PathBuf::from("/tmp/never-written"),
                    size: 10,
                },
                Box::new(|_| {}),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
