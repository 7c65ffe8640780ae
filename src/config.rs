//! Configuration types for seedreap

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

/// Kind of remote torrent client
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DownloaderKind {
    /// qBittorrent WebUI API
    #[default]
    Qbittorrent,
}

/// SSH parameters for reaching the seedbox filesystem
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SshConfig {
    /// SSH host (usually the same box as the torrent client)
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// SSH user
    pub username: String,

    /// Private key file for public-key authentication
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Password for password authentication (used when no key file is set)
    #[serde(default)]
    pub password: Option<String>,

    /// Verify the host key against a known-hosts file before transferring
    #[serde(default)]
    pub strict_host_key: bool,

    /// Known-hosts file consulted under the strict policy
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,
}

/// A configured remote torrent client ("downloader").
///
/// Immutable once loaded; replaced only on restart.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloaderConfig {
    /// Unique display name (also used in the default final-path layout)
    pub name: String,

    /// Client kind
    #[serde(default)]
    pub kind: DownloaderKind,

    /// WebUI base URL, e.g. `http://seedbox.example:8080`
    pub url: String,

    /// WebUI username
    #[serde(default)]
    pub username: Option<String>,

    /// WebUI password
    #[serde(default)]
    pub password: Option<String>,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// SSH parameters for the transfer backend
    pub ssh: SshConfig,

    /// Whether this downloader is polled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl DownloaderConfig {
    /// HTTP timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Kind of downstream media-management app
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    /// Sonarr (TV); triggers DownloadedEpisodesScan
    Sonarr,
    /// Radarr (movies); triggers DownloadedMoviesScan
    Radarr,
    /// No downstream scanner; files are moved but nothing is notified
    Passthrough,
}

impl AppKind {
    /// Whether this app kind performs a scan trigger at all
    pub fn is_passthrough(&self) -> bool {
        matches!(self, AppKind::Passthrough)
    }
}

/// A configured downstream consumer ("app")
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppConfig {
    /// Unique display name
    pub name: String,

    /// App kind (scan-triggerable or passthrough)
    pub kind: AppKind,

    /// Base URL, e.g. `http://localhost:8989` (unused for passthrough)
    #[serde(default)]
    pub url: Option<String>,

    /// API key for the app's REST API (unused for passthrough)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Category tag matching downloads to this app
    pub category: String,

    /// Final-destination override; when set, downloads for this app land here
    /// instead of under the global downloads path
    #[serde(default)]
    pub downloads_path: Option<PathBuf>,

    /// Delete previously imported files when a download leaves this category
    #[serde(default)]
    pub cleanup_on_category_change: bool,

    /// Delete previously imported files when the download is removed remotely
    #[serde(default)]
    pub cleanup_on_remove: bool,

    /// Whether this app participates in category matching (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Sync pipeline behavior (staging, concurrency, polling, drift thresholds)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncConfig {
    /// Local staging directory for in-flight syncs (default: "./syncing")
    #[serde(default = "default_syncing_path")]
    pub syncing_path: PathBuf,

    /// Global final downloads path; per-app `downloads_path` overrides it.
    /// When neither is set the move stage is skipped.
    #[serde(default)]
    pub downloads_path: Option<PathBuf>,

    /// Maximum concurrent file transfers (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Concurrent SFTP streams per file inside the transfer backend (default: 8)
    #[serde(default = "default_parallel_connections")]
    pub parallel_connections: usize,

    /// Seconds between downloader polls (default: 30)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Progress delta (percentage points) that triggers a download-updated
    /// event (default: 1.0)
    #[serde(default = "default_progress_drift_percent")]
    pub progress_drift_percent: f32,

    /// Downloaded-bytes delta that triggers a download-updated event
    /// (default: 1 MiB)
    #[serde(default = "default_size_drift_bytes")]
    pub size_drift_bytes: i64,

    /// Seconds to wait for in-flight transfers to drain on shutdown
    /// (default: 10)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl SyncConfig {
    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Shutdown drain timeout as a [`Duration`]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            syncing_path: default_syncing_path(),
            downloads_path: None,
            max_concurrent: default_max_concurrent(),
            parallel_connections: default_parallel_connections(),
            poll_interval_secs: default_poll_interval_secs(),
            progress_drift_percent: default_progress_drift_percent(),
            size_drift_bytes: default_size_drift_bytes(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./seedreap.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Read API settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Whether to serve the HTTP read API (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address (default: 127.0.0.1:7878)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: default_bind_addr(),
        }
    }
}

/// Main configuration for [`SeedReap`](crate::SeedReap)
///
/// Downloaders and apps are immutable after load; runtime changes require a
/// restart. Sub-configs carry serde defaults so a minimal file (one
/// downloader, one app) works out of the box.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Remote torrent clients to poll (at least one required)
    #[serde(default)]
    pub downloaders: Vec<DownloaderConfig>,

    /// Downstream apps consuming synced downloads
    #[serde(default)]
    pub apps: Vec<AppConfig>,

    /// Sync pipeline behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// HTTP read API
    #[serde(default)]
    pub server: ApiConfig,
}

impl Config {
    /// Union of categories across enabled apps, deduplicated and sorted.
    ///
    /// Passed to the downloader client as a listing filter hint.
    pub fn enabled_categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self
            .apps
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        let mut names = std::collections::HashSet::new();
        for d in &self.downloaders {
            if !names.insert(&d.name) {
                return Err(crate::Error::Config {
                    message: format!("duplicate downloader name '{}'", d.name),
                    key: Some("downloaders.name".into()),
                });
            }
        }
        let mut names = std::collections::HashSet::new();
        for a in &self.apps {
            if !names.insert(&a.name) {
                return Err(crate::Error::Config {
                    message: format!("duplicate app name '{}'", a.name),
                    key: Some("apps.name".into()),
                });
            }
            if !a.kind.is_passthrough() && a.url.is_none() {
                return Err(crate::Error::Config {
                    message: format!("app '{}' needs a url (only passthrough apps may omit it)", a.name),
                    key: Some("apps.url".into()),
                });
            }
        }
        if self.sync.max_concurrent == 0 {
            return Err(crate::Error::Config {
                message: "max_concurrent must be at least 1".into(),
                key: Some("sync.max_concurrent".into()),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_syncing_path() -> PathBuf {
    PathBuf::from("./syncing")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_parallel_connections() -> usize {
    8
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_progress_drift_percent() -> f32 {
    1.0
}

fn default_size_drift_bytes() -> i64 {
    1024 * 1024
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./seedreap.db")
}

fn default_bind_addr() -> SocketAddr {
    use std::net::{IpAddr, Ipv4Addr};
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7878)
}
