//! qBittorrent WebUI API client.
//!
//! Speaks the v2 WebUI API: cookie login via `/api/v2/auth/login`, listings
//! via `/api/v2/torrents/info` and `/api/v2/torrents/files`. The SID cookie
//! is captured from the login response and re-acquired once on a 403.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::DownloaderConfig;
use crate::error::ClientError;
use crate::types::{DownloadStatus, FileState};
use crate::{Error, Result};

use super::downloader::{DownloaderClient, RemoteDownload, RemoteFile};

/// qBittorrent WebUI client
pub struct QbittorrentClient {
    config: DownloaderConfig,
    http: reqwest::Client,
    /// SID cookie value captured at login
    sid: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    name: String,
    #[serde(default)]
    category: String,
    state: String,
    save_path: String,
    size: i64,
    #[serde(default)]
    completed: i64,
    /// Fraction 0.0-1.0
    progress: f64,
    #[serde(default)]
    dlspeed: i64,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    name: String,
    size: i64,
    /// Fraction 0.0-1.0
    progress: f64,
    priority: i32,
}

impl QbittorrentClient {
    /// Build a client for one configured downloader
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        url::Url::parse(&config.url).map_err(|e| Error::Config {
            message: format!("downloader '{}' has an invalid url: {}", config.name, e),
            key: Some("downloaders.url".into()),
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            config,
            http,
            sid: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn login(&self) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("auth/login"))
            .form(&[
                ("username", self.config.username.as_deref().unwrap_or("")),
                ("password", self.config.password.as_deref().unwrap_or("")),
            ])
            .send()
            .await
            .map_err(|e| {
                Error::Client(ClientError::Unreachable {
                    name: self.config.name.clone(),
                    reason: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            return Err(Error::Client(ClientError::AuthFailed {
                name: self.config.name.clone(),
                reason: format!("login returned HTTP {}", response.status()),
            }));
        }

        // qBittorrent answers 200 with body "Fails." on bad credentials
        let sid = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .split(';')
                    .next()
                    .filter(|pair| pair.trim_start().starts_with("SID="))
                    .map(|pair| pair.trim().to_string())
            });

        match sid {
            Some(sid) => {
                *self.sid.write().await = Some(sid);
                Ok(())
            }
            None => Err(Error::Client(ClientError::AuthFailed {
                name: self.config.name.clone(),
                reason: "login accepted but no SID cookie returned".to_string(),
            })),
        }
    }

    async fn get_with_auth(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        for attempt in 0..2 {
            if self.sid.read().await.is_none() {
                self.login().await?;
            }
            let cookie = self.sid.read().await.clone().unwrap_or_default();
            let response = self
                .http
                .get(self.endpoint(path))
                .header(reqwest::header::COOKIE, cookie)
                .query(query)
                .send()
                .await
                .map_err(|e| {
                    Error::Client(ClientError::Unreachable {
                        name: self.config.name.clone(),
                        reason: e.to_string(),
                    })
                })?;

            if response.status() == reqwest::StatusCode::FORBIDDEN && attempt == 0 {
                // Session expired; re-login once
                *self.sid.write().await = None;
                continue;
            }
            if !response.status().is_success() {
                return Err(Error::Client(ClientError::UnexpectedStatus {
                    name: self.config.name.clone(),
                    status: response.status().as_u16(),
                    body: response.text().await.unwrap_or_default(),
                }));
            }
            return Ok(response);
        }
        Err(Error::Client(ClientError::AuthFailed {
            name: self.config.name.clone(),
            reason: "session could not be re-established".to_string(),
        }))
    }

    fn map_state(state: &str, progress: f64) -> DownloadStatus {
        match state {
            "error" | "missingFiles" => DownloadStatus::Error,
            "pausedDL" | "stoppedDL" => DownloadStatus::Paused,
            "uploading" | "stalledUP" | "pausedUP" | "stoppedUP" | "queuedUP" | "forcedUP"
            | "checkingUP" => DownloadStatus::Complete,
            _ if progress >= 1.0 => DownloadStatus::Complete,
            _ => DownloadStatus::Downloading,
        }
    }
}

#[async_trait]
impl DownloaderClient for QbittorrentClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<()> {
        self.login().await
    }

    async fn list(&self, categories: &[String]) -> Result<Vec<RemoteDownload>> {
        // The WebUI filters by a single category per request, so fetch all
        // and narrow client-side. Known downloads keep being reported even
        // after a rename to an unmatched category; the download controller
        // handles those through its store diff.
        let response = self.get_with_auth("torrents/info", &[]).await?;
        let torrents: Vec<TorrentInfo> = response.json().await.map_err(|e| {
            Error::Client(ClientError::InvalidResponse {
                name: self.config.name.clone(),
                reason: e.to_string(),
            })
        })?;

        let downloads = torrents
            .into_iter()
            .filter(|t| categories.is_empty() || categories.contains(&t.category))
            .map(|t| {
                let status = Self::map_state(&t.state, t.progress);
                RemoteDownload {
                    remote_id: t.hash,
                    name: t.name,
                    category: t.category,
                    status,
                    save_path: t.save_path,
                    size: t.size,
                    downloaded: t.completed,
                    progress: (t.progress * 100.0) as f32,
                    download_speed: t.dlspeed,
                    error_message: match status {
                        DownloadStatus::Error => Some(format!("client state: {}", t.state)),
                        _ => None,
                    },
                }
            })
            .collect();

        Ok(downloads)
    }

    async fn get_files(&self, remote_id: &str) -> Result<Vec<RemoteFile>> {
        let response = self
            .get_with_auth("torrents/files", &[("hash", remote_id)])
            .await?;
        let files: Vec<TorrentFile> = response.json().await.map_err(|e| {
            Error::Client(ClientError::InvalidResponse {
                name: self.config.name.clone(),
                reason: e.to_string(),
            })
        })?;

        Ok(files
            .into_iter()
            .map(|f| RemoteFile {
                downloaded: (f.progress * f.size as f64) as i64,
                progress: (f.progress * 100.0) as f32,
                state: if f.progress >= 1.0 {
                    FileState::Complete
                } else {
                    FileState::Downloading
                },
                relative_path: f.name,
                size: f.size,
                priority: f.priority,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        // Best-effort logout; an expired session is fine
        if let Some(cookie) = self.sid.write().await.take() {
            let _ = self
                .http
                .post(self.endpoint("auth/logout"))
                .header(reqwest::header::COOKIE, cookie)
                .send()
                .await;
        }
        Ok(())
    }
}
