//! Sonarr/Radarr v3 command API client.
//!
//! Imports are triggered with the app's downloaded-scan command
//! (`DownloadedEpisodesScan` for Sonarr, `DownloadedMoviesScan` for Radarr)
//! posted to `/api/v3/command` with the configured API key.

use std::path::Path;

use async_trait::async_trait;

use crate::config::{AppConfig, AppKind};
use crate::error::ClientError;
use crate::{Error, Result};

use super::app::AppClient;

/// Sonarr/Radarr client
pub struct ArrApp {
    config: AppConfig,
    http: reqwest::Client,
}

impl ArrApp {
    /// Build a client for one configured app
    pub fn new(config: AppConfig) -> Result<Self> {
        if config.url.is_none() {
            return Err(Error::Config {
                message: format!("app '{}' has no url", config.name),
                key: Some("apps.url".into()),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(Error::Network)?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config.url.as_deref().unwrap_or_default()
    }

    fn scan_command(&self) -> &'static str {
        match self.config.kind {
            AppKind::Sonarr => "DownloadedEpisodesScan",
            AppKind::Radarr => "DownloadedMoviesScan",
            // Passthrough apps never construct an ArrApp
            AppKind::Passthrough => "DownloadedMoviesScan",
        }
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl AppClient for ArrApp {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> AppKind {
        self.config.kind
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
        let url = format!("{}/api/v3/system/status", self.base_url().trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .header("X-Api-Key", self.api_key())
            .send()
            .await
            .map_err(|e| {
                Error::Client(ClientError::Unreachable {
                    name: self.config.name.clone(),
                    reason: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            return Err(Error::Client(ClientError::UnexpectedStatus {
                name: self.config.name.clone(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            }));
        }
        Ok(())
    }

    async fn trigger_import(&self, path: &Path) -> Result<()> {
        let url = format!("{}/api/v3/command", self.base_url().trim_end_matches('/'));
        let body = serde_json::json!({
            "name": self.scan_command(),
            "path": path.to_string_lossy(),
        });

        let response = self
            .http
            .post(url)
            .header("X-Api-Key", self.api_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Client(ClientError::Unreachable {
                    name: self.config.name.clone(),
                    reason: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            return Err(Error::Client(ClientError::UnexpectedStatus {
                name: self.config.name.clone(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            }));
        }

        tracing::info!(
            app = self.name(),
            command = self.scan_command(),
            path = %path.display(),
            "import triggered"
        );
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str, kind: AppKind) -> AppConfig {
        AppConfig {
            name: "radarr".into(),
            kind,
            url: Some(url.into()),
            api_key: Some("topsecret".into()),
            category: "movies".into(),
            downloads_path: None,
            cleanup_on_category_change: false,
            cleanup_on_remove: false,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn trigger_import_posts_the_scan_command_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .and(header("X-Api-Key", "topsecret"))
            .and(body_partial_json(serde_json::json!({
                "name": "DownloadedMoviesScan",
                "path": "/library/movies/Movie.2024"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let app = ArrApp::new(config(&server.uri(), AppKind::Radarr)).unwrap();
        app.trigger_import(Path::new("/library/movies/Movie.2024"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sonarr_uses_the_episodes_scan_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .and(body_partial_json(serde_json::json!({
                "name": "DownloadedEpisodesScan"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 8})))
            .expect(1)
            .mount(&server)
            .await;

        let app = ArrApp::new(config(&server.uri(), AppKind::Sonarr)).unwrap();
        app.trigger_import(Path::new("/library/tv/Show.S01")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_trigger_surfaces_the_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let app = ArrApp::new(config(&server.uri(), AppKind::Radarr)).unwrap();
        let err = app
            .trigger_import(Path::new("/library/movies/Movie.2024"))
            .await
            .unwrap_err();
        match err {
            Error::Client(ClientError::UnexpectedStatus { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_hits_system_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/system/status"))
            .and(header("X-Api-Key", "topsecret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "5.0"})))
            .expect(1)
            .mount(&server)
            .await;

        let app = ArrApp::new(config(&server.uri(), AppKind::Radarr)).unwrap();
        app.test_connection().await.unwrap();
    }

    #[test]
    fn arr_app_requires_a_url() {
        let mut cfg = config("http://localhost", AppKind::Radarr);
        cfg.url = None;
        assert!(ArrApp::new(cfg).is_err());
    }
}
