//! Staging and final-destination path resolution.
//!
//! Final-path priority: (1) the first enabled app for the download's category
//! with a `downloads_path` override, used verbatim; (2) the global downloads
//! path extended with `<downloader>/<category>`; (3) none, and the move stage is
//! skipped.
//!
//! Relative file paths supplied by the downloader already include the
//! download's folder name for multi-file downloads, so joining a base with a
//! relative path yields the full on-disk location.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clients::app::AppClient;
use crate::types::Id;

/// Staging base for a sync job: `<syncing_path>/job_<sync_job_id>`
pub fn staging_base(syncing_path: &Path, sync_job_id: Id) -> PathBuf {
    syncing_path.join(format!("job_{sync_job_id}"))
}

/// Resolve the final base directory for a (downloader, category) pair.
///
/// `None` means no destination is configured and the move stage is skipped.
pub fn resolve_final_base(
    apps: &[Arc<dyn AppClient>],
    global_downloads_path: Option<&Path>,
    downloader: &str,
    category: &str,
) -> Option<PathBuf> {
    for app in apps {
        if app.enabled() && app.category() == category {
            if let Some(override_path) = app.downloads_path() {
                return Some(override_path.to_path_buf());
            }
        }
    }
    global_downloads_path.map(|base| base.join(downloader).join(category))
}

/// First enabled app matching a category
pub fn first_app_for_category<'a>(
    apps: &'a [Arc<dyn AppClient>],
    category: &str,
) -> Option<&'a Arc<dyn AppClient>> {
    apps.iter()
        .find(|app| app.enabled() && app.category() == category)
}

/// Every enabled app matching a category
pub fn apps_for_category<'a>(
    apps: &'a [Arc<dyn AppClient>],
    category: &str,
) -> Vec<&'a Arc<dyn AppClient>> {
    apps.iter()
        .filter(|app| app.enabled() && app.category() == category)
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::app::PassthroughApp;
    use crate::config::{AppConfig, AppKind};

    fn passthrough(name: &str, category: &str, downloads_path: Option<&str>) -> Arc<dyn AppClient> {
        Arc::new(PassthroughApp::new(AppConfig {
            name: name.into(),
            kind: AppKind::Passthrough,
            url: None,
            api_key: None,
            category: category.into(),
            downloads_path: downloads_path.map(PathBuf::from),
            cleanup_on_category_change: false,
            cleanup_on_remove: false,
            enabled: true,
        }))
    }

    #[test]
    fn app_override_wins_over_global_path() {
        let apps = vec![passthrough("radarr", "movies", Some("/library/movies"))];
        let base = resolve_final_base(&apps, Some(Path::new("/downloads")), "seedbox", "movies");
        assert_eq!(base, Some(PathBuf::from("/library/movies")));
    }

    #[test]
    fn global_path_gains_downloader_and_category_segments() {
        let apps = vec![passthrough("radarr", "movies", None)];
        let base = resolve_final_base(&apps, Some(Path::new("/downloads")), "seedbox", "movies");
        assert_eq!(base, Some(PathBuf::from("/downloads/seedbox/movies")));
    }

    #[test]
    fn no_app_and_no_global_path_means_no_destination() {
        let apps = vec![passthrough("radarr", "movies", None)];
        assert_eq!(resolve_final_base(&apps, None, "seedbox", "movies"), None);
    }

    #[test]
    fn disabled_apps_do_not_contribute_overrides() {
        let config = AppConfig {
            name: "radarr".into(),
            kind: AppKind::Passthrough,
            url: None,
            api_key: None,
            category: "movies".into(),
            downloads_path: Some(PathBuf::from("/library/movies")),
            cleanup_on_category_change: false,
            cleanup_on_remove: false,
            enabled: false,
        };
        let apps: Vec<Arc<dyn AppClient>> = vec![Arc::new(PassthroughApp::new(config))];

        let base = resolve_final_base(&apps, Some(Path::new("/downloads")), "seedbox", "movies");
        assert_eq!(
            base,
            Some(PathBuf::from("/downloads/seedbox/movies")),
            "a disabled app's override must not apply; the global path still does"
        );
        assert!(first_app_for_category(&apps, "movies").is_none());
    }

    #[test]
    fn staging_base_embeds_the_job_id() {
        let id = Id::generate();
        let base = staging_base(Path::new("/syncing"), id);
        assert_eq!(base, PathBuf::from(format!("/syncing/job_{id}")));
    }
}
