//! Test configuration helpers for creating downloaders rooted in a temp directory

use media_dl::{Config, MediaDownloader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::FakeExtractor;

/// Config rooted in `root` with short timeouts, no jitter and no cookie sources
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.store_dir = root.join("store");
    config.download.workspace_dir = root.join("workspaces");
    config.thumbnails.dir = root.join("thumbnails");
    config.download.task_timeout = Duration::from_secs(5);
    config.extractor.attempt_timeout = Duration::from_secs(5);
    config.extractor.strategy_jitter_min_ms = 0;
    config.extractor.strategy_jitter_max_ms = 0;
    config.extractor.search_path = false;
    config.extractor.cookie_browsers = Vec::new();
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config
}

/// Create a downloader over `extractor`
///
/// Returns the downloader and temp directory (keep temp_dir alive for test duration)
pub async fn create_downloader(extractor: Arc<FakeExtractor>) -> (MediaDownloader, TempDir) {
    create_downloader_with(extractor, |_| {}).await
}

/// Same as [`create_downloader`] with a config tweak applied first
pub async fn create_downloader_with(
    extractor: Arc<FakeExtractor>,
    tweak: impl FnOnce(&mut Config),
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);

    let downloader = MediaDownloader::with_extractor(config, extractor)
        .await
        .expect("Failed to create downloader");
    (downloader, temp_dir)
}
