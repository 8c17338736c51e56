//! Assertion and waiting helpers

use media_dl::{Event, MediaDownloader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Drain every event already sitting in the channel
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Everything below `root`, excluding `root` itself
pub fn entries_below(root: &Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect()
}

/// No task workspace (or anything inside one) outlived its task
pub fn assert_no_workspace_leaks(downloader: &MediaDownloader) {
    let root = &downloader.get_config().download.workspace_dir;
    let leftovers = entries_below(root);
    assert!(
        leftovers.is_empty(),
        "workspace root should be empty, found: {leftovers:?}"
    );
    assert_eq!(downloader.workspaces().outstanding(), 0);
}

/// File names currently in the public store, sorted
pub fn store_files(downloader: &MediaDownloader) -> Vec<String> {
    let store = &downloader.get_config().download.store_dir;
    let mut names: Vec<String> = entries_below(store)
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
