//! Application state for the API server

use crate::{Config, MediaDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; both fields are behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The downloader that owns jobs, the store and the thumbnail cache
    pub downloader: Arc<MediaDownloader>,

    /// Configuration snapshot the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
