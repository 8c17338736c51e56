//! Placeholder extractor used when no yt-dlp binary is available

use super::{ExtractOptions, Extractor, MediaDescriptor};
use crate::strategy::CredentialSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Extractor that fails every call with [`crate::Error::ExternalTool`]
pub struct UnavailableExtractor;

#[async_trait]
impl Extractor for UnavailableExtractor {
    async fn resolve(&self, _url: &str, _options: &ExtractOptions) -> crate::Result<MediaDescriptor> {
        Err(crate::Error::ExternalTool(
            "yt-dlp binary not found; set extractor.binary_path or install yt-dlp".into(),
        ))
    }

    async fn download(
        &self,
        _url: &str,
        _options: &ExtractOptions,
        _output_dir: &Path,
    ) -> crate::Result<PathBuf> {
        Err(crate::Error::ExternalTool(
            "yt-dlp binary not found; set extractor.binary_path or install yt-dlp".into(),
        ))
    }

    async fn probe_credential(&self, _source: &CredentialSource) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_reports_missing_tool() {
        let extractor = UnavailableExtractor;
        let options = ExtractOptions::default();

        let err = extractor
            .resolve("https://example.com", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ExternalTool(_)));

        let err = extractor
            .download("https://example.com", &options, Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ExternalTool(_)));

        assert!(!extractor.probe_credential(&CredentialSource::None).await);
    }
}
