//! Request parsing: quality labels, output formats, format selectors and URL classification

use crate::error::{Error, Result};
use crate::types::{JobKind, OutputFormat, Quality};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Selector used for metadata lookups (capped at 2160p)
pub const INFO_SELECTOR: &str = "bestvideo[height<=2160]+bestaudio/best[height<=2160]";

/// Format selectors handed to the strategy catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorPair {
    /// Selector honoring the requested quality
    pub requested: String,
    /// Fallback used by the simplified strategies
    pub simplified: String,
}

/// Transcoder step the extractor runs after downloading
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostProcess {
    /// Keep whatever the extractor produced
    None,
    /// Merge video and audio into this container
    Merge(OutputFormat),
    /// Extract the audio track and convert it
    ExtractAudio {
        /// Target codec
        codec: OutputFormat,
        /// Target bitrate in kbps
        bitrate_kbps: u32,
    },
}

impl PostProcess {
    /// Container or codec the transcoder hook produces, if any
    pub fn target_format(&self) -> Option<OutputFormat> {
        match self {
            PostProcess::None => None,
            PostProcess::Merge(format) | PostProcess::ExtractAudio { codec: format, .. } => {
                Some(*format)
            }
        }
    }
}

#[allow(clippy::expect_used)] // static pattern
static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit regex is valid"));

/// Parse a quality label such as "best", "worst", "1080p" or "2160p 4K"
pub fn parse_quality(label: &str) -> Result<Quality> {
    let trimmed = label.trim().to_ascii_lowercase();
    match trimmed.as_str() {
        "" | "best" | "highest" => return Ok(Quality::Best),
        "worst" | "lowest" => return Ok(Quality::Worst),
        _ => {}
    }

    let digits = DIGITS
        .find(&trimmed)
        .ok_or_else(|| Error::InvalidInput(format!("unrecognized quality label '{label}'")))?;

    match digits.as_str().parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::InvalidInput(format!(
            "quality ceiling out of range in '{label}'"
        ))),
        Ok(n) => Ok(Quality::AtMost(n)),
    }
}

/// Resolve the output format token, applying the audio-only override
///
/// `audio_only` with a video container falls back to mp3.
pub fn resolve_output_format(token: &str, audio_only: bool) -> Result<OutputFormat> {
    let wanted = token.trim().to_ascii_lowercase();
    let format = OutputFormat::ALL
        .into_iter()
        .find(|f| f.as_str() == wanted)
        .ok_or_else(|| Error::InvalidInput(format!("unsupported format '{token}'")))?;

    if audio_only && !format.is_audio() {
        return Ok(OutputFormat::Mp3);
    }
    Ok(format)
}

/// Build the requested and simplified selectors for a format/quality pair
pub fn format_selector(format: OutputFormat, quality: Quality) -> SelectorPair {
    if format.is_audio() {
        let requested = match quality {
            Quality::Best => "bestaudio/best".to_string(),
            Quality::Worst => "worstaudio/worst".to_string(),
            Quality::AtMost(kbps) => format!("bestaudio[abr<={kbps}]/bestaudio/best"),
        };
        SelectorPair {
            requested,
            simplified: "bestaudio/best".into(),
        }
    } else {
        let requested = match quality {
            Quality::Best => "bestvideo+bestaudio/best".to_string(),
            Quality::Worst => "worstvideo+worstaudio/worst".to_string(),
            Quality::AtMost(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
        };
        SelectorPair {
            requested,
            simplified: "best".into(),
        }
    }
}

/// Transcoder hook for a format
pub fn postprocess_for(format: OutputFormat, audio_bitrate_kbps: u32) -> PostProcess {
    if format.is_audio() {
        PostProcess::ExtractAudio {
            codec: format,
            bitrate_kbps: audio_bitrate_kbps,
        }
    } else {
        PostProcess::Merge(format)
    }
}

/// Parse a URL and require an http(s) scheme with a host
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::InvalidInput(format!("malformed URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "unsupported URL scheme '{}' in '{raw}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidInput(format!("URL '{raw}' has no host")));
    }
    Ok(url)
}

/// True when the URL points at a playlist rather than a single item
pub fn is_playlist_url(url: &Url) -> bool {
    url.query_pairs().any(|(k, _)| k == "list")
        || url
            .path_segments()
            .is_some_and(|mut segments| segments.any(|s| s == "playlist"))
}

/// Validate every URL and decide how the job expands
pub fn classify_urls(urls: &[String]) -> Result<JobKind> {
    let parsed = urls
        .iter()
        .map(|u| validate_url(u))
        .collect::<Result<Vec<_>>>()?;

    match parsed.as_slice() {
        [] => Err(Error::InvalidInput("at least one URL is required".into())),
        [single] if is_playlist_url(single) => Ok(JobKind::Playlist),
        [_] => Ok(JobKind::Single),
        _ => Ok(JobKind::Batch),
    }
}
