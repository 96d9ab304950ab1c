use super::types::Platform;
use crate::error::PipelineError;

/// Picks the platform handler for a URL by looking at its host, without any I/O.
pub fn classify(url: &str) -> Result<Platform, PipelineError> {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_ascii_lowercase()));

    let on_domain = |domain: &str| match &host {
        Some(host) => host == domain || host.ends_with(&format!(".{domain}")),
        None => url.contains(domain),
    };

    if on_domain("youtube.com") || on_domain("youtu.be") {
        Ok(Platform::Youtube)
    } else if on_domain("instagram.com") {
        Ok(Platform::Instagram)
    } else {
        Err(PipelineError::UnsupportedPlatform(url.to_string()))
    }
}

/// Short post identifier from an Instagram URL path, e.g. `xyz` in
/// `https://instagram.com/p/xyz/`.
pub fn instagram_shortcode(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let position = segments
        .iter()
        .position(|s| matches!(*s, "p" | "reel" | "reels" | "tv"));

    match position {
        Some(index) => segments.get(index + 1).map(|s| s.to_string()),
        None => segments.last().map(|s| s.to_string()),
    }
}
