//! Human-readable descriptions for discovered media.
//!
//! [`MediaDescriber::describe`] walks a fixed chain of sources and stops at the
//! first one that produces something useful:
//!
//! 1. HTML metadata (`alt`, `title`, enclosing `figcaption`)
//! 2. icon-style filenames
//! 3. the downloaded asset (captioned, SVG text, or type and size)
//! 4. the nearest preceding heading or paragraph
//! 5. a fixed failure message
//!
//! It never fails; every error along the way is logged and the chain moves on.

use crate::capability::{MediaCaptioner, NoCaptioner};
use crate::error::{CapabilityError, Result, ScanError};
use crate::extract::{MediaCandidate, MediaContext, collapse_whitespace};
use regex::Regex;
use reqwest::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const METADATA_MIN_CHARS: usize = 10;
const CAPTION_MAX_CHARS: usize = 200;
const NEARBY_MAX_CHARS: usize = 150;
const CAUSE_MAX_CHARS: usize = 100;

/// SVG and raster bodies above this size are not downloaded for inspection.
pub const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

const RASTER_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "avif", "tif", "tiff",
];

const ICON_NOISE_TOKENS: &[&str] = &["icon", "icons", "ico", "svg", "ic"];

const ICON_NAMES: &[(&str, &str)] = &[
    ("calendar", "Calendar"),
    ("check", "Checkmark"),
    ("checkmark", "Checkmark"),
    ("tick", "Checkmark"),
    ("user", "User profile"),
    ("avatar", "User profile"),
    ("profile", "User profile"),
    ("search", "Search"),
    ("magnifier", "Search"),
    ("arrow", "Arrow"),
    ("chevron", "Arrow"),
    ("close", "Close"),
    ("x", "Close"),
    ("menu", "Menu"),
    ("hamburger", "Menu"),
    ("home", "Home"),
    ("email", "Email"),
    ("mail", "Email"),
    ("envelope", "Email"),
    ("phone", "Phone"),
    ("cart", "Shopping cart"),
    ("basket", "Shopping cart"),
    ("star", "Star"),
    ("heart", "Heart"),
    ("settings", "Settings"),
    ("gear", "Settings"),
    ("cog", "Settings"),
    ("play", "Play"),
    ("pause", "Pause"),
    ("download", "Download"),
    ("upload", "Upload"),
    ("share", "Share"),
    ("info", "Information"),
    ("warning", "Warning"),
    ("alert", "Warning"),
    ("lock", "Lock"),
    ("logo", "Logo"),
];

// Captions a vision model produces when it has nothing specific to say.
const GENERIC_CAPTIONS: &[&str] = &[
    "a picture",
    "an image",
    "a photo",
    "a photograph",
    "a screenshot",
    "a close up",
    "a logo",
    "a black and white photo",
    "a blurry photo",
    "a white background",
];

static SVG_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:title|desc|text|tspan)\b[^>]*>(.*?)</(?:title|desc|text|tspan)\s*>")
        .unwrap()
});

static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Turns media candidates into descriptions.
#[derive(Clone)]
pub struct MediaDescriber {
    captioner: Arc<dyn MediaCaptioner>,
    timeout: Duration,
    max_download_bytes: u64,
}

impl Default for MediaDescriber {
    fn default() -> Self {
        Self::new(Arc::new(NoCaptioner))
    }
}

impl MediaDescriber {
    pub fn new(captioner: Arc<dyn MediaCaptioner>) -> Self {
        Self {
            captioner,
            timeout: Duration::from_secs(10),
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        }
    }

    /// Timeout for downloading a single asset.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_download_bytes(mut self, limit: u64) -> Self {
        self.max_download_bytes = limit;
        self
    }

    pub async fn describe(&self, client: &Client, candidate: &MediaCandidate) -> String {
        let label = candidate.media_type.label();
        let metadata = metadata_description(&candidate.context);

        if let Some(text) = &metadata
            && text.chars().count() > METADATA_MIN_CHARS
        {
            return text.clone();
        }

        let filename = filename_of(&candidate.url);
        if is_icon_like(&filename)
            && let Some(text) = icon_description(&filename)
        {
            return text;
        }

        let mut cause = None;
        match self
            .describe_download(client, candidate, metadata.as_deref(), &filename)
            .await
        {
            Ok(Some(text)) => return text,
            Ok(None) => {}
            Err(e) => {
                debug!(url = %candidate.url, error = %e, "media download did not yield a description");
                cause = Some(e.to_string());
            }
        }

        if let Some(nearby) = &candidate.context.nearby_text {
            return format!("{} near: {}", label, truncate_chars(nearby, NEARBY_MAX_CHARS));
        }

        if let Some(text) = metadata {
            return text;
        }

        let cause = cause.unwrap_or_else(|| "no usable description source".to_string());
        format!(
            "{} content (description failed: {})",
            label,
            truncate_chars(&cause, CAUSE_MAX_CHARS)
        )
    }

    async fn describe_download(
        &self,
        client: &Client,
        candidate: &MediaCandidate,
        metadata: Option<&str>,
        filename: &str,
    ) -> Result<Option<String>> {
        let response = client
            .get(&candidate.url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: candidate.url.clone(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let extension = extension_of(filename);
        let is_svg = content_type == "image/svg+xml" || extension == "svg";
        let is_raster = !is_svg
            && (content_type.starts_with("image/")
                || RASTER_EXTENSIONS.contains(&extension.as_str()));

        if !is_svg && !is_raster {
            let size = match response.content_length() {
                Some(length) => length,
                None => drain_length(response).await?,
            };
            let words = filename_words(filename);
            let name = if words.is_empty() {
                filename
            } else {
                words.as_str()
            };
            let kind = if content_type.is_empty() {
                "unknown"
            } else {
                content_type.as_str()
            };
            return Ok(Some(format!(
                "{} - {}, size: {:.1} KB",
                name,
                kind,
                size as f64 / 1024.0
            )));
        }

        let Some(bytes) = read_capped(response, self.max_download_bytes).await? else {
            debug!(url = %candidate.url, limit = self.max_download_bytes, "asset too large to inspect");
            return Ok(None);
        };

        if is_svg {
            return Ok(svg_description(&bytes, filename));
        }

        match self.captioner.caption(&bytes).await {
            Ok(caption) => Ok(Some(combine_caption(
                &caption,
                metadata,
                &candidate.context,
                filename,
            ))),
            Err(CapabilityError::Unavailable) => {
                debug!(url = %candidate.url, "no captioner available");
                Ok(None)
            }
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "captioning failed");
                Err(e.into())
            }
        }
    }
}

/// Body of `response`, or `None` once it grows past `limit` bytes.
async fn read_capped(mut response: Response, limit: u64) -> Result<Option<Vec<u8>>> {
    if response.content_length().is_some_and(|length| length > limit) {
        return Ok(None);
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body))
}

/// Counts body bytes without keeping them.
async fn drain_length(mut response: Response) -> Result<u64> {
    let mut total = 0u64;
    while let Some(chunk) = response.chunk().await? {
        total += chunk.len() as u64;
    }
    Ok(total)
}

/// `alt`, then `title` when it says something else, then the figcaption when
/// it is not already part of the text.
pub fn metadata_description(context: &MediaContext) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();

    if let Some(alt) = &context.alt {
        parts.push(alt);
    }
    if let Some(title) = &context.title
        && context.alt.as_deref() != Some(title.as_str())
    {
        parts.push(title);
    }
    if let Some(caption) = &context.figcaption {
        let joined = parts.join(" - ");
        if !joined.contains(caption.as_str()) {
            parts.push(caption);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" - "))
    }
}

fn filename_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default()
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn stem_of(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
}

fn is_icon_like(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".svg") || lower.contains("icon")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Words of a filename stem, numeric tokens dropped.
pub fn filename_words(filename: &str) -> String {
    stem_of(&filename.replace("%20", " "))
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty() && !token.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Icon: ...` from an icon-style filename, if any meaningful token remains.
pub fn icon_description(filename: &str) -> Option<String> {
    let stem = stem_of(filename).to_ascii_lowercase();
    let mut names: Vec<String> = Vec::new();

    for token in stem.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty()
            || token.chars().all(|c| c.is_ascii_digit())
            || ICON_NOISE_TOKENS.contains(&token)
        {
            continue;
        }
        let name = ICON_NAMES
            .iter()
            .find(|(key, _)| *key == token)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| title_case(token));
        if names.last() != Some(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        None
    } else {
        Some(format!("Icon: {}", names.join(" ")))
    }
}

fn is_generic_caption(caption: &str) -> bool {
    let lower = caption.to_lowercase();
    let lower = lower.trim_end_matches('.');
    GENERIC_CAPTIONS.contains(&lower) || lower.split_whitespace().count() < 3
}

fn combine_caption(
    caption: &str,
    metadata: Option<&str>,
    context: &MediaContext,
    filename: &str,
) -> String {
    let mut caption = truncate_chars(caption.trim(), CAPTION_MAX_CHARS);

    if is_generic_caption(&caption) {
        let hint = context
            .nearby_text
            .as_deref()
            .map(|text| truncate_chars(text, CAUSE_MAX_CHARS))
            .filter(|text| !text.is_empty())
            .or_else(|| Some(filename_words(filename)).filter(|words| !words.is_empty()));
        if let Some(hint) = hint {
            caption = format!("{} ({})", caption, hint);
        }
    }

    match metadata {
        Some(meta) => format!("{} - {}", meta, caption),
        None => caption,
    }
}

fn svg_description(bytes: &[u8], filename: &str) -> Option<String> {
    let source = String::from_utf8_lossy(bytes);
    let mut fragments: Vec<String> = Vec::new();

    for capture in SVG_TEXT.captures_iter(&source) {
        let Some(inner) = capture.get(1) else {
            continue;
        };
        let text = collapse_whitespace(&INNER_TAG.replace_all(inner.as_str(), " "));
        if !text.is_empty() && !fragments.contains(&text) {
            fragments.push(text);
        }
    }

    if !fragments.is_empty() {
        return Some(format!(
            "SVG graphic: {}",
            truncate_chars(&fragments.join(" "), CAPTION_MAX_CHARS)
        ));
    }

    let words = filename_words(filename);
    if words.is_empty() {
        None
    } else {
        Some(format!("SVG graphic: {}", words))
    }
}

/// At most `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
