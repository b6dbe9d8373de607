use serde::{Deserialize, Serialize};
use std::fmt;

/// A fetched HTML document, recorded once on first visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlPage {
    pub url: String,
    pub title: String,
    pub raw_html: String,
    pub parent_url: String,
    pub depth: usize,
    pub links: Vec<String>,
}

/// Readable text extracted from an [`HtmlPage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPage {
    pub url: String,
    pub title: String,
    pub text: String,
    /// Empty when simplification is disabled or failed.
    pub simplified_text: String,
    pub parent_url: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Source,
    Iframe,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Source => "source",
            MediaType::Iframe => "iframe",
        }
    }

    /// Capitalised label used in generated descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Image => "Image",
            MediaType::Video => "Video",
            MediaType::Audio => "Audio",
            MediaType::Source => "Media",
            MediaType::Iframe => "Embedded",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub url: String,
    pub media_type: MediaType,
    pub description: String,
    /// Page on which the asset was first discovered.
    pub parent_url: String,
}

/// Append-only aggregate produced by a crawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteContent {
    html_pages: Vec<HtmlPage>,
    text_pages: Vec<TextPage>,
    media_assets: Vec<MediaAsset>,
}

impl SiteContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html_pages(&self) -> &[HtmlPage] {
        &self.html_pages
    }

    pub fn text_pages(&self) -> &[TextPage] {
        &self.text_pages
    }

    pub fn media_assets(&self) -> &[MediaAsset] {
        &self.media_assets
    }

    pub fn push_html_page(&mut self, page: HtmlPage) {
        self.html_pages.push(page);
    }

    pub fn push_text_page(&mut self, page: TextPage) {
        self.text_pages.push(page);
    }

    pub fn push_media_asset(&mut self, asset: MediaAsset) {
        self.media_assets.push(asset);
    }

    pub fn is_empty(&self) -> bool {
        self.html_pages.is_empty() && self.text_pages.is_empty() && self.media_assets.is_empty()
    }
}
