//! Link, text and media extraction over a parsed HTML document.
//!
//! Everything in here is synchronous and side-effect free so that a parsed
//! [`Html`] never has to live across an await point in the crawler.

use crate::content::MediaType;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Primary text extraction falls back to whole-body text below this many chars.
pub const MIN_PRIMARY_TEXT_CHARS: usize = 50;

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "meta", "link", "title", "nav", "header",
    "footer", "aside", "svg",
];

const TEXT_BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "blockquote", "pre", "figcaption",
    "dt", "dd",
];

const CONTAINER_TAGS: &[&str] = &["div", "section", "article", "main", "body"];

const BOILERPLATE_MARKERS: &[&str] = &[
    "nav", "navbar", "navigation", "menu", "footer", "header", "sidebar",
];

// Class words that describe layout state rather than the element itself
// (`no-sidebar`, `has-header`).
const MODIFIER_WORDS: &[&str] = &["no", "has", "with", "without", "is"];

// Class words that tie a header or footer to the article it belongs to
// (`entry-header`, `post-footer`).
const CONTENT_WORDS: &[&str] = &["entry", "post", "article", "content", "story"];

// Content roots are never filtered by class or id.
const CONTENT_ROOT_TAGS: &[&str] = &["body", "main", "article"];

// Elements that start a new line when rendering visible body text.
const BREAKING_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "tr", "table", "blockquote", "pre", "br", "hr", "figure", "figcaption", "dl", "dt",
    "dd", "form",
];

const NEARBY_TEXT_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Lazy-loading attributes checked on `<img>`, first non-empty wins.
/// Inline `data:` placeholders do not count.
pub const IMAGE_SOURCE_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-lazy",
    "data-url",
];

const SRCSET_ATTRS: &[&str] = &["srcset", "data-srcset"];

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "avif", "tif", "tiff", "svg", "mp4", "webm", "mov",
    "ogv", "mp3", "wav", "ogg", "m4a", "flac", "pdf",
];

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));
static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector"));
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("img selector"));
static SRCSET_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[srcset], img[data-srcset], source[srcset], source[data-srcset]")
        .expect("srcset selector")
});
static EMBED_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("video, audio, source, iframe").expect("embed selector")
});
static STYLED_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[style]").expect("style selector"));
static FIGCAPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("figcaption").expect("figcaption selector"));

static BACKGROUND_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background(?:-image)?\s*:[^;]*?url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap()
});

// Asset hosts whose URLs are often only present in inline JSON or scripts.
static CDN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"https?://[A-Za-z0-9.-]*(?:cloudfront\.net|cloudinary\.com|imgix\.net|akamaihd\.net|twimg\.com|wp\.com|googleusercontent\.com|squarespace-cdn\.com|wixstatic\.com|cdn\.shopify\.com|ctfassets\.net)/[^\s"'<>()\\]+"#,
    )
    .unwrap()
});

/// Surrounding HTML hints used to describe a media asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaContext {
    pub alt: Option<String>,
    pub title: Option<String>,
    pub figcaption: Option<String>,
    /// Nearest preceding heading or paragraph text.
    pub nearby_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: String,
    pub media_type: MediaType,
    pub context: MediaContext,
}

/// `host[:port]` of a URL, the unit of domain scoping.
pub fn netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

pub fn is_in_scope(url: &Url, scope: &str) -> bool {
    netloc(url) == scope
}

/// Collapse runs of whitespace into single spaces. Non-whitespace characters
/// are never touched.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn page_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default()
}

/// Absolute, same-scope links in document order. Duplicates are kept.
pub fn extract_links(document: &Html, page_url: &Url, scope: &str) -> Vec<String> {
    let mut links = Vec::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = page_url.join(href.trim()) else {
            continue;
        };
        let absolute = resolved.to_string();

        if absolute.contains('#') {
            continue;
        }
        if matches!(resolved.scheme(), "mailto" | "tel" | "javascript")
            || !matches!(resolved.scheme(), "http" | "https")
        {
            continue;
        }
        if is_in_scope(&resolved, scope) {
            links.push(absolute);
        }
    }

    links
}

fn is_skipped(element: &ElementRef) -> bool {
    SKIPPED_TAGS.contains(&element.value().name())
}

/// Whether one class or id token names page chrome such as a menu.
///
/// Tokens are split into words on `-` and `_`; a marker has to be a whole word.
fn is_boilerplate_token(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    let words: Vec<&str> = token
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .collect();

    if words.first().is_some_and(|first| MODIFIER_WORDS.contains(first)) {
        return false;
    }
    if words.iter().any(|word| CONTENT_WORDS.contains(word)) {
        return false;
    }
    words.iter().any(|word| BOILERPLATE_MARKERS.contains(word))
}

fn is_boilerplate(element: &ElementRef) -> bool {
    if CONTENT_ROOT_TAGS.contains(&element.value().name()) {
        return false;
    }
    ["class", "id"].iter().any(|attr| {
        element
            .value()
            .attr(attr)
            .is_some_and(|value| value.split_whitespace().any(is_boilerplate_token))
    })
}

fn is_hidden(element: &ElementRef) -> bool {
    if element.value().attr("hidden").is_some() {
        return true;
    }
    element.value().attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}

/// Text of an element with skipped descendants (scripts, styles...) left out.
fn visible_text(element: ElementRef) -> String {
    let mut buffer = String::new();
    push_visible_text(element, &mut buffer);
    collapse_whitespace(&buffer)
}

fn push_visible_text(element: ElementRef, buffer: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => buffer.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child)
                    && !is_skipped(&child_element)
                {
                    let breaks = BREAKING_TAGS.contains(&child_element.value().name());
                    if breaks {
                        buffer.push(' ');
                    }
                    push_visible_text(child_element, buffer);
                    if breaks {
                        buffer.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

fn own_text(element: ElementRef) -> String {
    let joined: String = element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(format!("{} ", &**text)),
            _ => None,
        })
        .collect();
    collapse_whitespace(&joined)
}

fn collect_blocks(element: ElementRef, blocks: &mut Vec<String>) {
    if is_skipped(&element) || is_boilerplate(&element) {
        return;
    }

    let name = element.value().name();
    if TEXT_BLOCK_TAGS.contains(&name) {
        let text = visible_text(element);
        if !text.is_empty() {
            blocks.push(text);
        }
        return;
    }

    if CONTAINER_TAGS.contains(&name) {
        let text = own_text(element);
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    for child in element.children().filter_map(ElementRef::wrap) {
        collect_blocks(child, blocks);
    }
}

fn push_rendered_text(element: ElementRef, buffer: &mut String) {
    if is_skipped(&element) || is_hidden(&element) || is_boilerplate(&element) {
        return;
    }

    let breaks = BREAKING_TAGS.contains(&element.value().name());
    if breaks {
        buffer.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                for ch in text.chars() {
                    buffer.push(if ch == '\n' || ch == '\r' { ' ' } else { ch });
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    push_rendered_text(child_element, buffer);
                }
            }
            _ => {}
        }
    }

    if breaks {
        buffer.push('\n');
    }
}

fn content_root(document: &Html) -> ElementRef<'_> {
    document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element())
}

/// Readable text of a page.
///
/// Collects content blocks (paragraphs, headings, list items, cells...) while
/// ignoring scripts, styles and navigation chrome. When that yields fewer than
/// [`MIN_PRIMARY_TEXT_CHARS`] characters, all visible body text is used instead,
/// one line per block element. Menus and other chrome stay out of both.
pub fn extract_text(document: &Html) -> String {
    let root = content_root(document);

    let mut blocks = Vec::new();
    collect_blocks(root, &mut blocks);
    let primary = blocks.join("\n");
    if primary.chars().count() >= MIN_PRIMARY_TEXT_CHARS {
        return primary;
    }

    let mut rendered = String::new();
    push_rendered_text(root, &mut rendered);
    rendered
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether a URL looks like a media asset worth describing.
pub fn is_media_url(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    if path.contains("icon") || path.contains("favicon") {
        return false;
    }
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .is_some_and(|(_, ext)| MEDIA_EXTENSIONS.contains(&ext))
}

fn is_data_uri(raw: &str) -> bool {
    raw.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

fn resolve_media_url(page_url: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || is_data_uri(raw) {
        return None;
    }
    let resolved = page_url.join(raw).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") || !is_media_url(&resolved) {
        return None;
    }
    Some(resolved.to_string())
}

/// URLs of a `srcset` list, size descriptors dropped.
pub fn parse_srcset(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
        .collect()
}

fn non_empty_attr(element: &ElementRef, attr: &str) -> Option<String> {
    element
        .value()
        .attr(attr)
        .map(collapse_whitespace)
        .filter(|value| !value.is_empty())
}

fn nearest_figcaption(element: &ElementRef) -> Option<String> {
    let figure = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "figure")?;
    figure
        .select(&FIGCAPTION_SELECTOR)
        .next()
        .map(visible_text)
        .filter(|text| !text.is_empty())
}

fn last_text_block(element: ElementRef) -> Option<String> {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| NEARBY_TEXT_TAGS.contains(&e.value().name()))
        .map(visible_text)
        .filter(|text| !text.is_empty())
        .last()
}

/// Text of the closest heading or paragraph that precedes `element`.
pub fn nearby_text(element: &ElementRef) -> Option<String> {
    let mut current = Some(**element);
    while let Some(node) = current {
        for sibling in node.prev_siblings() {
            if let Some(found) = ElementRef::wrap(sibling).and_then(last_text_block) {
                return Some(found);
            }
        }
        current = node.parent();
    }
    None
}

fn context_for(element: &ElementRef) -> MediaContext {
    MediaContext {
        alt: non_empty_attr(element, "alt"),
        title: non_empty_attr(element, "title"),
        figcaption: nearest_figcaption(element),
        nearby_text: nearby_text(element),
    }
}

fn embed_type(tag: &str) -> MediaType {
    match tag {
        "video" => MediaType::Video,
        "audio" => MediaType::Audio,
        "iframe" => MediaType::Iframe,
        _ => MediaType::Source,
    }
}

/// Media candidates found on a page, in discovery order.
///
/// Surfaces are scanned in a fixed order: `<img>` sources, responsive
/// `srcset` lists, `<video>`/`<audio>`/`<source>`/`<iframe>` elements, inline
/// `background` styles, then CDN URLs found anywhere in the raw markup. The
/// same URL may be reported more than once; run-wide dedup is the crawler's job.
pub fn extract_media(document: &Html, raw_html: &str, page_url: &Url) -> Vec<MediaCandidate> {
    let mut candidates = Vec::new();

    for img in document.select(&IMG_SELECTOR) {
        let source = IMAGE_SOURCE_ATTRS.iter().find_map(|attr| {
            non_empty_attr(&img, attr).filter(|value| !is_data_uri(value))
        });
        if let Some(url) = source.and_then(|raw| resolve_media_url(page_url, &raw)) {
            candidates.push(MediaCandidate {
                url,
                media_type: MediaType::Image,
                context: context_for(&img),
            });
        }
    }

    for element in document.select(&SRCSET_SELECTOR) {
        let media_type = if element.value().name() == "img" {
            MediaType::Image
        } else {
            MediaType::Source
        };
        for attr in SRCSET_ATTRS {
            let Some(srcset) = element.value().attr(attr) else {
                continue;
            };
            for raw in parse_srcset(srcset) {
                if let Some(url) = resolve_media_url(page_url, raw) {
                    candidates.push(MediaCandidate {
                        url,
                        media_type,
                        context: context_for(&element),
                    });
                }
            }
        }
    }

    for element in document.select(&EMBED_SELECTOR) {
        let tag = element.value().name();
        if let Some(url) = non_empty_attr(&element, "src")
            .and_then(|raw| resolve_media_url(page_url, &raw))
        {
            candidates.push(MediaCandidate {
                url,
                media_type: embed_type(tag),
                context: context_for(&element),
            });
        }
        if tag == "video"
            && let Some(url) = non_empty_attr(&element, "poster")
                .and_then(|raw| resolve_media_url(page_url, &raw))
        {
            candidates.push(MediaCandidate {
                url,
                media_type: MediaType::Image,
                context: context_for(&element),
            });
        }
    }

    for element in document.select(&STYLED_SELECTOR) {
        let Some(style) = element.value().attr("style") else {
            continue;
        };
        for capture in BACKGROUND_URL.captures_iter(style) {
            if let Some(url) = capture
                .get(1)
                .and_then(|m| resolve_media_url(page_url, m.as_str()))
            {
                candidates.push(MediaCandidate {
                    url,
                    media_type: MediaType::Image,
                    context: MediaContext {
                        title: non_empty_attr(&element, "title"),
                        nearby_text: nearby_text(&element),
                        ..MediaContext::default()
                    },
                });
            }
        }
    }

    for found in CDN_URL.find_iter(raw_html) {
        let raw = found.as_str().replace("&amp;", "&");
        if let Some(url) = resolve_media_url(page_url, &raw) {
            candidates.push(MediaCandidate {
                url,
                media_type: MediaType::Image,
                context: MediaContext::default(),
            });
        }
    }

    candidates
}
