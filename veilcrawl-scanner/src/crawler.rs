use crate::capability::{MediaCaptioner, NoSimplifier, TextSimplifier};
use crate::content::{HtmlPage, MediaAsset, SiteContent, TextPage};
use crate::describe::MediaDescriber;
use crate::error::{CapabilityError, Result, ScanError};
use crate::extract::{self, MediaCandidate};
use crate::transport::AnonymizingTransport;
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Called with `(depth, url)` each time a page is about to be fetched.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub parent_url: String,
    pub depth: usize,
}

/// Pending work plus everything already seen during a run.
///
/// Entries are popped last-in first-out and links are pushed in reverse, so
/// pages are visited in the same order as a recursive depth-first walk.
#[derive(Debug, Default)]
pub struct Frontier {
    scope: String,
    max_depth: usize,
    stack: Vec<FrontierEntry>,
    visited: HashSet<String>,
    visit_order: Vec<String>,
    seen_media: HashSet<String>,
}

impl Frontier {
    pub fn new(scope: impl Into<String>, max_depth: usize) -> Self {
        Self {
            scope: scope.into(),
            max_depth,
            ..Self::default()
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn push(&mut self, url: String, parent_url: String, depth: usize) {
        self.stack.push(FrontierEntry {
            url,
            parent_url,
            depth,
        });
    }

    /// Queue the links of a page at `depth`, preserving document order.
    pub fn push_links(&mut self, links: &[String], parent_url: &str, depth: usize) {
        for link in links.iter().rev() {
            self.push(link.clone(), parent_url.to_string(), depth + 1);
        }
    }

    /// Next entry that is within the depth bound and not yet visited.
    pub fn next_entry(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.stack.pop() {
            if entry.depth > self.max_depth || self.visited.contains(&entry.url) {
                continue;
            }
            return Some(entry);
        }
        None
    }

    /// Returns `false` if the page was already visited.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if self.visited.insert(url.to_string()) {
            self.visit_order.push(url.to_string());
            true
        } else {
            false
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Returns `false` if the media URL was already described in this run.
    pub fn mark_media(&mut self, url: &str) -> bool {
        self.seen_media.insert(url.to_string())
    }

    /// Every page URL marked visited, in visiting order.
    pub fn visited_urls(&self) -> &[String] {
        &self.visit_order
    }
}

struct ParsedPage {
    title: String,
    links: Vec<String>,
    text: String,
    media: Vec<MediaCandidate>,
}

// Kept synchronous so the parsed document never lives across an await.
fn parse_page(body: &str, page_url: &Url, scope: &str) -> ParsedPage {
    let document = Html::parse_document(body);
    ParsedPage {
        title: extract::page_title(&document),
        links: extract::extract_links(&document, page_url, scope),
        text: extract::extract_text(&document),
        media: extract::extract_media(&document, body, page_url),
    }
}

fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|value| value.to_ascii_lowercase().contains("html"))
}

/// Single-site crawler that walks a site through an [`AnonymizingTransport`].
pub struct CrawlEngine<T: AnonymizingTransport> {
    root_url: String,
    transport: T,
    max_depth: usize,
    politeness_delay: Duration,
    page_timeout: Duration,
    use_existing_relay: bool,
    describer: MediaDescriber,
    simplifier: Arc<dyn TextSimplifier>,
    progress_callback: Option<ProgressCallback>,
    frontier: Frontier,
    content: SiteContent,
    state: EngineState,
}

impl<T: AnonymizingTransport> CrawlEngine<T> {
    pub fn new(root_url: impl Into<String>, transport: T) -> Self {
        Self {
            root_url: root_url.into(),
            transport,
            max_depth: 2,
            politeness_delay: Duration::from_secs(1),
            page_timeout: Duration::from_secs(30),
            use_existing_relay: false,
            describer: MediaDescriber::default(),
            simplifier: Arc::new(NoSimplifier),
            progress_callback: None,
            frontier: Frontier::default(),
            content: SiteContent::new(),
            state: EngineState::Idle,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Pause before fetching any page below the root.
    pub fn with_politeness(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Adopt an already running relay instead of launching one.
    pub fn with_use_existing(mut self, use_existing: bool) -> Self {
        self.use_existing_relay = use_existing;
        self
    }

    pub fn with_captioner(mut self, captioner: Arc<dyn MediaCaptioner>) -> Self {
        self.describer = MediaDescriber::new(captioner);
        self
    }

    pub fn with_media_timeout(mut self, timeout: Duration) -> Self {
        self.describer = self.describer.with_timeout(timeout);
        self
    }

    pub fn with_simplifier(mut self, simplifier: Arc<dyn TextSimplifier>) -> Self {
        self.simplifier = simplifier;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn visited_urls(&self) -> &[String] {
        self.frontier.visited_urls()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bring up the transport, crawl the site and return everything collected.
    ///
    /// Only transport failures (and an unusable root URL) are returned as
    /// errors; page and media failures are logged and skipped. The transport is
    /// stopped before this returns, whatever the outcome.
    pub async fn start(&mut self) -> Result<SiteContent> {
        if self.state != EngineState::Idle {
            return Err(ScanError::AlreadyStarted);
        }

        let root = match Url::parse(&self.root_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url,
            Ok(url) => {
                self.state = EngineState::Failed;
                return Err(ScanError::InvalidUrl(format!(
                    "{} is not an http(s) URL",
                    url
                )));
            }
            Err(e) => {
                self.state = EngineState::Failed;
                return Err(ScanError::InvalidUrl(format!("{}: {}", self.root_url, e)));
            }
        };

        self.state = EngineState::Running;
        if let Err(e) = self.transport.start(self.use_existing_relay).await {
            self.state = EngineState::Failed;
            self.transport.stop().await;
            return Err(e.into());
        }

        let scope = extract::netloc(&root);
        info!("Starting crawl of {} (max depth {}, scope {})", root, self.max_depth, scope);

        self.frontier = Frontier::new(scope, self.max_depth);
        self.frontier.push(root.to_string(), String::new(), 0);
        self.walk().await;

        self.transport.stop().await;
        self.state = EngineState::Completed;
        info!(
            "Crawl complete. Visited {} pages, {} html pages, {} media assets",
            self.frontier.visited_urls().len(),
            self.content.html_pages().len(),
            self.content.media_assets().len()
        );

        Ok(std::mem::take(&mut self.content))
    }

    async fn walk(&mut self) {
        while let Some(entry) = self.frontier.next_entry() {
            if entry.depth > 0 && !self.politeness_delay.is_zero() {
                tokio::time::sleep(self.politeness_delay).await;
            }

            let links = self.visit(&entry).await;
            if entry.depth < self.max_depth && !links.is_empty() {
                self.frontier.push_links(&links, &entry.url, entry.depth);
            }
        }
    }

    /// Fetch one page and record its content. Returns the page's links.
    async fn visit(&mut self, entry: &FrontierEntry) -> Vec<String> {
        if !self.frontier.mark_visited(&entry.url) {
            return Vec::new();
        }

        info!("Crawling: {} (depth {})", entry.url, entry.depth);
        if let Some(ref callback) = self.progress_callback {
            callback(entry.depth, entry.url.clone());
        }

        let body = match self.fetch_page(&entry.url).await {
            Ok(Some(body)) => body,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Error crawling {}: {}", entry.url, e);
                return Vec::new();
            }
        };

        let Ok(page_url) = Url::parse(&entry.url) else {
            return Vec::new();
        };
        let parsed = parse_page(&body, &page_url, self.frontier.scope());
        debug!(
            url = %entry.url,
            links = parsed.links.len(),
            media = parsed.media.len(),
            "parsed page"
        );

        self.content.push_html_page(HtmlPage {
            url: entry.url.clone(),
            title: parsed.title.clone(),
            raw_html: body,
            parent_url: entry.parent_url.clone(),
            depth: entry.depth,
            links: parsed.links.clone(),
        });

        if !parsed.text.is_empty() {
            let simplified_text = match self.simplifier.simplify(&parsed.text).await {
                Ok(simplified) => simplified,
                Err(CapabilityError::Unavailable) => String::new(),
                Err(e) => {
                    warn!("Text simplification failed for {}: {}", entry.url, e);
                    String::new()
                }
            };
            self.content.push_text_page(TextPage {
                url: entry.url.clone(),
                title: parsed.title,
                text: parsed.text,
                simplified_text,
                parent_url: entry.parent_url.clone(),
                depth: entry.depth,
            });
        }

        for candidate in parsed.media {
            if !self.frontier.mark_media(&candidate.url) {
                continue;
            }
            let description = self
                .describer
                .describe(self.transport.client(), &candidate)
                .await;
            debug!(url = %candidate.url, %description, "described media");
            self.content.push_media_asset(MediaAsset {
                url: candidate.url,
                media_type: candidate.media_type,
                description,
                parent_url: entry.url.clone(),
            });
        }

        parsed.links
    }

    /// Body of an in-scope HTML page, or `None` if the response is not one.
    async fn fetch_page(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .transport
            .client()
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if !extract::is_in_scope(response.url(), self.frontier.scope()) {
            warn!("Skipping {}: redirected off-site to {}", url, response.url());
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if !is_html_content_type(content_type.as_deref()) {
            debug!(url, content_type = ?content_type, "skipping non-HTML response");
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }
}
