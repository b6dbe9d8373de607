use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use url::Url;
use veilcrawl_scanner::{
    AnonymizingTransport, CrawlEngine, HttpCaptioner, HttpSimplifier, MediaCaptioner, NoCaptioner,
    NoSimplifier, ScanError, SiteContent, TextSimplifier, TorTransport, TransportConfig,
};

/// Local prompt-compression service used by `--simplify` when no endpoint is given.
pub const DEFAULT_SIMPLIFY_ENDPOINT: &str = "http://127.0.0.1:8000/compress";

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub url: String,
    pub max_depth: usize,
    pub use_existing_tor: bool,
    pub transport: TransportConfig,
    pub politeness_delay: Duration,
    pub caption_endpoint: Option<String>,
    pub simplify: bool,
    pub simplify_endpoint: Option<String>,
    pub show_progress_bars: bool,
}

impl CrawlOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_depth: 2,
            use_existing_tor: false,
            transport: TransportConfig::default(),
            politeness_delay: Duration::from_secs(1),
            caption_endpoint: None,
            simplify: false,
            simplify_endpoint: None,
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// What a crawl produced. `visited` is filled even when the run failed.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub result: Result<SiteContent, ScanError>,
    pub visited: Vec<String>,
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

pub fn select_captioner(endpoint: Option<&str>) -> anyhow::Result<Arc<dyn MediaCaptioner>> {
    match endpoint {
        Some(endpoint) => {
            let captioner = HttpCaptioner::new(endpoint)
                .with_context(|| format!("failed to set up captioner at {}", endpoint))?;
            info!("Image captioning via {}", endpoint);
            Ok(Arc::new(captioner))
        }
        None => Ok(Arc::new(NoCaptioner)),
    }
}

pub fn select_simplifier(
    simplify: bool,
    endpoint: Option<&str>,
) -> anyhow::Result<Arc<dyn TextSimplifier>> {
    if !simplify {
        return Ok(Arc::new(NoSimplifier));
    }
    let endpoint = endpoint.unwrap_or(DEFAULT_SIMPLIFY_ENDPOINT);
    let simplifier = HttpSimplifier::new(endpoint)
        .with_context(|| format!("failed to set up simplifier at {}", endpoint))?;
    info!("Text simplification via {}", endpoint);
    Ok(Arc::new(simplifier))
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Connecting to Tor...");
    pb
}

/// Execute a crawl through Tor with the given options
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> anyhow::Result<CrawlOutcome> {
    let transport =
        TorTransport::new(options.transport.clone()).context("failed to configure Tor transport")?;
    run_crawl(options, transport, progress_callback).await
}

/// Execute a crawl over any transport.
pub async fn run_crawl<T: AnonymizingTransport>(
    options: CrawlOptions,
    transport: T,
    progress_callback: Option<CrawlProgressCallback>,
) -> anyhow::Result<CrawlOutcome> {
    let captioner = select_captioner(options.caption_endpoint.as_deref())?;
    let simplifier = select_simplifier(options.simplify, options.simplify_endpoint.as_deref())?;

    let progress_bar = options.show_progress_bars.then(|| Arc::new(spinner()));
    let processed_count = Arc::new(AtomicUsize::new(0));

    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let user_callback = progress_callback.clone();
    let engine_callback: veilcrawl_scanner::ProgressCallback =
        Arc::new(move |depth: usize, url: String| {
            let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = pb_clone {
                pb.set_message(format!("[{}] depth {}: {}", count, depth, extract_url_path(&url)));
            }
            if let Some(ref callback) = user_callback {
                callback(format!("Crawling {} (depth {})", url, depth));
            }
        });

    let mut engine = CrawlEngine::new(options.url.clone(), transport)
        .with_max_depth(options.max_depth)
        .with_politeness(options.politeness_delay)
        .with_use_existing(options.use_existing_tor)
        .with_captioner(captioner)
        .with_simplifier(simplifier)
        .with_progress_callback(engine_callback);

    let result = engine.start().await;

    if let Some(ref pb) = progress_bar {
        let total = processed_count.load(Ordering::Relaxed);
        match &result {
            Ok(_) => pb.finish_with_message(format!("Crawl complete! {} pages visited", total)),
            Err(_) => pb.finish_and_clear(),
        }
    }

    Ok(CrawlOutcome {
        result,
        visited: engine.visited_urls().to_vec(),
    })
}
