// Tests for crawl orchestration

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use veilcrawl_core::crawl::{
    CrawlOptions, execute_crawl, extract_url_path, run_crawl, select_simplifier,
};
use veilcrawl_scanner::{
    AnonymizingTransport, ScanError, TextSimplifier, TransportConfig, TransportError,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

#[derive(Default)]
struct DirectTransport {
    client: Client,
    refuse: bool,
}

#[async_trait]
impl AnonymizingTransport for DirectTransport {
    async fn start(&mut self, _use_existing: bool) -> Result<(), TransportError> {
        self.verify().await
    }

    async fn verify(&mut self) -> Result<(), TransportError> {
        if self.refuse {
            Err(TransportError::Verification("not routed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn stop(&mut self) {}

    fn client(&self) -> &Client {
        &self.client
    }
}

fn unused_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fast_options(url: String) -> CrawlOptions {
    CrawlOptions {
        politeness_delay: Duration::ZERO,
        ..CrawlOptions::new(url)
    }
}

// ============================================================================
// URL Path Extraction Tests
// ============================================================================

#[test]
fn test_extract_url_path_root() {
    assert_eq!(extract_url_path("http://example.com/"), "/");
    assert_eq!(extract_url_path("http://example.com"), "/");
}

#[test]
fn test_extract_url_path_drops_query_and_fragment() {
    assert_eq!(extract_url_path("http://example.com/news?page=2#top"), "/news");
}

#[test]
fn test_extract_url_path_onion_host() {
    assert_eq!(
        extract_url_path("http://duckduckgogg42xjoc72x3sjasowoarfbgcmvfimaftt6twagswzczad.onion/about/"),
        "/about/"
    );
}

#[test]
fn test_extract_url_path_invalid_url() {
    let url = "not a valid url";
    assert_eq!(extract_url_path(url), url);
}

// ============================================================================
// Option and Capability Tests
// ============================================================================

#[test]
fn test_crawl_options_defaults() {
    let options = CrawlOptions::new("http://example.com");
    assert_eq!(options.max_depth, 2);
    assert!(!options.use_existing_tor);
    assert!(!options.simplify);
    assert_eq!(options.politeness_delay, Duration::from_secs(1));
    assert_eq!(options.transport.socks_port, 9050);
}

#[tokio::test]
async fn test_simplifier_disabled_reports_unavailable() {
    let simplifier = select_simplifier(false, Some("http://127.0.0.1:1/")).unwrap();
    assert!(simplifier.simplify("text").await.is_err());
}

// ============================================================================
// Crawl Execution Tests
// ============================================================================

#[tokio::test]
async fn test_run_crawl_collects_site_content() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Root</title></head><body>
                <p>Welcome to the hidden library.</p>
                <img src="/cover.jpg" alt="Cover of the first edition">
                <a href="/shelf">Shelf</a>
            </body></html>"#,
            "text/html",
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/shelf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><p>Shelf one</p></body></html>",
            "text/html",
        ))
        .mount(&site)
        .await;

    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let messages_clone = messages.clone();
    let callback = Arc::new(move |msg: String| {
        messages_clone.lock().unwrap().push(msg);
    });

    let outcome = run_crawl(
        fast_options(site.uri()),
        DirectTransport::default(),
        Some(callback),
    )
    .await
    .unwrap();

    let content = outcome.result.unwrap();
    assert_eq!(content.html_pages().len(), 2);
    assert_eq!(content.text_pages().len(), 2);
    assert_eq!(content.media_assets().len(), 1);
    assert_eq!(
        content.media_assets()[0].description,
        "Cover of the first edition"
    );
    assert_eq!(
        outcome.visited,
        vec![format!("{}/", site.uri()), format!("{}/shelf", site.uri())]
    );
    assert_eq!(messages.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_crawl_failure_keeps_outcome() {
    let outcome = run_crawl(
        fast_options("http://127.0.0.1:1/".to_string()),
        DirectTransport {
            refuse: true,
            ..DirectTransport::default()
        },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(
        outcome.result,
        Err(ScanError::Transport(TransportError::Verification(_)))
    ));
    assert!(outcome.visited.is_empty());
}

#[tokio::test]
async fn test_execute_crawl_reports_missing_tor() {
    let options = CrawlOptions {
        transport: TransportConfig {
            socks_port: unused_port(),
            control_port: unused_port(),
            executable: PathBuf::from("/nonexistent/veilcrawl-core-test/tor"),
            ..TransportConfig::default()
        },
        ..fast_options("http://example.com/".to_string())
    };

    let outcome = execute_crawl(options, None).await.unwrap();
    assert!(matches!(
        outcome.result,
        Err(ScanError::Transport(TransportError::ExecutableNotFound(_)))
    ));
    assert!(outcome.visited.is_empty());
}
