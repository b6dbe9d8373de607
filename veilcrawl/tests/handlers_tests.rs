use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use veilcrawl::command_argument_builder;
use veilcrawl::handlers::*;
use veilcrawl_core::report::ExportFormat;
use veilcrawl_scanner::{HtmlPage, ScanError, SiteContent, TransportError};

fn invocation(args: &[&str]) -> CrawlInvocation {
    let mut argv = vec!["veilcrawl"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    build_crawl_invocation(&matches).unwrap()
}

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com");
    assert_eq!(result, Some("https://example.com/".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    assert_eq!(
        parse_url_line("example.onion/about"),
        Some("http://example.onion/about".to_string())
    );
    assert_eq!(
        parse_url_line("localhost:8080"),
        Some("http://localhost:8080/".to_string())
    );
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
    assert_eq!(parse_url_line("   "), None);
}

#[test]
fn test_defaults() {
    let invocation = invocation(&["http://example.com"]);

    assert_eq!(invocation.options.url, "http://example.com/");
    assert_eq!(invocation.options.max_depth, 2);
    assert!(!invocation.options.use_existing_tor);
    assert!(!invocation.options.simplify);
    assert_eq!(invocation.options.politeness_delay, Duration::from_secs(1));
    assert_eq!(invocation.options.transport.executable, PathBuf::from("tor"));
    assert_eq!(invocation.output, PathBuf::from("output.json"));
    assert_eq!(invocation.history_file, PathBuf::from(".scrape_history"));
    assert_eq!(invocation.format, ExportFormat::Json);
    assert!(invocation.options.show_progress_bars);
    assert!(!invocation.verbose);
}

#[test]
fn test_flags_map_onto_options() {
    let invocation = invocation(&[
        "example.onion",
        "-d",
        "4",
        "-t",
        "-o",
        "site.txt",
        "--format",
        "text",
        "--history-file",
        "visited.log",
        "--simplify",
        "--simplify-endpoint",
        "http://127.0.0.1:9000/compress",
        "--caption-endpoint",
        "http://127.0.0.1:9001/caption",
        "--delay-ms",
        "250",
        "-q",
        "-v",
    ]);

    assert_eq!(invocation.options.url, "http://example.onion/");
    assert_eq!(invocation.options.max_depth, 4);
    assert!(invocation.options.use_existing_tor);
    assert!(invocation.options.simplify);
    assert_eq!(
        invocation.options.simplify_endpoint.as_deref(),
        Some("http://127.0.0.1:9000/compress")
    );
    assert_eq!(
        invocation.options.caption_endpoint.as_deref(),
        Some("http://127.0.0.1:9001/caption")
    );
    assert_eq!(invocation.options.politeness_delay, Duration::from_millis(250));
    assert_eq!(invocation.format, ExportFormat::Text);
    assert_eq!(invocation.output, PathBuf::from("site.txt"));
    assert_eq!(invocation.history_file, PathBuf::from("visited.log"));
    assert!(invocation.quiet);
    assert!(!invocation.options.show_progress_bars);
    assert!(invocation.verbose);
}

#[test]
fn test_unknown_format_rejected_by_parser() {
    let result =
        command_argument_builder().try_get_matches_from(["veilcrawl", "http://a.b", "--format", "csv"]);
    assert!(result.is_err());
}

#[test]
fn test_url_is_required() {
    assert!(command_argument_builder().try_get_matches_from(["veilcrawl"]).is_err());
}

#[test]
fn test_invalid_url_is_reported() {
    let matches = command_argument_builder()
        .try_get_matches_from(["veilcrawl", "not a valid url!!!"])
        .unwrap();
    let err = build_crawl_invocation(&matches).unwrap_err();
    assert!(err.contains("Invalid URL"));
}

#[test]
fn test_expand_path_tilde() {
    let expanded = expand_path("~/snapshots/out.json");
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.ends_with("snapshots/out.json"));
    assert_eq!(expand_path("relative.json"), PathBuf::from("relative.json"));
}

#[test]
fn test_fatal_message_for_missing_tor() {
    let error = ScanError::Transport(TransportError::ExecutableNotFound("tor".to_string()));
    let message = fatal_message(&error);
    assert!(message.contains("Tor executable not found"));
    assert!(message.contains("sudo apt install tor"));
    assert!(message.contains("brew install tor"));
}

#[test]
fn test_fatal_message_for_unverified_route() {
    let error = ScanError::Transport(TransportError::Verification("marker missing".to_string()));
    let message = fatal_message(&error);
    assert!(message.contains("marker missing"));
    assert!(message.contains("Nothing was crawled"));
}

#[test]
fn test_write_results_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("output.json");

    let mut content = SiteContent::new();
    content.push_html_page(HtmlPage {
        url: "http://example.onion/".to_string(),
        title: "Home".to_string(),
        raw_html: "<p>hi</p>".to_string(),
        parent_url: String::new(),
        depth: 0,
        links: Vec::new(),
    });

    write_results(&content, ExportFormat::Json, "http://example.onion/", &path)?;

    let written = fs::read_to_string(&path)?;
    assert!(written.contains("\"html_pages\""));
    assert!(written.contains("\"media_content\""));
    assert!(written.contains("http://example.onion/"));
    Ok(())
}

#[test]
fn test_write_results_text() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("report.txt");

    write_results(&SiteContent::new(), ExportFormat::Text, "http://example.onion/", &path)?;

    let written = fs::read_to_string(&path)?;
    assert!(written.contains("VEILCRAWL SITE REPORT"));
    assert!(written.contains("HTML pages:   0"));
    Ok(())
}

#[test]
fn test_write_results_unwritable_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("out.json");
    let err = write_results(&SiteContent::new(), ExportFormat::Json, "http://x/", &path).unwrap_err();
    assert!(err.contains("Failed to write"));
}
