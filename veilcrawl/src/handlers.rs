use clap::ArgMatches;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, warn};
use url::Url;
use veilcrawl_core::crawl::{CrawlOptions, execute_crawl};
use veilcrawl_core::report::{ExportFormat, RunSummary, render_export, save_report, write_history};
use veilcrawl_scanner::{ScanError, SiteContent, TransportConfig, TransportError};

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(url.to_string());
    }

    let with_scheme = format!("http://{}", line);
    match Url::parse(&with_scheme) {
        Ok(url) if url.has_host() => Some(url.to_string()),
        _ => None,
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(
        shellexpand::full(raw)
            .map(|expanded| expanded.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

/// Everything `handle_crawl` needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct CrawlInvocation {
    pub options: CrawlOptions,
    pub output: PathBuf,
    pub format: ExportFormat,
    pub history_file: PathBuf,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn build_crawl_invocation(matches: &ArgMatches) -> Result<CrawlInvocation, String> {
    let raw_url = matches
        .get_one::<String>("url")
        .ok_or_else(|| "a URL to crawl is required".to_string())?;
    let url = parse_url_line(raw_url).ok_or_else(|| format!("Invalid URL '{}'", raw_url))?;

    let format_name = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("json");
    let format = ExportFormat::from_str(format_name)
        .ok_or_else(|| format!("Unsupported output format '{}'", format_name))?;

    let quiet = matches.get_flag("quiet");
    let tor_path = matches
        .get_one::<String>("tor-path")
        .map(|path| expand_path(path))
        .unwrap_or_else(|| PathBuf::from("tor"));

    let options = CrawlOptions {
        max_depth: *matches.get_one::<usize>("depth").unwrap_or(&2),
        use_existing_tor: matches.get_flag("use-existing-tor"),
        transport: TransportConfig {
            executable: tor_path,
            ..TransportConfig::default()
        },
        politeness_delay: Duration::from_millis(
            *matches.get_one::<u64>("delay-ms").unwrap_or(&1000),
        ),
        caption_endpoint: matches.get_one::<String>("caption-endpoint").cloned(),
        simplify: matches.get_flag("simplify"),
        simplify_endpoint: matches.get_one::<String>("simplify-endpoint").cloned(),
        show_progress_bars: !quiet,
        ..CrawlOptions::new(url)
    };

    Ok(CrawlInvocation {
        options,
        output: expand_path(
            matches
                .get_one::<String>("output")
                .map(String::as_str)
                .unwrap_or("output.json"),
        ),
        format,
        history_file: expand_path(
            matches
                .get_one::<String>("history-file")
                .map(String::as_str)
                .unwrap_or(".scrape_history"),
        ),
        quiet,
        verbose: matches.get_flag("verbose"),
    })
}

pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Actionable message for an error that ended the run.
pub fn fatal_message(error: &ScanError) -> String {
    match error {
        ScanError::Transport(TransportError::ExecutableNotFound(path)) => format!(
            "Tor executable not found ({}).\n\
             Please install Tor:\n  \
             Ubuntu/Debian: sudo apt install tor\n  \
             macOS: brew install tor\n\
             or point --tor-path at an existing tor binary.",
            path
        ),
        ScanError::Transport(TransportError::Verification(reason)) => format!(
            "Could not confirm traffic is routed through Tor: {}\n\
             Nothing was crawled. Check that Tor is running and reachable on its SOCKS port.",
            reason
        ),
        other => other.to_string(),
    }
}

pub fn write_results(
    content: &SiteContent,
    format: ExportFormat,
    root_url: &str,
    path: &Path,
) -> Result<(), String> {
    let rendered = render_export(content, format, root_url)
        .map_err(|e| format!("Failed to serialise results: {}", e))?;
    save_report(&rendered, path)
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "Summary:".bright_white().bold());
    println!("  HTML pages:   {}", summary.html_pages.to_string().bright_white());
    println!("  Text pages:   {}", summary.text_pages.to_string().bright_white());
    println!("  Media assets: {}", summary.media_assets.to_string().bright_white());
}

pub async fn handle_crawl(matches: &ArgMatches) {
    let invocation = match build_crawl_invocation(matches) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    init_tracing(invocation.verbose);

    let root_url = invocation.options.url.clone();
    if !invocation.quiet {
        println!("\n{} {}", "Crawling".bright_cyan().bold(), root_url.bright_white());
        println!("Max depth: {}", invocation.options.max_depth);
        println!(
            "Tor: {}\n",
            if invocation.options.use_existing_tor {
                "use existing instance"
            } else {
                "launch if not running"
            }
        );
    }

    let outcome = match execute_crawl(invocation.options.clone(), None).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = write_history(&invocation.history_file, &outcome.visited) {
        warn!(
            "Failed to write history file {}: {}",
            invocation.history_file.display(),
            e
        );
    }

    let content = match outcome.result {
        Ok(content) => content,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), fatal_message(&e));
            std::process::exit(1);
        }
    };

    if let Err(e) = write_results(&content, invocation.format, &root_url, &invocation.output) {
        eprintln!("{} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }

    println!("\n{} Crawl complete!\n", "✓".green().bold());
    print_summary(&RunSummary::from(&content));
    println!(
        "\n{} Results saved to {}",
        "✓".green().bold(),
        invocation.output.display().to_string().bright_white()
    );
}
