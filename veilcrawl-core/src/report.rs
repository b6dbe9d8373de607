// Export of crawl results and the visited-URL history file

use crate::crawl::extract_url_path;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use veilcrawl_scanner::{HtmlPage, MediaAsset, SiteContent, TextPage};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "text" | "txt" => Some(ExportFormat::Text),
            _ => None,
        }
    }
}

/// The exported document: one array per collection, in crawl order.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub html_pages: &'a [HtmlPage],
    pub text_pages: &'a [TextPage],
    pub media_content: &'a [MediaAsset],
}

impl<'a> From<&'a SiteContent> for ExportDocument<'a> {
    fn from(content: &'a SiteContent) -> Self {
        Self {
            html_pages: content.html_pages(),
            text_pages: content.text_pages(),
            media_content: content.media_assets(),
        }
    }
}

pub fn generate_json_export(content: &SiteContent) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportDocument::from(content))
}

/// Collection sizes printed at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub html_pages: usize,
    pub text_pages: usize,
    pub media_assets: usize,
}

impl From<&SiteContent> for RunSummary {
    fn from(content: &SiteContent) -> Self {
        Self {
            html_pages: content.html_pages().len(),
            text_pages: content.text_pages().len(),
            media_assets: content.media_assets().len(),
        }
    }
}

pub fn generate_text_report(
    content: &SiteContent,
    root_url: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let summary = RunSummary::from(content);
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                           VEILCRAWL SITE REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Target:       {}\n", root_url));
    report.push_str(&format!(
        "Generated:    {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("HTML pages:   {}\n", summary.html_pages));
    report.push_str(&format!("Text pages:   {}\n", summary.text_pages));
    report.push_str(&format!("Media assets: {}\n\n", summary.media_assets));

    if !content.html_pages().is_empty() {
        report.push_str(RULE);
        report.push_str("PAGES\n");
        report.push_str(RULE);
        report.push('\n');

        for page in content.html_pages() {
            let indent = "  ".repeat(page.depth);
            let title = if page.title.is_empty() {
                "(untitled)"
            } else {
                page.title.as_str()
            };
            report.push_str(&format!(
                "{}{} {}  [{} links]\n",
                indent,
                extract_url_path(&page.url),
                title,
                page.links.len()
            ));
        }
        report.push('\n');
    }

    if !content.media_assets().is_empty() {
        report.push_str(RULE);
        report.push_str("MEDIA\n");
        report.push_str(RULE);
        report.push('\n');

        for asset in content.media_assets() {
            report.push_str(&format!("[{}] {}\n", asset.media_type, asset.url));
            report.push_str(&wrap_text(&asset.description, 80, "    "));
            report.push_str(&format!("    on {}\n\n", extract_url_path(&asset.parent_url)));
        }
    }

    report
}

pub fn render_export(
    content: &SiteContent,
    format: ExportFormat,
    root_url: &str,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => generate_json_export(content),
        ExportFormat::Text => Ok(generate_text_report(content, root_url, Utc::now())),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Write visited page URLs, one per line, replacing any previous history.
pub fn write_history(path: &Path, urls: &[String]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    for url in urls {
        writeln!(file, "{}", url)?;
    }
    Ok(())
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();
    let limit = width.saturating_sub(indent.len()).max(1);

    for word in text.split_whitespace() {
        if !current_line.is_empty()
            && current_line.chars().count() + word.chars().count() + 1 > limit
        {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
