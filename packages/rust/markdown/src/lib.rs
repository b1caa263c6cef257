//! HTML-to-Markdown normalization of fetched web pages.
//!
//! Candidate pages are handed to a language model as text, so the HTML is
//! reduced to Markdown with the `htmd` crate and then put through a series of
//! cleanup passes that drop page chrome, stray tags, images, and excess
//! whitespace while keeping headings, lists, tables, and code intact.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use webresolve_shared::{Result, WebResolveError};

/// Tags whose content never helps answer a question.
const SKIPPED_TAGS: [&str; 9] = [
    "script", "style", "nav", "footer", "iframe", "noscript", "svg", "form", "button",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A page reduced to Markdown text.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Cleaned Markdown body.
    pub markdown: String,
    /// Title from `<title>` or the first H1, if any.
    pub title: Option<String>,
    /// Approximate word count, code blocks excluded.
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert an HTML document to clean Markdown.
///
/// 1. Picks the main content container (`<main>`, `[role=main]`, else `<body>`)
/// 2. Pre-processes HTML tables into Markdown tables
/// 3. Converts HTML → Markdown via `htmd` (ATX headings)
/// 4. Runs the cleanup pipeline, resolving relative links against `source_url`
#[instrument(skip(html), fields(url = source_url.unwrap_or("-")))]
pub fn html_to_markdown(html: &str, source_url: Option<&str>) -> Result<PageText> {
    let doc = Html::parse_document(html);
    let document_title = extract_document_title(&doc);

    let content_html = extract_content_html(&doc).unwrap_or_else(|| html.to_string());
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| WebResolveError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");

    let base_url = source_url.and_then(|u| Url::parse(u).ok());
    let markdown = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    let title = document_title.or_else(|| extract_title_from_markdown(&markdown));
    let word_count = count_words(&markdown);

    debug!(word_count, final_len = markdown.len(), "normalization complete");

    Ok(PageText {
        markdown,
        title,
        word_count,
    })
}

/// Whether a response body looks like HTML rather than plain text.
pub fn looks_like_html(body: &str) -> bool {
    static HTML_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<(?:!doctype\s+html|html|head|body)[\s>]").expect("valid regex")
    });

    let head: String = body.chars().take(2048).collect();
    HTML_RE.is_match(&head)
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Convert HTML `<table>` elements to markdown table syntax before htmd conversion.
///
/// `htmd` 0.1 doesn't support table conversion, so we handle it manually.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").expect("valid selector");

    if doc.select(&table_sel).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();

    for table_el in doc.select(&table_sel) {
        let table_html = table_el.html();
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_html, &md_table, 1);
    }

    result
}

/// Convert a single HTML table element to a markdown table string.
fn html_table_to_markdown(table: &scraper::ElementRef) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");
    let th_sel = Selector::parse("th").expect("valid selector");

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&tr_sel) {
        let cells: Vec<String> = tr
            .select(&cell_sel)
            .map(|cell| collapse_cell_text(&cell.text().collect::<String>()))
            .collect();

        if cells.is_empty() {
            continue;
        }
        if rows.is_empty() && tr.select(&th_sel).next().is_some() {
            has_header = true;
        }
        rows.push(cells);
    }

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    // Without a header row, emit an empty one so the table stays valid Markdown.
    let (header, data) = if has_header {
        (rows[0].clone(), &rows[1..])
    } else {
        (vec![String::new(); col_count], &rows[..])
    };

    let mut md = String::from("\n\n");
    md.push_str(&format!("| {} |\n", header.join(" | ")));
    md.push_str(&format!("| {} |\n", vec!["---"; col_count].join(" | ")));
    for row in data {
        md.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    md.push('\n');
    md
}

/// Cell text collapsed onto one line.
fn collapse_cell_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the main content HTML, falling back to `<body>`.
fn extract_content_html(doc: &Html) -> Option<String> {
    ["main", "[role=\"main\"]", "body"]
        .iter()
        .filter_map(|sel| Selector::parse(sel).ok())
        .find_map(|selector| doc.select(&selector).next().map(|el| el.inner_html()))
}

/// Text of the `<title>` element, if non-empty.
fn extract_document_title(doc: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").expect("valid selector");
    doc.select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract title from the first H1 in the Markdown text.
fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Count words in Markdown body (excluding code blocks).
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| !w.starts_with('#') || w.len() > 2)
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
