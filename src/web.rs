//! Web page fetching and HTML content selection.
//!
//! The fetch layer uses a browser-like user agent, bounded redirects,
//! and a content-type gate: only HTML/XHTML, plain text, and PDF
//! responses are consumed. HTML body selection runs a cascade of
//! heuristics — semantic tags, then named content containers, then the
//! `<div>` with the most text, then the whole `<body>` — and never
//! includes script, style, or navigation chrome in the extracted text.

use std::time::Duration;

use scraper::{ElementRef, Html, Node, Selector};

use docq_core::models::SourceDocument;

use crate::config::FetchConfig;
use crate::extract::{build_document, extract_pdf, ExtractError};

/// Containers tried, in order, before falling back to the largest div.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "#content",
    "#main-content",
    ".content",
    ".post-content",
    "#main",
];

/// Tags whose subtrees never contribute to extracted text.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "iframe",
    "svg", "form", "button",
];

/// Tags that end a line in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "br", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "section", "article",
    "blockquote", "pre",
];

/// A container candidate must carry at least this many characters to
/// win the cascade; anything smaller is assumed to be chrome.
const MIN_CONTAINER_CHARS: usize = 80;

/// Fetch a URL and extract a [`SourceDocument`] from the response.
///
/// Follows up to `max_redirects` redirects and rejects responses whose
/// content type is neither HTML, plain text, nor PDF.
pub async fn fetch_url(config: &FetchConfig, url: &str) -> Result<SourceDocument, ExtractError> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ExtractError::Unreachable(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractError::Unreachable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Unreachable(format!(
            "{} returned HTTP {}",
            url, status
        )));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::Unreachable(e.to_string()))?;

    if content_type.contains("text/html") || content_type.contains("application/xhtml") {
        let html = String::from_utf8_lossy(&bytes);
        let (title, text) = extract_html(&html);
        let title = title.or_else(|| title_from_url(url));
        build_document(title, &text, config.min_content_len)
    } else if content_type.contains("application/pdf") {
        let text = extract_pdf(&bytes)?;
        build_document(title_from_url(url), &text, config.min_content_len)
    } else if content_type.starts_with("text/") {
        let text = String::from_utf8_lossy(&bytes);
        build_document(title_from_url(url), &text, config.min_content_len)
    } else {
        Err(ExtractError::ContentType(content_type))
    }
}

/// Select the page title and main body text from an HTML document.
///
/// The cascade: first matching content selector with enough text, then
/// the `<div>` carrying the most text, then the whole `<body>`.
pub fn extract_html(html: &str) -> (Option<String>, String) {
    let doc = Html::parse_document(html);

    let title = page_title(&doc);

    for sel in CONTENT_SELECTORS {
        let selector = Selector::parse(sel).unwrap();
        if let Some(element) = doc.select(&selector).next() {
            let text = element_text(element);
            if text.chars().count() >= MIN_CONTAINER_CHARS {
                return (title, text);
            }
        }
    }

    if let Some(text) = largest_div_text(&doc) {
        if text.chars().count() >= MIN_CONTAINER_CHARS {
            return (title, text);
        }
    }

    let body_selector = Selector::parse("body").unwrap();
    let text = doc
        .select(&body_selector)
        .next()
        .map(element_text)
        .unwrap_or_default();

    (title, text)
}

fn page_title(doc: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").unwrap();
    let from_tag = doc
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());
    if from_tag.is_some() {
        return from_tag;
    }

    let og_selector = Selector::parse("meta[property=\"og:title\"]").unwrap();
    doc.select(&og_selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Collect the visible text under an element, skipping excluded
/// subtrees and inserting newlines after block-level elements.
fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(element, &mut out);
    out
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                let name = e.name();
                if EXCLUDED_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    push_text(child_ref, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Score every `<div>` by visible text length and return the winner.
fn largest_div_text(doc: &Html) -> Option<String> {
    let div_selector = Selector::parse("div").unwrap();
    doc.select(&div_selector)
        .map(element_text)
        .max_by_key(|text| text.chars().count())
}

/// Derive a title from the last meaningful URL path segment.
/// Domain-only URLs have no such segment.
fn title_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let after_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    if !after_scheme.contains('/') {
        return None;
    }
    after_scheme
        .rsplit('/')
        .next()
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.to_string())
}
