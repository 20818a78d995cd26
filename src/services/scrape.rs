//! Readable-text extraction for web search hits.
//!
//! Pages are fetched with reqwest and parsed with scraper on the blocking
//! pool, so a slow or enormous page never stalls the session task.

use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAX_CONTENT_CHARS: usize = 3000;
const TRUNCATION_NOTICE: &str = "...\n[Content truncated due to length]";
const NO_TITLE: &str = "No Title Found";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const SKIPPED_TAGS: [&str; 8] = [
    "script", "style", "header", "footer", "nav", "aside", "form", "noscript",
];

const CONTENT_SELECTORS: [&str; 9] = [
    "article",
    "main",
    "div[role=\"main\"]",
    "div.content",
    "div.main-content",
    "div.post-content",
    "div#bodyContent",
    "div.entry-content",
    "div[itemprop=\"articleBody\"]",
];

const FALLBACK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li";

/// Outcome of scraping one search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapedPage {
    Success {
        url: String,
        title: String,
        content: String,
    },
    Failed {
        url: String,
        error: String,
    },
}

impl ScrapedPage {
    #[cfg(test)]
    pub fn url(&self) -> &str {
        match self {
            ScrapedPage::Success { url, .. } | ScrapedPage::Failed { url, .. } => url,
        }
    }
}

/// Fetches `url` and extracts its main text within `timeout`.
///
/// Never errors: every failure is folded into [`ScrapedPage::Failed`].
pub async fn scrape_page(client: &Client, url: &str, timeout: Duration) -> ScrapedPage {
    let failed = |error: String| ScrapedPage::Failed {
        url: url.to_string(),
        error,
    };

    let html = match fetch_html(client, url, timeout).await {
        Ok(html) => html,
        Err(error) => {
            tracing::debug!(url, %error, "page fetch failed");
            return failed(error);
        }
    };

    let parsed = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || extract_page_content(&html)),
    )
    .await;

    match parsed {
        Ok(Ok(Some((title, content)))) => ScrapedPage::Success {
            url: url.to_string(),
            title,
            content,
        },
        Ok(Ok(None)) => failed("No readable content found".to_string()),
        Ok(Err(join_error)) => failed(format!("Parser task failed: {}", join_error)),
        Err(_) => failed(format!("Parsing timed out after {}s", timeout.as_secs())),
    }
}

async fn fetch_html(client: &Client, url: &str, timeout: Duration) -> Result<String, String> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                format!("Request timed out after {}s", timeout.as_secs())
            } else {
                format!("Request failed: {}", e)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| format!("Failed to read body: {}", e))
}

/// Pulls `(title, content)` out of an HTML document.
///
/// Returns `None` when neither a content container nor any fallback block
/// yields text.
pub fn extract_page_content(html: &str) -> Option<(String, String)> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = extract_main_text(&document).or_else(|| extract_fallback_text(&document))?;

    let cleaned = collapse_blank_lines(&text);
    if cleaned.is_empty() {
        return None;
    }

    Some((title, truncate_content(&cleaned, MAX_CONTENT_CHARS)))
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return NO_TITLE.to_string();
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

fn extract_main_text(document: &Html) -> Option<String> {
    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = visible_text(element);
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_fallback_text(document: &Html) -> Option<String> {
    let selector = Selector::parse(FALLBACK_SELECTOR).ok()?;
    let blocks: Vec<String> = document
        .select(&selector)
        .filter(|element| !inside_skipped(element))
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| text.chars().count() > 10)
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

/// Text nodes under `root`, one per line, ignoring boilerplate subtrees
fn visible_text(root: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_TAGS.contains(&element.name()))
        });
        if skipped {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    lines.join("\n")
}

fn inside_skipped(element: &ElementRef<'_>) -> bool {
    SKIPPED_TAGS.contains(&element.value().name())
        || element.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        })
}

fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_content(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}
