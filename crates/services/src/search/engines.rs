//! Web search engine adapters.
//!
//! Two engines sit behind one trait: Brave (ranked, needs an API key) and
//! DuckDuckGo's HTML endpoint (keyless). The router prefers the ranked
//! engine when configured and falls back on absence or failure. The
//! `web_search` tool surface never fails: engine errors come back to the
//! model as descriptive text.
//!
//! `format_search_results` and `extract_sources` are coupled inverses:
//! the parser is line-oriented over the exact grammar the formatter emits,
//! so the two must change together.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Results returned per query
pub const MAX_RESULTS: usize = 5;

static BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
static DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    RequestFailed(String),
    #[error("failed to parse search response: {0}")]
    ParseFailed(String),
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

// ==================== Brave (ranked, keyed) ====================

pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

fn results_from_brave(response: BraveResponse) -> Vec<SearchResult> {
    response
        .web
        .map(|web| {
            web.results
                .into_iter()
                .take(MAX_RESULTS)
                .map(|r| SearchResult {
                    title: strip_tags(&r.title),
                    snippet: strip_tags(&r.description.unwrap_or_default()),
                    url: r.url,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchEngine for BraveSearch {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(BRAVE_API_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &MAX_RESULTS.to_string())])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseFailed(e.to_string()))?;
        Ok(results_from_brave(parsed))
    }
}

// ==================== DuckDuckGo (keyless) ====================

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            // The HTML endpoint rejects default library user agents
            .user_agent(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            )
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngine for DuckDuckGoSearch {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .post(DUCKDUCKGO_HTML_URL)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::ParseFailed(e.to_string()))?;
        Ok(parse_duckduckgo_html(&html, MAX_RESULTS))
    }
}

const RESULT_LINK_MARKER: &str = "class=\"result__a\"";
const SNIPPET_MARKER: &str = "class=\"result__snippet\"";

/// Scrape result anchors and snippets out of the DuckDuckGo HTML page
fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut cursor = 0usize;

    while results.len() < max_results {
        let Some(offset) = html[cursor..].find(RESULT_LINK_MARKER) else {
            break;
        };
        let marker_pos = cursor + offset;

        let url = last_href_before(&html[..marker_pos])
            .map(clean_redirect_url)
            .unwrap_or_default();
        let title = strip_tags(&element_text(
            &html[marker_pos + RESULT_LINK_MARKER.len()..],
            "</a>",
        ));
        let snippet = html[marker_pos..]
            .find(SNIPPET_MARKER)
            .map(|s| {
                let after = &html[marker_pos + s + SNIPPET_MARKER.len()..];
                strip_tags(&element_text(after, "</")).trim().to_string()
            })
            .unwrap_or_default();

        if !title.is_empty() || !url.is_empty() {
            results.push(SearchResult {
                title,
                snippet,
                url,
            });
        }
        cursor = marker_pos + RESULT_LINK_MARKER.len();
    }

    results
}

/// Text between the end of the marker's opening tag and `end_tag`
fn element_text(after_marker: &str, end_tag: &str) -> String {
    let Some(open_end) = after_marker.find('>') else {
        return String::new();
    };
    let content = &after_marker[open_end + 1..];
    let stop = content.find(end_tag).unwrap_or(content.len());
    content[..stop].to_string()
}

fn last_href_before(html: &str) -> Option<String> {
    let pos = html.rfind("href=\"")?;
    let tail = &html[pos + 6..];
    let end = tail.find('"')?;
    Some(tail[..end].to_string())
}

/// Unwrap DuckDuckGo's `/l/?uddg=` redirect to the destination URL
fn clean_redirect_url(url: String) -> String {
    if url.contains("duckduckgo.com/l/") {
        if let Some(pos) = url.find("uddg=") {
            let encoded = url[pos + 5..].split('&').next().unwrap_or("");
            return percent_decode(encoded);
        }
    }
    if url.starts_with("//") {
        return format!("https:{url}");
    }
    url
}

fn percent_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => out.push(byte as char),
                    Err(_) => {
                        out.push('%');
                        out.push_str(&hex);
                    }
                }
            }
            '+' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Drop HTML tags and decode the entities DuckDuckGo emits in titles
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

// ==================== Router ====================

/// Orders the configured engines by preference and exposes the
/// never-failing `web_search` tool surface over them.
pub struct SearchRouter {
    engines: Vec<Arc<dyn SearchEngine>>,
}

impl SearchRouter {
    pub fn new(engines: Vec<Arc<dyn SearchEngine>>) -> Self {
        Self { engines }
    }

    /// Ranked engine first when configured, keyless fallback after
    pub fn from_config(config: &config::SearchConfig) -> Self {
        let mut engines: Vec<Arc<dyn SearchEngine>> = Vec::new();
        if let Some(api_key) = &config.brave_api_key {
            engines.push(Arc::new(BraveSearch::new(api_key.clone())));
        }
        if config.duckduckgo_enabled {
            engines.push(Arc::new(DuckDuckGoSearch::new()));
        }
        Self::new(engines)
    }

    pub fn has_engine(&self) -> bool {
        !self.engines.is_empty()
    }

    /// Execute the `web_search` tool. Always returns text for the model:
    /// results formatted for citation, or a descriptive error string.
    pub async fn web_search(&self, query: &str) -> String {
        if self.engines.is_empty() {
            return "No search engine is available.".to_string();
        }

        tracing::info!(query, "performing web search");
        let mut last_error = None;

        for engine in &self.engines {
            match engine.search(query).await {
                Ok(results) if !results.is_empty() => {
                    tracing::info!(
                        engine = engine.name(),
                        count = results.len(),
                        "search completed"
                    );
                    return format_search_results(&results);
                }
                Ok(_) => {
                    tracing::debug!(engine = engine.name(), "no results, trying next engine");
                }
                Err(e) => {
                    tracing::warn!(engine = engine.name(), error = %e, "search engine failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => format!("Search error: {e}"),
            None => format!("No results found for: {query}"),
        }
    }
}

// ==================== Formatting and source extraction ====================

/// Format results into the text block handed to the model.
///
/// Grammar (consumed by `extract_sources`): a dated header line, then per
/// result `N. **Title**` / indented snippet / `Source: URL`.
pub fn format_search_results(results: &[SearchResult]) -> String {
    let today = Utc::now().format("%B %d, %Y");
    let mut formatted = vec![format!("Search performed on {today}:\n")];

    for (i, result) in results.iter().take(MAX_RESULTS).enumerate() {
        formatted.push(format!(
            "{}. **{}**\n   {}\n   Source: {}\n",
            i + 1,
            result.title,
            result.snippet,
            result.url
        ));
    }

    formatted.join("\n")
}

/// Parse a formatted result block back into source records for citation
/// display. Line-oriented: `N. **Title**` starts a record, `Source: URL`
/// closes its url, anything else accumulates into the snippet.
pub fn extract_sources(text: &str) -> Vec<SearchResult> {
    let title_re = Regex::new(r"^\d+\.\s+\*\*(.+?)\*\*").expect("valid regex");
    let source_re = Regex::new(r"^Source:\s*(.+)$").expect("valid regex");

    let mut sources = Vec::new();
    let mut current: Option<SearchResult> = None;

    for line in text.lines() {
        let line = line.trim();

        if let Some(caps) = title_re.captures(line) {
            if let Some(source) = current.take() {
                sources.push(source);
            }
            current = Some(SearchResult {
                title: caps[1].to_string(),
                snippet: String::new(),
                url: String::new(),
            });
            continue;
        }

        if let Some(caps) = source_re.captures(line) {
            if let Some(source) = current.as_mut() {
                source.url = caps[1].trim().to_string();
            }
            continue;
        }

        if let Some(source) = current.as_mut() {
            if !line.is_empty() {
                if source.snippet.is_empty() {
                    source.snippet = line.to_string();
                } else {
                    source.snippet.push(' ');
                    source.snippet.push_str(line);
                }
            }
        }
    }

    // The last record only counts once its url is known
    if let Some(source) = current {
        if !source.url.is_empty() {
            sources.push(source);
        }
    }

    sources
}
