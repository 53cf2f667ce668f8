//! Web search and page scraping tools.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs;
use tracing::{info, warn};

use crate::tool::{Result, Tool, ToolContext, ToolError, ToolInput, ToolOutput};
use crate::workspace;

/// Tavily search endpoint
const TAVILY_API_URL: &str = "https://api.tavily.com/search";
/// Cap on results per search
const MAX_RESULTS: u32 = 20;
/// HTTP timeout for search and scrape requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static SCRIPT_OR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)\s*>") {
        Ok(regex) => regex,
        Err(err) => panic!("Script regex is invalid: {err}"),
    });

static TAG: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?s)<[^>]*>") {
    Ok(regex) => regex,
    Err(err) => panic!("Tag regex is invalid: {err}"),
});

static TITLE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>") {
    Ok(regex) => regex,
    Err(err) => panic!("Title regex is invalid: {err}"),
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"[ \t\r\f]+") {
    Ok(regex) => regex,
    Err(err) => panic!("Whitespace regex is invalid: {err}"),
});

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"\n\s*\n+") {
    Ok(regex) => regex,
    Err(err) => panic!("Blank line regex is invalid: {err}"),
});

/// Request body for Tavily search
#[derive(Serialize)]
struct TavilyRequest<'request> {
    /// API key
    api_key: &'request str,
    /// Search query
    query: &'request str,
    /// Result count
    max_results: u32,
    /// Search depth
    search_depth: &'static str,
    /// Ask Tavily for a synthesized answer
    include_answer: bool,
}

/// Response from Tavily search
#[derive(Deserialize)]
struct TavilyResponse {
    /// Synthesized answer
    #[serde(default)]
    answer: Option<String>,
    /// Ranked results
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Snippet
    #[serde(default)]
    pub content: String,
}

/// Lowercase a query into a file-name-safe stem.
pub fn sanitize_query(query: &str) -> String {
    let stem: String = query
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let collapsed = stem
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    collapsed.chars().take(50).collect()
}

/// Deterministic results used when no search backend is reachable.
pub fn fallback_results(query: &str, count: u32) -> Vec<SearchHit> {
    let angles = [
        ("Overview", "General background and recent developments"),
        ("Latest Analysis", "Expert commentary and current trends"),
        ("Key Data", "Figures and statistics worth tracking"),
        ("Risks and Considerations", "Factors that could change the outlook"),
        ("Outlook", "Expectations for the coming period"),
    ];
    let slug = sanitize_query(query);
    angles
        .iter()
        .cycle()
        .take(count as usize)
        .enumerate()
        .map(|(position, (angle, summary))| SearchHit {
            title: format!("{query} - {angle}"),
            url: format!("https://example.com/{slug}/{}", position + 1),
            content: format!("{summary} for {query}."),
        })
        .collect()
}

fn render_results(query: &str, answer: Option<&str>, hits: &[SearchHit], source: &str) -> String {
    let mut document = format!("# Search Results: {query}\n\nSource: {source}\n\n");
    if let Some(answer) = answer {
        document.push_str(&format!("## Summary\n{answer}\n\n"));
    }
    for (position, hit) in hits.iter().enumerate() {
        document.push_str(&format!(
            "## {}. {}\n{}\n\n{}\n\n",
            position + 1,
            hit.title,
            hit.url,
            hit.content
        ));
    }
    document
}

/// Web search through Tavily with an offline fallback.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    default_results: u32,
}

impl WebSearchTool {
    /// Create a search tool; without a key every search uses fallback results.
    pub fn new(api_key: Option<String>, default_results: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            default_results,
        }
    }

    async fn tavily(&self, api_key: &str, query: &str, count: u32) -> Result<(Option<String>, Vec<SearchHit>)> {
        let request = TavilyRequest {
            api_key,
            query,
            max_results: count,
            search_depth: "basic",
            include_answer: true,
        };
        let response = self
            .client
            .post(TAVILY_API_URL)
            .timeout(HTTP_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "Search API returned {}",
                response.status()
            )));
        }
        let body: TavilyResponse = response.json().await?;
        Ok((body.answer, body.results))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web-search"
    }

    fn description(&self) -> &'static str {
        "Search the web. Results are also saved to search_results_<query>.md in the workspace."
    }

    fn usage(&self) -> &'static str {
        "<web-search query=\"current market conditions\" num_results=\"5\"></web-search>"
    }

    fn produces_files(&self) -> bool {
        true
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let query = input.require_str(self.name(), &["query", "content"])?.trim().to_owned();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("web-search query is empty".to_owned()));
        }
        let count = input
            .get_u32("num_results")
            .unwrap_or(self.default_results)
            .clamp(1, MAX_RESULTS);

        let searched = match self.api_key.as_deref() {
            Some(key) => match self.tavily(key, &query, count).await {
                Ok(found) => Some(found),
                Err(err) => {
                    warn!("Search for '{}' failed, using fallback results: {}", query, err);
                    None
                }
            },
            None => None,
        };
        let (answer, hits, source) = match searched {
            Some((answer, hits)) => (answer, hits, "tavily"),
            None => (None, fallback_results(&query, count), "fallback"),
        };

        let file_name = format!("search_results_{}.md", sanitize_query(&query));
        let path = workspace::resolve(&context.workspace, &file_name, true).await?;
        fs::write(&path, render_results(&query, answer.as_deref(), &hits, source)).await?;
        info!("Search '{}' returned {} results from {}", query, hits.len(), source);

        Ok(ToolOutput::success_with_data(
            format!("Found {} results for '{query}'", hits.len()),
            json!({
                "query": query,
                "answer": answer,
                "results": hits,
                "source": source,
                "file": file_name,
            }),
        ))
    }
}

/// Reduce an HTML page to readable text.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(html, " ");
    let with_breaks = without_scripts
        .replace("</p>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("</li>", "\n")
        .replace("</h1>", "\n")
        .replace("</h2>", "\n")
        .replace("</h3>", "\n")
        .replace("</div>", "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let spaced = WHITESPACE.replace_all(&decoded, " ");
    BLANK_LINES
        .replace_all(&spaced, "\n\n")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Fetches a page and returns its text content.
#[derive(Debug, Clone)]
pub struct WebScrapeTool {
    client: Client,
    max_chars: usize,
}

impl WebScrapeTool {
    /// Create a scrape tool keeping at most `max_chars` characters of text.
    pub fn new(max_chars: usize) -> Self {
        Self {
            client: Client::new(),
            max_chars,
        }
    }
}

#[async_trait]
impl Tool for WebScrapeTool {
    fn name(&self) -> &'static str {
        "web-scrape"
    }

    fn description(&self) -> &'static str {
        "Fetch a web page and extract its text. Optional save_as writes the text to the workspace."
    }

    fn usage(&self) -> &'static str {
        "<web-scrape url=\"https://example.com/article\" save_as=\"article.md\" />"
    }

    fn produces_files(&self) -> bool {
        true
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let url = input.require_str(self.name(), &["url", "content"])?.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidInput(format!("Not an http(s) URL: {url}")));
        }

        let response = self.client.get(url).timeout(HTTP_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "Fetching {url} returned {}",
                response.status()
            )));
        }
        let html = response.text().await?;
        let title = TITLE
            .captures(&html)
            .and_then(|captures| captures.get(1))
            .map(|found| html_to_text(found.as_str()))
            .unwrap_or_default();
        let text = html_to_text(&html);
        let truncated = text.chars().count() > self.max_chars;
        let content: String = text.chars().take(self.max_chars).collect();

        let saved = match input.get_str(&["save_as", "path"]) {
            Some(target) => {
                let path = workspace::resolve(&context.workspace, target, true).await?;
                fs::write(&path, format!("# {title}\n\nSource: {url}\n\n{content}\n")).await?;
                Some(workspace::normalize(target).to_owned())
            }
            None => None,
        };

        Ok(ToolOutput::success_with_data(
            format!("Scraped {} characters from {url}", content.chars().count()),
            json!({
                "url": url,
                "title": title,
                "content": content,
                "truncated": truncated,
                "file": saved,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use nexus_core::{ConversationId, UserId};
    use std::fs as std_fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("S&P 500 outlook, 2025!"), "s_p_500_outlook_2025");
        assert_eq!(sanitize_query(&"a".repeat(80)).len(), 50);
    }

    #[test]
    fn test_fallback_results_are_deterministic() {
        let first = fallback_results("bonds", 7);
        assert_eq!(first.len(), 7);
        assert_eq!(first, fallback_results("bonds", 7));
        assert_eq!(first[0].title, "bonds - Overview");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><h1>Head</h1><p>One &amp; two</p><script>var x = 1;</script></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Head"));
        assert!(text.contains("One & two"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[tokio::test]
    async fn test_search_without_key_uses_fallback_and_saves() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let ctx = ToolContext::new(ConversationId::from("c"), UserId::default(), temp.path());
        let tool = WebSearchTool::new(None, 5);

        let output = tool
            .execute(ToolInput { params: json!({"query": "x", "num_results": "3"}) }, &ctx)
            .await?;
        assert!(output.success);
        let data = output.data.unwrap_or_default();
        assert_eq!(data["source"], "fallback");
        assert_eq!(data["results"].as_array().map(Vec::len), Some(3));

        let saved = std_fs::read_to_string(temp.path().join("search_results_x.md"))?;
        assert!(saved.starts_with("# Search Results: x"));
        Ok(())
    }

    #[tokio::test]
    async fn test_scrape_rejects_non_http() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let ctx = ToolContext::new(ConversationId::from("c"), UserId::default(), temp.path());
        let result = WebScrapeTool::new(100)
            .execute(ToolInput { params: json!({"url": "file:///etc/passwd"}) }, &ctx)
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        Ok(())
    }
}
