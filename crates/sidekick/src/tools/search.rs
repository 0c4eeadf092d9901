use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use sidekick_core::tool::{Error as ToolError, Tool, ToolResult};

const MAX_RESULTS: usize = 8;
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const TIMEOUT: Duration = Duration::from_secs(15);

/// A single search hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// Title of the result.
    pub title: String,
    /// URL of the result.
    pub url: String,
    /// A short text snippet.
    pub snippet: String,
}

/// Errors from a [`SearchProvider`].
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The search engine answered with a non-success status.
    #[error("search engine returned status {0}")]
    Status(u16),
    /// The body is not the expected JSON document.
    #[error("unexpected response payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Searches for `query`, returning at most `max_results` hits.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;

    /// Returns the provider name for logging.
    fn provider_name(&self) -> &'static str;
}

/// Searches with the DuckDuckGo instant answer API. No key required.
#[derive(Clone, Debug)]
pub struct DuckDuckGoProvider {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoProvider {
    /// Creates a provider talking to the public endpoint.
    #[inline]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: DUCKDUCKGO_URL.to_owned(),
        }
    }
}

impl Default for DuckDuckGoProvider {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    results: Vec<Topic>,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Topic {
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<Topic>,
    },
    Hit {
        #[serde(rename = "Text", default)]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
}

impl InstantAnswer {
    fn parse(body: &str) -> Result<Self, SearchError> {
        Ok(serde_json::from_str(body)?)
    }

    fn into_results(self, max_results: usize) -> Vec<SearchResult> {
        fn flatten(topics: Vec<Topic>, out: &mut Vec<SearchResult>) {
            for topic in topics {
                match topic {
                    Topic::Group { topics } => flatten(topics, out),
                    Topic::Hit { text, first_url } if !text.is_empty() => {
                        // Hit texts start with the title, e.g. "Rust - A language...".
                        let title = text
                            .split_once(" - ")
                            .map(|(title, _)| title)
                            .unwrap_or(&text)
                            .to_owned();
                        out.push(SearchResult {
                            title,
                            url: first_url,
                            snippet: text,
                        });
                    }
                    Topic::Hit { .. } => {}
                }
            }
        }

        let mut out = vec![];
        if !self.abstract_text.is_empty() {
            out.push(SearchResult {
                title: self.heading,
                url: self.abstract_url,
                snippet: self.abstract_text,
            });
        }
        flatten(self.results, &mut out);
        flatten(self.related_topics, &mut out);
        out.truncate(max_results);
        out
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .timeout(TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        // The API labels its JSON as `application/x-javascript`.
        let body = resp.text().await?;
        let answer = InstantAnswer::parse(&body).inspect_err(|err| {
            warn!("unexpected instant answer payload: {err}");
        })?;
        Ok(answer.into_results(max_results))
    }

    fn provider_name(&self) -> &'static str {
        "duckduckgo"
    }
}

/// Input of [`SearchTool`].
#[derive(Deserialize, JsonSchema)]
pub struct SearchToolParameters {
    #[schemars(description = "What to search for.")]
    query: String,
}

/// A tool for searching the web. Returns snippets only, pages are never
/// fetched.
pub struct SearchTool {
    provider: Arc<dyn SearchProvider>,
    parameter_schema: Value,
}

impl SearchTool {
    /// Creates a search tool backed by DuckDuckGo.
    #[inline]
    pub fn new() -> Self {
        Self::with_provider(Arc::new(DuckDuckGoProvider::new()))
    }

    /// Creates a search tool backed by a custom provider.
    #[inline]
    pub fn with_provider(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            parameter_schema: schema_for!(SearchToolParameters).to_value(),
        }
    }
}

impl Default for SearchTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SearchTool {
    type Input = SearchToolParameters;

    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "DuckDuckGo search: return top result snippets (title, url, snippet)."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: SearchToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        async move {
            debug!("searching {} for {:?}", provider.provider_name(), input.query);
            let results = provider
                .search(&input.query, MAX_RESULTS)
                .await
                .map_err(|err| {
                    ToolError::execution_error()
                        .with_reason(format!("search failed: {err}"))
                })?;
            Ok(format_results(&results))
        }
    }
}

fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results.".to_owned();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Vec<SearchResult>);

    #[async_trait]
    impl SearchProvider for FixedProvider {
        async fn search(
            &self,
            _query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Ok(self.0.iter().take(max_results).cloned().collect())
        }

        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct BlockedProvider;

    #[async_trait]
    impl SearchProvider for BlockedProvider {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            InstantAnswer::parse("<html>Service temporarily blocked</html>")
                .map(|answer| answer.into_results(MAX_RESULTS))
        }

        fn provider_name(&self) -> &'static str {
            "blocked"
        }
    }

    fn hit(n: usize) -> SearchResult {
        SearchResult {
            title: format!("Title {n}"),
            url: format!("https://example.com/{n}"),
            snippet: format!("Snippet {n}"),
        }
    }

    #[tokio::test]
    async fn test_search_output() {
        let tool = SearchTool::with_provider(Arc::new(FixedProvider(
            (1..=10).map(hit).collect(),
        )));
        let output = tool
            .execute(SearchToolParameters {
                query: "anything".to_owned(),
            })
            .await
            .unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 8 * 3);
        assert_eq!(lines[0], "1. Title 1");
        assert_eq!(lines[1], "   https://example.com/1");
        assert_eq!(lines[2], "   Snippet 1");
        assert_eq!(lines[21], "8. Title 8");

        let tool = SearchTool::with_provider(Arc::new(FixedProvider(vec![])));
        let output = tool
            .execute(SearchToolParameters {
                query: "nothing".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(output, "No results.");
    }

    #[test]
    fn test_instant_answer_results() {
        let payload = r#"{
            "Heading": "Rust (programming language)",
            "AbstractText": "Rust is a general-purpose programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Results": [
                { "Text": "Official site - Rust", "FirstURL": "https://www.rust-lang.org/" }
            ],
            "RelatedTopics": [
                { "Text": "Cargo - The Rust package manager.", "FirstURL": "https://duckduckgo.com/Cargo" },
                {
                    "Name": "See also",
                    "Topics": [
                        { "Text": "Ferris - The Rust mascot.", "FirstURL": "https://duckduckgo.com/Ferris" }
                    ]
                }
            ]
        }"#;
        let answer: InstantAnswer = serde_json::from_str(payload).unwrap();
        let results = answer.into_results(3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[1].title, "Official site");
        assert_eq!(results[1].url, "https://www.rust-lang.org/");
        assert_eq!(results[2].title, "Cargo");
        assert_eq!(results[2].snippet, "Cargo - The Rust package manager.");
    }

    #[test]
    fn test_unexpected_payload() {
        let err = InstantAnswer::parse("<html>Service temporarily blocked</html>")
            .unwrap_err();
        assert!(matches!(err, SearchError::Payload(_)));
        assert!(InstantAnswer::parse("{}").unwrap().into_results(8).is_empty());
    }

    #[tokio::test]
    async fn test_payload_error_output() {
        let tool = SearchTool::with_provider(Arc::new(BlockedProvider));
        let err = tool
            .execute(SearchToolParameters {
                query: "anything".to_owned(),
            })
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(
            text.starts_with("Error: search failed: unexpected response payload: "),
            "{text}"
        );
    }
}
