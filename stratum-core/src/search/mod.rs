//! Web search capability.
//!
//! [`SearchProvider`] is one backend (Tavily, Exa, SerpAPI, You.com).
//! [`SearchTool`] is what the pipeline consumes: it takes [`SearchArgs`],
//! fans out over providers, and returns one formatted text blob.

pub mod exa;
pub mod multi;
pub mod serpapi;
pub mod tavily;
pub mod youcom;

pub use multi::MultiSearch;

use crate::error::{ProviderKind, ProviderRateLimitError, Result, SearchError};
use crate::text::truncate_chars;
use crate::types::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Header line every formatted result blob starts with.
pub const RESULTS_HEADER: &str = "=== ARAŞTIRMA SONUÇLARI ===";

/// Returned instead of a blob when there is nothing to search for.
pub const NO_QUERIES_MESSAGE: &str = "Arama yapılacak sorgu bulunamadı.";

/// Placeholder for hits without a title.
pub const UNTITLED_HIT: &str = "Başlık bulunamadı";

/// Provider snippets are cut to this many characters.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Name of the search tool offered to the model.
pub const SEARCH_TOOL_NAME: &str = "search_web";

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Search context accepted by the providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTopic {
    #[default]
    General,
    News,
    Finance,
}

impl SearchTopic {
    /// Parse a topic; anything unrecognized becomes [`SearchTopic::General`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "news" => SearchTopic::News,
            "finance" => SearchTopic::Finance,
            _ => SearchTopic::General,
        }
    }

    /// Like [`SearchTopic::parse`], for untyped tool arguments.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(Value::as_str)
            .map(Self::parse)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchTopic::General => "general",
            SearchTopic::News => "news",
            SearchTopic::Finance => "finance",
        }
    }
}

impl std::fmt::Display for SearchTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Provider results
// ---------------------------------------------------------------------------

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchHit {
    /// Build a hit with trimmed fields and a placeholder for a missing title.
    pub fn new(title: &str, url: &str, snippet: &str) -> Self {
        let title = title.trim();
        Self {
            title: if title.is_empty() {
                UNTITLED_HIT.to_string()
            } else {
                title.to_string()
            },
            url: url.trim().to_string(),
            snippet: truncate_chars(snippet.trim(), MAX_SNIPPET_CHARS).to_string(),
        }
    }
}

/// What one provider returned for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProviderResult {
    pub provider_id: String,
    pub provider_name: String,
    pub query: String,
    pub summary: Option<String>,
    pub hits: Vec<SearchHit>,
    pub error: Option<String>,
    /// Whether `error` carries a rate-limit signature.
    #[serde(default)]
    pub rate_limited: bool,
}

impl SearchProviderResult {
    pub fn success(
        provider: &dyn SearchProvider,
        query: &str,
        summary: Option<String>,
        hits: Vec<SearchHit>,
    ) -> Self {
        Self {
            provider_id: provider.id().to_string(),
            provider_name: provider.display_name().to_string(),
            query: query.to_string(),
            summary: summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            hits,
            error: None,
            rate_limited: false,
        }
    }

    pub fn failure(provider: &dyn SearchProvider, query: &str, error: &SearchError) -> Self {
        Self {
            provider_id: provider.id().to_string(),
            provider_name: provider.display_name().to_string(),
            query: query.to_string(),
            summary: None,
            hits: Vec::new(),
            error: Some(error.to_string()),
            rate_limited: crate::providers::failover::is_search_rate_limit(error),
        }
    }
}

/// A single web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable provider id, e.g. `tavily`.
    fn id(&self) -> &str;

    /// Human-readable name used in result blobs.
    fn display_name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        topic: SearchTopic,
        max_results: usize,
    ) -> std::result::Result<SearchProviderResult, SearchError>;
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

/// Read a provider API key from the environment.
pub(crate) fn api_key_from_env(
    provider: &str,
    env_var: &str,
) -> std::result::Result<String, SearchError> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| SearchError::Unavailable {
            provider: provider.to_string(),
            reason: format!("{env_var} environment variable is not set"),
        })
}

/// HTTP client with the configured request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send a request and decode a JSON body, mapping failures per provider.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> std::result::Result<Value, SearchError> {
    let response = request.send().await.map_err(|e| SearchError::Request {
        provider: provider.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| SearchError::Request {
        provider: provider.to_string(),
        message: format!("Failed to read response body: {e}"),
    })?;

    if !status.is_success() {
        return Err(SearchError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate_chars(&body, 300).to_string(),
        });
    }

    serde_json::from_str(&body).map_err(|e| SearchError::ResponseParse {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// First non-empty string among `keys` on a JSON object.
pub(crate) fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Hits from a plain `results`-style array.
pub(crate) fn hits_from_array(
    items: Option<&Value>,
    url_key: &str,
    snippet_key: &str,
    max_results: usize,
) -> Vec<SearchHit> {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .take(max_results)
                .map(|item| {
                    SearchHit::new(
                        first_str(item, &["title"]).unwrap_or_default(),
                        first_str(item, &[url_key]).unwrap_or_default(),
                        first_str(item, &[snippet_key]).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tool arguments
// ---------------------------------------------------------------------------

/// Normalize tool-call arguments into an argument object.
///
/// - an object is used as-is;
/// - a string holding a JSON object is parsed;
/// - a string holding a JSON list becomes `{"queries": list}`;
/// - a string holding any other JSON scalar, or text that is not JSON,
///   becomes a one-query list;
/// - empty strings and every other value become an empty object.
pub fn coerce_tool_arguments(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Map::new();
            }
            let mut args = Map::new();
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => return map,
                Ok(Value::Array(items)) => {
                    args.insert("queries".into(), Value::Array(items));
                }
                Ok(Value::String(s)) => {
                    args.insert("queries".into(), json!([s]));
                }
                Ok(Value::Null) | Err(_) => {
                    args.insert("queries".into(), json!([text]));
                }
                Ok(scalar) => {
                    args.insert("queries".into(), json!([scalar.to_string()]));
                }
            }
            args
        }
        _ => Map::new(),
    }
}

/// Typed arguments for [`SearchTool::invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchArgs {
    pub queries: Vec<String>,
    pub topic: SearchTopic,
    pub max_results: Option<usize>,
}

impl SearchArgs {
    pub fn new(queries: Vec<String>, topic: SearchTopic) -> Self {
        Self {
            queries,
            topic,
            max_results: None,
        }
    }

    /// Build from raw tool-call arguments.
    ///
    /// `queries` may be a list or a single string; blank entries are
    /// dropped. `max_results` is kept only when it is a positive integer.
    pub fn from_value(raw: &Value) -> Self {
        let args = coerce_tool_arguments(raw);

        let queries = match args.get("queries").or_else(|| args.get("query")) {
            Some(Value::String(q)) => vec![q.trim().to_string()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(q) => q.trim().to_string(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
        .into_iter()
        .filter(|q| !q.is_empty())
        .collect();

        let max_results = match args.get("max_results") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .filter(|n| *n > 0)
        .map(|n| n as usize);

        Self {
            queries,
            topic: SearchTopic::from_value(args.get("topic")),
            max_results,
        }
    }

    /// The argument object as sent through a tool call.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "queries": self.queries,
            "topic": self.topic.as_str(),
        });
        if let Some(max_results) = self.max_results {
            value["max_results"] = json!(max_results);
        }
        value
    }
}

// ---------------------------------------------------------------------------
// Search tool
// ---------------------------------------------------------------------------

/// Which providers a tool used and what happened along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchToolMetadata {
    pub provider_ids: Vec<String>,
    pub provider_names: Vec<String>,
    pub notices: Vec<String>,
}

/// Tool definition for `search_web`.
pub fn search_web_definition() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TOOL_NAME.to_string(),
        description: "Run web searches in parallel across the selected providers and return \
                      results grouped by provider."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Search queries to run."
                },
                "topic": {
                    "type": "string",
                    "enum": ["general", "news", "finance"],
                    "description": "Search context."
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum results per provider."
                }
            },
            "required": ["queries"]
        }),
    }
}

/// The search capability the research and writing stages consume.
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn definition(&self) -> ToolDefinition {
        search_web_definition()
    }

    /// Run the searches and return one formatted result blob.
    async fn invoke(&self, args: SearchArgs) -> Result<String>;

    fn metadata(&self) -> SearchToolMetadata;
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

enum MockOutcome {
    Blob(String),
    RateLimited { provider_id: String },
    Failure(String),
}

/// A scripted [`SearchTool`] for tests.
///
/// Queued outcomes are served in FIFO order. With an empty queue, a
/// deterministic blob with one `URL:` line per query is generated.
pub struct MockSearchTool {
    provider_id: String,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    invocations: Mutex<Vec<SearchArgs>>,
}

impl MockSearchTool {
    pub fn new() -> Self {
        Self::with_provider_id("mock-search")
    }

    pub fn with_provider_id(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            outcomes: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    pub fn queue_blob(&self, blob: &str) {
        self.push(MockOutcome::Blob(blob.to_string()));
    }

    /// Queue a rate-limit failure attributed to `provider_id`.
    pub fn queue_rate_limit(&self, provider_id: &str) {
        self.push(MockOutcome::RateLimited {
            provider_id: provider_id.to_string(),
        });
    }

    /// Queue a non-rate-limit failure.
    pub fn queue_failure(&self, message: &str) {
        self.push(MockOutcome::Failure(message.to_string()));
    }

    pub fn invocations(&self) -> Vec<SearchArgs> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The blob produced when no outcome is queued.
    pub fn default_blob(args: &SearchArgs, call_index: usize) -> String {
        if args.queries.is_empty() {
            return NO_QUERIES_MESSAGE.to_string();
        }
        let mut lines = vec![RESULTS_HEADER.to_string(), String::new()];
        for (i, query) in args.queries.iter().enumerate() {
            lines.push(format!("Sorgu: {query}"));
            lines.push("[Mock Search]".to_string());
            lines.push(format!("1. {query}"));
            lines.push(format!(
                "   URL: https://example.org/research/{call_index}-{i}"
            ));
            lines.push(format!("   İçerik: {query} hakkında örnek içerik"));
            lines.push(String::new());
        }
        lines.join("\n").trim().to_string()
    }
}

impl Default for MockSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchTool for MockSearchTool {
    async fn invoke(&self, args: SearchArgs) -> Result<String> {
        let call_index = {
            let mut invocations = self
                .invocations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            invocations.push(args.clone());
            invocations.len()
        };

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match outcome {
            Some(MockOutcome::Blob(blob)) => Ok(blob),
            Some(MockOutcome::RateLimited { provider_id }) => Err(ProviderRateLimitError::new(
                ProviderKind::Search,
                provider_id,
                &"429 Too Many Requests",
            )
            .into()),
            Some(MockOutcome::Failure(message)) => Err(SearchError::Request {
                provider: self.provider_id.clone(),
                message,
            }
            .into()),
            None => Ok(Self::default_blob(&args, call_index)),
        }
    }

    fn metadata(&self) -> SearchToolMetadata {
        SearchToolMetadata {
            provider_ids: vec![self.provider_id.clone()],
            provider_names: vec!["Mock Search".to_string()],
            notices: Vec::new(),
        }
    }
}

/// A scripted [`SearchProvider`] for tests that go through [`MultiSearch`].
///
/// Queued failures are served first; afterwards every query gets one hit
/// whose URL is derived from the query.
pub struct MockSearchProvider {
    id: String,
    display_name: String,
    failures: Mutex<VecDeque<SearchError>>,
    queries: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: format!("Mock {id}"),
            failures: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_error(&self, error: SearchError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Queue `count` HTTP 429 failures.
    pub fn queue_rate_limits(&self, count: usize) {
        for _ in 0..count {
            self.queue_error(SearchError::Status {
                provider: self.display_name.clone(),
                status: 429,
                body: "Too Many Requests".to_string(),
            });
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn search(
        &self,
        query: &str,
        _topic: SearchTopic,
        _max_results: usize,
    ) -> std::result::Result<SearchProviderResult, SearchError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());
        if let Some(error) = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }
        let slug: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let hit = SearchHit::new(
            query,
            &format!("https://{}.example.org/{slug}", self.id),
            &format!("{query} hakkında örnek içerik"),
        );
        Ok(SearchProviderResult::success(self, query, None, vec![hit]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_topic_normalization() {
        assert_eq!(SearchTopic::parse("News"), SearchTopic::News);
        assert_eq!(SearchTopic::parse(" finance "), SearchTopic::Finance);
        assert_eq!(SearchTopic::parse(""), SearchTopic::General);
        assert_eq!(SearchTopic::parse("**news**"), SearchTopic::General);
        assert_eq!(SearchTopic::from_value(Some(&json!(42))), SearchTopic::General);
        assert_eq!(SearchTopic::from_value(None), SearchTopic::General);
    }

    #[test]
    fn test_hit_placeholder_and_trim() {
        let hit = SearchHit::new("  ", " https://a.org ", "  body  ");
        assert_eq!(hit.title, UNTITLED_HIT);
        assert_eq!(hit.url, "https://a.org");
        assert_eq!(hit.snippet, "body");

        let long = "x".repeat(900);
        assert_eq!(SearchHit::new("t", "", &long).snippet.chars().count(), 500);
    }

    #[test]
    fn test_coerce_object_passthrough() {
        let args = coerce_tool_arguments(&json!({"queries": ["a"], "topic": "news"}));
        assert_eq!(args["topic"], "news");
    }

    #[test]
    fn test_coerce_json_strings() {
        let args = coerce_tool_arguments(&json!("{\"queries\": [\"x\"]}"));
        assert_eq!(args["queries"], json!(["x"]));

        let args = coerce_tool_arguments(&json!("[\"a\", \"b\"]"));
        assert_eq!(args["queries"], json!(["a", "b"]));

        let args = coerce_tool_arguments(&json!("\"solo\""));
        assert_eq!(args["queries"], json!(["solo"]));

        let args = coerce_tool_arguments(&json!("42"));
        assert_eq!(args["queries"], json!(["42"]));
    }

    #[test]
    fn test_coerce_plain_text_and_others() {
        let args = coerce_tool_arguments(&json!("quantum sensors"));
        assert_eq!(args["queries"], json!(["quantum sensors"]));
        assert!(coerce_tool_arguments(&json!("   ")).is_empty());
        assert!(coerce_tool_arguments(&json!(7)).is_empty());
        assert!(coerce_tool_arguments(&Value::Null).is_empty());
    }

    #[test]
    fn test_search_args_from_value() {
        let args = SearchArgs::from_value(&json!({
            "queries": ["  a ", "", "b"],
            "topic": "FINANCE",
            "max_results": 0
        }));
        assert_eq!(args.queries, vec!["a", "b"]);
        assert_eq!(args.topic, SearchTopic::Finance);
        assert_eq!(args.max_results, None);

        let args = SearchArgs::from_value(&json!({"queries": "single", "max_results": "3"}));
        assert_eq!(args.queries, vec!["single"]);
        assert_eq!(args.max_results, Some(3));
    }

    #[test]
    fn test_search_args_roundtrip_through_value() {
        let mut args = SearchArgs::new(vec!["q".into()], SearchTopic::News);
        args.max_results = Some(4);
        assert_eq!(SearchArgs::from_value(&args.to_value()), args);
    }

    #[test]
    fn test_definition_schema() {
        let def = search_web_definition();
        assert_eq!(def.name, "search_web");
        assert_eq!(def.parameters["required"], json!(["queries"]));
    }

    #[tokio::test]
    async fn test_mock_default_blob_has_urls() {
        let tool = MockSearchTool::new();
        let blob = tool
            .invoke(SearchArgs::new(vec!["edge ai".into()], SearchTopic::General))
            .await
            .unwrap();
        assert!(blob.starts_with(RESULTS_HEADER));
        assert!(blob.contains("URL: https://example.org/research/1-0"));
        assert_eq!(tool.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_queued_outcomes() {
        let tool = MockSearchTool::new();
        tool.queue_blob("custom");
        tool.queue_rate_limit("tavily");
        tool.queue_failure("boom");
        let args = SearchArgs::new(vec!["q".into()], SearchTopic::General);

        assert_eq!(tool.invoke(args.clone()).await.unwrap(), "custom");

        let err = tool.invoke(args.clone()).await.unwrap_err();
        let limit = err.as_rate_limit().unwrap();
        assert_eq!(limit.provider_type, ProviderKind::Search);
        assert_eq!(limit.provider_id, "tavily");

        let err = tool.invoke(args).await.unwrap_err();
        assert!(err.as_rate_limit().is_none());
    }
}
