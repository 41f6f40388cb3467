//! Tavily search provider.

use super::{
    SearchHit, SearchProvider, SearchProviderResult, SearchTopic, api_key_from_env, first_str,
    hits_from_array, http_client, send_json,
};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_URL: &str = "https://api.tavily.com/search";

pub struct TavilyProvider {
    client: reqwest::Client,
    id: String,
    display_name: String,
    url: String,
    api_key: String,
}

impl TavilyProvider {
    /// Create a provider, reading the API key from the configured env var.
    pub fn new(config: &SearchProviderConfig, timeout_secs: u64) -> Result<Self, SearchError> {
        let api_key = api_key_from_env(&config.display_name, &config.api_key_env)?;
        Ok(Self::new_with_key(config, api_key, timeout_secs))
    }

    pub fn new_with_key(config: &SearchProviderConfig, api_key: String, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            api_key,
        }
    }

    fn request_body(&self, query: &str, topic: SearchTopic, max_results: usize) -> Value {
        json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "basic",
            "include_answer": true,
            "include_raw_content": false,
            "max_results": max_results,
            "topic": topic.as_str(),
        })
    }

    /// Answer text and hits from a Tavily response body.
    fn parse_response(body: &Value, max_results: usize) -> (Option<String>, Vec<SearchHit>) {
        let summary = first_str(body, &["answer"]).map(str::to_string);
        let hits = hits_from_array(body.get("results"), "url", "content", max_results);
        (summary, hits)
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn search(
        &self,
        query: &str,
        topic: SearchTopic,
        max_results: usize,
    ) -> Result<SearchProviderResult, SearchError> {
        debug!(provider = %self.id, query, %topic, "Sending Tavily search");
        let body = send_json(
            &self.display_name,
            self.client
                .post(&self.url)
                .json(&self.request_body(query, topic, max_results)),
        )
        .await?;

        let (summary, hits) = Self::parse_response(&body, max_results);
        Ok(SearchProviderResult::success(self, query, summary, hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;

    fn provider() -> TavilyProvider {
        let config = SearchConfig::default();
        TavilyProvider::new_with_key(config.provider("tavily").unwrap(), "tvly-test".into(), 5)
    }

    #[test]
    fn test_request_body() {
        let body = provider().request_body("edge ai", SearchTopic::News, 3);
        assert_eq!(body["topic"], "news");
        assert_eq!(body["max_results"], 3);
        assert_eq!(body["include_answer"], true);
        assert_eq!(body["api_key"], "tvly-test");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "answer": "  Edge AI is growing. ",
            "results": [
                {"title": "One", "url": "https://a.org", "content": "first"},
                {"title": "", "url": "https://b.org", "content": null},
                {"title": "Three", "url": "https://c.org", "content": "third"}
            ]
        });
        let (summary, hits) = TavilyProvider::parse_response(&body, 2);
        assert_eq!(summary.as_deref(), Some("Edge AI is growing."));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "Başlık bulunamadı");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_new_requires_api_key() {
        let mut config = SearchConfig::default().provider("tavily").unwrap().clone();
        config.api_key_env = "STRATUM_TEST_TAVILY_KEY_UNSET".into();
        assert!(matches!(
            TavilyProvider::new(&config, 5),
            Err(SearchError::Unavailable { .. })
        ));
    }
}
