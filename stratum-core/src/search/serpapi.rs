//! SerpAPI Google search provider.

use super::{
    SearchHit, SearchProvider, SearchProviderResult, SearchTopic, api_key_from_env, first_str,
    hits_from_array, http_client, send_json,
};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const DEFAULT_URL: &str = "https://serpapi.com/search.json";

pub struct SerpApiProvider {
    client: reqwest::Client,
    id: String,
    display_name: String,
    url: String,
    api_key: String,
}

impl SerpApiProvider {
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

    /// Interface language: Turkish for general searches, English otherwise.
    fn language(topic: SearchTopic) -> &'static str {
        match topic {
            SearchTopic::General => "tr",
            SearchTopic::News | SearchTopic::Finance => "en",
        }
    }

    fn query_params(&self, query: &str, topic: SearchTopic, max_results: usize) -> Vec<(&'static str, String)> {
        vec![
            ("engine", "google".to_string()),
            ("q", query.to_string()),
            ("num", max_results.to_string()),
            ("hl", Self::language(topic).to_string()),
            ("api_key", self.api_key.clone()),
        ]
    }

    fn parse_response(body: &Value, max_results: usize) -> (Option<String>, Vec<SearchHit>) {
        let summary = body
            .get("answer_box")
            .filter(|answer_box| answer_box.is_object())
            .and_then(|answer_box| first_str(answer_box, &["answer", "snippet"]))
            .map(str::to_string);
        let hits = hits_from_array(body.get("organic_results"), "link", "snippet", max_results);
        (summary, hits)
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
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
        debug!(provider = %self.id, query, %topic, "Sending SerpAPI search");
        let body = send_json(
            &self.display_name,
            self.client
                .get(&self.url)
                .query(&self.query_params(query, topic, max_results)),
        )
        .await?;

        let (summary, hits) = Self::parse_response(&body, max_results);
        Ok(SearchProviderResult::success(self, query, summary, hits))
    }
}
