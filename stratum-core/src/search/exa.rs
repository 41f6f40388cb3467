//! Exa semantic search provider.

use super::{
    SearchHit, SearchProvider, SearchProviderResult, SearchTopic, api_key_from_env, first_str,
    hits_from_array, http_client, send_json,
};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_URL: &str = "https://api.exa.ai/search";

pub struct ExaProvider {
    client: reqwest::Client,
    id: String,
    display_name: String,
    url: String,
    api_key: String,
}

impl ExaProvider {
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

    // Exa has no topic parameter; the neural ranking covers it.
    fn request_body(query: &str, max_results: usize) -> Value {
        json!({
            "query": query,
            "useAutoprompt": true,
            "numResults": max_results,
            "type": "neural",
        })
    }

    fn parse_response(body: &Value, max_results: usize) -> (Option<String>, Vec<SearchHit>) {
        let summary = first_str(body, &["summary"]).map(str::to_string);
        let hits = hits_from_array(body.get("results"), "url", "text", max_results);
        (summary, hits)
    }
}

#[async_trait]
impl SearchProvider for ExaProvider {
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
        debug!(provider = %self.id, query, %topic, "Sending Exa search");
        let body = send_json(
            &self.display_name,
            self.client
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .json(&Self::request_body(query, max_results)),
        )
        .await?;

        let (summary, hits) = Self::parse_response(&body, max_results);
        Ok(SearchProviderResult::success(self, query, summary, hits))
    }
}
