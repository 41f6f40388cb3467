//! You.com search provider.
//!
//! The You.com API has shipped several response shapes, so hits and the
//! summary are looked up under a handful of known keys.

use super::{
    SearchHit, SearchProvider, SearchProviderResult, SearchTopic, api_key_from_env, first_str,
    http_client, send_json,
};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_URL: &str = "https://api.you.com/search";

const HIT_KEYS: &[&str] = &["web_results", "webResults", "searchResults", "results", "hits"];
const NESTED_HIT_KEYS: &[&str] = &[
    "web",
    "web_results",
    "webResults",
    "results",
    "searchResults",
    "hits",
];
const SUMMARY_KEYS: &[&str] = &["answer", "instant_answer", "direct_answer", "summary", "overview"];

pub struct YouComProvider {
    client: reqwest::Client,
    id: String,
    display_name: String,
    url: String,
    api_key: String,
}

impl YouComProvider {
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

    fn request_body(query: &str, topic: SearchTopic, max_results: usize) -> Value {
        json!({
            "query": query,
            "num_web_results": max_results,
            "page": 1,
            "domain": "you.com",
            "safeSearch": "Moderate",
            "language": if topic == SearchTopic::General { "tr" } else { "en" },
        })
    }

    /// A hit list, either directly or nested one level under a known key.
    fn hit_list(source: &Value) -> Option<&Vec<Value>> {
        match source {
            Value::Array(items) => Some(items),
            Value::Object(map) => NESTED_HIT_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array)),
            _ => None,
        }
    }

    fn extract_hits(body: &Value, max_results: usize) -> Vec<SearchHit> {
        let items = HIT_KEYS
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(|value| Self::hit_list(value).filter(|items| !items.is_empty()))
            .or_else(|| Self::hit_list(body));

        items
            .into_iter()
            .flatten()
            .filter(|item| item.is_object())
            .take(max_results)
            .map(|item| {
                SearchHit::new(
                    first_str(item, &["title", "name"]).unwrap_or_default(),
                    first_str(item, &["url", "link"]).unwrap_or_default(),
                    first_str(item, &["snippet", "summary", "description"]).unwrap_or_default(),
                )
            })
            .collect()
    }

    fn extract_summary(body: &Value) -> Option<String> {
        first_str(body, SUMMARY_KEYS)
            .or_else(|| {
                ["youChat", "youchat"]
                    .iter()
                    .filter_map(|key| body.get(*key))
                    .find(|chat| chat.is_object())
                    .and_then(|chat| first_str(chat, &["response", "message"]))
            })
            .map(str::to_string)
    }
}

#[async_trait]
impl SearchProvider for YouComProvider {
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
        debug!(provider = %self.id, query, %topic, "Sending You.com search");
        let body = send_json(
            &self.display_name,
            self.client
                .post(&self.url)
                .header("X-API-Key", &self.api_key)
                .header("Accept", "application/json")
                .json(&Self::request_body(query, topic, max_results)),
        )
        .await?;

        let hits = Self::extract_hits(&body, max_results);
        let summary = Self::extract_summary(&body);
        Ok(SearchProviderResult::success(self, query, summary, hits))
    }
}
