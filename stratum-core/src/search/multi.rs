//! Fan-out search across several providers.

use super::{
    NO_QUERIES_MESSAGE, RESULTS_HEADER, SearchArgs, SearchProvider, SearchProviderResult,
    SearchTool, SearchToolMetadata, SearchTopic,
};
use crate::error::{ProviderKind, ProviderRateLimitError, Result};
use crate::text::ellipsize;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Snippets in the result blob are cut to this many characters.
const BLOB_SNIPPET_CHARS: usize = 400;

/// The production [`SearchTool`]: every query goes to every provider.
///
/// Providers for one query run concurrently and are joined before the next
/// query starts. A failing provider only affects its own bucket, unless
/// every provider failed with a rate limit.
pub struct MultiSearch {
    providers: Vec<Arc<dyn SearchProvider>>,
    default_max_results: usize,
    notices: Mutex<Vec<String>>,
}

impl MultiSearch {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, default_max_results: usize) -> Self {
        let names: Vec<&str> = providers.iter().map(|p| p.display_name()).collect();
        info!(providers = %names.join(", "), "Configuring search providers");
        Self {
            providers,
            default_max_results: default_max_results.max(1),
            notices: Mutex::new(Vec::new()),
        }
    }

    async fn run_provider(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        topic: SearchTopic,
        limit: usize,
    ) -> SearchProviderResult {
        match provider.search(query, topic, limit).await {
            Ok(result) => result,
            Err(e) => {
                warn!(provider = provider.id(), query, error = %e, "Search provider failed");
                self.notices
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(format!("{} araması başarısız oldu: {e}", provider.display_name()));
                SearchProviderResult::failure(provider, query, &e)
            }
        }
    }

    fn format_bucket(lines: &mut Vec<String>, result: &SearchProviderResult, limit: usize) {
        lines.push(format!("[{}]", result.provider_name));

        if let Some(error) = &result.error {
            lines.push(format!("⚠️ {error}"));
            lines.push(String::new());
            return;
        }

        if let Some(summary) = &result.summary {
            lines.push(format!("Özet: {summary}"));
        }

        for (index, hit) in result.hits.iter().take(limit).enumerate() {
            lines.push(format!("{}. {}", index + 1, hit.title));
            if !hit.url.is_empty() {
                lines.push(format!("   URL: {}", hit.url));
            }
            let snippet = hit.snippet.trim();
            if !snippet.is_empty() {
                lines.push(format!("   İçerik: {}", ellipsize(snippet, BLOB_SNIPPET_CHARS)));
            }
        }
        lines.push(String::new());
    }
}

#[async_trait]
impl SearchTool for MultiSearch {
    async fn invoke(&self, args: SearchArgs) -> Result<String> {
        if args.queries.is_empty() {
            return Ok(NO_QUERIES_MESSAGE.to_string());
        }

        let limit = args
            .max_results
            .filter(|n| *n > 0)
            .unwrap_or(self.default_max_results);
        let mut lines = vec![RESULTS_HEADER.to_string(), String::new()];

        for query in &args.queries {
            lines.push(format!("Sorgu: {query}"));

            let results = join_all(
                self.providers
                    .iter()
                    .map(|provider| self.run_provider(provider.as_ref(), query, args.topic, limit)),
            )
            .await;

            if let Some(first) = results.first()
                && results.iter().all(|r| r.rate_limited)
            {
                let cause = first.error.clone().unwrap_or_default();
                warn!(provider = %first.provider_id, query, "Every search provider is rate limited");
                return Err(
                    ProviderRateLimitError::new(ProviderKind::Search, &first.provider_id, &cause)
                        .into(),
                );
            }

            for result in &results {
                Self::format_bucket(&mut lines, result, limit);
            }
            lines.push(String::new());
        }

        Ok(lines.join("\n").trim().to_string())
    }

    fn metadata(&self) -> SearchToolMetadata {
        SearchToolMetadata {
            provider_ids: self.providers.iter().map(|p| p.id().to_string()).collect(),
            provider_names: self
                .providers
                .iter()
                .map(|p| p.display_name().to_string())
                .collect(),
            notices: self
                .notices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
