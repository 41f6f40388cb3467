//! LLM and search provider registry.
//!
//! Concrete LLM providers:
//! - OpenAI-compatible APIs (OpenAI, OpenRouter, local endpoints)
//! - Anthropic Messages API (Claude models)
//!
//! Search providers live in [`crate::search`]. The [`ProviderRegistry`] is the
//! factory for both kinds, keyed by normalized provider id.

pub mod anthropic;
pub mod failover;
pub mod openai_compat;

use crate::brain::{Brain, LlmProvider};
use crate::config::{
    LlmConfig, LlmProviderConfig, LlmProviderKind, SearchConfig, SearchProviderConfig,
    SearchProviderKind, StratumConfig,
};
use crate::error::{ConfigError, ProviderKind};
use crate::search::exa::ExaProvider;
use crate::search::serpapi::SerpApiProvider;
use crate::search::tavily::TavilyProvider;
use crate::search::youcom::YouComProvider;
use crate::search::{MultiSearch, SearchProvider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub use anthropic::AnthropicProvider;
pub use failover::{FailoverTracker, is_rate_limit_error, is_search_rate_limit};
pub use openai_compat::OpenAiCompatibleProvider;

/// Provider ids compare trimmed and case-insensitively.
pub fn normalize_provider_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Whether a provider can be instantiated right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// A provider as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEntry {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub is_default: bool,
    pub availability: Availability,
}

fn key_availability(env_var: &str) -> Availability {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Availability::Available,
        _ => Availability::Unavailable {
            reason: format!("environment variable {env_var} is not set"),
        },
    }
}

fn is_local_endpoint(config: &LlmProviderConfig) -> bool {
    config
        .base_url
        .as_deref()
        .is_some_and(|url| url.contains("localhost") || url.contains("127.0.0.1"))
}

fn sort_options(mut entries: Vec<ProviderEntry>) -> Vec<ProviderEntry> {
    entries.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    entries
}

/// Factory for LLM brains and search tools, keyed by provider id.
pub struct ProviderRegistry {
    llm: LlmConfig,
    search: SearchConfig,
    llm_instances: HashMap<String, Arc<dyn LlmProvider>>,
    search_instances: HashMap<String, Arc<dyn SearchProvider>>,
}

impl ProviderRegistry {
    pub fn new(llm: LlmConfig, search: SearchConfig) -> Self {
        Self {
            llm,
            search,
            llm_instances: HashMap::new(),
            search_instances: HashMap::new(),
        }
    }

    pub fn from_config(config: &StratumConfig) -> Self {
        Self::new(config.llm.clone(), config.search.clone())
    }

    // -----------------------------------------------------------------------
    // Pre-built instances
    // -----------------------------------------------------------------------

    /// Register a ready-made LLM provider under `id`, bypassing key checks.
    ///
    /// Unknown ids are appended to the declaration order.
    pub fn register_llm_instance(&mut self, id: &str, provider: Arc<dyn LlmProvider>) {
        let id = normalize_provider_id(id);
        if self.llm_config(&id).is_none() {
            self.llm.providers.push(LlmProviderConfig {
                id: id.clone(),
                display_name: id.clone(),
                kind: LlmProviderKind::OpenAi,
                model: provider.model_name().to_string(),
                api_key_env: String::new(),
                base_url: None,
                description: String::new(),
                is_default: false,
            });
        }
        self.llm_instances.insert(id, provider);
    }

    /// Register a ready-made search provider under `id`, bypassing key checks.
    pub fn register_search_instance(&mut self, id: &str, provider: Arc<dyn SearchProvider>) {
        let id = normalize_provider_id(id);
        if self.search_config(&id).is_none() {
            self.search.providers.push(SearchProviderConfig {
                id: id.clone(),
                display_name: provider.display_name().to_string(),
                kind: SearchProviderKind::Tavily,
                api_key_env: String::new(),
                base_url: None,
                description: String::new(),
                is_default: false,
            });
        }
        self.search_instances.insert(id, provider);
    }

    fn llm_config(&self, id: &str) -> Option<&LlmProviderConfig> {
        self.llm
            .providers
            .iter()
            .find(|p| normalize_provider_id(&p.id) == id)
    }

    fn search_config(&self, id: &str) -> Option<&SearchProviderConfig> {
        self.search
            .providers
            .iter()
            .find(|p| normalize_provider_id(&p.id) == id)
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    pub fn default_llm_id(&self) -> String {
        normalize_provider_id(&self.llm.default_provider)
    }

    pub fn default_search_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.search.default_providers.iter().map(|id| normalize_provider_id(id)) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    fn llm_availability(&self, config: &LlmProviderConfig) -> Availability {
        let id = normalize_provider_id(&config.id);
        if self.llm_instances.contains_key(&id) || is_local_endpoint(config) {
            Availability::Available
        } else {
            key_availability(&config.api_key_env)
        }
    }

    fn search_availability(&self, config: &SearchProviderConfig) -> Availability {
        if self
            .search_instances
            .contains_key(&normalize_provider_id(&config.id))
        {
            Availability::Available
        } else {
            key_availability(&config.api_key_env)
        }
    }

    /// LLM providers in declaration order.
    pub fn llm_entries(&self) -> Vec<ProviderEntry> {
        let default_id = self.default_llm_id();
        self.llm
            .providers
            .iter()
            .map(|p| {
                let id = normalize_provider_id(&p.id);
                ProviderEntry {
                    is_default: p.is_default || id == default_id,
                    id,
                    display_name: p.display_name.clone(),
                    description: p.description.clone(),
                    availability: self.llm_availability(p),
                }
            })
            .collect()
    }

    /// Search providers in declaration order.
    pub fn search_entries(&self) -> Vec<ProviderEntry> {
        let defaults = self.default_search_ids();
        self.search
            .providers
            .iter()
            .map(|p| {
                let id = normalize_provider_id(&p.id);
                ProviderEntry {
                    is_default: p.is_default || defaults.contains(&id),
                    id,
                    display_name: p.display_name.clone(),
                    description: p.description.clone(),
                    availability: self.search_availability(p),
                }
            })
            .collect()
    }

    /// LLM providers with defaults first, then by display name.
    pub fn llm_options(&self) -> Vec<ProviderEntry> {
        sort_options(self.llm_entries())
    }

    pub fn search_options(&self) -> Vec<ProviderEntry> {
        sort_options(self.search_entries())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Build a [`Brain`] for `id`, or the configured default.
    pub fn create_llm(&self, id: Option<&str>) -> Result<Brain, ConfigError> {
        let id = id
            .map(normalize_provider_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.default_llm_id());

        let config = self
            .llm_config(&id)
            .ok_or_else(|| ConfigError::UnknownProvider {
                kind: ProviderKind::Llm,
                id: id.clone(),
            })?;

        let provider: Arc<dyn LlmProvider> = match self.llm_instances.get(&id) {
            Some(instance) => instance.clone(),
            None => {
                let timeout = self.llm.timeout_secs;
                let built: Result<Arc<dyn LlmProvider>, _> = match config.kind {
                    LlmProviderKind::Anthropic => AnthropicProvider::new(config, timeout)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                    LlmProviderKind::OpenAi => OpenAiCompatibleProvider::new(config, timeout)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                };
                built.map_err(|e| ConfigError::ProviderUnavailable {
                    kind: ProviderKind::Llm,
                    id: id.clone(),
                    reason: e.to_string(),
                })?
            }
        };

        info!(provider = %id, model = provider.model_name(), "Using LLM provider");
        Ok(Brain::new(provider, id)
            .with_temperature(self.llm.temperature)
            .with_max_tokens(self.llm.max_tokens))
    }

    fn build_search_provider(
        &self,
        config: &SearchProviderConfig,
    ) -> Result<Arc<dyn SearchProvider>, String> {
        let id = normalize_provider_id(&config.id);
        if let Some(instance) = self.search_instances.get(&id) {
            return Ok(instance.clone());
        }
        let timeout = self.search.timeout_secs;
        let built: Result<Arc<dyn SearchProvider>, _> = match config.kind {
            SearchProviderKind::Tavily => {
                TavilyProvider::new(config, timeout).map(|p| Arc::new(p) as Arc<dyn SearchProvider>)
            }
            SearchProviderKind::Exa => {
                ExaProvider::new(config, timeout).map(|p| Arc::new(p) as Arc<dyn SearchProvider>)
            }
            SearchProviderKind::SerpApi => SerpApiProvider::new(config, timeout)
                .map(|p| Arc::new(p) as Arc<dyn SearchProvider>),
            SearchProviderKind::YouCom => {
                YouComProvider::new(config, timeout).map(|p| Arc::new(p) as Arc<dyn SearchProvider>)
            }
        };
        built.map_err(|e| e.to_string())
    }

    /// Build providers for `ids`, skipping unknown and unavailable ones.
    fn build_search_providers(&self, ids: &[String]) -> (Vec<Arc<dyn SearchProvider>>, Vec<String>) {
        let mut providers = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut problems = Vec::new();

        for id in ids.iter().map(|id| normalize_provider_id(id)) {
            if id.is_empty() || seen.contains(&id) {
                continue;
            }
            seen.push(id.clone());

            let Some(config) = self.search_config(&id) else {
                warn!(provider = %id, "Skipping unknown search provider");
                problems.push(format!("unknown provider '{id}'"));
                continue;
            };
            match self.build_search_provider(config) {
                Ok(provider) => providers.push(provider),
                Err(reason) => {
                    warn!(provider = %id, reason = %reason, "Skipping unavailable search provider");
                    problems.push(format!("{id}: {reason}"));
                }
            }
        }
        (providers, problems)
    }

    /// Build the fan-out search tool over `ids`.
    ///
    /// Unknown or unavailable ids are skipped. When nothing usable remains the
    /// configured default providers are used instead.
    pub fn create_search_tool(
        &self,
        ids: &[String],
        max_results: Option<usize>,
    ) -> Result<MultiSearch, ConfigError> {
        let max_results = max_results
            .filter(|n| *n > 0)
            .unwrap_or(self.search.max_results);

        let (providers, mut problems) = self.build_search_providers(ids);
        if !providers.is_empty() {
            return Ok(MultiSearch::new(providers, max_results));
        }

        let defaults = self.default_search_ids();
        if !ids.is_empty() {
            warn!(requested = ?ids, defaults = ?defaults, "No usable search provider requested; using defaults");
        }
        let (providers, default_problems) = self.build_search_providers(&defaults);
        if !providers.is_empty() {
            return Ok(MultiSearch::new(providers, max_results));
        }

        problems.extend(default_problems);
        Err(ConfigError::ProviderUnavailable {
            kind: ProviderKind::Search,
            id: defaults.join(","),
            reason: if problems.is_empty() {
                "no search providers configured".to_string()
            } else {
                problems.join("; ")
            },
        })
    }

    // -----------------------------------------------------------------------
    // Failover
    // -----------------------------------------------------------------------

    /// First available LLM provider, in declaration order, not yet attempted.
    pub fn alternative_llm(&self, attempted: &[String]) -> Option<String> {
        Self::first_untried(self.llm_entries(), attempted)
    }

    /// First available search provider, in declaration order, not yet attempted.
    pub fn alternative_search(&self, attempted: &[String]) -> Option<String> {
        Self::first_untried(self.search_entries(), attempted)
    }

    fn first_untried(entries: Vec<ProviderEntry>, attempted: &[String]) -> Option<String> {
        let attempted: Vec<String> = attempted.iter().map(|id| normalize_provider_id(id)).collect();
        entries
            .into_iter()
            .find(|entry| entry.availability.is_available() && !attempted.contains(&entry.id))
            .map(|entry| entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::SearchError;
    use crate::search::{SearchProviderResult, SearchTool, SearchTopic};
    use async_trait::async_trait;

    const MISSING_ENV: &str = "STRATUM_TEST_REGISTRY_KEY_MISSING";

    struct NamedSearch(String);

    #[async_trait]
    impl SearchProvider for NamedSearch {
        fn id(&self) -> &str {
            &self.0
        }

        fn display_name(&self) -> &str {
            &self.0
        }

        async fn search(
            &self,
            query: &str,
            _topic: SearchTopic,
            _max_results: usize,
        ) -> Result<SearchProviderResult, SearchError> {
            Ok(SearchProviderResult::success(self, query, None, Vec::new()))
        }
    }

    fn offline_registry() -> ProviderRegistry {
        let mut llm = LlmConfig::default();
        for provider in &mut llm.providers {
            provider.api_key_env = MISSING_ENV.to_string();
        }
        let mut search = SearchConfig::default();
        for provider in &mut search.providers {
            provider.api_key_env = MISSING_ENV.to_string();
        }
        ProviderRegistry::new(llm, search)
    }

    fn mock_llm(model: &str) -> Arc<dyn LlmProvider> {
        Arc::new(MockLlmProvider::with_response("ok").with_model(model))
    }

    fn named_search(id: &str) -> Arc<dyn SearchProvider> {
        Arc::new(NamedSearch(id.to_string()))
    }

    #[test]
    fn test_normalize_provider_id() {
        assert_eq!(normalize_provider_id("  OpenAI-GPT4 "), "openai-gpt4");
    }

    #[test]
    fn test_missing_keys_are_unavailable() {
        let registry = offline_registry();
        let entries = registry.llm_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| !e.availability.is_available()));
        match &entries[0].availability {
            Availability::Unavailable { reason } => assert!(reason.contains(MISSING_ENV)),
            other => panic!("Expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_present_env_var_is_available() {
        let mut llm = LlmConfig::default();
        llm.providers[0].api_key_env = "PATH".to_string();
        let registry = ProviderRegistry::new(llm, SearchConfig::default());
        assert!(registry.llm_entries()[0].availability.is_available());
    }

    #[test]
    fn test_create_llm_unknown_and_unavailable() {
        let registry = offline_registry();
        assert!(matches!(
            registry.create_llm(Some("does-not-exist")),
            Err(ConfigError::UnknownProvider { .. })
        ));
        match registry.create_llm(None) {
            Err(ConfigError::ProviderUnavailable { kind, id, .. }) => {
                assert_eq!(kind, ProviderKind::Llm);
                assert_eq!(id, "anthropic-claude");
            }
            Err(other) => panic!("Expected unavailable, got {:?}", other),
            Ok(_) => panic!("Expected an error"),
        }
    }

    #[test]
    fn test_registered_instance_bypasses_env() {
        let mut registry = offline_registry();
        registry.register_llm_instance(" OpenAI-GPT4 ", mock_llm("mock-gpt"));
        let brain = registry.create_llm(Some("openai-gpt4")).unwrap();
        assert_eq!(brain.provider_id(), "openai-gpt4");
        assert_eq!(brain.model_name(), "mock-gpt");
    }

    #[test]
    fn test_register_unknown_id_appends_entry() {
        let mut registry = offline_registry();
        registry.register_llm_instance("llm-b", mock_llm("b"));
        let entries = registry.llm_entries();
        assert_eq!(entries.last().unwrap().id, "llm-b");
        assert!(entries.last().unwrap().availability.is_available());
    }

    #[test]
    fn test_alternative_llm_respects_order_and_attempted() {
        let mut registry = offline_registry();
        registry.register_llm_instance("llm-a", mock_llm("a"));
        registry.register_llm_instance("llm-b", mock_llm("b"));

        assert_eq!(registry.alternative_llm(&[]), Some("llm-a".to_string()));
        assert_eq!(
            registry.alternative_llm(&["LLM-A".to_string()]),
            Some("llm-b".to_string())
        );
        assert_eq!(
            registry.alternative_llm(&["llm-a".to_string(), "llm-b".to_string()]),
            None
        );
    }

    #[test]
    fn test_alternative_search() {
        let mut registry = offline_registry();
        registry.register_search_instance("exa", named_search("exa"));
        assert_eq!(registry.alternative_search(&["tavily".into()]), Some("exa".into()));
        assert_eq!(registry.alternative_search(&["exa".into()]), None);
    }

    #[test]
    fn test_create_search_tool_skips_unknown_ids() {
        let mut registry = offline_registry();
        registry.register_search_instance("exa", named_search("exa"));
        let tool = registry
            .create_search_tool(&["bing".into(), "EXA".into(), "exa".into()], None)
            .unwrap();
        assert_eq!(tool.metadata().provider_ids, vec!["exa"]);
    }

    #[test]
    fn test_create_search_tool_falls_back_to_defaults() {
        let mut registry = offline_registry();
        registry.register_search_instance("tavily", named_search("tavily"));
        let tool = registry.create_search_tool(&["bing".into()], Some(3)).unwrap();
        assert_eq!(tool.metadata().provider_ids, vec!["tavily"]);
    }

    #[test]
    fn test_create_search_tool_without_usable_provider() {
        let registry = offline_registry();
        match registry.create_search_tool(&[], None) {
            Err(ConfigError::ProviderUnavailable { kind, reason, .. }) => {
                assert_eq!(kind, ProviderKind::Search);
                assert!(reason.contains(MISSING_ENV));
            }
            Err(other) => panic!("Expected unavailable, got {:?}", other),
            Ok(_) => panic!("Expected an error"),
        }
    }

    #[test]
    fn test_options_put_defaults_first() {
        let registry = offline_registry();
        let options = registry.llm_options();
        assert_eq!(options[0].id, "anthropic-claude");
        assert!(options[0].is_default);
        let rest: Vec<&str> = options[1..].iter().map(|e| e.display_name.as_str()).collect();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted);

        let search = registry.search_options();
        assert_eq!(search[0].id, "tavily");
        assert_eq!(search.len(), 4);
    }
}
