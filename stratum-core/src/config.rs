//! Configuration system for Stratum.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/stratum/config.toml` and/or `.stratum/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::research::layers::{ResearchLayer, default_layers};
use crate::research::sources::{SignalRule, default_signal_rules, default_type_priority};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratumConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub writer: WriterConfig,
    pub quality: QualityConfig,
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Wire protocol a chat provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// OpenAI chat completions, also used for OpenRouter.
    OpenAi,
    Anthropic,
}

/// One configured chat provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub id: String,
    pub display_name: String,
    pub kind: LlmProviderKind,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Chat provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub temperature: f32,
    /// Maximum tokens to generate per response.
    pub max_tokens: Option<usize>,
    pub timeout_secs: u64,
    pub providers: Vec<LlmProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "anthropic-claude".to_string(),
            temperature: 0.7,
            max_tokens: Some(4096),
            timeout_secs: 120,
            providers: default_llm_providers(),
        }
    }
}

impl LlmConfig {
    pub fn provider(&self, id: &str) -> Option<&LlmProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.provider(&self.default_provider).is_none() {
            warnings.push(format!(
                "llm.default_provider '{}' is not among the configured providers",
                self.default_provider
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                self.temperature
            ));
        }
        if self.max_tokens == Some(0) {
            warnings.push("llm.max_tokens is 0; every response would be empty".to_string());
        }
        warnings
    }
}

fn default_llm_providers() -> Vec<LlmProviderConfig> {
    vec![
        LlmProviderConfig {
            id: "openrouter-nemotron".to_string(),
            display_name: "OpenRouter · NVIDIA Nemotron".to_string(),
            kind: LlmProviderKind::OpenAi,
            model: "nvidia/nemotron-nano-9b-v2:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            description: "NVIDIA Nemotron Nano 9B through the OpenRouter API".to_string(),
            is_default: false,
        },
        LlmProviderConfig {
            id: "openai-gpt4".to_string(),
            display_name: "OpenAI · GPT-4o".to_string(),
            kind: LlmProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            description: "OpenAI GPT-4o family".to_string(),
            is_default: false,
        },
        LlmProviderConfig {
            id: "anthropic-claude".to_string(),
            display_name: "Anthropic · Claude".to_string(),
            kind: LlmProviderKind::Anthropic,
            model: "claude-3-haiku-20240307".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            description: "Anthropic Claude with a long context window".to_string(),
            is_default: true,
        },
    ]
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Which search API a provider entry talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
    Exa,
    SerpApi,
    YouCom,
}

/// One configured search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    pub id: String,
    pub display_name: String,
    pub kind: SearchProviderKind,
    pub api_key_env: String,
    /// Endpoint override, mainly for self-hosted proxies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Web search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_providers: Vec<String>,
    /// Results per provider per query.
    pub max_results: usize,
    pub timeout_secs: u64,
    pub providers: Vec<SearchProviderConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_providers: vec!["tavily".to_string()],
            max_results: 5,
            timeout_secs: 30,
            providers: default_search_providers(),
        }
    }
}

impl SearchConfig {
    pub fn provider(&self, id: &str) -> Option<&SearchProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_results == 0 {
            warnings.push("search.max_results is 0; searches would return nothing".to_string());
        }
        for id in &self.default_providers {
            if self.provider(id).is_none() {
                warnings.push(format!(
                    "search.default_providers entry '{id}' is not among the configured providers"
                ));
            }
        }
        warnings
    }
}

fn default_search_providers() -> Vec<SearchProviderConfig> {
    vec![
        SearchProviderConfig {
            id: "tavily".to_string(),
            display_name: "Tavily Search".to_string(),
            kind: SearchProviderKind::Tavily,
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: None,
            description: "Tavily web search with generated answers".to_string(),
            is_default: true,
        },
        SearchProviderConfig {
            id: "exa".to_string(),
            display_name: "Exa Semantic Search".to_string(),
            kind: SearchProviderKind::Exa,
            api_key_env: "EXA_API_KEY".to_string(),
            base_url: None,
            description: "Semantic web search with autoprompt".to_string(),
            is_default: false,
        },
        SearchProviderConfig {
            id: "serpapi".to_string(),
            display_name: "SerpAPI Google Search".to_string(),
            kind: SearchProviderKind::SerpApi,
            api_key_env: "SERPAPI_API_KEY".to_string(),
            base_url: None,
            description: "Google result pages through SerpAPI".to_string(),
            is_default: false,
        },
        SearchProviderConfig {
            id: "youcom".to_string(),
            display_name: "You.com Search".to_string(),
            kind: SearchProviderKind::YouCom,
            api_key_env: "YOUCOM_API_KEY".to_string(),
            base_url: None,
            description: "You.com multi-source web search with short answers".to_string(),
            is_default: false,
        },
    ]
}

// ---------------------------------------------------------------------------
// Research, writing, quality, output
// ---------------------------------------------------------------------------

/// Layered research configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Query budget used by the report pipeline.
    pub initial_queries: usize,
    /// Query budget when a caller supplies none.
    pub default_queries: usize,
    pub layers: Vec<ResearchLayer>,
    pub signal_rules: Vec<SignalRule>,
    pub type_priority: BTreeMap<String, u8>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            initial_queries: 4,
            default_queries: 3,
            layers: default_layers(),
            signal_rules: default_signal_rules(),
            type_priority: default_type_priority(),
        }
    }
}

/// Section writing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Pause between sections, in milliseconds.
    pub section_pause_ms: u64,
    /// Research characters shown to the report planner.
    pub plan_research_chars: usize,
    /// Language every written text is requested in.
    pub language: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            section_pause_ms: 1000,
            plan_research_chars: 2000,
            language: "Turkish".to_string(),
        }
    }
}

/// Quality-control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub enabled: bool,
    /// Reports scoring below this are fixed.
    pub fix_threshold: u8,
    /// Reports scoring below this are also rewritten by the model.
    pub llm_fix_threshold: u8,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fix_threshold: 70,
            llm_fix_threshold: 60,
        }
    }
}

/// Where reports are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub report_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("raporlar"),
        }
    }
}

impl StratumConfig {
    /// Validate the whole configuration and return human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.search.validate());
        if self.research.layers.is_empty() {
            warnings.push("research.layers is empty; no research can be planned".to_string());
        }
        if self.research.initial_queries == 0 {
            warnings.push(
                "research.initial_queries is 0; every layer will get a single query".to_string(),
            );
        }
        if self.quality.llm_fix_threshold > self.quality.fix_threshold {
            warnings.push(format!(
                "quality.llm_fix_threshold ({}) exceeds quality.fix_threshold ({}); \
                 model repairs only run for reports that are already being fixed",
                self.quality.llm_fix_threshold, self.quality.fix_threshold
            ));
        }
        warnings
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "stratum", "stratum")
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform data directory used for log files.
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `STRATUM_`, `__` for nesting)
/// 3. Workspace-local config (`.stratum/config.toml`)
/// 4. User config (`~/.config/stratum/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&StratumConfig>,
) -> Result<StratumConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(StratumConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".stratum").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // STRATUM_SEARCH__MAX_RESULTS, STRATUM_LLM__DEFAULT_PROVIDER, ...
    figment = figment.merge(Env::prefixed("STRATUM_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
