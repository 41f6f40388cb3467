//! Error types for the Stratum core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering LLM, search, parsing, configuration, and provider rate limits.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level error type for the Stratum core library.
#[derive(Debug, thiserror::Error)]
pub enum StratumError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    RateLimit(#[from] ProviderRateLimitError),

    #[error("Failed to write report to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StratumError {
    /// The rate-limit payload, if this error is a provider rate limit.
    pub fn as_rate_limit(&self) -> Option<&ProviderRateLimitError> {
        match self {
            StratumError::RateLimit(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from web search providers.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request to {provider} failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Could not parse {provider} response: {message}")]
    ResponseParse { provider: String, message: String },

    #[error("{provider} is not available: {reason}")]
    Unavailable { provider: String, reason: String },
}

/// Raised when every JSON extraction strategy has been exhausted.
#[derive(Debug, thiserror::Error)]
#[error("No JSON object could be extracted ({} chars of model output)", .content.chars().count())]
pub struct ParseError {
    /// The original model output, kept for diagnostics.
    pub content: String,
}

/// Errors from the configuration system and provider registry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Unknown {kind} provider: {id}")]
    UnknownProvider { kind: ProviderKind, id: String },

    #[error("{kind} provider '{id}' is unavailable: {reason}")]
    ProviderUnavailable {
        kind: ProviderKind,
        id: String,
        reason: String,
    },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Which capability a provider backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Llm,
    Search,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Llm => write!(f, "llm"),
            ProviderKind::Search => write!(f, "search"),
        }
    }
}

/// A rate-limit failure attributed to one concrete provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Rate limit ({provider_type}:{provider_id}): {message}")]
pub struct ProviderRateLimitError {
    pub provider_type: ProviderKind,
    pub provider_id: String,
    /// Display form of the underlying failure.
    pub message: String,
}

impl ProviderRateLimitError {
    pub fn new(
        provider_type: ProviderKind,
        provider_id: impl Into<String>,
        cause: &dyn std::fmt::Display,
    ) -> Self {
        Self {
            provider_type,
            provider_id: provider_id.into(),
            message: cause.to_string(),
        }
    }
}

/// A type alias for results using the top-level `StratumError`.
pub type Result<T> = std::result::Result<T, StratumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = StratumError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_rate_limit() {
        let err = StratumError::from(ProviderRateLimitError::new(
            ProviderKind::Llm,
            "anthropic-claude",
            &"429 Too Many Requests",
        ));
        assert_eq!(
            err.to_string(),
            "Rate limit (llm:anthropic-claude): 429 Too Many Requests"
        );
        assert!(err.as_rate_limit().is_some());
    }

    #[test]
    fn test_error_display_search_status() {
        let err = SearchError::Status {
            provider: "Tavily Search".into(),
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Tavily Search returned HTTP 502: bad gateway");
    }

    #[test]
    fn test_parse_error_counts_chars() {
        let err = ParseError {
            content: "çöp".into(),
        };
        assert!(err.to_string().contains("3 chars"));
    }

    #[test]
    fn test_unknown_provider_display() {
        let err = ConfigError::UnknownProvider {
            kind: ProviderKind::Search,
            id: "bing".into(),
        };
        assert_eq!(err.to_string(), "Unknown search provider: bing");
        assert!(StratumError::from(err).as_rate_limit().is_none());
    }
}
