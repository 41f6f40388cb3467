//! Rate-limit detection and failover bookkeeping.
//!
//! Every backend failure is classified here. A failure counts as a rate
//! limit when it carries HTTP 429, when its variant is a dedicated
//! rate-limit variant, or when its message matches one of
//! [`RATE_LIMIT_KEYWORDS`]. The [`FailoverTracker`] remembers which
//! providers a logical run already tried and the notices produced on each
//! switch.

use crate::error::{LlmError, ProviderKind, ProviderRateLimitError, SearchError};
use tracing::info;

/// Lowercase message fragments that mark a rate-limit failure.
pub const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "exceeded your",
    "exceed your",
];

/// What a failure can tell the classifier about itself.
pub trait RateLimitSignature: std::fmt::Display {
    /// HTTP status attached to the failure, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Whether the failure is a dedicated rate-limit variant.
    fn is_rate_limit_variant(&self) -> bool {
        false
    }
}

impl RateLimitSignature for LlmError {
    fn is_rate_limit_variant(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

impl RateLimitSignature for SearchError {
    fn status_code(&self) -> Option<u16> {
        match self {
            SearchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Whether a free-text failure message reads like a rate limit.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RATE_LIMIT_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Classify any backend failure.
pub fn is_rate_limited<E: RateLimitSignature + ?Sized>(error: &E) -> bool {
    error.status_code() == Some(429)
        || error.is_rate_limit_variant()
        || is_rate_limit_message(&error.to_string())
}

/// Classify a chat-provider failure.
pub fn is_rate_limit_error(error: &LlmError) -> bool {
    is_rate_limited(error)
}

/// Classify a search-provider failure.
pub fn is_search_rate_limit(error: &SearchError) -> bool {
    is_rate_limited(error)
}

// ---------------------------------------------------------------------------
// Failover tracking
// ---------------------------------------------------------------------------

/// Providers tried during one logical run, plus the notices collected.
#[derive(Debug, Clone, Default)]
pub struct FailoverTracker {
    attempted_llm: Vec<String>,
    attempted_search: Vec<String>,
    notices: Vec<String>,
}

impl FailoverTracker {
    /// Start tracking with providers the caller already tried.
    pub fn new(attempted_llm: impl IntoIterator<Item = String>) -> Self {
        let mut tracker = Self::default();
        for id in attempted_llm {
            tracker.mark_attempted(ProviderKind::Llm, &id);
        }
        tracker
    }

    /// Record that a provider has been used in this run.
    pub fn mark_attempted(&mut self, kind: ProviderKind, id: &str) {
        let id = super::normalize_provider_id(id);
        if id.is_empty() {
            return;
        }
        let list = self.list_mut(kind);
        if !list.contains(&id) {
            list.push(id);
        }
    }

    /// Ids already attempted for a capability, in first-use order.
    pub fn attempted(&self, kind: ProviderKind) -> &[String] {
        match kind {
            ProviderKind::Llm => &self.attempted_llm,
            ProviderKind::Search => &self.attempted_search,
        }
    }

    /// Record a provider switch and the notice shown to the caller.
    pub fn record_switch(&mut self, failure: &ProviderRateLimitError, replacement: &str) {
        let label = match failure.provider_type {
            ProviderKind::Llm => "LLM",
            ProviderKind::Search => "Arama",
        };
        let notice = format!(
            "{label} sağlayıcısı '{}' rate limit nedeniyle '{replacement}' ile değiştirildi.",
            failure.provider_id
        );
        info!(
            kind = %failure.provider_type,
            from = %failure.provider_id,
            to = %replacement,
            "Switching provider after rate limit"
        );
        self.mark_attempted(failure.provider_type, &failure.provider_id);
        self.mark_attempted(failure.provider_type, replacement);
        self.notices.push(notice);
    }

    /// Append a free-form notice.
    pub fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn into_notices(self) -> Vec<String> {
        self.notices
    }

    fn list_mut(&mut self, kind: ProviderKind) -> &mut Vec<String> {
        match kind {
            ProviderKind::Llm => &mut self.attempted_llm,
            ProviderKind::Search => &mut self.attempted_search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_variant_detected() {
        assert!(is_rate_limit_error(&LlmError::RateLimited {
            retry_after_secs: 30
        }));
    }

    #[test]
    fn test_keyword_detection_is_case_insensitive() {
        assert!(is_rate_limit_message("Too Many Requests"));
        assert!(is_rate_limit_message("You have EXCEEDED YOUR quota"));
        assert!(is_rate_limit_message("status 429"));
        assert!(!is_rate_limit_message("connection reset by peer"));
    }

    #[test]
    fn test_search_status_429_detected() {
        let err = SearchError::Status {
            provider: "Exa Search".into(),
            status: 429,
            body: String::new(),
        };
        assert!(is_search_rate_limit(&err));

        let err = SearchError::Status {
            provider: "Exa Search".into(),
            status: 500,
            body: "internal".into(),
        };
        assert!(!is_search_rate_limit(&err));
    }

    #[test]
    fn test_plain_errors_not_rate_limits() {
        assert!(!is_rate_limit_error(&LlmError::AuthFailed {
            provider: "openai".into()
        }));
        assert!(!is_rate_limit_error(&LlmError::Timeout { timeout_secs: 120 }));
    }

    #[test]
    fn test_tracker_normalizes_and_dedupes() {
        let mut tracker = FailoverTracker::new(vec![" LLM-A ".to_string()]);
        tracker.mark_attempted(ProviderKind::Llm, "llm-a");
        tracker.mark_attempted(ProviderKind::Search, "tavily");
        assert_eq!(tracker.attempted(ProviderKind::Llm), ["llm-a".to_string()]);
        assert_eq!(tracker.attempted(ProviderKind::Search), ["tavily".to_string()]);
    }

    #[test]
    fn test_tracker_records_switch_notice() {
        let mut tracker = FailoverTracker::default();
        let failure = ProviderRateLimitError::new(ProviderKind::Llm, "llm-a", &"429");
        tracker.record_switch(&failure, "llm-b");
        assert_eq!(tracker.notices().len(), 1);
        assert!(tracker.notices()[0].contains("llm-a"));
        assert!(tracker.notices()[0].contains("llm-b"));
        assert_eq!(tracker.attempted(ProviderKind::Llm).len(), 2);
    }
}
