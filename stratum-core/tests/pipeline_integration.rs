//! Integration tests for the report service: provider failover, scripted
//! end-to-end runs and report persistence.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use stratum_core::error::LlmError;
use stratum_core::search::SEARCH_TOOL_NAME;
use stratum_core::{
    MockLlmProvider, MockSearchProvider, ProviderRegistry, ReportService, StratumConfig,
};

fn test_config() -> StratumConfig {
    let mut config = StratumConfig::default();
    config.llm.providers.clear();
    config.llm.default_provider = "llm-a".to_string();
    config.search.providers.clear();
    config.search.default_providers = vec!["search-a".to_string()];
    config.writer.section_pause_ms = 0;
    config
}

struct Harness {
    service: ReportService,
    llm_a: Arc<MockLlmProvider>,
    llm_b: Option<Arc<MockLlmProvider>>,
    search_a: Arc<MockSearchProvider>,
    search_b: Option<Arc<MockSearchProvider>>,
}

fn harness(config: StratumConfig, llm_a: MockLlmProvider, with_alternatives: bool) -> Harness {
    let mut registry = ProviderRegistry::new(config.llm.clone(), config.search.clone());

    let llm_a = Arc::new(llm_a);
    registry.register_llm_instance("llm-a", llm_a.clone());
    let search_a = Arc::new(MockSearchProvider::new("search-a"));
    registry.register_search_instance("search-a", search_a.clone());

    let (llm_b, search_b) = if with_alternatives {
        let llm_b = Arc::new(MockLlmProvider::with_response("not json at all"));
        registry.register_llm_instance("llm-b", llm_b.clone());
        let search_b = Arc::new(MockSearchProvider::new("search-b"));
        registry.register_search_instance("search-b", search_b.clone());
        (Some(llm_b), Some(search_b))
    } else {
        (None, None)
    };

    Harness {
        service: ReportService::with_registry(config, registry),
        llm_a,
        llm_b,
        search_a,
        search_b,
    }
}

// ---------------------------------------------------------------------------
// Scripted end-to-end run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scripted_run_returns_quality_checked_report() {
    let llm = MockLlmProvider::new();
    // Research: query plan, gap analysis, synthesis.
    llm.queue_text("not a plan");
    llm.queue_text("no analysis either");
    llm.queue_text("Edge AI is growing quickly.");
    // Outline with two sections that need no extra research.
    llm.queue_text(
        &json!({
            "title": "Edge AI Report",
            "sections": [
                {"name": "Market", "description": "Market size", "research": false},
                {"name": "Outlook", "description": "Next steps", "research": "false"}
            ]
        })
        .to_string(),
    );
    llm.queue_text("# Market\n\nThe market grows.");
    llm.queue_text("# Outlook\n\nThe outlook is bright.");
    let compiled = "# Edge AI Report\n\n## Introduction\n\nShort intro.\n\n## Conclusion\n\nDone.";
    llm.queue_text(compiled);
    llm.queue_text(r#"{"overall_score": 95, "severity": "low"}"#);

    let h = harness(test_config(), llm, false);
    let result = h.service.generate_report("Edge AI", None).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.content, compiled);
    assert_eq!(result.llm_provider_id.as_deref(), Some("llm-a"));
    assert_eq!(result.search_provider_ids, vec!["search-a".to_string()]);
    assert!(result.notices.is_empty(), "unexpected notices: {:?}", result.notices);
    assert_eq!(h.llm_a.call_count(), 8);
    assert!(!h.search_a.queries().is_empty());
}

#[tokio::test]
async fn test_unparseable_replies_fall_back_and_still_report() {
    let h = harness(test_config(), MockLlmProvider::with_response("not json at all"), false);
    let result = h.service.generate_report("Kuantum bilgisayarlar", None).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert!(!result.content.is_empty());
    assert!(
        result.notices.iter().any(|n| n.contains("varsayılan bölüm yapısı")),
        "missing plan fallback notice: {:?}",
        result.notices
    );
}

#[tokio::test]
async fn test_blank_topic_is_rejected_before_any_call() {
    let h = harness(test_config(), MockLlmProvider::new(), false);
    let result = h.service.generate_report("   ", None).await;

    assert_eq!(result.error.as_deref(), Some("Lütfen bir rapor konusu girin."));
    assert_eq!(h.llm_a.call_count(), 0);
    assert!(h.search_a.queries().is_empty());
}

// ---------------------------------------------------------------------------
// Failover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_llm_rate_limit_switches_to_next_provider() {
    let llm_a = MockLlmProvider::new();
    llm_a.queue_error(LlmError::RateLimited { retry_after_secs: 30 });

    let h = harness(test_config(), llm_a, true);
    let result = h.service.generate_report("Edge AI", None).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.llm_provider_id.as_deref(), Some("llm-b"));
    assert!(
        result
            .notices
            .iter()
            .any(|n| n.contains("'llm-a'") && n.contains("'llm-b'")),
        "missing switch notice: {:?}",
        result.notices
    );
    assert_eq!(h.llm_a.call_count(), 1);
    assert!(h.llm_b.as_ref().is_some_and(|b| b.call_count() > 0));
}

#[tokio::test]
async fn test_llm_rate_limit_without_alternative_fails_with_message() {
    let llm_a = MockLlmProvider::new();
    llm_a.queue_error(LlmError::RateLimited { retry_after_secs: 30 });

    let h = harness(test_config(), llm_a, false);
    let result = h.service.generate_report("Edge AI", None).await;

    assert!(!result.is_success());
    let error = result.error.unwrap_or_default();
    assert!(error.contains("'llm-a'"), "error was: {error}");
    assert!(error.contains("başka sağlayıcı yok"), "error was: {error}");
    assert!(result.content.is_empty());
}

#[tokio::test]
async fn test_previously_attempted_llm_is_skipped() {
    let h = harness(test_config(), MockLlmProvider::new(), true);
    let result = h
        .service
        .generate_report("Edge AI", Some(vec!["LLM-A".to_string()]))
        .await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.llm_provider_id.as_deref(), Some("llm-b"));
    assert_eq!(h.llm_a.call_count(), 0);
}

#[tokio::test]
async fn test_search_rate_limit_in_section_research_switches_search_provider() {
    // Every reply is a search tool call, so every structured parse falls
    // back and the first research section asks for a search.
    let llm = MockLlmProvider::new();
    for _ in 0..6 {
        llm.queue_response(MockLlmProvider::tool_call_response(
            SEARCH_TOOL_NAME,
            json!({"queries": ["edge ai pazarı"]}),
        ));
    }

    let h = harness(test_config(), llm, true);
    h.search_a.queue_rate_limits(50);
    let result = h.service.generate_report("Edge AI", None).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.llm_provider_id.as_deref(), Some("llm-a"));
    assert_eq!(result.search_provider_ids, vec!["search-b".to_string()]);
    assert!(
        result
            .notices
            .iter()
            .any(|n| n.starts_with("Arama sağlayıcısı 'search-a'") && n.contains("'search-b'")),
        "missing switch notice: {:?}",
        result.notices
    );
    assert!(h.search_b.as_ref().is_some_and(|b| !b.queries().is_empty()));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_save_report_with_explicit_filename() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.output.report_dir = dir.path().join("raporlar");

    let h = harness(config, MockLlmProvider::new(), false);
    let path = h
        .service
        .save_report("# Başlık\n\nİçerik", Some("edge_ai.md"))
        .unwrap();

    assert_eq!(path, dir.path().join("raporlar").join("edge_ai.md"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Başlık\n\nİçerik");
}

#[test]
fn test_save_report_generates_timestamped_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.output.report_dir = dir.path().to_path_buf();

    let h = harness(config, MockLlmProvider::new(), false);
    let path = h.service.save_report("content", None).unwrap();

    let name = path.file_name().and_then(|n| n.to_str()).unwrap();
    assert!(name.starts_with("rapor_"), "name was {name}");
    assert!(name.ends_with(".md"), "name was {name}");
    assert_eq!(name.len(), "rapor_20260101_120000.md".len());
}

#[test]
fn test_save_report_into_a_file_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let mut config = test_config();
    config.output.report_dir = blocker;

    let h = harness(config, MockLlmProvider::new(), false);
    let err = h.service.save_report("content", Some("r.md")).unwrap_err();
    assert!(err.to_string().contains("not-a-dir"), "error was: {err}");
}
