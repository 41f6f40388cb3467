//! End-to-end report generation.
//!
//! [`ReportPipeline`] runs research, planning, section writing,
//! compilation and quality control in order against one LLM and one
//! search tool. [`ReportService`] builds pipelines from the provider
//! registry, retries the whole run on another provider when one is rate
//! limited, and persists finished reports.

use crate::brain::Brain;
use crate::config::StratumConfig;
use crate::error::{ProviderKind, ProviderRateLimitError, Result, StratumError};
use crate::providers::{FailoverTracker, ProviderRegistry};
use crate::report::{
    QualityController, QualityOutcome, ReportCompiler, ReportPlanner, ReportStructure,
    SectionWriter,
};
use crate::research::{ResearchOrchestrator, ResearchOutcome};
use crate::search::SearchTool;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const EMPTY_TOPIC_ERROR: &str = "Lütfen bir rapor konusu girin.";
const PLAN_FALLBACK_NOTICE: &str = "Rapor planı ayrıştırılamadı; varsayılan bölüm yapısı kullanıldı.";
const MAX_FILENAME_SLUG_CHARS: usize = 50;

/// What one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub content: String,
    pub structure: ReportStructure,
    pub research: ResearchOutcome,
    pub compiled_manually: bool,
    pub quality: QualityOutcome,
    /// Degraded-mode events worth showing to the caller.
    pub notices: Vec<String>,
}

/// The linear research → plan → write → compile → QC sequence.
pub struct ReportPipeline {
    brain: Brain,
    search: Arc<dyn SearchTool>,
    config: StratumConfig,
}

impl ReportPipeline {
    pub fn new(brain: Brain, search: Arc<dyn SearchTool>, config: StratumConfig) -> Self {
        Self {
            brain,
            search,
            config,
        }
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Run every stage for `topic`. Rate limits propagate untouched.
    pub async fn run(&self, topic: &str) -> Result<PipelineOutput> {
        let language = self.config.writer.language.as_str();
        let mut notices = Vec::new();

        info!(topic, "Running initial research");
        let research = ResearchOrchestrator::new(&self.brain, self.search.as_ref(), &self.config.research)
            .with_language(language)
            .research(topic, Some(self.config.research.initial_queries))
            .await?;
        let research_data = research.writer_context();

        info!("Planning report");
        let planned = ReportPlanner::new(&self.brain, self.config.writer.plan_research_chars, language)
            .plan(topic, &research_data)
            .await?;
        if planned.used_fallback {
            notices.push(PLAN_FALLBACK_NOTICE.to_string());
        }
        let mut structure = planned.structure;

        info!(sections = structure.sections.len(), "Writing sections");
        let writer = SectionWriter::new(&self.brain, self.search.as_ref(), language);
        let pause = Duration::from_millis(self.config.writer.section_pause_ms);
        for (i, section) in structure.sections.iter_mut().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let content = writer.write_section(section, i + 1, &research_data).await?;
            section.content = content;
        }

        let contents: Vec<String> = structure.sections.iter().map(|s| s.content.clone()).collect();
        let compiled = ReportCompiler::new(&self.brain, language)
            .compile(topic, &contents)
            .await?;
        if let Some(reason) = &compiled.fallback_reason {
            notices.push(format!("Rapor elle derlendi: {reason}"));
        }

        let quality = QualityController::new(&self.brain, &self.config.quality, language)
            .process(&compiled.content)
            .await?;

        info!(
            chars = quality.content.chars().count(),
            usage = self.brain.total_usage().total(),
            "Report pipeline finished"
        );
        Ok(PipelineOutput {
            content: quality.content.clone(),
            structure,
            research,
            compiled_manually: compiled.used_manual,
            quality,
            notices,
        })
    }
}

/// The terminal value of one `generate_report` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportRunResult {
    pub content: String,
    pub error: Option<String>,
    pub notices: Vec<String>,
    pub llm_provider_id: Option<String>,
    pub search_provider_ids: Vec<String>,
}

impl ReportRunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Filename for a report on `topic`: a lowercase `_`-joined slug of at most
/// 50 characters (`rapor` when empty) plus a timestamp.
pub fn report_filename_for(topic: &str) -> String {
    let cleaned: String = topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let slug = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let slug: String = slug.chars().take(MAX_FILENAME_SLUG_CHARS).collect();
    let slug = if slug.is_empty() { "rapor".to_string() } else { slug };
    format!("{slug}_{}.md", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn default_report_filename() -> String {
    format!("rapor_{}.md", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn kind_label(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Llm => "LLM",
        ProviderKind::Search => "Arama",
    }
}

fn exhausted_message(failure: &ProviderRateLimitError) -> String {
    format!(
        "{} sağlayıcısı '{}' rate limit nedeniyle kullanılamıyor ve denenebilecek başka sağlayıcı yok: {}",
        kind_label(failure.provider_type),
        failure.provider_id,
        failure.message
    )
}

fn push_unique(notices: &mut Vec<String>, notice: String) {
    if !notices.contains(&notice) {
        notices.push(notice);
    }
}

/// Report generation with provider selection, failover and persistence.
pub struct ReportService {
    config: StratumConfig,
    registry: ProviderRegistry,
    llm_provider: Option<String>,
    search_providers: Vec<String>,
}

impl ReportService {
    pub fn new(config: StratumConfig) -> Self {
        let registry = ProviderRegistry::from_config(&config);
        Self::with_registry(config, registry)
    }

    /// Use a prepared registry, e.g. one with registered test instances.
    pub fn with_registry(config: StratumConfig, registry: ProviderRegistry) -> Self {
        Self {
            config,
            registry,
            llm_provider: None,
            search_providers: Vec::new(),
        }
    }

    /// Start runs on this LLM provider instead of the configured default.
    pub fn with_llm_provider(mut self, id: impl Into<String>) -> Self {
        self.llm_provider = Some(id.into());
        self
    }

    /// Start runs on these search providers instead of the defaults.
    pub fn with_search_providers(mut self, ids: Vec<String>) -> Self {
        self.search_providers = ids;
        self
    }

    pub fn config(&self) -> &StratumConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Generate a report for `topic`.
    ///
    /// Never fails: problems are reported through
    /// [`ReportRunResult::error`]. A rate-limited provider is replaced by
    /// the first available provider of the same kind that this run (or the
    /// caller, via `attempted_llm_ids`) has not tried, and the whole
    /// pipeline starts over.
    pub async fn generate_report(&self, topic: &str, attempted_llm_ids: Option<Vec<String>>) -> ReportRunResult {
        let topic = topic.trim();
        if topic.is_empty() {
            return ReportRunResult::failure(EMPTY_TOPIC_ERROR);
        }

        let mut tracker = FailoverTracker::new(attempted_llm_ids.unwrap_or_default());
        let mut llm_id = self
            .llm_provider
            .clone()
            .unwrap_or_else(|| self.registry.default_llm_id());
        let mut search_ids = if self.search_providers.is_empty() {
            self.registry.default_search_ids()
        } else {
            self.search_providers.clone()
        };

        if tracker
            .attempted(ProviderKind::Llm)
            .contains(&crate::providers::normalize_provider_id(&llm_id))
            && let Some(alternative) = self.registry.alternative_llm(tracker.attempted(ProviderKind::Llm))
        {
            tracker.push_notice(format!(
                "LLM sağlayıcısı '{llm_id}' daha önce denendiği için '{alternative}' kullanıldı."
            ));
            llm_id = alternative;
        }

        info!(topic, llm = %llm_id, search = ?search_ids, "Report generation started");
        loop {
            let brain = match self.registry.create_llm(Some(&llm_id)) {
                Ok(brain) => brain,
                Err(e) => {
                    error!(provider = %llm_id, error = %e, "Could not create LLM provider");
                    return self.finish_failure(tracker, Some(llm_id), Vec::new(), e.to_string());
                }
            };
            let search = match self.registry.create_search_tool(&search_ids, None) {
                Ok(search) => Arc::new(search),
                Err(e) => {
                    error!(error = %e, "Could not create search tool");
                    return self.finish_failure(tracker, Some(llm_id), Vec::new(), e.to_string());
                }
            };

            let used_search_ids = search.metadata().provider_ids;
            tracker.mark_attempted(ProviderKind::Llm, brain.provider_id());
            for id in &used_search_ids {
                tracker.mark_attempted(ProviderKind::Search, id);
            }

            let pipeline = ReportPipeline::new(brain, search.clone(), self.config.clone());
            let outcome = pipeline.run(topic).await;
            let search_notices = search.metadata().notices;

            match outcome {
                Ok(output) => {
                    info!(llm = %llm_id, search = ?used_search_ids, "Report generated");
                    let mut notices = tracker.into_notices();
                    for notice in output.notices.into_iter().chain(search_notices) {
                        push_unique(&mut notices, notice);
                    }
                    return ReportRunResult {
                        content: output.content,
                        error: None,
                        notices,
                        llm_provider_id: Some(llm_id),
                        search_provider_ids: used_search_ids,
                    };
                }
                Err(StratumError::RateLimit(failure)) => {
                    let attempted = tracker.attempted(failure.provider_type);
                    let alternative = match failure.provider_type {
                        ProviderKind::Llm => self.registry.alternative_llm(attempted),
                        ProviderKind::Search => self.registry.alternative_search(attempted),
                    };
                    let Some(alternative) = alternative else {
                        warn!(kind = %failure.provider_type, provider = %failure.provider_id, "No alternative provider left");
                        return self.finish_failure(
                            tracker,
                            Some(llm_id),
                            used_search_ids,
                            exhausted_message(&failure),
                        );
                    };
                    tracker.record_switch(&failure, &alternative);
                    match failure.provider_type {
                        ProviderKind::Llm => llm_id = alternative,
                        ProviderKind::Search => search_ids = vec![alternative],
                    }
                }
                Err(e) => {
                    error!(error = %e, "Report generation failed");
                    return self.finish_failure(
                        tracker,
                        Some(llm_id),
                        used_search_ids,
                        format!("Rapor oluşturma hatası: {e}"),
                    );
                }
            }
        }
    }

    fn finish_failure(
        &self,
        tracker: FailoverTracker,
        llm_provider_id: Option<String>,
        search_provider_ids: Vec<String>,
        message: String,
    ) -> ReportRunResult {
        ReportRunResult {
            content: String::new(),
            error: Some(message),
            notices: tracker.into_notices(),
            llm_provider_id,
            search_provider_ids,
        }
    }

    /// Write `content` as UTF-8 into the configured report directory.
    ///
    /// The directory is created when missing. Without a filename,
    /// `rapor_%Y%m%d_%H%M%S.md` is used.
    pub fn save_report(&self, content: &str, filename: Option<&str>) -> Result<PathBuf> {
        let dir = &self.config.output.report_dir;
        std::fs::create_dir_all(dir).map_err(|e| StratumError::Save {
            path: dir.clone(),
            source: e,
        })?;

        let filename = filename
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .unwrap_or_else(default_report_filename);
        let path = dir.join(filename);
        std::fs::write(&path, content).map_err(|e| StratumError::Save {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), bytes = content.len(), "Report saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::search::MockSearchTool;
    use pretty_assertions::assert_eq;

    fn quiet_config() -> StratumConfig {
        let mut config = StratumConfig::default();
        config.writer.section_pause_ms = 0;
        config
    }

    #[test]
    fn test_report_filename_for() {
        let name = report_filename_for("Yapay Zeka: Etik & Hukuk!");
        assert!(name.starts_with("yapay_zeka_etik_hukuk_"), "{name}");
        assert!(name.ends_with(".md"));

        let name = report_filename_for("  ?!  ");
        assert!(name.starts_with("rapor_"));

        let long = "a".repeat(80);
        let name = report_filename_for(&long);
        assert!(name.starts_with(&format!("{}_", "a".repeat(50))));
    }

    #[tokio::test]
    async fn test_empty_topic_is_an_error_result() {
        let service = ReportService::new(quiet_config());
        let result = service.generate_report("   ", None).await;
        assert_eq!(result.error.as_deref(), Some(EMPTY_TOPIC_ERROR));
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_runs_with_fallbacks_everywhere() {
        // Every reply is unusable, so each stage takes its fallback path.
        let mock = Arc::new(MockLlmProvider::with_response("not json at all"));
        let brain = Brain::new(mock.clone(), "mock");
        let search = Arc::new(MockSearchTool::new());
        let pipeline = ReportPipeline::new(brain, search.clone(), quiet_config());

        let output = pipeline.run("Kuantum Hesaplama").await.unwrap();

        assert_eq!(output.structure.sections.len(), 6);
        assert!(output.structure.sections.iter().all(|s| s.content == "not json at all"));
        assert!(output.notices.contains(&PLAN_FALLBACK_NOTICE.to_string()));
        assert!(!output.content.is_empty());
        assert!(search.invocation_count() > 0);
    }
}
