//! Layered research run: plan, search, analyze, follow up, synthesize.

use super::analysis::{AnalysisResult, collect_follow_up_queries, normalize_analysis};
use super::layers::{ResearchLayer, distribute_queries};
use super::planner::{QueryPlan, QueryPlanner};
use super::prompts;
use super::results::{LayerResults, SearchResultEntry, SearchVariant};
use super::session::{ResearchPhase, ResearchSession};
use super::sources::{ScoredSource, SourceScorer, format_source_summary};
use crate::brain::Brain;
use crate::config::ResearchConfig;
use crate::error::Result;
use crate::json_extract::parse_json_from_response;
use crate::search::{RESULTS_HEADER, SearchArgs, SearchTool, SearchTopic};
use crate::text::truncate_chars;
use crate::types::{Message, Role};
use serde_json::json;
use tracing::{debug, error, info, warn};

const ANALYSIS_DIGEST_CHARS: usize = 4500;
const ANALYSIS_TOP_SOURCES: usize = 8;
const FOLLOW_UP_DIGEST_CHARS: usize = 2500;
const COMBINED_DIGEST_CHARS: usize = 4500;
const SYNTHESIS_TOP_SOURCES: usize = 12;
const ANALYSIS_JSON_CHARS: usize = 4000;

const NO_STRONG_SOURCES: &str = "Güçlü kaynak bulunamadı.";
const NO_SEARCH_OUTPUT: &str = "Arama çıktısı bulunamadı.";
const NO_FOLLOW_UP: &str = "Takip araması yapılmadı.";
const NO_TOP_SOURCES: &str = "Öne çıkan kaynak bulunamadı.";

/// Everything one research run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub topic: String,
    pub plan: QueryPlan,
    pub used_fallback_plan: bool,
    pub initial_results: LayerResults,
    pub analysis: AnalysisResult,
    pub follow_up_queries: Vec<(String, Vec<String>)>,
    pub follow_up_results: LayerResults,
    /// Sources over the merged result set, best first.
    pub sources: Vec<ScoredSource>,
    /// Final synthesis narrative.
    pub summary: String,
    /// Prompts, replies and one tool message per search, in order.
    pub transcript: Vec<Message>,
    pub session: ResearchSession,
}

impl ResearchOutcome {
    /// Research text handed to the report planner and section writers.
    ///
    /// The synthesis summary followed by every raw search blob.
    pub fn writer_context(&self) -> String {
        let mut context = String::new();
        let summary = self.summary.trim();
        if !summary.is_empty() {
            context.push_str(summary);
            context.push_str("\n\n");
        }
        for message in self.transcript.iter().filter(|m| m.role == Role::Tool) {
            let text = message.text();
            if text.contains(RESULTS_HEADER) {
                context.push_str(&text);
                context.push_str("\n\n");
            }
        }
        context.trim_end().to_string()
    }
}

/// Drives one research run through [`ResearchPhase`]s.
pub struct ResearchOrchestrator<'a> {
    brain: &'a Brain,
    search: &'a dyn SearchTool,
    layers: &'a [ResearchLayer],
    default_queries: usize,
    scorer: SourceScorer,
    language: String,
}

impl<'a> ResearchOrchestrator<'a> {
    pub fn new(brain: &'a Brain, search: &'a dyn SearchTool, config: &'a ResearchConfig) -> Self {
        Self {
            brain,
            search,
            layers: &config.layers,
            default_queries: config.default_queries,
            scorer: SourceScorer::new(config.signal_rules.clone(), config.type_priority.clone()),
            language: "Turkish".to_string(),
        }
    }

    /// Language the synthesis is written in.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Run the full layered research for `topic`.
    ///
    /// Search failures are recorded inline per query. Model failures,
    /// including rate limits, propagate.
    pub async fn research(&self, topic: &str, number_of_queries: Option<usize>) -> Result<ResearchOutcome> {
        let budget = number_of_queries.unwrap_or(self.default_queries);
        info!(topic, budget, layers = self.layers.len(), "Starting layered research");

        let mut session = ResearchSession::new(topic);
        let mut transcript: Vec<Message> = Vec::new();

        // Plan
        let distribution = distribute_queries(budget, self.layers);
        let planned = QueryPlanner::new(self.brain, self.layers)
            .plan(topic, &distribution)
            .await?;
        transcript.push(Message::user(planned.prompt.clone()));
        transcript.push(Message::assistant(planned.response_text.clone()));
        let plan = planned.plan;

        // Initial searches
        session.transition(ResearchPhase::ExecuteInitial);
        let initial_results = self
            .execute_plan(topic, &plan, SearchVariant::Initial, &mut transcript)
            .await;
        let initial_sources = self.scorer.score_results(&initial_results);

        // Gap analysis
        session.transition(ResearchPhase::Analyze);
        let analysis = self
            .analyze(topic, &plan, &initial_results, &initial_sources, &mut transcript)
            .await?;

        // Follow-ups
        session.transition(ResearchPhase::CollectFollowUps);
        let follow_up_queries = collect_follow_up_queries(topic, &analysis, self.layers);
        let follow_up_results = if follow_up_queries.is_empty() {
            info!("No follow-up queries needed");
            LayerResults::default()
        } else {
            info!(layers = follow_up_queries.len(), "Running follow-up queries");
            session.transition(ResearchPhase::ExecuteFollowUp);
            let follow_up_plan = QueryPlan::follow_up(self.layers, &follow_up_queries);
            self.execute_plan(topic, &follow_up_plan, SearchVariant::FollowUp, &mut transcript)
                .await
        };

        // Merge and rescore
        session.transition(ResearchPhase::Merge);
        let combined = LayerResults::merge(self.layers, &[&initial_results, &follow_up_results]);
        let sources = self.scorer.score_results(&combined);
        debug!(sources = sources.len(), "Scored merged sources");

        // Synthesis
        session.transition(ResearchPhase::Synthesize);
        let synthesis_prompt = prompts::synthesis_human(
            topic,
            &plan.summary(),
            &analysis_excerpt(&analysis),
            &or_placeholder(follow_up_results.digest(self.layers, FOLLOW_UP_DIGEST_CHARS), NO_FOLLOW_UP),
            &or_placeholder(combined.digest(self.layers, COMBINED_DIGEST_CHARS), NO_SEARCH_OUTPUT),
            &or_placeholder(format_source_summary(&sources, SYNTHESIS_TOP_SOURCES), NO_TOP_SOURCES),
        );
        let response = self
            .brain
            .ask(&prompts::synthesis_system(&self.language), &synthesis_prompt)
            .await?;
        let summary = response.text();
        transcript.push(Message::user(synthesis_prompt));
        transcript.push(Message::assistant(summary.clone()));

        session.transition(ResearchPhase::Done);
        info!(topic, searches = combined.len(), "Layered research finished");

        Ok(ResearchOutcome {
            topic: topic.to_string(),
            plan,
            used_fallback_plan: planned.used_fallback,
            initial_results,
            analysis,
            follow_up_queries,
            follow_up_results,
            sources,
            summary,
            transcript,
            session,
        })
    }

    /// Run every non-empty query of `plan` in layer order.
    ///
    /// A failing search becomes a visible inline result for that query.
    async fn execute_plan(
        &self,
        topic: &str,
        plan: &QueryPlan,
        variant: SearchVariant,
        transcript: &mut Vec<Message>,
    ) -> LayerResults {
        let mut results = LayerResults::with_layers(plan.layers.iter().map(|l| l.layer_id.clone()));
        let search_topic = SearchTopic::parse(topic);

        for layer in &plan.layers {
            for (index, query) in layer.queries.iter().enumerate() {
                let query = query.trim();
                if query.is_empty() {
                    continue;
                }
                info!(layer = %layer.layer_id, variant = %variant, query, "Searching");

                let args = SearchArgs::new(vec![query.to_string()], search_topic);
                let call_args = args.to_value();
                let (output, is_error) = match self.search.invoke(args).await {
                    Ok(output) => (output, false),
                    Err(e) => {
                        error!(layer = %layer.layer_id, query, error = %e, "Search failed");
                        (format!("⚠️ Arama sırasında hata oluştu: {e}"), true)
                    }
                };

                transcript.push(
                    Message::tool_result(
                        format!("search_{}_{}_{}", variant.as_str(), layer.layer_id, index + 1),
                        output.clone(),
                        is_error,
                    )
                    .with_metadata("layer", json!(layer.layer_id))
                    .with_metadata("arguments", call_args),
                );
                results.push(SearchResultEntry {
                    layer_id: layer.layer_id.clone(),
                    layer_title: layer.title.clone(),
                    query: query.to_string(),
                    variant,
                    result: output,
                });
            }
        }
        results
    }

    async fn analyze(
        &self,
        topic: &str,
        plan: &QueryPlan,
        initial_results: &LayerResults,
        sources: &[ScoredSource],
        transcript: &mut Vec<Message>,
    ) -> Result<AnalysisResult> {
        let prompt = prompts::analysis_human(
            topic,
            &plan.summary(),
            &or_placeholder(format_source_summary(sources, ANALYSIS_TOP_SOURCES), NO_STRONG_SOURCES),
            &or_placeholder(initial_results.digest(self.layers, ANALYSIS_DIGEST_CHARS), NO_SEARCH_OUTPUT),
        );
        let response = self.brain.ask(prompts::ANALYSIS_SYSTEM, &prompt).await?;
        let raw = response.text();

        let (analysis, response_text) = match parse_json_from_response(&raw) {
            Ok(value) if value.is_object() => (normalize_analysis(&value, self.layers), raw),
            Ok(_) => {
                warn!("Gap analysis was not a JSON object; using empty analysis");
                self.empty_analysis()?
            }
            Err(e) => {
                warn!(error = %e, "Gap analysis could not be parsed; using empty analysis");
                self.empty_analysis()?
            }
        };

        transcript.push(Message::user(prompt));
        transcript.push(Message::assistant(response_text));
        Ok(analysis)
    }

    fn empty_analysis(&self) -> Result<(AnalysisResult, String)> {
        let analysis = AnalysisResult::empty(self.layers);
        let text = serde_json::to_string_pretty(&analysis)?;
        Ok((analysis, text))
    }
}

fn or_placeholder(text: String, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text
    }
}

fn analysis_excerpt(analysis: &AnalysisResult) -> String {
    let json = serde_json::to_string(analysis).unwrap_or_default();
    truncate_chars(&json, ANALYSIS_JSON_CHARS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::search::MockSearchTool;
    use crate::types::Content;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn brain(mock: &Arc<MockLlmProvider>) -> Brain {
        Brain::new(mock.clone(), "mock-llm")
    }

    fn plan_reply() -> String {
        json!({
            "layers": {
                "foundation": {"focus": "Basics", "queries": ["edge ai definition"]},
                "technical": {"queries": ["edge ai architecture"]},
                "practical": {"queries": ["edge ai case study"]},
                "future": {"queries": ["edge ai roadmap"]},
                "comparative": {"queries": ["edge ai vs cloud ai"]}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_full_run_with_follow_ups() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text(&plan_reply());
        mock.queue_text(
            &json!({
                "patterns": ["growth"],
                "gaps": {"technical": {"follow_up_queries": ["edge ai npu benchmarks"]}}
            })
            .to_string(),
        );
        mock.queue_text("Final synthesis.");
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        let config = ResearchConfig::default();

        let outcome = ResearchOrchestrator::new(&brain, &search, &config)
            .research("Edge AI", Some(5))
            .await
            .unwrap();

        assert!(!outcome.used_fallback_plan);
        assert_eq!(outcome.initial_results.len(), 5);
        assert_eq!(
            outcome.follow_up_queries,
            vec![("technical".to_string(), vec!["edge ai npu benchmarks".to_string()])]
        );
        assert_eq!(outcome.follow_up_results.len(), 1);
        assert_eq!(outcome.summary, "Final synthesis.");
        assert_eq!(search.invocation_count(), 6);
        assert!(outcome.session.is_done());
        assert!(outcome.session.ran_follow_ups());
        assert!(!outcome.sources.is_empty());

        // plan (2) + 5 initial + analysis (2) + 1 follow-up + synthesis (2)
        assert_eq!(outcome.transcript.len(), 12);
        let tool_ids: Vec<String> = outcome
            .transcript
            .iter()
            .filter_map(|m| match &m.content {
                Content::ToolResult { call_id, .. } => Some(call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_ids[0], "search_initial_foundation_1");
        assert_eq!(tool_ids[5], "search_follow_up_technical_1");
    }

    #[tokio::test]
    async fn test_search_args_use_single_query_and_general_topic() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text(&plan_reply());
        mock.queue_text("{}");
        mock.queue_text("ok");
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        let config = ResearchConfig::default();

        ResearchOrchestrator::new(&brain, &search, &config)
            .research("Edge AI", Some(5))
            .await
            .unwrap();

        let first = &search.invocations()[0];
        assert_eq!(first.queries, vec!["edge ai definition"]);
        assert_eq!(first.topic, SearchTopic::General);
    }

    #[tokio::test]
    async fn test_unparseable_analysis_skips_follow_ups() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("not json at all");
        mock.queue_text("still not json");
        mock.queue_text("summary");
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        let config = ResearchConfig::default();

        let outcome = ResearchOrchestrator::new(&brain, &search, &config)
            .research("Kuantum", Some(3))
            .await
            .unwrap();

        assert!(outcome.used_fallback_plan);
        assert_eq!(outcome.analysis, AnalysisResult::empty(&config.layers));
        assert!(outcome.follow_up_queries.is_empty());
        assert!(outcome.follow_up_results.is_empty());
        assert!(!outcome.session.ran_follow_ups());
        // Five layers with a one-query floor each.
        assert_eq!(search.invocation_count(), 5);
    }

    #[tokio::test]
    async fn test_search_failure_is_isolated() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text(&plan_reply());
        mock.queue_text("{}");
        mock.queue_text("summary");
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        search.queue_failure("connection reset");
        let config = ResearchConfig::default();

        let outcome = ResearchOrchestrator::new(&brain, &search, &config)
            .research("Edge AI", Some(5))
            .await
            .unwrap();

        let foundation = outcome.initial_results.get("foundation");
        assert!(foundation[0].result.starts_with("⚠️ Arama sırasında hata oluştu:"));
        assert!(foundation[0].result.contains("connection reset"));
        assert_eq!(outcome.initial_results.len(), 5);
        assert!(outcome.initial_results.get("technical")[0].result.contains(RESULTS_HEADER));
    }

    #[tokio::test]
    async fn test_llm_rate_limit_propagates() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(crate::error::LlmError::RateLimited { retry_after_secs: 5 });
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        let config = ResearchConfig::default();

        let err = ResearchOrchestrator::new(&brain, &search, &config)
            .research("Edge AI", None)
            .await
            .unwrap_err();
        assert_eq!(err.as_rate_limit().unwrap().provider_id, "mock-llm");
    }

    #[tokio::test]
    async fn test_writer_context_keeps_summary_and_blobs() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text(&plan_reply());
        mock.queue_text("{}");
        mock.queue_text("Synthesis body");
        let brain = brain(&mock);
        let search = MockSearchTool::new();
        search.queue_failure("boom");
        let config = ResearchConfig::default();

        let outcome = ResearchOrchestrator::new(&brain, &search, &config)
            .research("Edge AI", Some(5))
            .await
            .unwrap();

        let context = outcome.writer_context();
        assert!(context.starts_with("Synthesis body\n\n=== ARAŞTIRMA SONUÇLARI ==="));
        assert_eq!(context.matches(RESULTS_HEADER).count(), 4);
        assert!(!context.contains("boom"));
    }
}
