//! Prompt templates for the research stages.

/// System prompt for the layered query planner.
pub const PLAN_SYSTEM: &str = "\
You are a senior research strategist. Prepare a multi-layer research plan for the given topic.

For every layer:
- Summarise the angle the layer focuses on in one or two sentences.
- Name the preferred source types (academic papers, patents, documentation, ...).
- Write search queries that use advanced operators (site:, filetype:, intitle:, \"exact\") and target recent (2023 or later), reliable sources.
- Consider keywords in both Turkish and English.

Answer with JSON in exactly this shape:
{
  \"layers\": {
    \"<layer id>\": {
      \"focus\": \"...\",
      \"source_targets\": [\"...\"],
      \"queries\": [\"...\"]
    }
  },
  \"notes\": \"optional general notes\",
  \"total_queries\": 0
}

Use the layer ids you are given. Do not leave any layer empty.";

/// Human prompt for the planner.
pub fn plan_human(topic: &str, allocation: &str, layer_instructions: &str) -> String {
    format!(
        "Topic: {topic}\n\n\
         Target query allocation:\n{allocation}\n\n\
         Layer descriptions and priorities:\n{layer_instructions}\n\n\
         Produce the multi-layer query plan as JSON following the criteria above."
    )
}

/// System prompt for gap analysis of the initial results.
pub const ANALYSIS_SYSTEM: &str = "\
You are an expert research analyst working from layered search output. Complete these tasks:
1. Identify patterns, themes and insights that recur across layers.
2. Find conflicting claims, uncertainties and what needs verification.
3. For each layer, list the missing topics and propose 1-3 new follow-up queries aimed at expert sources.
4. Summarise emerging trends, risks and opportunities.
5. State which sources should be used to cross-validate critical findings.

Answer with JSON in exactly this shape:
{
  \"patterns\": [{\"insight\": \"...\", \"supporting_layers\": [\"...\"]}],
  \"contradictions\": [{\"issue\": \"...\", \"sources_to_compare\": [\"...\"]}],
  \"trends\": [{\"trend\": \"...\", \"evidence\": [\"...\"]}],
  \"gaps\": {
    \"<layer id>\": {
      \"missing_topics\": [\"...\"],
      \"follow_up_queries\": [\"...\"],
      \"validation_targets\": [\"...\"]
    }
  },
  \"cross_validation\": [{\"claim\": \"...\", \"recommended_sources\": [\"...\"]}]
}

Leave a field as an empty list when there is no data for it. Base every suggestion on the data, not on guesses.";

/// Human prompt for gap analysis.
pub fn analysis_human(topic: &str, plan_summary: &str, top_sources: &str, digest: &str) -> String {
    format!(
        "Topic: {topic}\n\n\
         Query plan summary:\n{plan_summary}\n\n\
         Leading source candidates:\n{top_sources}\n\n\
         Initial search digest:\n{digest}\n\n\
         Produce the requested JSON from the information above."
    )
}

/// System prompt for the final synthesis.
pub fn synthesis_system(language: &str) -> String {
    format!(
        "You are an expert analyst who turns layered research output, follow-up queries and \
         source quality assessments into one coherent analysis. Synthesise the results along these lines:\n\
         - Overall picture across layers\n\
         - Key patterns and conclusions\n\
         - Contradictions found and the verification they need\n\
         - Gaps and recommended next research steps\n\
         - Trends, expectations and risks\n\
         - The most reliable sources and what they support\n\n\
         Tie findings and recommendations to the evidence, name the source types, and add \
         actionable advice for decision makers. Write in {language}."
    )
}

/// Human prompt for the final synthesis.
pub fn synthesis_human(
    topic: &str,
    plan_summary: &str,
    analysis_json: &str,
    follow_up_digest: &str,
    combined_digest: &str,
    top_sources: &str,
) -> String {
    format!(
        "Topic: {topic}\n\n\
         Query plan summary:\n{plan_summary}\n\n\
         Analysis findings (JSON):\n{analysis_json}\n\n\
         Follow-up search digest:\n{follow_up_digest}\n\n\
         Merged search digest:\n{combined_digest}\n\n\
         Highest scoring sources:\n{top_sources}\n\n\
         Write a comprehensive synthesis report from the inputs above."
    )
}
