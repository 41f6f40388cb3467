//! Layered query planning.
//!
//! Turns a topic and a query budget into a [`QueryPlan`] covering every
//! configured layer. A model-proposed plan is accepted after repair; if it
//! cannot be used a deterministic plan is built from the layers' seed
//! queries. Either way each layer ends up with at least its allocated
//! number of distinct queries.

use super::layers::{QueryDistribution, ResearchLayer, find_layer, match_layer_id};
use super::prompts;
use crate::brain::Brain;
use crate::error::Result;
use crate::json_extract::parse_json_from_response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Focus text used for follow-up plans.
pub const FOLLOW_UP_FOCUS: &str = "Follow-up araştırma";

/// Plan for a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPlan {
    pub layer_id: String,
    pub title: String,
    pub focus: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub source_targets: Vec<String>,
    pub queries: Vec<String>,
}

/// Ordered per-layer query assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub layers: Vec<LayerPlan>,
}

impl QueryPlan {
    pub fn get(&self, layer_id: &str) -> Option<&LayerPlan> {
        self.layers.iter().find(|plan| plan.layer_id == layer_id)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn total_queries(&self) -> usize {
        self.layers.iter().map(|plan| plan.queries.len()).sum()
    }

    /// `Title (id) -> n sorgu` per layer with up to four sample queries.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for plan in &self.layers {
            lines.push(format!(
                "{} ({}) -> {} sorgu",
                plan.title,
                plan.layer_id,
                plan.queries.len()
            ));
            for query in plan.queries.iter().take(4) {
                lines.push(format!("  - {query}"));
            }
        }
        lines.join("\n")
    }

    /// A follow-up plan restricted to the layers that produced queries.
    pub fn follow_up(layers: &[ResearchLayer], queries: &[(String, Vec<String>)]) -> Self {
        let layers = queries
            .iter()
            .map(|(layer_id, queries)| LayerPlan {
                layer_id: layer_id.clone(),
                title: find_layer(layers, layer_id)
                    .map(|layer| layer.title.clone())
                    .unwrap_or_else(|| layer_id.clone()),
                focus: FOLLOW_UP_FOCUS.to_string(),
                objectives: Vec::new(),
                source_targets: Vec::new(),
                queries: queries.clone(),
            })
            .collect();
        Self { layers }
    }
}

/// Clean proposed queries and top them up to `minimum`.
///
/// Proposed strings are trimmed and deduplicated case-insensitively; then
/// topic-substituted seed queries are appended, then numbered filler
/// queries, until the minimum is met. No two entries ever compare equal
/// ignoring case.
pub fn ensure_query_count(
    topic: &str,
    layer: &ResearchLayer,
    proposed: &[Value],
    minimum: usize,
) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for item in proposed {
        if let Value::String(text) = item {
            let text = text.trim();
            if !text.is_empty() && seen.insert(text.to_lowercase()) {
                cleaned.push(text.to_string());
            }
        }
    }

    for seed in layer.seed_queries_for(topic) {
        if cleaned.len() >= minimum {
            break;
        }
        if seen.insert(seed.to_lowercase()) {
            cleaned.push(seed);
        }
    }

    let mut index = 1usize;
    while cleaned.len() < minimum {
        let candidate = format!("{topic} {} derinlemesine araştırma {index}", layer.id);
        if seen.insert(candidate.to_lowercase()) {
            cleaned.push(candidate);
        }
        index += 1;
    }

    cleaned
}

/// Find the part of a model payload that describes `layer_id`.
fn extract_layer_info<'a>(
    payload: &'a Value,
    layers: &[ResearchLayer],
    layer_id: &str,
) -> Option<&'a Value> {
    let map = payload.as_object()?;
    if let Some(value) = map
        .iter()
        .find(|(key, _)| key.to_lowercase() == layer_id)
        .map(|(_, value)| value)
    {
        return Some(value);
    }
    map.iter()
        .find(|(key, _)| match_layer_id(layers, key) == Some(layer_id))
        .map(|(_, value)| value)
}

fn first_string<'a>(info: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .filter_map(Value::as_str)
        .find(|text| !text.trim().is_empty())
}

fn first_array<'a>(info: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .filter_map(Value::as_array)
        .find(|items| !items.is_empty())
}

fn layer_plan_from(
    topic: &str,
    layer: &ResearchLayer,
    info: Option<&Value>,
    minimum: usize,
) -> LayerPlan {
    let mut focus = layer.description.clone();
    let mut source_targets = layer.source_targets.clone();
    let mut proposed: &[Value] = &[];

    match info {
        Some(Value::Object(info)) => {
            if let Some(text) = first_string(info, &["focus", "objective", "summary"]) {
                focus = text.to_string();
            }
            if let Some(queries) = first_array(info, &["queries", "search_queries"]) {
                proposed = queries;
            }
            if let Some(sources) = first_array(info, &["source_targets", "sources"]) {
                source_targets = sources
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
        Some(Value::Array(queries)) => proposed = queries,
        _ => {}
    }

    LayerPlan {
        layer_id: layer.id.clone(),
        title: layer.title.clone(),
        focus,
        objectives: layer.objectives.clone(),
        source_targets,
        queries: ensure_query_count(topic, layer, proposed, minimum),
    }
}

/// Normalize a model-proposed plan. Returns `None` unless it is an object.
pub fn normalize_query_plan(
    topic: &str,
    raw: &Value,
    layers: &[ResearchLayer],
    distribution: &QueryDistribution,
) -> Option<QueryPlan> {
    if !raw.is_object() {
        return None;
    }
    let payload = raw.get("layers").filter(|v| v.is_object()).unwrap_or(raw);

    let plans = layers
        .iter()
        .map(|layer| {
            let info = extract_layer_info(payload, layers, &layer.id);
            layer_plan_from(topic, layer, info, distribution.get(&layer.id))
        })
        .collect();
    Some(QueryPlan { layers: plans })
}

/// Deterministic plan built from seed queries alone.
pub fn build_fallback_plan(
    topic: &str,
    layers: &[ResearchLayer],
    distribution: &QueryDistribution,
) -> QueryPlan {
    QueryPlan {
        layers: layers
            .iter()
            .map(|layer| layer_plan_from(topic, layer, None, distribution.get(&layer.id)))
            .collect(),
    }
}

/// `- Title (id): en az n sorgu` per layer.
pub fn allocation_lines(layers: &[ResearchLayer], distribution: &QueryDistribution) -> String {
    distribution
        .iter()
        .map(|(layer_id, count)| {
            let title = find_layer(layers, layer_id)
                .map(|layer| layer.title.as_str())
                .unwrap_or(layer_id);
            format!("- {title} ({layer_id}): en az {count} sorgu")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Objectives, source priorities and minimum query count per layer.
pub fn layer_instructions(layers: &[ResearchLayer], distribution: &QueryDistribution) -> String {
    layers
        .iter()
        .map(|layer| {
            let objectives = layer
                .objectives
                .iter()
                .map(|item| format!("• {item}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "- {} ({})\n  Odak: {objectives}\n  Kaynak önceliği: {}\n  Minimum sorgu: {}",
                layer.title,
                layer.id,
                layer.source_targets.join(", "),
                distribution.get(&layer.id)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of one planning call.
#[derive(Debug, Clone)]
pub struct PlannedQueries {
    pub plan: QueryPlan,
    pub prompt: String,
    /// Raw model reply, or the serialized fallback plan.
    pub response_text: String,
    pub used_fallback: bool,
}

/// Asks the model for a layered plan and repairs the answer.
pub struct QueryPlanner<'a> {
    brain: &'a Brain,
    layers: &'a [ResearchLayer],
}

impl<'a> QueryPlanner<'a> {
    pub fn new(brain: &'a Brain, layers: &'a [ResearchLayer]) -> Self {
        Self { brain, layers }
    }

    pub async fn plan(&self, topic: &str, distribution: &QueryDistribution) -> Result<PlannedQueries> {
        let prompt = prompts::plan_human(
            topic,
            &allocation_lines(self.layers, distribution),
            &layer_instructions(self.layers, distribution),
        );
        let response = self.brain.ask(prompts::PLAN_SYSTEM, &prompt).await?;
        let raw = response.text();

        let normalized = match parse_json_from_response(&raw) {
            Ok(value) => normalize_query_plan(topic, &value, self.layers, distribution),
            Err(e) => {
                warn!(error = %e, "Query plan could not be parsed");
                None
            }
        };

        match normalized {
            Some(plan) => {
                debug!(queries = plan.total_queries(), "Accepted model query plan");
                Ok(PlannedQueries {
                    plan,
                    prompt,
                    response_text: raw,
                    used_fallback: false,
                })
            }
            None => {
                info!("Model output unusable, building fallback query plan");
                let plan = build_fallback_plan(topic, self.layers, distribution);
                let response_text = serde_json::to_string_pretty(&plan)?;
                Ok(PlannedQueries {
                    plan,
                    prompt,
                    response_text,
                    used_fallback: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::research::layers::{default_layers, distribute_queries};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_ensure_query_count_dedupes_case_insensitively() {
        let layers = default_layers();
        let queries = ensure_query_count(
            "AI",
            &layers[0],
            &[json!("AI basics"), json!(" ai BASICS "), json!(""), json!(3)],
            3,
        );
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "AI basics");
        assert_eq!(queries[1], "\"AI\" fundamentals 2024");
    }

    #[test]
    fn test_ensure_query_count_filler_after_seeds() {
        let mut layer = default_layers().remove(1);
        layer.seed_queries = vec!["{topic} docs".into()];
        let queries = ensure_query_count("x", &layer, &[], 3);
        assert_eq!(
            queries,
            vec![
                "x docs",
                "x technical derinlemesine araştırma 1",
                "x technical derinlemesine araştırma 2"
            ]
        );
    }

    #[test]
    fn test_ensure_query_count_keeps_extra_proposals() {
        let layers = default_layers();
        let proposed: Vec<Value> = (0..5).map(|i| json!(format!("q{i}"))).collect();
        assert_eq!(ensure_query_count("t", &layers[0], &proposed, 2).len(), 5);
    }

    #[test]
    fn test_normalize_plan_with_aliases_and_lists() {
        let layers = default_layers();
        let dist = distribute_queries(10, &layers);
        let raw = json!({
            "layers": {
                "Foundation Layer": {"focus": "Basics", "queries": ["a", "b"], "sources": ["wiki"]},
                "teknik": ["c"],
                "future": {"summary": "Outlook", "search_queries": ["d", "e", "f"]}
            }
        });
        let plan = normalize_query_plan("T", &raw, &layers, &dist).unwrap();
        assert_eq!(plan.layers.len(), 5);

        let foundation = plan.get("foundation").unwrap();
        assert_eq!(foundation.focus, "Basics");
        assert_eq!(foundation.queries, vec!["a", "b"]);
        assert_eq!(foundation.source_targets, vec!["wiki"]);

        let technical = plan.get("technical").unwrap();
        assert_eq!(technical.queries[0], "c");
        assert_eq!(technical.queries.len(), 2);

        let future = plan.get("future").unwrap();
        assert_eq!(future.focus, "Outlook");
        assert_eq!(future.queries.len(), 3);

        let practical = plan.get("practical").unwrap();
        assert_eq!(practical.focus, layers[2].description);
        assert_eq!(practical.queries.len(), 2);
    }

    #[test]
    fn test_normalize_plan_rejects_non_objects() {
        let layers = default_layers();
        let dist = distribute_queries(5, &layers);
        assert!(normalize_query_plan("T", &json!(["x"]), &layers, &dist).is_none());
    }

    #[test]
    fn test_plan_summary_format() {
        let layers = default_layers();
        let dist = distribute_queries(5, &layers);
        let plan = build_fallback_plan("T", &layers[..1], &dist);
        assert_eq!(
            plan.summary(),
            "Foundation · Temel Katman (foundation) -> 1 sorgu\n  - \"T\" fundamentals 2024"
        );
    }

    #[test]
    fn test_allocation_and_instructions() {
        let layers = default_layers();
        let dist = distribute_queries(6, &layers);
        let allocation = allocation_lines(&layers, &dist);
        assert!(allocation.starts_with("- Foundation · Temel Katman (foundation): en az 2 sorgu\n"));
        let instructions = layer_instructions(&layers, &dist);
        assert!(instructions.contains("  Odak: • Temel kavramları"));
        assert!(instructions.contains("  Minimum sorgu: 1"));
    }

    #[test]
    fn test_follow_up_plan_uses_layer_titles() {
        let layers = default_layers();
        let plan = QueryPlan::follow_up(&layers, &[("future".into(), vec!["q".into()])]);
        assert_eq!(plan.layers[0].title, "Future · Trendler & Yol Haritası");
        assert_eq!(plan.layers[0].focus, FOLLOW_UP_FOCUS);
    }

    #[tokio::test]
    async fn test_planner_falls_back_on_garbage() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("not json at all");
        let brain = Brain::new(provider, "mock");
        let layers = default_layers();
        let dist = distribute_queries(5, &layers);

        let planned = QueryPlanner::new(&brain, &layers).plan("T", &dist).await.unwrap();
        assert!(planned.used_fallback);
        assert_eq!(planned.plan.total_queries(), 5);
        assert!(planned.response_text.contains("\"layers\""));
        assert!(planned.prompt.contains("Topic: T"));
    }

    #[tokio::test]
    async fn test_planner_accepts_model_plan() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text(r#"```json
{"layers": {"foundation": {"focus": "F", "queries": ["one"]}}}
```"#);
        let brain = Brain::new(provider, "mock");
        let layers = default_layers();
        let dist = distribute_queries(5, &layers);

        let planned = QueryPlanner::new(&brain, &layers).plan("T", &dist).await.unwrap();
        assert!(!planned.used_fallback);
        assert_eq!(planned.plan.get("foundation").unwrap().queries, vec!["one"]);
    }
}
