//! Gap analysis normalization and follow-up query collection.

use super::layers::{ResearchLayer, match_layer_id};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Maximum follow-up queries kept per layer.
pub const MAX_FOLLOW_UPS_PER_LAYER: usize = 3;

/// Maximum queries synthesized from missing topics.
const MAX_SYNTHESIZED_FOLLOW_UPS: usize = 2;

/// What one layer's initial research missed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGap {
    pub missing_topics: Vec<String>,
    pub follow_up_queries: Vec<String>,
    pub validation_targets: Vec<String>,
}

/// Structured gap analysis. Every configured layer has a gap entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub patterns: Vec<Value>,
    pub contradictions: Vec<Value>,
    pub trends: Vec<Value>,
    pub gaps: BTreeMap<String, LayerGap>,
    pub cross_validation: Vec<Value>,
}

impl AnalysisResult {
    /// Fully populated, empty analysis for the given layers.
    pub fn empty(layers: &[ResearchLayer]) -> Self {
        Self {
            gaps: layers
                .iter()
                .map(|layer| (layer.id.clone(), LayerGap::default()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn gap(&self, layer_id: &str) -> Option<&LayerGap> {
        self.gaps.get(layer_id)
    }
}

/// Keep trimmed, non-empty strings. A lone string becomes a one-item list.
pub fn coerce_str_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            }
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The first key whose value is present and non-empty.
fn first_truthy<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| is_truthy(value))
}

fn gap_from(map: &Map<String, Value>, topic_keys: &[&str]) -> LayerGap {
    LayerGap {
        missing_topics: coerce_str_list(first_truthy(map, topic_keys)),
        follow_up_queries: coerce_str_list(first_truthy(map, &["follow_up_queries", "queries"])),
        validation_targets: coerce_str_list(first_truthy(map, &["validation_targets", "validation"])),
    }
}

fn list_or_empty(raw: &Map<String, Value>, key: &str) -> Vec<Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Normalize a raw analysis payload against the configured layers.
///
/// `gaps` may be an object keyed by (loosely matched) layer names or a list
/// of objects carrying a `layer`/`layer_id` field. Unknown layers are
/// dropped; missing layers keep empty gaps.
pub fn normalize_analysis(raw: &Value, layers: &[ResearchLayer]) -> AnalysisResult {
    let mut normalized = AnalysisResult::empty(layers);
    let Some(raw) = raw.as_object() else {
        return normalized;
    };

    normalized.patterns = list_or_empty(raw, "patterns");
    normalized.contradictions = list_or_empty(raw, "contradictions");
    normalized.trends = list_or_empty(raw, "trends");
    normalized.cross_validation = list_or_empty(raw, "cross_validation");

    match raw.get("gaps") {
        Some(Value::Object(gaps)) => {
            for (key, value) in gaps {
                let (Some(layer_id), Some(value)) = (match_layer_id(layers, key), value.as_object())
                else {
                    continue;
                };
                normalized
                    .gaps
                    .insert(layer_id.to_string(), gap_from(value, &["missing_topics", "gaps"]));
            }
        }
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_object) {
                let layer_ref = first_truthy(item, &["layer", "layer_id"])
                    .map(|value| match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                let Some(layer_id) = match_layer_id(layers, &layer_ref) else {
                    continue;
                };
                normalized
                    .gaps
                    .insert(layer_id.to_string(), gap_from(item, &["missing_topics", "topics"]));
            }
        }
        _ => {}
    }

    normalized
}

/// Follow-up queries per layer, in layer order, for layers that have any.
///
/// Supplied follow-up queries are capped at three. When a layer supplies
/// none, up to two are synthesized from its missing topics.
pub fn collect_follow_up_queries(
    topic: &str,
    analysis: &AnalysisResult,
    layers: &[ResearchLayer],
) -> Vec<(String, Vec<String>)> {
    let mut collected = Vec::new();

    for layer in layers {
        let Some(gap) = analysis.gap(&layer.id) else {
            continue;
        };
        let mut queries: Vec<String> = gap
            .follow_up_queries
            .iter()
            .filter(|q| !q.is_empty())
            .cloned()
            .collect();

        if queries.is_empty() {
            for missing in gap.missing_topics.iter().take(MAX_SYNTHESIZED_FOLLOW_UPS) {
                let candidate = format!("{topic} {missing} derinlemesine araştırma");
                if !queries.contains(&candidate) {
                    queries.push(candidate);
                }
            }
        }

        if !queries.is_empty() {
            queries.truncate(MAX_FOLLOW_UPS_PER_LAYER);
            collected.push((layer.id.clone(), queries));
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::layers::default_layers;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_analysis_has_every_layer() {
        let analysis = normalize_analysis(&json!("garbage"), &default_layers());
        assert_eq!(analysis.gaps.len(), 5);
        assert!(analysis.patterns.is_empty());
        assert!(analysis.gap("comparative").unwrap().follow_up_queries.is_empty());
    }

    #[test]
    fn test_object_gaps_with_alias_keys() {
        let raw = json!({
            "patterns": [{"insight": "x"}],
            "trends": "not a list",
            "gaps": {
                "Teknik": {"gaps": ["latency"], "queries": "edge benchmarks", "validation": ["ieee"]},
                "mystery": {"follow_up_queries": ["ignored"]},
                "future": "not an object"
            }
        });
        let analysis = normalize_analysis(&raw, &default_layers());
        assert_eq!(analysis.patterns.len(), 1);
        assert!(analysis.trends.is_empty());

        let technical = analysis.gap("technical").unwrap();
        assert_eq!(technical.missing_topics, vec!["latency"]);
        assert_eq!(technical.follow_up_queries, vec!["edge benchmarks"]);
        assert_eq!(technical.validation_targets, vec!["ieee"]);
        assert_eq!(analysis.gap("future").unwrap(), &LayerGap::default());
        assert_eq!(analysis.gaps.len(), 5);
    }

    #[test]
    fn test_list_gaps() {
        let raw = json!({
            "gaps": [
                {"layer": "Practical", "topics": ["ROI"], "follow_up_queries": []},
                {"layer_id": "comparative", "missing_topics": ["vendors"], "queries": ["a", " ", 7]},
                "skip me"
            ]
        });
        let analysis = normalize_analysis(&raw, &default_layers());
        assert_eq!(analysis.gap("practical").unwrap().missing_topics, vec!["ROI"]);
        assert_eq!(analysis.gap("comparative").unwrap().follow_up_queries, vec!["a"]);
    }

    #[test]
    fn test_coerce_str_list() {
        assert_eq!(coerce_str_list(Some(&json!("  x "))), vec!["x"]);
        assert!(coerce_str_list(Some(&json!("   "))).is_empty());
        assert!(coerce_str_list(Some(&json!(5))).is_empty());
        assert!(coerce_str_list(None).is_empty());
    }

    #[test]
    fn test_collect_follow_ups() {
        let layers = default_layers();
        let mut analysis = AnalysisResult::empty(&layers);
        analysis.gaps.insert(
            "foundation".into(),
            LayerGap {
                follow_up_queries: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                ..Default::default()
            },
        );
        analysis.gaps.insert(
            "future".into(),
            LayerGap {
                missing_topics: vec!["risk".into(), "policy".into(), "cost".into()],
                ..Default::default()
            },
        );

        let follow_ups = collect_follow_up_queries("AI", &analysis, &layers);
        assert_eq!(
            follow_ups,
            vec![
                ("foundation".to_string(), vec!["a".to_string(), "b".into(), "c".into()]),
                (
                    "future".to_string(),
                    vec![
                        "AI risk derinlemesine araştırma".to_string(),
                        "AI policy derinlemesine araştırma".to_string()
                    ]
                ),
            ]
        );
    }

    #[test]
    fn test_collect_follow_ups_empty() {
        let layers = default_layers();
        assert!(collect_follow_up_queries("AI", &AnalysisResult::empty(&layers), &layers).is_empty());
    }
}
