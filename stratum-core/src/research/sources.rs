//! Source credibility scoring.
//!
//! URLs found in search result blobs are scored against an ordered list of
//! [`SignalRule`]s. The rules are configuration data; [`default_signal_rules`]
//! and [`default_type_priority`] hold the reference set.

use super::results::LayerResults;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use url::Url;

/// Highest score a source can reach.
pub const MAX_SCORE: u8 = 10;

/// Source type used when no rule matched.
pub const GENERAL_SOURCE_TYPE: &str = "general";

const ORG_SIGNAL: &str = "STK/.org alan adı";

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"URL:\s*(\S+)").ok());

/// A pattern-matched credibility rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRule {
    /// Source type tag assigned when this rule wins on priority.
    #[serde(rename = "type")]
    pub source_type: String,
    /// Score added once when any pattern matches.
    pub score: u8,
    /// Human-readable signal label.
    pub signal: String,
    /// Patterns starting with `.` match the host, others the lowercased URL.
    pub patterns: Vec<String>,
}

impl SignalRule {
    fn matches(&self, host: &str, url_lower: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            let target = if pattern.starts_with('.') { host } else { url_lower };
            target.contains(pattern.as_str())
        })
    }
}

/// Low / medium / high credibility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub fn from_score(score: u8) -> Self {
        if score >= 7 {
            QualityTier::High
        } else if score >= 4 {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one URL once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEvaluation {
    pub url: String,
    pub domain: String,
    pub score: u8,
    pub quality_tier: QualityTier,
    pub source_type: String,
    pub signals: Vec<String>,
}

/// Aggregated credibility record for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredSource {
    pub url: String,
    pub domain: String,
    pub score: u8,
    pub quality_tier: QualityTier,
    pub source_type: String,
    pub signals: BTreeSet<String>,
    pub layers: BTreeSet<String>,
    pub queries: BTreeSet<String>,
}

impl ScoredSource {
    fn from_evaluation(evaluation: UrlEvaluation) -> Self {
        Self {
            url: evaluation.url,
            domain: evaluation.domain,
            score: evaluation.score,
            quality_tier: evaluation.quality_tier,
            source_type: evaluation.source_type,
            signals: evaluation.signals.into_iter().collect(),
            layers: BTreeSet::new(),
            queries: BTreeSet::new(),
        }
    }

    /// Fold another evaluation of the same URL into this record.
    ///
    /// The score only ever rises; the type follows the latest evaluation.
    fn absorb(&mut self, evaluation: UrlEvaluation) {
        self.score = self.score.max(evaluation.score);
        self.quality_tier = QualityTier::from_score(self.score);
        self.source_type = evaluation.source_type;
        self.signals.extend(evaluation.signals);
    }
}

/// Scores URLs with an ordered rule set.
#[derive(Debug, Clone)]
pub struct SourceScorer {
    rules: Vec<SignalRule>,
    type_priority: BTreeMap<String, u8>,
}

impl Default for SourceScorer {
    fn default() -> Self {
        Self::new(default_signal_rules(), default_type_priority())
    }
}

impl SourceScorer {
    pub fn new(rules: Vec<SignalRule>, type_priority: BTreeMap<String, u8>) -> Self {
        Self {
            rules,
            type_priority,
        }
    }

    /// Score a single URL. Returns `None` when the URL has no host.
    pub fn evaluate(&self, url: &str) -> Option<UrlEvaluation> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        if host.is_empty() {
            return None;
        }
        let domain = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };

        let url_lower = url.to_lowercase();
        let mut score: u32 = u32::from(parsed.scheme() == "https");
        let mut signals = Vec::new();
        let mut source_type = GENERAL_SOURCE_TYPE.to_string();
        let mut highest_priority = 0u8;

        for rule in &self.rules {
            if !rule.matches(&host, &url_lower) {
                continue;
            }
            score += u32::from(rule.score);
            signals.push(rule.signal.clone());
            let priority = self
                .type_priority
                .get(&rule.source_type)
                .copied()
                .unwrap_or(0);
            if priority > highest_priority {
                source_type = rule.source_type.clone();
                highest_priority = priority;
            }
        }

        if host.ends_with(".org") {
            signals.push(ORG_SIGNAL.to_string());
            score += 1;
        }

        let score = score.min(u32::from(MAX_SCORE)) as u8;
        Some(UrlEvaluation {
            url: url.to_string(),
            domain,
            score,
            quality_tier: QualityTier::from_score(score),
            source_type,
            signals,
        })
    }

    /// Score every URL found in the result blobs.
    ///
    /// Sorted by descending score, then domain, then URL.
    pub fn score_results(&self, results: &LayerResults) -> Vec<ScoredSource> {
        let mut aggregated: HashMap<String, ScoredSource> = HashMap::new();

        for entry in results.entries() {
            for url in extract_urls(&entry.result) {
                let Some(evaluation) = self.evaluate(&url) else {
                    continue;
                };
                let record = match aggregated.entry(evaluation.url.clone()) {
                    Entry::Occupied(slot) => {
                        let record = slot.into_mut();
                        record.absorb(evaluation);
                        record
                    }
                    Entry::Vacant(slot) => slot.insert(ScoredSource::from_evaluation(evaluation)),
                };
                record.layers.insert(entry.layer_id.clone());
                if !entry.query.is_empty() {
                    record.queries.insert(entry.query.clone());
                }
            }
        }

        let mut scored: Vec<ScoredSource> = aggregated.into_values().collect();
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.domain.cmp(&b.domain))
                .then_with(|| a.url.cmp(&b.url))
        });
        scored
    }
}

/// Unique URLs that follow a `URL:` marker, trailing punctuation removed.
pub fn extract_urls(text: &str) -> Vec<String> {
    let Some(pattern) = URL_PATTERN.as_ref() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for capture in pattern.captures_iter(text) {
        let cleaned = capture[1]
            .trim()
            .trim_end_matches([')', '.', ',', ';'])
            .to_string();
        if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
            urls.push(cleaned);
        }
    }
    urls
}

/// One summary line per source, at most `limit` lines.
///
/// `- [TIER | score] domain (layers) -> url | first three signals`
pub fn format_source_summary(sources: &[ScoredSource], limit: usize) -> String {
    sources
        .iter()
        .take(limit)
        .map(|source| {
            let layers = source.layers.iter().cloned().collect::<Vec<_>>().join(", ");
            let signals = source
                .signals
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let mut line = format!(
                "- [{} | {}] {} ({layers}) -> {}",
                source.quality_tier.as_str().to_uppercase(),
                source.score,
                source.domain,
                source.url
            );
            if !signals.is_empty() {
                line.push_str(" | ");
                line.push_str(&signals);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn rule(source_type: &str, score: u8, signal: &str, patterns: &[&str]) -> SignalRule {
    SignalRule {
        source_type: source_type.to_string(),
        score,
        signal: signal.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

/// The reference credibility rules, in evaluation order.
pub fn default_signal_rules() -> Vec<SignalRule> {
    vec![
        rule(
            "academic",
            3,
            "Hakemli/Akademik kaynak",
            &[
                "arxiv.org",
                ".edu",
                ".ac.",
                "ieee.org",
                "acm.org",
                "springer",
                "nature.com",
                "sciencedirect",
                "frontiersin",
                "ieeexplore.ieee.org",
                "scholar.google",
                "researchgate",
                "pubmed",
            ],
        ),
        rule(
            "conference",
            3,
            "Konferans bildirisi",
            &["proceedings", "conference", "neurips", "icml", "cvpr", "aaai", "emnlp"],
        ),
        rule(
            "industry",
            2,
            "Endüstri raporu",
            &["gartner", "mckinsey", "bcg", "accenture", "deloitte", "forrester", "pwc"],
        ),
        rule(
            "technical",
            2,
            "Teknik dokümantasyon",
            &[
                "docs.",
                "documentation",
                "developer.",
                "readthedocs",
                "learn.microsoft",
                "docs.oracle.com",
                "aws.amazon.com",
                "cloud.google",
                "azure.microsoft",
            ],
        ),
        rule(
            "repository",
            2,
            "Kod deposu",
            &["github.com", "gitlab.com", "bitbucket.org"],
        ),
        rule(
            "patent",
            3,
            "Patent verisi",
            &["patents.google.com", "uspto.gov", "epo.org", "wipo.int"],
        ),
        rule(
            "government",
            2,
            "Resmi düzenleyici kaynak",
            &[".gov", "europa.eu", "who.int", "nih.gov", "ema.europa.eu"],
        ),
        rule(
            "news",
            1,
            "Güncel haber/analiz",
            &["news", "forbes", "bloomberg", "reuters", "techcrunch", "wired"],
        ),
    ]
}

/// Trust weight per source type; higher wins ties between matching rules.
pub fn default_type_priority() -> BTreeMap<String, u8> {
    [
        ("academic", 6),
        ("conference", 5),
        ("patent", 5),
        ("government", 4),
        ("industry", 4),
        ("technical", 3),
        ("repository", 3),
        ("news", 1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::results::{SearchResultEntry, SearchVariant};
    use pretty_assertions::assert_eq;

    fn results_with(blobs: &[(&str, &str, &str)]) -> LayerResults {
        let mut results = LayerResults::default();
        for (layer, query, blob) in blobs {
            results.push(SearchResultEntry {
                layer_id: layer.to_string(),
                layer_title: layer.to_string(),
                query: query.to_string(),
                variant: SearchVariant::Initial,
                result: blob.to_string(),
            });
        }
        results
    }

    #[test]
    fn test_arxiv_scores_above_plain_http() {
        let scorer = SourceScorer::default();
        let arxiv = scorer.evaluate("https://arxiv.org/abs/123").unwrap();
        let plain = scorer.evaluate("http://example.com/news-2024").unwrap();

        assert_eq!(arxiv.score, 5);
        assert_eq!(arxiv.quality_tier, QualityTier::Medium);
        assert_eq!(arxiv.source_type, "academic");

        assert_eq!(plain.score, 1);
        assert_eq!(plain.quality_tier, QualityTier::Low);
        assert_eq!(plain.source_type, "news");
        assert!(arxiv.score > plain.score);
    }

    #[test]
    fn test_rule_applies_once_per_rule() {
        let scorer = SourceScorer::default();
        // ieee.org and ieeexplore.ieee.org both match the academic rule.
        let eval = scorer.evaluate("https://ieeexplore.ieee.org/document/1").unwrap();
        assert_eq!(eval.score, 5);
        assert_eq!(eval.signals, vec!["Hakemli/Akademik kaynak", ORG_SIGNAL]);
    }

    #[test]
    fn test_higher_priority_type_wins() {
        let scorer = SourceScorer::default();
        // Matches both the conference (5) and industry (4) rules.
        let eval = scorer
            .evaluate("https://www.mckinsey.com/conference-proceedings")
            .unwrap();
        assert_eq!(eval.source_type, "conference");
        assert_eq!(eval.score, 1 + 3 + 2);
    }

    #[test]
    fn test_dot_patterns_match_host_only() {
        let scorer = SourceScorer::default();
        let host_match = scorer.evaluate("https://cs.stanford.edu/paper").unwrap();
        assert_eq!(host_match.source_type, "academic");
        let path_only = scorer.evaluate("https://example.com/page.edu").unwrap();
        assert_eq!(path_only.source_type, GENERAL_SOURCE_TYPE);
        assert_eq!(path_only.score, 1);
    }

    #[test]
    fn test_score_is_capped() {
        let scorer = SourceScorer::default();
        let eval = scorer
            .evaluate("https://arxiv.org/conference/gartner/docs./github.com/patents.google.com/news")
            .unwrap();
        assert_eq!(eval.score, MAX_SCORE);
        assert_eq!(eval.quality_tier, QualityTier::High);
    }

    #[test]
    fn test_invalid_urls_skipped() {
        let scorer = SourceScorer::default();
        assert!(scorer.evaluate("").is_none());
        assert!(scorer.evaluate("not a url").is_none());
        assert!(scorer.evaluate("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_extract_urls_strips_and_dedupes() {
        let text = "1. A\n   URL: https://a.com/x).\n2. B\n   URL:https://b.org;\n   URL: https://a.com/x)";
        assert_eq!(
            extract_urls(text),
            vec!["https://a.com/x".to_string(), "https://b.org".to_string()]
        );
    }

    #[test]
    fn test_aggregation_unions_layers_and_queries() {
        let scorer = SourceScorer::default();
        let results = results_with(&[
            ("foundation", "q1", "URL: https://arxiv.org/abs/1"),
            ("technical", "q2", "URL: https://arxiv.org/abs/1\nURL: http://example.com"),
        ]);
        let scored = scorer.score_results(&results);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].url, "https://arxiv.org/abs/1");
        assert_eq!(
            scored[0].layers.iter().cloned().collect::<Vec<_>>(),
            vec!["foundation", "technical"]
        );
        assert_eq!(scored[0].queries.len(), 2);
    }

    #[test]
    fn test_repeated_url_matches_single_scoring() {
        let scorer = SourceScorer::default();
        let once = scorer.score_results(&results_with(&[(
            "foundation",
            "q",
            "URL: https://github.com/a\nURL: https://b.com",
        )]));
        let twice = scorer.score_results(&results_with(&[
            ("foundation", "q", "URL: https://github.com/a\nURL: https://b.com"),
            ("foundation", "q", "URL: https://github.com/a"),
        ]));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_ties_by_domain() {
        let scorer = SourceScorer::default();
        let scored = scorer.score_results(&results_with(&[(
            "foundation",
            "q",
            "URL: https://zeta.com\nURL: https://alpha.com",
        )]));
        assert_eq!(scored[0].domain, "alpha.com");
        assert_eq!(scored[1].domain, "zeta.com");
    }

    #[test]
    fn test_format_source_summary() {
        let scorer = SourceScorer::default();
        let scored = scorer.score_results(&results_with(&[(
            "future",
            "q",
            "URL: https://arxiv.org/abs/9",
        )]));
        assert_eq!(
            format_source_summary(&scored, 8),
            "- [MEDIUM | 5] arxiv.org (future) -> https://arxiv.org/abs/9 | Hakemli/Akademik kaynak, STK/.org alan adı"
        );
        assert_eq!(format_source_summary(&[], 8), "");
    }
}
