//! Quality control for compiled reports.
//!
//! The model is asked to list problems as JSON. When that fails the regex
//! detectors below produce the same shape. Low scores trigger a cleanup
//! pass and, below a second threshold, a model-based repair.

use super::prompts;
use crate::brain::Brain;
use crate::config::QualityConfig;
use crate::error::Result;
use crate::json_extract::parse_json_from_response;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{info, warn};

/// Issues passed to the repair prompt.
const MAX_FIX_ISSUES: usize = 10;
/// A repair shorter than this share of the cleaned text is discarded.
const MIN_FIX_RATIO: f64 = 0.5;
const MISSING_SCORE: u8 = 100;

const NONSENSE_WORDS: &[&str] = &[
    "Kalıtschaft",
    "Sirküt",
    "DavyBinary",
    "Outre",
    "famoso",
    "Napıлий",
    "oscillations",
    "کاکma",
    "گ",
    "الفقر",
];

fn pattern(source: &str) -> Option<Regex> {
    Regex::new(source).ok()
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

static ENCODING_PATTERNS: LazyLock<Vec<(Option<Regex>, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            pattern(r"[^\x00-\x7F\x{A0}-\x{17F}\x{100}-\x{24F}\x{1E00}-\x{1EFF}]"),
            "Non-Latin characters detected",
        ),
        (pattern(r"Ã[\x{80}-\x{BF}]"), "UTF-8 encoding corruption"),
        (pattern(r"â€™|â€œ|â€\x{9d}"), "Smart quotes encoding issue"),
        (
            pattern(r"Ä±|Åž|Ä\x{9f}|Ã§|Ã¼|Ã¶"),
            "Turkish character encoding issue",
        ),
    ]
});

static FORMAT_PATTERNS: LazyLock<Vec<(Option<Regex>, &'static str)>> = LazyLock::new(|| {
    vec![
        (pattern(r"##[^#\s]"), "Broken heading format detected"),
        (pattern(r"\]\([^)]*$"), "Unclosed markdown links"),
        (pattern(r#"<a name="[^"]*">[^<]*</a>"#), "HTML anchor tags in markdown"),
        (pattern(r"###\s*$"), "Empty headings detected"),
    ]
});

static INCOMPLETE_SENTENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"(?m)\w+\?\s*$"));
static MIXED_LANGUAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"[a-zA-Z]{3,}\s+[^\x00-\x7F]+"));
static HEADING_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"##[^#].*\[.*\]\(##.*\)"));
static HEADING_LEVEL: LazyLock<Option<Regex>> = LazyLock::new(|| pattern(r"(?m)^(#{1,6})\s"));

fn matches(regex: &Option<Regex>, text: &str) -> bool {
    regex.as_ref().is_some_and(|re| re.is_match(text))
}

fn run_patterns(patterns: &[(Option<Regex>, &'static str)], text: &str) -> Vec<String> {
    patterns
        .iter()
        .filter(|(regex, _)| matches(regex, text))
        .map(|(_, label)| label.to_string())
        .collect()
}

pub fn detect_encoding_issues(text: &str) -> Vec<String> {
    run_patterns(&ENCODING_PATTERNS, text)
}

pub fn detect_format_issues(text: &str) -> Vec<String> {
    run_patterns(&FORMAT_PATTERNS, text)
}

pub fn detect_content_issues(text: &str) -> Vec<String> {
    let mut issues: Vec<String> = NONSENSE_WORDS
        .iter()
        .filter(|word| text.contains(*word))
        .map(|word| format!("Nonsense word detected: {word}"))
        .collect();
    if matches(&INCOMPLETE_SENTENCE, text) {
        issues.push("Incomplete sentences ending with ?".to_string());
    }
    if matches(&MIXED_LANGUAGE, text) {
        issues.push("Mixed language content detected".to_string());
    }
    issues
}

pub fn detect_structural_issues(text: &str) -> Vec<String> {
    let mut issues = Vec::new();
    if matches(&HEADING_LINK, text) {
        issues.push("Broken internal navigation links".to_string());
    }
    if let Some(re) = HEADING_LEVEL.as_ref() {
        let levels: Vec<usize> = re
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().len()))
            .collect();
        if let (Some(max), Some(min)) = (levels.iter().max(), levels.iter().min())
            && max - min > 3
        {
            issues.push("Inconsistent heading hierarchy".to_string());
        }
    }
    issues
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    fn from_score(score: u8) -> Self {
        match score {
            80.. => Severity::Low,
            50.. => Severity::Medium,
            _ => Severity::High,
        }
    }
}

/// Problems found in a report and an overall 0-100 score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub encoding_issues: Vec<String>,
    pub format_issues: Vec<String>,
    pub content_issues: Vec<String>,
    pub structural_issues: Vec<String>,
    pub severity: Severity,
    pub overall_score: u8,
}

impl QualityAnalysis {
    /// Every issue in category order.
    pub fn all_issues(&self) -> impl Iterator<Item = &String> {
        self.encoding_issues
            .iter()
            .chain(&self.format_issues)
            .chain(&self.content_issues)
            .chain(&self.structural_issues)
    }

    pub fn issue_count(&self) -> usize {
        self.all_issues().count()
    }

    /// Read the model's JSON reply. Missing lists are empty and a missing
    /// score counts as 100.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let list = |key: &str| -> Vec<String> {
            match object.get(key) {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };
        let overall_score = match object.get("overall_score") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .map(|score| score.clamp(0.0, 100.0) as u8)
        .unwrap_or(MISSING_SCORE);
        let severity = object
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse)
            .unwrap_or_else(|| Severity::from_score(overall_score));

        Some(Self {
            encoding_issues: list("encoding_issues"),
            format_issues: list("format_issues"),
            content_issues: list("content_issues"),
            structural_issues: list("structural_issues"),
            severity,
            overall_score,
        })
    }
}

/// Regex-only analysis used when the model is unavailable.
pub fn heuristic_analysis(report: &str) -> QualityAnalysis {
    let mut analysis = QualityAnalysis {
        encoding_issues: detect_encoding_issues(report),
        format_issues: detect_format_issues(report),
        content_issues: detect_content_issues(report),
        structural_issues: detect_structural_issues(report),
        severity: Severity::Low,
        overall_score: 80,
    };
    let total = analysis.issue_count();
    (analysis.severity, analysis.overall_score) = match total {
        10.. => (Severity::High, 20),
        5.. => (Severity::Medium, 50),
        _ => (Severity::Low, 80),
    };
    analysis
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

static ANCHOR_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r#"<a name="([^"]*)"[^>]*>([^<]*)</a>"#));
static LINKED_HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"##([^#]*)\[.*\]\(##([^)]*)\)"));
static SPACE_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| pattern(r" {2,}"));
static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| pattern(r"\n{3,}"));
static DANGLING_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| pattern(r"\]\([^)]*$"));

fn is_kept_char(c: char) -> bool {
    matches!(c, '\n' | '\t' | '\r' | '\x20'..='\x7E' | '\u{A0}'..='\u{24F}' | '\u{1E00}'..='\u{1EFF}')
}

fn replace(regex: &Option<Regex>, text: String, replacement: &str) -> String {
    match regex {
        Some(re) => re.replace_all(&text, replacement).into_owned(),
        None => text,
    }
}

/// Deterministic repairs that never need the model.
pub fn basic_cleanup(text: &str) -> String {
    let text: String = text.chars().filter(|c| is_kept_char(*c)).collect();
    let text = replace(&ANCHOR_TAG, text, "## $2");
    let text = replace(&LINKED_HEADING, text, "## $1");
    let text = replace(&SPACE_RUN, text, " ");
    let text = replace(&BLANK_LINES, text, "\n\n");
    let text = replace(&DANGLING_LINK, text, "");
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// What the pass did to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAction {
    Disabled,
    CleanupOnly,
    Cleaned,
    ModelRepaired,
}

#[derive(Debug, Clone)]
pub struct QualityOutcome {
    pub content: String,
    pub analysis: Option<QualityAnalysis>,
    pub action: QualityAction,
    /// Set when the analysis came from the regex detectors.
    pub used_heuristics: bool,
}

pub struct QualityController<'a> {
    brain: &'a Brain,
    config: &'a QualityConfig,
    language: &'a str,
}

impl<'a> QualityController<'a> {
    pub fn new(brain: &'a Brain, config: &'a QualityConfig, language: &'a str) -> Self {
        Self {
            brain,
            config,
            language,
        }
    }

    /// Analyze and, when the score is low enough, repair `report`.
    ///
    /// Rate limits propagate. Other model failures fall back to the
    /// heuristics or to cleanup.
    pub async fn process(&self, report: &str) -> Result<QualityOutcome> {
        if !self.config.enabled {
            return Ok(QualityOutcome {
                content: report.to_string(),
                analysis: None,
                action: QualityAction::Disabled,
                used_heuristics: false,
            });
        }

        info!("Quality control started");
        let (analysis, used_heuristics) = self.analyze(report).await?;
        info!(
            score = analysis.overall_score,
            severity = ?analysis.severity,
            issues = analysis.issue_count(),
            "Quality analysis finished"
        );

        let (content, action) = if analysis.overall_score < self.config.fix_threshold {
            self.fix(report, &analysis).await?
        } else {
            (basic_cleanup(report), QualityAction::CleanupOnly)
        };

        Ok(QualityOutcome {
            content,
            analysis: Some(analysis),
            action,
            used_heuristics,
        })
    }

    async fn analyze(&self, report: &str) -> Result<(QualityAnalysis, bool)> {
        let response = match self
            .brain
            .ask(prompts::QUALITY_CHECK_SYSTEM, &prompts::quality_check_human(report))
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_rate_limit().is_some() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Quality analysis failed, using heuristics");
                return Ok((heuristic_analysis(report), true));
            }
        };

        match parse_json_from_response(&response.text()) {
            Ok(value) => match QualityAnalysis::from_value(&value) {
                Some(analysis) => Ok((analysis, false)),
                None => {
                    warn!("Quality analysis was not an object, using heuristics");
                    Ok((heuristic_analysis(report), true))
                }
            },
            Err(e) => {
                warn!(error = %e, "Quality analysis did not parse, using heuristics");
                Ok((heuristic_analysis(report), true))
            }
        }
    }

    async fn fix(&self, report: &str, analysis: &QualityAnalysis) -> Result<(String, QualityAction)> {
        let cleaned = basic_cleanup(report);
        if analysis.overall_score >= self.config.llm_fix_threshold {
            return Ok((cleaned, QualityAction::Cleaned));
        }

        info!("Repairing report with the model");
        let issues = analysis
            .all_issues()
            .take(MAX_FIX_ISSUES)
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");
        let response = match self
            .brain
            .ask(
                &prompts::quality_fix_system(self.language),
                &prompts::quality_fix_human(&cleaned, &issues),
            )
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_rate_limit().is_some() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Report repair failed, keeping cleaned text");
                return Ok((cleaned, QualityAction::Cleaned));
            }
        };

        let repaired = response.text().trim().to_string();
        if (repaired.chars().count() as f64) < cleaned.chars().count() as f64 * MIN_FIX_RATIO {
            warn!("Repaired report too short, keeping cleaned text");
            return Ok((cleaned, QualityAction::Cleaned));
        }
        Ok((repaired, QualityAction::ModelRepaired))
    }
}
