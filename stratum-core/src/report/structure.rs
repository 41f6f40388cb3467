//! Report outline planning.

use super::prompts;
use crate::brain::Brain;
use crate::error::Result;
use crate::json_extract::parse_json_from_response;
use crate::text::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

const UNNAMED_SECTION: &str = "Adsız Bölüm";
const NO_DESCRIPTION: &str = "Açıklama yok";
const GENERIC_TOPIC: &str = "Genel Konu";

/// One planned report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub description: String,
    /// Whether the writer runs targeted research before drafting.
    pub research: bool,
    /// Filled in once by the writer.
    #[serde(default)]
    pub content: String,
}

impl Section {
    pub fn new(name: impl Into<String>, description: impl Into<String>, research: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            research,
            content: String::new(),
        }
    }
}

/// Title plus ordered sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStructure {
    pub title: String,
    pub sections: Vec<Section>,
}

/// Lenient truthiness for the model's research flag.
pub fn coerce_research_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(
            text.trim().to_lowercase().as_str(),
            "true" | "evet" | "yes" | "1" | "doğru"
        ),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn text_field(entry: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
    .filter(|text| !text.is_empty())
}

/// Read a planner reply. `None` when it has no usable sections.
///
/// The reply must be an object with both `title` and `sections`;
/// `sections` may be a list or an object whose values are taken in order.
pub fn parse_report_structure(raw: &Value, topic: &str) -> Option<ReportStructure> {
    let object = raw.as_object()?;
    let title = object.get("title")?;
    let sections = match object.get("sections")? {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(map) => map.values().collect(),
        _ => return None,
    };

    let sections: Vec<Section> = sections
        .into_iter()
        .filter_map(|entry| {
            let Some(entry) = entry.as_object() else {
                warn!(entry = %entry, "Skipping section entry that is not an object");
                return None;
            };
            Some(Section::new(
                text_field(entry, "name").unwrap_or_else(|| UNNAMED_SECTION.to_string()),
                text_field(entry, "description").unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                coerce_research_flag(entry.get("research")),
            ))
        })
        .collect();

    if sections.is_empty() {
        return None;
    }

    let title = match title {
        Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => format!("{} Raporu", display_topic(topic)),
    };
    Some(ReportStructure { title, sections })
}

fn display_topic(topic: &str) -> &str {
    let topic = topic.trim();
    if topic.is_empty() { GENERIC_TOPIC } else { topic }
}

/// The fixed six-section outline used when planning fails.
pub fn fallback_structure(topic: &str) -> ReportStructure {
    let topic = display_topic(topic);
    ReportStructure {
        title: format!("{topic} - Detaylı Araştırma Raporu"),
        sections: vec![
            Section::new(
                "Giriş ve Kapsam",
                format!("{topic} konusunun tanıtımı, araştırmanın kapsamı ve amaçları"),
                false,
            ),
            Section::new(
                "Mevcut Durum Analizi",
                format!("{topic} alanındaki mevcut durum, temel kavramlar ve güncel gelişmeler"),
                true,
            ),
            Section::new(
                "Teknoloji ve Yöntemler",
                format!("{topic} kapsamında kullanılan teknolojiler, yöntemler ve araçlar"),
                true,
            ),
            Section::new(
                "Uygulama Alanları",
                format!("{topic} konusunun pratik uygulama alanları ve gerçek dünya örnekleri"),
                true,
            ),
            Section::new(
                "Fırsatlar ve Zorluklar",
                format!("{topic} alanındaki fırsatlar, zorluklar ve çözüm önerileri"),
                true,
            ),
            Section::new(
                "Sonuç ve Öneriler",
                "Araştırma bulgularının özeti, sonuçlar ve gelecek için öneriler",
                false,
            ),
        ],
    }
}

/// A planned outline and whether it came from the fallback.
#[derive(Debug, Clone)]
pub struct PlannedReport {
    pub structure: ReportStructure,
    pub used_fallback: bool,
}

/// Asks the model for a report outline.
pub struct ReportPlanner<'a> {
    brain: &'a Brain,
    research_chars: usize,
    language: &'a str,
}

impl<'a> ReportPlanner<'a> {
    pub fn new(brain: &'a Brain, research_chars: usize, language: &'a str) -> Self {
        Self {
            brain,
            research_chars,
            language,
        }
    }

    /// Plan the outline. Unusable replies yield [`fallback_structure`];
    /// model errors propagate.
    pub async fn plan(&self, topic: &str, research: &str) -> Result<PlannedReport> {
        let prompt = prompts::planner_human(topic, truncate_chars(research, self.research_chars));
        let response = self
            .brain
            .ask(&prompts::planner_system(self.language), &prompt)
            .await?;

        let parsed = match parse_json_from_response(&response.text()) {
            Ok(value) => parse_report_structure(&value, topic),
            Err(e) => {
                warn!(error = %e, "Report plan could not be parsed");
                None
            }
        };

        match parsed {
            Some(structure) => {
                info!(sections = structure.sections.len(), title = %structure.title, "Report planned");
                Ok(PlannedReport {
                    structure,
                    used_fallback: false,
                })
            }
            None => {
                warn!("Using fallback report structure");
                Ok(PlannedReport {
                    structure: fallback_structure(topic),
                    used_fallback: true,
                })
            }
        }
    }
}
