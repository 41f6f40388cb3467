//! Thematic research layers and query budget distribution.
//!
//! A layer is a fixed research angle on a topic (foundations, technical
//! detail, practical value, outlook, comparison). Layers are plain data so
//! they can be replaced through configuration; the five reference layers are
//! returned by [`default_layers`].

use serde::{Deserialize, Serialize};

/// A single research layer definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchLayer {
    /// Stable identifier used as the plan key.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// What the layer covers.
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    /// Preferred kinds of sources for this layer.
    #[serde(default)]
    pub source_targets: Vec<String>,
    /// Query templates; `{topic}` is replaced with the research topic.
    #[serde(default)]
    pub seed_queries: Vec<String>,
    /// Lowercase fragments that identify this layer in free text.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ResearchLayer {
    /// Seed queries with the topic substituted in.
    pub fn seed_queries_for(&self, topic: &str) -> Vec<String> {
        self.seed_queries
            .iter()
            .map(|template| template.replace("{topic}", topic))
            .collect()
    }
}

/// Per-layer minimum query counts, in layer declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDistribution {
    allocations: Vec<(String, usize)>,
}

impl QueryDistribution {
    /// Allocated count for a layer; unknown layers get one query.
    pub fn get(&self, layer_id: &str) -> usize {
        self.allocations
            .iter()
            .find(|(id, _)| id == layer_id)
            .map(|(_, count)| *count)
            .unwrap_or(1)
    }

    pub fn total(&self) -> usize {
        self.allocations.iter().map(|(_, count)| count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.allocations.iter().map(|(id, count)| (id.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Split a total query budget across layers.
///
/// Each layer gets `total / layers`; a zero quotient gives every layer one
/// query. Any remainder goes one by one to layers in declaration order.
pub fn distribute_queries(total_requested: usize, layers: &[ResearchLayer]) -> QueryDistribution {
    let total_requested = total_requested.max(1);
    let layer_count = layers.len();
    if layer_count == 0 {
        return QueryDistribution::default();
    }

    let base = total_requested / layer_count;
    let mut allocations: Vec<(String, usize)> = layers
        .iter()
        .map(|layer| (layer.id.clone(), base.max(1)))
        .collect();

    if base > 0 {
        let remainder = total_requested - base * layer_count;
        for slot in allocations.iter_mut().take(remainder) {
            slot.1 += 1;
        }
    }

    QueryDistribution { allocations }
}

/// Resolve a free-text layer reference to a configured layer id.
///
/// Matching is case-insensitive: an exact id, a text containing the id, or
/// a text containing one of the layer's aliases.
pub fn match_layer_id<'a>(layers: &'a [ResearchLayer], raw: &str) -> Option<&'a str> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if let Some(layer) = layers.iter().find(|l| l.id.to_lowercase() == text) {
        return Some(&layer.id);
    }
    layers
        .iter()
        .find(|layer| {
            text.contains(&layer.id.to_lowercase())
                || layer
                    .aliases
                    .iter()
                    .any(|alias| !alias.is_empty() && text.contains(&alias.to_lowercase()))
        })
        .map(|layer| layer.id.as_str())
}

/// Look up a layer by id.
pub fn find_layer<'a>(layers: &'a [ResearchLayer], id: &str) -> Option<&'a ResearchLayer> {
    layers.iter().find(|layer| layer.id == id)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The five reference layers.
pub fn default_layers() -> Vec<ResearchLayer> {
    vec![
        ResearchLayer {
            id: "foundation".into(),
            title: "Foundation · Temel Katman".into(),
            description: "Temel kavramlar, terminoloji, tarihçe ve pazar görünümü".into(),
            objectives: strings(&[
                "Temel kavramları ve terminolojiyi açıklamak",
                "Kavramsal çerçeveyi ve tarihsel gelişimi belgelemek",
                "Mevcut pazar durumunu ve ekosistemi özetlemek",
            ]),
            source_targets: strings(&[
                "academic papers",
                "government & standards bodies",
                "industry landscape reports",
            ]),
            seed_queries: strings(&[
                "\"{topic}\" fundamentals 2024",
                "\"{topic}\" history timeline",
                "\"{topic}\" market overview report 2024",
                "\"{topic}\" temel kavramlar nelerdir",
            ]),
            aliases: strings(&["foundation", "temel", "fundamental"]),
        },
        ResearchLayer {
            id: "technical".into(),
            title: "Technical · Mimari & Uygulama".into(),
            description: "Teknik mimari, altyapı ve uygulama ayrıntıları".into(),
            objectives: strings(&[
                "Ana teknolojileri, modelleri ve algoritmaları incelemek",
                "Sistem mimarilerini ve entegrasyon modellerini çıkarmak",
                "Referans implementasyonları ve kod örneklerini toplamak",
            ]),
            source_targets: strings(&[
                "technical documentation",
                "architecture whitepapers",
                "GitHub repositories",
            ]),
            seed_queries: strings(&[
                "\"{topic}\" reference architecture 2024",
                "\"{topic}\" implementation guide filetype:pdf",
                "\"{topic}\" API documentation site:docs",
                "\"{topic}\" github repository",
            ]),
            aliases: strings(&["technical", "teknik", "engineering", "implementation"]),
        },
        ResearchLayer {
            id: "practical".into(),
            title: "Practical · Vaka & İş Değeri".into(),
            description: "Gerçek projeler, iş etkisi ve yatırım geri dönüşü".into(),
            objectives: strings(&[
                "Gerçek dünya uygulamalarını ve vaka çalışmalarını derlemek",
                "ROI, maliyet ve iş değeri analizlerini toplamak",
                "Regülasyon, etik ve operasyonel hususları belirlemek",
            ]),
            source_targets: strings(&[
                "industry reports",
                "case studies",
                "news & government initiatives",
            ]),
            seed_queries: strings(&[
                "\"{topic}\" case study healthcare",
                "\"{topic}\" deployment ROI 2024",
                "\"{topic}\" pilot project government",
                "\"{topic}\" gerçek dünya uygulamaları",
            ]),
            aliases: strings(&["practical", "business", "case", "uygulama"]),
        },
        ResearchLayer {
            id: "future".into(),
            title: "Future · Trendler & Yol Haritası".into(),
            description: "Gelecek projeksiyonları, trendler ve riskler".into(),
            objectives: strings(&[
                "Emerging trendleri ve teknoloji yol haritalarını tespit etmek",
                "Riskleri, engelleri ve başarı faktörlerini analiz etmek",
                "Uzun vadeli fırsatları ve dönüşümleri belirlemek",
            ]),
            source_targets: strings(&[
                "conference proceedings",
                "futurist think-tank reports",
                "patent databases",
            ]),
            seed_queries: strings(&[
                "\"{topic}\" future roadmap 2025",
                "\"{topic}\" emerging trends 2024",
                "\"{topic}\" risk assessment report",
                "\"{topic}\" patent landscape",
            ]),
            aliases: strings(&["future", "trend", "roadmap", "gelecek"]),
        },
        ResearchLayer {
            id: "comparative".into(),
            title: "Comparative · Karşılaştırmalı Analiz".into(),
            description: "Alternatif yaklaşımlar, benchmark ve karşılaştırmalar".into(),
            objectives: strings(&[
                "Rakip veya alternatif çözümleri karşılaştırmak",
                "Benchmark sonuçlarını ve metodolojilerini toplamak",
                "Avantaj/dezavantaj ve seçim kriterlerini belirlemek",
            ]),
            source_targets: strings(&[
                "comparative whitepapers",
                "benchmark studies",
                "independent analyst reviews",
            ]),
            seed_queries: strings(&[
                "\"{topic}\" vs alternative solutions 2024",
                "\"{topic}\" benchmarking study",
                "\"{topic}\" karşılaştırma raporu",
                "\"{topic}\" alternative approaches analysis",
            ]),
            aliases: strings(&["comparative", "benchmark", "comparison", "alternatif"]),
        },
    ]
}
