//! Per-layer search result accumulation and digests.

use super::layers::{ResearchLayer, find_layer};
use crate::text::{ellipsize, truncate_chars};
use serde::{Deserialize, Serialize};

/// Which execution pass produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchVariant {
    Initial,
    FollowUp,
}

impl SearchVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchVariant::Initial => "initial",
            SearchVariant::FollowUp => "follow_up",
        }
    }
}

impl std::fmt::Display for SearchVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed query and its raw result blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub layer_id: String,
    pub layer_title: String,
    pub query: String,
    pub variant: SearchVariant,
    /// Free-text result, or an inline failure notice.
    pub result: String,
}

/// Search results grouped by layer, in layer order then arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerResults {
    layers: Vec<(String, Vec<SearchResultEntry>)>,
}

impl LayerResults {
    /// Empty buckets for the given layer ids.
    pub fn with_layers<I, S>(layer_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            layers: layer_ids
                .into_iter()
                .map(|id| (id.into(), Vec::new()))
                .collect(),
        }
    }

    /// Append an entry to its layer bucket, creating the bucket if needed.
    pub fn push(&mut self, entry: SearchResultEntry) {
        let layer_id = entry.layer_id.clone();
        self.bucket_mut(&layer_id).push(entry);
    }

    fn bucket_mut(&mut self, layer_id: &str) -> &mut Vec<SearchResultEntry> {
        let index = match self.layers.iter().position(|(id, _)| id == layer_id) {
            Some(index) => index,
            None => {
                self.layers.push((layer_id.to_string(), Vec::new()));
                self.layers.len() - 1
            }
        };
        &mut self.layers[index].1
    }

    /// Entries for one layer.
    pub fn get(&self, layer_id: &str) -> &[SearchResultEntry] {
        self.layers
            .iter()
            .find(|(id, _)| id == layer_id)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    /// `(layer_id, entries)` pairs in layer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SearchResultEntry])> {
        self.layers
            .iter()
            .map(|(id, entries)| (id.as_str(), entries.as_slice()))
    }

    /// Every entry, layer by layer.
    pub fn entries(&self) -> impl Iterator<Item = &SearchResultEntry> {
        self.layers.iter().flat_map(|(_, entries)| entries.iter())
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate result sets per layer, preserving arrival order.
    ///
    /// Buckets for every configured layer exist in the output even when no
    /// set contributed to them.
    pub fn merge(layers: &[ResearchLayer], sets: &[&LayerResults]) -> LayerResults {
        let mut merged = LayerResults::with_layers(layers.iter().map(|l| l.id.clone()));
        for set in sets {
            for (layer_id, entries) in &set.layers {
                merged
                    .bucket_mut(layer_id)
                    .extend(entries.iter().cloned());
            }
        }
        merged
    }

    /// Human-readable digest bounded to `max_chars` characters.
    ///
    /// Each non-empty layer gets a `### Title (id)` heading followed by
    /// `- Sorgu: q` lines with the result text cut to 600 characters.
    pub fn digest(&self, layers: &[ResearchLayer], max_chars: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        for (layer_id, entries) in &self.layers {
            if entries.is_empty() {
                continue;
            }
            let title = find_layer(layers, layer_id)
                .map(|layer| layer.title.as_str())
                .unwrap_or(layer_id.as_str());
            parts.push(format!("### {title} ({layer_id})"));
            for entry in entries {
                let snippet = ellipsize(entry.result.trim(), 600);
                parts.push(format!("- Sorgu: {}\n{snippet}", entry.query));
            }
        }

        let digest = parts.join("\n");
        if digest.chars().count() > max_chars {
            format!("{}...", truncate_chars(&digest, max_chars))
        } else {
            digest
        }
    }
}
