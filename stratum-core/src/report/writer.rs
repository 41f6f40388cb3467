//! Section drafting with optional targeted research.

use super::prompts;
use super::structure::Section;
use crate::brain::Brain;
use crate::error::Result;
use crate::search::{SEARCH_TOOL_NAME, SearchArgs, SearchTool};
use crate::types::Message;
use tracing::{debug, info, warn};

const EXTRA_RESEARCH_HEADER: &str = "\n\n=== EK ARAŞTIRMA ===\n";
const NO_RESEARCH: &str = "Mevcut araştırma verisi yok.";

/// Where a section's flow goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStep {
    Research,
    Draft,
}

impl SectionStep {
    /// Research first only when the section asks for it and none was gathered.
    pub fn first(needs_research: bool, additional_research: &str) -> Self {
        if needs_research && additional_research.trim().is_empty() {
            SectionStep::Research
        } else {
            SectionStep::Draft
        }
    }
}

/// Research text handed to the drafting prompt.
pub fn combine_research(research_data: &str, additional: &str) -> String {
    let mut all = research_data.to_string();
    if !additional.trim().is_empty() {
        all.push_str(EXTRA_RESEARCH_HEADER);
        all.push_str(additional);
    }
    if all.trim().is_empty() {
        NO_RESEARCH.to_string()
    } else {
        all
    }
}

/// Writes one report section at a time.
pub struct SectionWriter<'a> {
    brain: &'a Brain,
    search: &'a dyn SearchTool,
    language: &'a str,
}

impl<'a> SectionWriter<'a> {
    pub fn new(brain: &'a Brain, search: &'a dyn SearchTool, language: &'a str) -> Self {
        Self {
            brain,
            search,
            language,
        }
    }

    /// Produce Markdown for `section`.
    pub async fn write_section(&self, section: &Section, index: usize, research_data: &str) -> Result<String> {
        info!(section = %section.name, index, "Writing section");

        let mut additional = String::new();
        let mut step = SectionStep::first(section.research, &additional);
        loop {
            match step {
                SectionStep::Research => {
                    additional = self.gather_research(section).await?;
                    step = SectionStep::Draft;
                }
                SectionStep::Draft => return self.draft(section, index, research_data, &additional).await,
            }
        }
    }

    /// Ask the model for 2-3 queries through the search tool and run them.
    ///
    /// Rate limits propagate; other search failures skip that call.
    async fn gather_research(&self, section: &Section) -> Result<String> {
        info!(section = %section.name, "Gathering additional research");
        let messages = vec![
            Message::system(prompts::SECTION_RESEARCH_SYSTEM),
            Message::user(prompts::section_research_human(&section.name, &section.description)),
        ];
        let response = self
            .brain
            .think(messages, Some(vec![self.search.definition()]))
            .await?;

        let mut gathered = String::new();
        for call in response.message.content.tool_calls() {
            if call.name != SEARCH_TOOL_NAME {
                debug!(tool = call.name, "Ignoring call to unknown tool");
                continue;
            }
            let args = SearchArgs::from_value(call.arguments);
            match self.search.invoke(args).await {
                Ok(output) => {
                    gathered.push_str("\n\n");
                    gathered.push_str(&output);
                }
                Err(e) if e.as_rate_limit().is_some() => return Err(e),
                Err(e) => warn!(section = %section.name, error = %e, "Section research search failed"),
            }
        }

        if gathered.is_empty() {
            debug!(section = %section.name, "Model issued no usable search calls");
        }
        Ok(gathered)
    }

    async fn draft(&self, section: &Section, index: usize, research_data: &str, additional: &str) -> Result<String> {
        let prompt = prompts::section_writer_human(
            &section.name,
            &section.description,
            index,
            &combine_research(research_data, additional),
        );
        let response = self
            .brain
            .ask(&prompts::section_writer_system(self.language), &prompt)
            .await?;

        let content = response.text();
        if content.trim().is_empty() {
            warn!(section = %section.name, "Model returned an empty section");
            return Ok(format!("# {}\n\nBu bölüm oluşturulurken bir hata oluştu.", section.name));
        }
        info!(section = %section.name, chars = content.chars().count(), "Section written");
        Ok(content)
    }
}
