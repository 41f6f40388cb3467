//! Prompts for report planning, section writing, compilation and QC.

/// System prompt for the report planner.
pub fn planner_system(language: &str) -> String {
    format!(
        "You are a report planning expert. You design the structure of a research report on a topic.\n\n\
         Reply with JSON ONLY. Do not add any other text.\n\n\
         JSON format:\n\
         {{\n  \"title\": \"Report title\",\n  \"sections\": [\n    \
         {{\"name\": \"Section name\", \"description\": \"What this section covers\", \"research\": true}},\n    \
         {{\"name\": \"Another section\", \"description\": \"What this section covers\", \"research\": false}}\n  ]\n}}\n\n\
         Plan a report with 4-6 sections. Sections marked research: true get additional research. \
         Write the title, names and descriptions in {language}."
    )
}

/// Human prompt for the report planner.
pub fn planner_human(topic: &str, research_excerpt: &str) -> String {
    format!(
        "Topic: {topic}\n\n\
         Research data:\n{research_excerpt}\n\n\
         Using this information, create a comprehensive report structure of 4-6 sections. Reply in JSON."
    )
}

/// System prompt for drafting one section.
pub fn section_writer_system(language: &str) -> String {
    format!(
        "You are a professional technical report writer. You write high quality, informative \
         report sections from the research data you are given.\n\n\
         While writing:\n\
         1. Follow the grammar of {language}\n\
         2. Use technical terms correctly\n\
         3. Refer to the research data\n\
         4. Keep the language fluent and clear\n\
         5. Write in Markdown\n\
         6. Keep the heading hierarchy\n\
         7. Add examples and explanations where needed\n\n\
         Formatting rules:\n\
         - H2 headings (##) for the section title\n\
         - H3 headings (###) for subsections\n\
         - Bold (**text**) for key concepts\n\
         - Italics (*text*) for emphasis\n\
         - Bullets (-) for lists\n\
         - Numbered lists (1.) for steps\n\n\
         Write in {language}."
    )
}

/// Human prompt for drafting one section.
pub fn section_writer_human(name: &str, description: &str, index: usize, research: &str) -> String {
    format!(
        "Section details:\n\
         - Name: {name}\n\
         - Description: {description}\n\
         - Position: {index}\n\n\
         Research data:\n{research}\n\n\
         Write a professional report section from this information. The section should be about \
         300-500 words and formatted as Markdown."
    )
}

pub const SECTION_RESEARCH_SYSTEM: &str = "You are an expert at writing web research queries.";

/// Prompt asking for targeted queries for one section.
pub fn section_research_human(name: &str, description: &str) -> String {
    format!(
        "The section \"{name}\" needs additional research.\n\n\
         Section description: {description}\n\n\
         Create 2-3 specific web search queries for this section and run them with the search tool. \
         The queries should target detailed information that supports the section's content."
    )
}

/// System prompt for the compiler.
pub fn compiler_system(language: &str) -> String {
    format!(
        "You are a professional report compiler. You combine the given sections into one coherent, \
         fluent report.\n\n\
         Compilation rules:\n\
         1. Add a report title and date\n\
         2. Create a table of contents\n\
         3. Smooth the transitions between sections\n\
         4. Keep style and formatting consistent\n\
         5. Add a conclusion and recommendations section\n\
         6. Keep the Markdown formatting\n\
         7. Follow the grammar of {language}\n\n\
         Write in {language}."
    )
}

/// Human prompt for the compiler. `sections` is already framed per section.
pub fn compiler_human(topic: &str, sections: &str) -> String {
    format!(
        "Report topic: {topic}\n\n\
         Sections:\n{sections}\n\
         Compile a professional report from these sections. It must have this structure:\n\
         - Title and date\n\
         - Table of contents\n\
         - Introduction (write it yourself)\n\
         - The given sections\n\
         - Conclusion and recommendations (write it yourself)"
    )
}

pub const QUALITY_CHECK_SYSTEM: &str = "\
You are a report quality control expert. Inspect the report and detect these problems:

1. ENCODING ISSUES:
   - Broken UTF-8 characters
   - Characters from unrelated scripts (Arabic, etc.)
   - Garbled text

2. MARKDOWN/FORMAT ISSUES:
   - Broken HTML links
   - Broken heading formats
   - Missing or wrong Markdown syntax

3. CONTENT ISSUES:
   - Nonsense words
   - Unfinished sentences
   - Mixed languages
   - Repeated or contradictory information

4. STRUCTURAL ISSUES:
   - Missing sections
   - Broken navigation
   - Inconsistent formatting

Only list the problems, do not fix them. Reply in JSON:
{
  \"encoding_issues\": [\"issue1\", \"issue2\"],
  \"format_issues\": [\"issue1\", \"issue2\"],
  \"content_issues\": [\"issue1\", \"issue2\"],
  \"structural_issues\": [\"issue1\", \"issue2\"],
  \"severity\": \"low|medium|high\",
  \"overall_score\": 0-100
}";

pub fn quality_check_human(report: &str) -> String {
    format!("Report:\n\n{report}")
}

/// System prompt for the model-based repair.
pub fn quality_fix_system(language: &str) -> String {
    format!(
        "You are a report repair expert. Fix the problems in the given report:\n\n\
         RULES:\n\
         1. Remove or repair broken UTF-8 characters\n\
         2. Remove characters from unrelated scripts\n\
         3. Repair broken HTML links\n\
         4. Repair the Markdown formatting\n\
         5. Replace nonsense words with meaningful ones\n\
         6. Complete or remove unfinished sentences\n\
         7. Keep the language consistent ({language} only)\n\
         8. Repair the heading hierarchy\n\
         9. Repair navigation links\n\
         10. Make the content flow logically\n\n\
         Return ONLY the repaired report, without any commentary."
    )
}

pub fn quality_fix_human(report: &str, issues: &str) -> String {
    format!("Report to repair:\n\n{report}\n\nDetected issues:\n{issues}\n\nRepaired report:")
}
