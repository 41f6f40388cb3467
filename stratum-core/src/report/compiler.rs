//! Report compilation with a deterministic fallback.
//!
//! The model gets every section and is asked to add a title, a table of
//! contents, an introduction and a conclusion. Its output is checked by
//! [`insufficiency`]; when the check fails, or the call fails for a reason
//! other than a rate limit, [`manual_compile`] assembles the report instead.

use super::prompts;
use crate::brain::Brain;
use crate::error::Result;
use crate::text::word_count;
use std::collections::HashSet;
use tracing::{info, warn};

/// Input size below which structural markers and length are not checked.
const MIN_INPUT_WORDS: usize = 200;
/// The compiled text must keep at least this share of the input words.
const MIN_WORD_RATIO: f64 = 0.6;

const TOC_MARKERS: &[&str] = &["table of contents", "contents", "içindekiler"];
const INTRO_MARKERS: &[&str] = &["introduction", "giriş"];
const CONCLUSION_MARKERS: &[&str] = &["conclusion", "sonuç"];

const INTRODUCTION_SLUG: &str = "introduction";
const CONCLUSION_SLUG: &str = "conclusion";

/// The compiled document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledReport {
    pub content: String,
    /// Set when the deterministic layout replaced the model's output.
    pub used_manual: bool,
    /// Why the model's output was rejected.
    pub fallback_reason: Option<String>,
}

/// Lowercase with the dotted capital I folded to a plain `i`.
fn fold_case(text: &str) -> String {
    text.to_lowercase().replace("i\u{307}", "i")
}

fn has_marker(folded: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| folded.contains(marker))
}

/// Why a compiled text should be discarded, or `None` when it is usable.
pub fn insufficiency(compiled: &str, truncated: bool, input_words: usize) -> Option<String> {
    if truncated {
        return Some("model output was truncated".to_string());
    }
    if compiled.trim().is_empty() {
        return Some("model returned an empty report".to_string());
    }
    if input_words < MIN_INPUT_WORDS {
        return None;
    }

    let compiled_words = word_count(compiled);
    if (compiled_words as f64) < input_words as f64 * MIN_WORD_RATIO {
        return Some(format!(
            "compiled report has {compiled_words} words for {input_words} input words"
        ));
    }

    let folded = fold_case(compiled);
    let missing = [TOC_MARKERS, INTRO_MARKERS, CONCLUSION_MARKERS]
        .iter()
        .filter(|markers| !has_marker(&folded, markers))
        .count();
    if missing >= 2 {
        return Some(format!("{missing} of 3 structural markers are missing"));
    }
    None
}

/// Anchor slug for a heading. Empty results fall back to `section-{index}`.
pub fn slugify(title: &str, index: usize) -> String {
    let mut slug = String::new();
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("section-{index}")
    } else {
        slug.to_string()
    }
}

/// Hands out unique slugs, suffixing repeats with `-2`, `-3`, ...
#[derive(Debug)]
struct SlugRegistry {
    taken: HashSet<String>,
}

impl SlugRegistry {
    fn new() -> Self {
        Self {
            taken: [INTRODUCTION_SLUG, CONCLUSION_SLUG]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    fn claim(&mut self, base: String) -> String {
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Drop a leading `1.` / `1)` numbering prefix.
fn strip_numbering(text: &str) -> &str {
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return text;
    }
    let rest = &text[digits..];
    match rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => text,
    }
}

fn clean_title(raw: &str) -> String {
    let title = raw.trim().trim_matches('*').trim();
    strip_numbering(title).trim().to_string()
}

/// Title and body for one section.
///
/// The title comes from the first heading line, which is then removed from
/// the body. Without a heading the first non-empty line is used and the
/// body is kept whole. `Section {index}` is the last resort.
pub fn section_title(text: &str, index: usize) -> (String, String) {
    let trimmed = text.trim();
    let mut lines = trimmed.lines();
    let Some(first) = lines.by_ref().map(str::trim).find(|line| !line.is_empty()) else {
        return (format!("Section {index}"), String::new());
    };

    if first.starts_with('#') {
        let title = clean_title(first.trim_start_matches('#'));
        let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        if title.is_empty() {
            return (format!("Section {index}"), body);
        }
        return (title, body);
    }

    let title = clean_title(first);
    if title.is_empty() {
        (format!("Section {index}"), trimmed.to_string())
    } else {
        (title, trimmed.to_string())
    }
}

/// Deterministic report layout. Blank sections are skipped.
pub fn manual_compile(topic: &str, sections: &[String]) -> String {
    let topic = match topic.trim() {
        "" => "Report",
        topic => topic,
    };
    let mut slugs = SlugRegistry::new();
    let entries: Vec<(String, String, String)> = sections
        .iter()
        .filter(|section| !section.trim().is_empty())
        .enumerate()
        .map(|(i, section)| {
            let number = i + 1;
            let (title, body) = section_title(section, number);
            let slug = slugs.claim(slugify(&title, number));
            (title, slug, body)
        })
        .collect();

    let mut out = format!("# {topic}\n\n## Table of Contents\n\n");
    out.push_str(&format!("- [Introduction](#{INTRODUCTION_SLUG})\n"));
    for (i, (title, slug, _)) in entries.iter().enumerate() {
        out.push_str(&format!("{}. [{}](#{slug})\n", i + 1, escape_link_text(title)));
    }
    out.push_str(&format!("- [Conclusion](#{CONCLUSION_SLUG})\n\n"));

    out.push_str("## Introduction\n\n");
    out.push_str(&format!(
        "This report brings together the research gathered on {topic}. \
         The sections below follow the order of the table of contents.\n\n"
    ));

    for (i, (title, slug, body)) in entries.iter().enumerate() {
        out.push_str(&format!("<a id=\"{slug}\"></a>\n## {}. {title}\n\n", i + 1));
        if !body.is_empty() {
            out.push_str(body);
            out.push_str("\n\n");
        }
    }

    out.push_str("## Conclusion\n\n");
    out.push_str(&format!(
        "This report covered {} section(s) on {topic}. \
         The findings above should be read together with the sources they cite.\n",
        entries.len()
    ));
    out
}

/// Escape brackets so a title stays inside its Markdown link text.
fn escape_link_text(title: &str) -> String {
    title.replace('[', "\\[").replace(']', "\\]")
}

/// Frame sections for the compile prompt.
fn frame_sections(sections: &[&String]) -> String {
    sections
        .iter()
        .enumerate()
        .map(|(i, section)| format!("=== BÖLÜM {} ===\n{section}\n\n", i + 1))
        .collect()
}

/// Merges written sections into one report.
pub struct ReportCompiler<'a> {
    brain: &'a Brain,
    language: &'a str,
}

impl<'a> ReportCompiler<'a> {
    pub fn new(brain: &'a Brain, language: &'a str) -> Self {
        Self { brain, language }
    }

    /// Compile with the model, falling back to [`manual_compile`].
    ///
    /// Rate limits propagate so failover can switch providers.
    pub async fn compile(&self, topic: &str, sections: &[String]) -> Result<CompiledReport> {
        let written: Vec<&String> = sections.iter().filter(|s| !s.trim().is_empty()).collect();
        if written.is_empty() {
            warn!("No section content to compile");
            return Ok(Self::manual(topic, sections, "no section content".to_string()));
        }

        let input_words: usize = written.iter().map(|s| word_count(s)).sum();
        info!(sections = written.len(), input_words, "Compiling report");

        let prompt = prompts::compiler_human(topic, &frame_sections(&written));
        let response = match self
            .brain
            .ask(&prompts::compiler_system(self.language), &prompt)
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_rate_limit().is_some() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Compilation call failed");
                return Ok(Self::manual(topic, sections, format!("compilation failed: {e}")));
            }
        };

        let content = response.text();
        match insufficiency(&content, response.is_truncated(), input_words) {
            Some(reason) => {
                warn!(reason = %reason, "Compiled report rejected");
                Ok(Self::manual(topic, sections, reason))
            }
            None => Ok(CompiledReport {
                content,
                used_manual: false,
                fallback_reason: None,
            }),
        }
    }

    fn manual(topic: &str, sections: &[String], reason: String) -> CompiledReport {
        CompiledReport {
            content: manual_compile(topic, sections),
            used_manual: true,
            fallback_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::LlmError;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn words(n: usize) -> String {
        vec!["kelime"; n].join(" ")
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fırsatlar ve Zorluklar", 1), "fırsatlar-ve-zorluklar");
        assert_eq!(slugify("  A -- B  ", 1), "a-b");
        assert_eq!(slugify("C++ & Rust!", 2), "c-rust");
        assert_eq!(slugify("???", 3), "section-3");
        assert_eq!(slugify("İçerik", 1), "içerik");
    }

    #[test]
    fn test_duplicate_slugs_get_suffixes() {
        let mut slugs = SlugRegistry::new();
        assert_eq!(slugs.claim("a".into()), "a");
        assert_eq!(slugs.claim("a".into()), "a-2");
        assert_eq!(slugs.claim("a".into()), "a-3");
        assert_eq!(slugs.claim("introduction".into()), "introduction-2");
    }

    #[test]
    fn test_section_title() {
        assert_eq!(
            section_title("## 2. Mevcut Durum\n\nMetin", 1),
            ("Mevcut Durum".to_string(), "Metin".to_string())
        );
        assert_eq!(
            section_title("\n**Giriş**\nMetin", 1),
            ("Giriş".to_string(), "**Giriş**\nMetin".to_string())
        );
        assert_eq!(section_title("##\nbody", 4), ("Section 4".to_string(), "body".to_string()));
        assert_eq!(strip_numbering("2024 yılı"), "2024 yılı");
    }

    #[test]
    fn test_manual_compile_layout() {
        let sections = vec![
            "## Giriş\nA".to_string(),
            "   ".to_string(),
            "## Giriş\nB".to_string(),
            "plain text".to_string(),
        ];
        let report = manual_compile("Konu", &sections);

        assert!(report.starts_with("# Konu\n"));
        assert!(report.contains("- [Introduction](#introduction)\n1. [Giriş](#giriş)\n2. [Giriş](#giriş-2)\n3. [plain text](#plain-text)\n- [Conclusion](#conclusion)"));
        assert!(report.contains("<a id=\"giriş-2\"></a>\n## 2. Giriş\n\nB\n"));
        assert!(report.contains("## 3. plain text\n\nplain text\n"));
        assert!(!report.contains("## 4."));
        assert!(report.contains("## Conclusion"));
    }

    #[test]
    fn test_manual_compile_exact_output() {
        let report = manual_compile("", &["## Özet\nGövde".to_string()]);
        let expected = "# Report\n\n\
            ## Table of Contents\n\n\
            - [Introduction](#introduction)\n\
            1. [Özet](#özet)\n\
            - [Conclusion](#conclusion)\n\n\
            ## Introduction\n\n\
            This report brings together the research gathered on Report. \
            The sections below follow the order of the table of contents.\n\n\
            <a id=\"özet\"></a>\n\
            ## 1. Özet\n\n\
            Gövde\n\n\
            ## Conclusion\n\n\
            This report covered 1 section(s) on Report. \
            The findings above should be read together with the sources they cite.\n";
        assert_eq!(report, expected);
    }

    #[test]
    fn test_manual_compile_escapes_brackets_in_toc() {
        let sections = vec!["## Sürüm [2.0] Notları\nMetin".to_string()];
        let report = manual_compile("Konu", &sections);

        assert!(
            report.contains("1. [Sürüm \\[2.0\\] Notları](#sürüm-20-notları)\n"),
            "table of contents was:\n{report}"
        );
        assert!(report.contains("## 1. Sürüm [2.0] Notları\n"));
    }

    #[test]
    fn test_insufficiency_rules() {
        assert!(insufficiency("full text", true, 10).is_some());
        assert!(insufficiency("  ", false, 10).is_some());
        assert_eq!(insufficiency("short", false, 50), None);

        let input = 300;
        assert!(insufficiency(&words(100), false, input).is_some());

        let structured = format!("İçindekiler\nGiriş\n{}\nSonuç", words(250));
        assert_eq!(insufficiency(&structured, false, input), None);

        let one_marker = format!("Introduction\n{}", words(250));
        assert!(insufficiency(&one_marker, false, input).is_some());
    }

    #[tokio::test]
    async fn test_accepts_good_compilation() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("# Report\n## Contents\n## Introduction\nx\n## Conclusion\ny");
        let brain = Brain::new(mock.clone(), "mock");

        let compiled = ReportCompiler::new(&brain, "Turkish")
            .compile("t", &["## A\nbody".to_string(), "## B\nmore".to_string()])
            .await
            .unwrap();
        assert!(!compiled.used_manual);

        let prompt = mock.recorded_requests()[0].messages[1].text();
        assert!(prompt.contains("=== BÖLÜM 1 ===\n## A\nbody\n\n=== BÖLÜM 2 ===\n## B\nmore\n\n"));
    }

    #[tokio::test]
    async fn test_truncated_compilation_falls_back() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_response(MockLlmProvider::text_response_with_reason("# Half", "length"));
        let brain = Brain::new(mock, "mock");

        let compiled = ReportCompiler::new(&brain, "Turkish")
            .compile("Konu", &["## A\nbody".to_string()])
            .await
            .unwrap();
        assert!(compiled.used_manual);
        assert!(compiled.content.contains("## 1. A"));
        assert!(compiled.fallback_reason.unwrap().contains("truncated"));
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_but_rate_limit_propagates() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::Connection {
            message: "reset".into(),
        });
        mock.queue_error(LlmError::RateLimited { retry_after_secs: 5 });
        let brain = Brain::new(mock, "mock");
        let compiler = ReportCompiler::new(&brain, "Turkish");
        let sections = vec!["## A\nbody".to_string()];

        assert!(compiler.compile("t", &sections).await.unwrap().used_manual);
        assert!(compiler.compile("t", &sections).await.unwrap_err().as_rate_limit().is_some());
    }
}
