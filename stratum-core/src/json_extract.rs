//! Tolerant JSON extraction from model output.
//!
//! Model replies often wrap JSON in prose or code fences, or leave naked
//! double quotes inside string values. [`parse_json_from_response`] repairs
//! the quoting and then tries progressively looser ways of locating an
//! object before giving up with a [`ParseError`].
//!
//! The quote repair works line by line and assumes string values do not
//! span lines; multi-line string values are left as they are.

use crate::error::ParseError;
use crate::text::truncate_chars;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static FIELD_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?m)(^\s*"[^"\\]+"\s*:\s*")"#).ok());

static BALANCED_OBJECT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").ok());

static NEWLINE_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\s*").ok());

/// Count the backslashes immediately before `index`.
fn preceding_backslashes(bytes: &[u8], index: usize) -> usize {
    bytes[..index]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
}

/// Byte offset of the last `"` not escaped by an odd backslash run.
fn find_last_unescaped_quote(segment: &str) -> Option<usize> {
    let bytes = segment.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'"' && preceding_backslashes(bytes, i) % 2 == 0)
}

/// Escape every `"` in `value` that is preceded by an even backslash run.
///
/// Returns the rewritten value and whether anything changed.
fn escape_unescaped_quotes(value: &str) -> (String, bool) {
    let mut escaped = String::with_capacity(value.len() + 8);
    let mut backslash_run = 0usize;
    let mut modified = false;

    for ch in value.chars() {
        match ch {
            '\\' => {
                escaped.push(ch);
                backslash_run += 1;
            }
            '"' => {
                if backslash_run % 2 == 0 {
                    escaped.push_str("\\\"");
                    modified = true;
                } else {
                    escaped.push(ch);
                }
                backslash_run = 0;
            }
            _ => {
                escaped.push(ch);
                backslash_run = 0;
            }
        }
    }

    (escaped, modified)
}

/// Escape naked quotes inside `"key": "value` spans, one line at a time.
///
/// Text outside a detected value span is copied unchanged. A string value
/// that continues onto the next line is not repaired.
pub fn normalize_unescaped_quotes(content: &str) -> String {
    let Some(pattern) = FIELD_PATTERN.as_ref() else {
        return content.to_string();
    };

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0usize;
    let mut changed = false;

    for m in pattern.find_iter(content) {
        // A previous span already consumed this line.
        if m.start() < cursor {
            continue;
        }
        let prefix_end = m.end();
        out.push_str(&content[cursor..prefix_end]);

        let line_end = content[prefix_end..]
            .find('\n')
            .map(|offset| prefix_end + offset)
            .unwrap_or(content.len());
        let segment = &content[prefix_end..line_end];

        match find_last_unescaped_quote(segment) {
            Some(closing) => {
                let (fixed, modified) = escape_unescaped_quotes(&segment[..closing]);
                changed |= modified;
                out.push_str(&fixed);
                out.push_str(&segment[closing..]);
            }
            None => out.push_str(segment),
        }
        cursor = line_end;
    }
    out.push_str(&content[cursor..]);

    if changed {
        info!("Escaped naked double quotes in model output");
    }
    out
}

fn try_parse(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate).ok()
}

fn brace_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn balanced_candidates(content: &str) -> Option<Value> {
    let pattern = BALANCED_OBJECT.as_ref()?;
    pattern.find_iter(content).find_map(|m| {
        let candidate = match NEWLINE_RUN.as_ref() {
            Some(newlines) => newlines.replace_all(m.as_str(), " ").into_owned(),
            None => m.as_str().to_string(),
        };
        try_parse(&candidate)
    })
}

fn brace_count(line: &str) -> i64 {
    line.matches('{').count() as i64 - line.matches('}').count() as i64
}

fn accumulate_lines(content: &str) -> Option<Value> {
    let mut collected: Vec<&str> = Vec::new();
    let mut depth = 0i64;

    for line in content.lines() {
        let stripped = line.trim();
        if collected.is_empty() && !stripped.starts_with('{') {
            continue;
        }
        collected.push(stripped);
        depth += brace_count(stripped);
        if depth <= 0 {
            break;
        }
    }

    if collected.is_empty() {
        return None;
    }
    try_parse(&collected.join(" "))
}

/// Extract a JSON value from arbitrary model output.
///
/// Already well-formed input is returned as parsed. Otherwise naked quotes
/// are repaired and the following are tried in order: a direct parse, the
/// span from the first `{` to the last `}`, every object with at most one
/// level of nesting, and a brace-counting line scan.
pub fn parse_json_from_response(response: &str) -> Result<Value, ParseError> {
    let trimmed = response.trim();
    debug!(preview = %truncate_chars(trimmed, 300), "Parsing JSON from model output");

    if let Some(value) = try_parse(trimmed) {
        return Ok(value);
    }

    let content = normalize_unescaped_quotes(trimmed);

    if let Some(value) = try_parse(&content) {
        return Ok(value);
    }

    if let Some(span) = brace_span(&content)
        && let Some(value) = try_parse(span)
    {
        debug!("Extracted JSON from brace span");
        return Ok(value);
    }

    if let Some(value) = balanced_candidates(&content) {
        debug!("Extracted JSON from balanced-brace scan");
        return Ok(value);
    }

    if let Some(value) = accumulate_lines(&content) {
        debug!("Extracted JSON from line accumulation");
        return Ok(value);
    }

    warn!(
        chars = response.chars().count(),
        "No JSON object could be extracted from model output"
    );
    Err(ParseError {
        content: response.to_string(),
    })
}

/// Like [`parse_json_from_response`], but only accepts JSON objects.
pub fn parse_json_object(response: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    match parse_json_from_response(response)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError {
            content: response.to_string(),
        }),
    }
}
