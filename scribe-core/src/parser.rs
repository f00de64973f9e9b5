//! Heuristic extraction of note fields from free-text generator output.
//!
//! Parsing is line-oriented and never fails: every extractor takes the full
//! line sequence and falls back to an empty/default value when its section is
//! missing. Each extractor scans independently, so section order in the
//! response does not matter.
//!
//! Tag precedence, in order:
//! 1. content on the `Tags:` header line itself wins outright;
//! 2. otherwise bullet lines below the header accumulate;
//! 3. an inline backtick line (not a bullet) replaces everything accumulated
//!    so far and ends the scan.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled Note";

/// Structured fields recovered from a generator response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub tags: Vec<String>,
}

/// Parse a raw response. `existing_tags` (the capture's own tags) are appended
/// after the extracted tags, without deduplication.
pub fn parse_response(raw: &str, existing_tags: &[String]) -> ParsedResponse {
    let lines: Vec<&str> = raw.lines().collect();

    let mut tags = extract_tags(&lines);
    tags.extend(existing_tags.iter().cloned());

    ParsedResponse {
        title: extract_title(&lines),
        summary: extract_summary(&lines),
        key_points: extract_key_points(&lines),
        tags,
    }
}

// ============================================================================
// Patterns
// ============================================================================

// Whitespace classes are ASCII-only (`[[:space:]]` includes \x0B), so a
// no-break space after a bullet does not make it a bullet.
type Pattern = LazyLock<Option<Regex>>;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Pattern = LazyLock::new(|| Regex::new($re).ok());
    };
}

pattern!(TITLE, r"^(?:Title:|#)[[:space:]]*");
pattern!(SUMMARY_HEADER, r"^(?:Summary:|##[[:space:]]*Summary)");
pattern!(SUMMARY_END, r"^(?:##|Key Points:|Tags:)");
pattern!(KEY_POINTS_HEADER, r"^(?:Key Points:|##[[:space:]]*Key Points)");
pattern!(KEY_POINTS_END, r"^(?:##|Tags:|Suggested Tags:)");
pattern!(TAGS_HEADER, r"^(?:Tags:|##[[:space:]]*(?:Suggested )?Tags)");
pattern!(SAME_LINE_TAGS, r"^Tags:[[:space:]]*[^[:space:]]");
pattern!(TAGS_LABEL, r"^Tags:[[:space:]]*");
pattern!(TAG_SEPARATOR, r"[,[:space:]]+");
pattern!(SECTION_END, r"^(?:##|[A-Z][a-z]+:)");
pattern!(BULLET, r"^[-*•][[:space:]]+");
pattern!(BULLET_CHAR, r"^[-*•]");
pattern!(WHITESPACE, r"[[:space:]]+");

fn is_match(pattern: &Pattern, line: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(line))
}

/// Text after a leading match of `pattern`, or `None` if it does not match.
fn strip_match<'a>(pattern: &Pattern, line: &'a str) -> Option<&'a str> {
    let m = pattern.as_ref()?.find(line)?;
    Some(&line[m.end()..])
}

fn split_on<'a>(pattern: &Pattern, text: &'a str) -> Vec<&'a str> {
    match pattern.as_ref() {
        Some(re) => re.split(text).collect(),
        None => vec![text],
    }
}

/// Trim the ASCII whitespace set (plus NUL) used by the pattern classes.
fn strip_ascii(text: &str) -> &str {
    text.trim_matches(|c: char| matches!(c, '\0' | '\t' | '\n' | '\x0B' | '\x0C' | '\r' | ' '))
}

// ============================================================================
// Extractors
// ============================================================================

/// First line starting with `Title:` or `#`, marker and whitespace stripped.
pub fn extract_title(lines: &[&str]) -> String {
    lines
        .iter()
        .find_map(|line| strip_match(&TITLE, line))
        .map(|rest| strip_ascii(rest).to_string())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Non-blank lines after `Summary:` / `## Summary`, up to the next section.
pub fn extract_summary(lines: &[&str]) -> String {
    let Some(start) = lines.iter().position(|line| is_match(&SUMMARY_HEADER, line)) else {
        return String::new();
    };

    let mut collected = Vec::new();
    for line in &lines[start + 1..] {
        if is_match(&SUMMARY_END, line) {
            break;
        }
        if !strip_ascii(line).is_empty() {
            collected.push(*line);
        }
    }

    collected.join("\n")
}

/// Bullet lines after `Key Points:` / `## Key Points`. Non-bullet lines inside
/// the section are skipped.
pub fn extract_key_points(lines: &[&str]) -> Vec<String> {
    let Some(start) = lines.iter().position(|line| is_match(&KEY_POINTS_HEADER, line)) else {
        return Vec::new();
    };

    let mut points = Vec::new();
    for line in &lines[start + 1..] {
        if is_match(&KEY_POINTS_END, line) {
            break;
        }
        if let Some(point) = strip_match(&BULLET, line) {
            points.push(strip_ascii(point).to_string());
        }
    }

    points
}

/// Tags under `Tags:`, `## Tags` or `## Suggested Tags`.
pub fn extract_tags(lines: &[&str]) -> Vec<String> {
    let Some(start) = lines.iter().position(|line| is_match(&TAGS_HEADER, line)) else {
        return Vec::new();
    };

    let header = lines[start];
    if is_match(&SAME_LINE_TAGS, header) {
        let rest = strip_match(&TAGS_LABEL, header).unwrap_or(header);
        // '#' is stripped before backticks, so "`#tag`" keeps its '#'.
        return split_on(&TAG_SEPARATOR, rest)
            .into_iter()
            .map(|token| strip_hash(token).replace('`', ""))
            .filter(|tag| !tag.is_empty())
            .collect();
    }

    let mut tags = Vec::new();
    for line in &lines[start + 1..] {
        if is_match(&SECTION_END, line) {
            break;
        }
        if strip_ascii(line).is_empty() {
            continue;
        }

        if let Some(item) = strip_match(&BULLET, line) {
            let tag = strip_ascii(item).replace('`', "");
            let tag = strip_hash(&tag);
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
            continue;
        }

        if line.contains('`') && !is_match(&BULLET_CHAR, line) {
            return split_on(&WHITESPACE, line)
                .into_iter()
                .map(|token| {
                    let token = token.replace('`', "");
                    strip_ascii(strip_hash(&token)).to_string()
                })
                .filter(|tag| !tag.is_empty())
                .collect();
        }
    }

    tags
}

/// Drop a single leading '#'.
fn strip_hash(token: &str) -> &str {
    token.strip_prefix('#').unwrap_or(token)
}
