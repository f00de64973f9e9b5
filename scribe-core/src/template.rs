//! Placeholder substitution for prompt and markdown templates.
//!
//! Substitution is literal and sequential: each binding is applied to the
//! output of the previous one, in binding order. A bound value that itself
//! contains a later placeholder token (for example capture content holding
//! `{{title}}`) is rewritten by the later pass. Placeholders without a binding
//! are left in place.

use chrono::{DateTime, Utc};

use crate::models::{Capture, Template};
use crate::parser::ParsedResponse;

/// Ordered placeholder bindings. Names are given without braces.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(&'static str, String)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.entries.push((name, value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replace every `{{name}}` with its bound value.
pub fn render(template: &str, bindings: &Bindings) -> String {
    bindings
        .entries
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{{{}}}}}", name), value)
        })
}

/// Prompt for the generator: `content`, `context` (empty when absent) and
/// `content_type`.
pub fn render_prompt(prompt_template: &str, capture: &Capture) -> String {
    let bindings = Bindings::new()
        .bind("content", capture.content.as_str())
        .bind("context", capture.context.as_deref().unwrap_or(""))
        .bind("content_type", capture.content_type.as_str());

    render(prompt_template, &bindings)
}

/// Final markdown for the vault.
pub fn render_markdown(markdown_template: &str, capture: &Capture, parsed: &ParsedResponse) -> String {
    let bindings = Bindings::new()
        .bind("title", parsed.title.as_str())
        .bind("summary", parsed.summary.as_str())
        .bind("key_points", format_key_points(&parsed.key_points))
        .bind("tags", format_tags(&parsed.tags))
        .bind("created_at", format_created_at(&capture.created_at))
        .bind("content_type", capture.content_type.as_str());

    let sections = Bindings::new()
        .bind("context_section", context_section(capture.context.as_deref()))
        .bind("related_notes_section", "");

    render(&render(markdown_template, &bindings), &sections)
}

/// `- point` per line, or an empty string when there are no points.
pub fn format_key_points(points: &[String]) -> String {
    points
        .iter()
        .map(|point| format!("- {}", point))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Two-space indented YAML-style list, one tag per line.
pub fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("  - {}", tag))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_created_at(created_at: &DateTime<Utc>) -> String {
    created_at.format("%Y-%m-%d %H:%M").to_string()
}

fn context_section(context: Option<&str>) -> String {
    match context {
        Some(context) => format!("## Context\n\n{}", context),
        None => String::new(),
    }
}

// ============================================================================
// Built-in templates
// ============================================================================

pub const STANDARD_TEMPLATE_NAME: &str = "standard";
pub const CONVERSATION_TEMPLATE_NAME: &str = "conversation";

pub const STANDARD_PROMPT_TEMPLATE: &str = "Analyze the following content and provide:
1. A concise title
2. A clear summary (2-3 paragraphs)
3. Key points (bullet list)
4. Suggested tags

Content: {{content}}
Context: {{context}}";

pub const STANDARD_MARKDOWN_TEMPLATE: &str = "---
created: {{created_at}}
tags: {{tags}}
type: {{content_type}}
---

# {{title}}

{{context_section}}

## Summary

{{summary}}

## Key Points

{{key_points}}

{{related_notes_section}}";

pub const CONVERSATION_PROMPT_TEMPLATE: &str = "Summarize this conversation and extract the main takeaways.

Conversation: {{content}}";

pub const CONVERSATION_MARKDOWN_TEMPLATE: &str = "# Conversation: {{context}}

{{summary}}

## Main Takeaways

{{key_points}}";

/// Built-in template by name. Not persisted.
pub fn builtin(name: &str) -> Option<Template> {
    let (prompt, markdown) = match name {
        STANDARD_TEMPLATE_NAME => (STANDARD_PROMPT_TEMPLATE, STANDARD_MARKDOWN_TEMPLATE),
        CONVERSATION_TEMPLATE_NAME => (CONVERSATION_PROMPT_TEMPLATE, CONVERSATION_MARKDOWN_TEMPLATE),
        _ => return None,
    };

    Some(Template::builtin(name, prompt, markdown))
}

/// The template used when a capture has none assigned.
pub fn default_template() -> Template {
    Template::builtin(
        STANDARD_TEMPLATE_NAME,
        STANDARD_PROMPT_TEMPLATE,
        STANDARD_MARKDOWN_TEMPLATE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn capture(context: Option<&str>) -> Capture {
        let mut capture = Capture::new(uuid::Uuid::new_v4(), "Test content", "conversation");
        capture.context = context.map(str::to_string);
        capture.created_at = Utc.with_ymd_and_hms(2025, 12, 13, 18, 35, 7).unwrap();
        capture
    }

    fn parsed() -> ParsedResponse {
        ParsedResponse {
            title: "Test Title".to_string(),
            summary: "Test summary".to_string(),
            key_points: vec!["Point 1".to_string(), "Point 2".to_string()],
            tags: vec!["tag1".to_string(), "tag2".to_string()],
        }
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let bindings = Bindings::new().bind("name", "x");
        assert_eq!(render("{{name}} and {{name}}", &bindings), "x and x");
    }

    #[test]
    fn test_render_leaves_unbound_placeholders() {
        let bindings = Bindings::new().bind("title", "T");
        assert_eq!(render("{{title}} {{unknown}}", &bindings), "T {{unknown}}");
    }

    #[test]
    fn test_render_does_not_escape() {
        let bindings = Bindings::new().bind("content", "<b>&</b>");
        assert_eq!(render("{{content}}", &bindings), "<b>&</b>");
    }

    #[test]
    fn test_render_is_sequential_across_bindings() {
        // A value containing a later placeholder is rewritten by the later pass.
        let bindings = Bindings::new()
            .bind("summary", "see {{title}}")
            .bind("title", "Real");
        assert_eq!(render("{{summary}}", &bindings), "see Real");
    }

    #[test]
    fn test_render_does_not_revisit_earlier_bindings() {
        let bindings = Bindings::new()
            .bind("title", "Real")
            .bind("summary", "see {{title}}");
        assert_eq!(render("{{summary}}", &bindings), "see {{title}}");
    }

    #[test]
    fn test_prompt_binds_content_context_and_type() {
        let prompt = render_prompt("{{content}}|{{context}}|{{content_type}}", &capture(Some("ctx")));
        assert_eq!(prompt, "Test content|ctx|conversation");
    }

    #[test]
    fn test_prompt_absent_context_is_empty() {
        let prompt = render_prompt("Context: {{context}}.", &capture(None));
        assert_eq!(prompt, "Context: .");
    }

    #[test]
    fn test_markdown_key_points_as_bullets() {
        let out = render_markdown("{{key_points}}", &capture(None), &parsed());
        assert_eq!(out, "- Point 1\n- Point 2");
    }

    #[test]
    fn test_markdown_empty_key_points() {
        let mut parsed = parsed();
        parsed.key_points.clear();
        assert_eq!(render_markdown("{{key_points}}", &capture(None), &parsed), "");
    }

    #[test]
    fn test_markdown_tags_indented() {
        let out = render_markdown("Tags:\n{{tags}}", &capture(None), &parsed());
        assert_eq!(out, "Tags:\n  - tag1\n  - tag2");
    }

    #[test]
    fn test_markdown_created_at_and_type() {
        let out = render_markdown("{{created_at}} {{content_type}}", &capture(None), &parsed());
        assert_eq!(out, "2025-12-13 18:35 conversation");
    }

    #[test]
    fn test_markdown_context_section_present() {
        let out = render_markdown("{{context_section}}", &capture(Some("Important context")), &parsed());
        assert_eq!(out, "## Context\n\nImportant context");
    }

    #[test]
    fn test_markdown_context_section_absent() {
        assert_eq!(render_markdown("{{context_section}}", &capture(None), &parsed()), "");
    }

    #[test]
    fn test_markdown_related_notes_always_empty() {
        assert_eq!(
            render_markdown("[{{related_notes_section}}]", &capture(Some("c")), &parsed()),
            "[]"
        );
    }

    #[test]
    fn test_standard_template_renders_all_fields() {
        let template = default_template();
        let markdown = template.markdown_template.unwrap_or_default();
        let out = render_markdown(&markdown, &capture(None), &parsed());

        assert!(out.starts_with("---\ncreated: 2025-12-13 18:35\n"));
        assert!(out.contains("# Test Title"));
        assert!(out.contains("## Summary\n\nTest summary"));
        assert!(out.contains("- Point 1\n- Point 2"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("standard").map(|t| t.name), Some("standard".to_string()));
        assert_eq!(
            builtin("conversation").map(|t| t.prompt_template),
            Some(CONVERSATION_PROMPT_TEMPLATE.to_string())
        );
        assert!(builtin("missing").is_none());
    }
}
