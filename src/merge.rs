//! Intent classification and merge-result normalization.
//!
//! Turns a raw generative reply into a validated [`MergeResult`]:
//! a tagged action, a full replacement document body, and a human-readable
//! explanation. The backend performs the actual merge (append vs. modify
//! vs. replace is prompt-level policy); this module only validates and
//! normalizes what comes back.
//!
//! Parsing is defensive by design:
//! - incidental ``` / ```json fence wrappers are stripped;
//! - a reply that fails to parse as JSON is treated as literal content with
//!   a synthesized explanation — user-visible output is never dropped over
//!   a formatting defect;
//! - an unreachable or unconfigured backend degrades to an `Error` action
//!   carrying a static, renderable fallback body. Nothing raises past this
//!   boundary.
//!
//! Any lightweight markup that leaks through structured parsing (bold and
//! italic wrappers, heading levels 1-3, bullet runs) is normalized into the
//! document's canonical HTML before the result is returned, and blank-line
//! runs collapse to at most one blank line. Normalization is idempotent.

use serde::Deserialize;

use crate::genai::GenerativeBackend;
use crate::models::ConversationTurn;

/// What the backend decided to do with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Add,
    Modify,
    Replace,
    /// Degraded response: the content is a static fallback body.
    Error,
}

impl MergeAction {
    /// Parse the backend's action string. Unknown values default to `Add`,
    /// matching the append-by-default policy.
    fn parse(s: &str) -> Self {
        match s {
            "modify" => MergeAction::Modify,
            "replace" => MergeAction::Replace,
            "error" => MergeAction::Error,
            _ => MergeAction::Add,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Add => "add",
            MergeAction::Modify => "modify",
            MergeAction::Replace => "replace",
            MergeAction::Error => "error",
        }
    }
}

/// Normalized output of a merge request.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub action: MergeAction,
    /// Full new document body (not a diff), in canonical HTML.
    pub content: String,
    pub explanation: String,
}

/// Raw structured reply shape expected from the backend.
#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    action: String,
    #[serde(default, alias = "html_content")]
    content: String,
    #[serde(default)]
    explanation: String,
}

static FALLBACK_UNCONFIGURED: &str = r#"<div class="p-4 bg-yellow-50 border border-yellow-200 rounded-lg">
<h3 class="text-lg font-semibold text-yellow-800 mb-2">Generative backend not configured</h3>
<p class="text-sm text-yellow-700">Set the GEMINI_API_KEY environment variable to enable smart editing.</p>
</div>"#;

/// Classify and merge one instruction against the current document body.
///
/// Sends the current content, the instruction, and the serialized recent
/// history to the backend, then validates and normalizes the reply. Never
/// returns an error: backend failures degrade to an `Error` result with a
/// renderable static body so the mutation transaction still has something
/// to work with.
pub async fn merge(
    backend: &dyn GenerativeBackend,
    current_content: &str,
    instruction: &str,
    recent_history: &[ConversationTurn],
    preferred_model: Option<&str>,
) -> MergeResult {
    if !backend.enabled() {
        return MergeResult {
            action: MergeAction::Error,
            content: FALLBACK_UNCONFIGURED.to_string(),
            explanation: "The generative backend is not configured; set GEMINI_API_KEY to enable smart editing.".to_string(),
        };
    }

    let prompt = build_merge_prompt(current_content, instruction, recent_history);

    match backend.generate(&prompt, preferred_model).await {
        Ok(raw) => parse_reply(&raw),
        Err(e) => MergeResult {
            action: MergeAction::Error,
            content: format!(
                r#"<div class="p-4 bg-red-50 border border-red-200 rounded-lg">
<h3 class="text-lg font-semibold text-red-800 mb-2">Something went wrong</h3>
<p class="text-sm text-red-700">{}</p>
</div>"#,
                e
            ),
            explanation: format!("The generative backend call failed: {e}"),
        },
    }
}

/// Build the merge prompt: editing policy, formatting contract, current
/// content, recent history, and the instruction.
fn build_merge_prompt(
    current_content: &str,
    instruction: &str,
    recent_history: &[ConversationTurn],
) -> String {
    let mut history = String::new();
    if !recent_history.is_empty() {
        history.push_str("Recent conversation:\n");
        for turn in recent_history {
            history.push_str(&format!("User: {}\n", turn.instruction));
            history.push_str(&format!("Assistant: {}\n", turn.explanation));
        }
    }

    format!(
        r#"You are an assistant that edits a rich-text document based on user instructions.

Editing policy:
- Default to APPENDING new content after the existing content.
- REPLACE the whole document only when the user explicitly asks to rewrite, clear, or start over.
- MODIFY only when the user explicitly names a specific part to change.
- Keep the existing content intact unless told otherwise.

Formatting rules:
- Produce valid HTML styled with Tailwind CSS classes. Never use Markdown markers such as **, *, # or leading dashes.
- For bold use <strong class="font-bold">, for headings use <h2 class="text-xl font-bold">, for lists use <ul class="list-disc"> with <li> items.

Current document content:
{current}

{history}
User instruction: {instruction}

Reply with valid JSON only, no fences:
{{
  "action": "add" | "modify" | "replace",
  "content": "the complete new document body (existing plus new), as HTML",
  "explanation": "a short human-readable description of what was done"
}}"#,
        current = current_content,
        history = history,
        instruction = instruction,
    )
}

/// Parse a raw backend reply into a [`MergeResult`].
///
/// Strips fence wrappers, parses the structured JSON contract, and falls
/// back to treating the whole reply as literal content when parsing fails.
/// The content is always run through [`normalize_markup`] before return.
pub fn parse_reply(raw: &str) -> MergeResult {
    let cleaned = strip_fences(raw);

    match serde_json::from_str::<RawReply>(cleaned) {
        Ok(reply) => {
            let action = MergeAction::parse(&reply.action);
            let content = normalize_markup(&reply.content);
            let explanation = describe(action, &reply.explanation);
            MergeResult {
                action,
                content,
                explanation,
            }
        }
        Err(e) => MergeResult {
            action: MergeAction::Add,
            content: normalize_markup(cleaned),
            explanation: format!("Extracted the reply as literal content (structured parse failed: {e})"),
        },
    }
}

/// Strip leading/trailing code-fence wrappers from a reply.
fn strip_fences(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Prefix the backend's explanation with what actually happened.
fn describe(action: MergeAction, explanation: &str) -> String {
    let prefix = match action {
        MergeAction::Add => "Added new content and kept the existing body.",
        MergeAction::Modify => "Modified the requested part of the document.",
        MergeAction::Replace => "Replaced the document content as requested.",
        MergeAction::Error => "The request could not be served.",
    };
    if explanation.trim().is_empty() {
        prefix.to_string()
    } else {
        format!("{} {}", prefix, explanation.trim())
    }
}

/// Normalize leaked lightweight markup into canonical HTML.
///
/// Handles `**bold**`, `*italic*`, `#`/`##`/`###` headings, and contiguous
/// `- ` / `• ` bullet runs (each run becomes one `<ul>`). Blank-line runs
/// collapse to at most one blank line and surrounding whitespace is
/// trimmed. Lines already in HTML pass through untouched, which makes the
/// function idempotent.
pub fn normalize_markup(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Backends sometimes emit literal backslash-n sequences inside JSON
    // string values; fold them into real newlines first.
    let text = text.replace("\\n", "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in text.lines() {
        let trimmed = line.trim();

        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("• "));

        if let Some(item) = bullet {
            if !in_list {
                lines.push(r#"<ul class="list-disc list-inside space-y-2 mb-4">"#.to_string());
                in_list = true;
            }
            lines.push(format!("<li>{}</li>", convert_inline(item.trim())));
            continue;
        }

        if in_list {
            lines.push("</ul>".to_string());
            in_list = false;
        }

        if let Some(heading) = trimmed.strip_prefix("### ") {
            lines.push(format!(
                r#"<h3 class="text-lg font-bold mb-3 mt-4">{}</h3>"#,
                convert_inline(heading)
            ));
        } else if let Some(heading) = trimmed.strip_prefix("## ") {
            lines.push(format!(
                r#"<h2 class="text-xl font-bold mb-4 mt-6">{}</h2>"#,
                convert_inline(heading)
            ));
        } else if let Some(heading) = trimmed.strip_prefix("# ") {
            lines.push(format!(
                r#"<h1 class="text-2xl font-bold mb-4 mt-6">{}</h1>"#,
                convert_inline(heading)
            ));
        } else {
            lines.push(convert_inline(line));
        }
    }

    if in_list {
        lines.push("</ul>".to_string());
    }

    collapse_blank_lines(&lines).trim().to_string()
}

/// Convert inline `**bold**` and `*italic*` pairs. Unpaired markers are
/// left alone.
fn convert_inline(text: &str) -> String {
    let text = replace_pairs(
        text,
        "**",
        r#"<strong class="font-bold">"#,
        "</strong>",
    );
    replace_pairs(&text, "*", r#"<em class="italic">"#, "</em>")
}

/// Replace paired occurrences of `delim` with open/close tags. Pairs with
/// blank content are left as literal markers so a stray `**` never turns
/// into an empty emphasis span.
fn replace_pairs(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(delim) {
        let after = start + delim.len();
        match rest[after..].find(delim) {
            Some(end_rel) => {
                let end = after + end_rel;
                let inner = &rest[after..end];
                if inner.trim().is_empty() {
                    out.push_str(&rest[..after]);
                    rest = &rest[after..];
                    continue;
                }
                out.push_str(&rest[..start]);
                out.push_str(open);
                out.push_str(inner);
                out.push_str(close);
                rest = &rest[end + delim.len()..];
            }
            None => break,
        }
    }

    out.push_str(rest);
    out
}

/// Collapse runs of blank lines to a single blank line.
fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut last_blank = false;

    for line in lines {
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push(if blank { "" } else { line.as_str() });
        last_blank = blank;
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, Result};
    use async_trait::async_trait;

    struct FixedBackend {
        reply: Option<String>,
    }

    #[async_trait]
    impl GenerativeBackend for FixedBackend {
        fn enabled(&self) -> bool {
            self.reply.is_some()
        }

        fn resolve_model(&self, _preferred: Option<&str>) -> String {
            "models/fixed".to_string()
        }

        async fn generate(&self, _prompt: &str, _model: Option<&str>) -> Result<String> {
            self.reply
                .clone()
                .ok_or_else(|| EngineError::BackendUnavailable("no key".into()))
        }
    }

    #[test]
    fn test_parse_reply_plain_json() {
        let raw = r#"{"action":"replace","content":"<div>new</div>","explanation":"rewrote it"}"#;
        let result = parse_reply(raw);
        assert_eq!(result.action, MergeAction::Replace);
        assert_eq!(result.content, "<div>new</div>");
        assert!(result.explanation.contains("Replaced"));
        assert!(result.explanation.contains("rewrote it"));
    }

    #[test]
    fn test_parse_reply_strips_fences() {
        let raw = "```json\n{\"action\":\"add\",\"content\":\"<p>x</p>\",\"explanation\":\"ok\"}\n```";
        let result = parse_reply(raw);
        assert_eq!(result.action, MergeAction::Add);
        assert_eq!(result.content, "<p>x</p>");
    }

    #[test]
    fn test_parse_reply_html_content_alias() {
        let raw = r#"{"action":"add","html_content":"<p>aliased</p>","explanation":""}"#;
        let result = parse_reply(raw);
        assert_eq!(result.content, "<p>aliased</p>");
    }

    #[test]
    fn test_parse_reply_fallback_keeps_raw_output() {
        let raw = "Here is a **bold** statement that is not JSON.";
        let result = parse_reply(raw);
        assert_eq!(result.action, MergeAction::Add);
        assert!(result.content.contains(r#"<strong class="font-bold">bold</strong>"#));
        assert!(result.explanation.contains("structured parse failed"));
    }

    #[test]
    fn test_unknown_action_defaults_to_add() {
        let raw = r#"{"action":"delete","content":"<p>x</p>","explanation":""}"#;
        assert_eq!(parse_reply(raw).action, MergeAction::Add);
    }

    #[test]
    fn test_normalize_headings_and_bullets() {
        let input = "## Plan\n- first\n- second\n\ndone";
        let output = normalize_markup(input);
        assert!(output.contains(r#"<h2 class="text-xl font-bold mb-4 mt-6">Plan</h2>"#));
        assert!(output.contains("<ul"));
        assert_eq!(output.matches("<ul").count(), 1);
        assert!(output.contains("<li>first</li>"));
        assert!(output.contains("<li>second</li>"));
    }

    #[test]
    fn test_normalize_separate_bullet_runs_get_separate_lists() {
        let input = "- a\n\ntext between\n\n- b";
        let output = normalize_markup(input);
        assert_eq!(output.matches("<ul").count(), 2);
    }

    #[test]
    fn test_normalize_collapses_blank_runs_and_trims() {
        let input = "\n\nfirst\n\n\n\nsecond\n\n";
        let output = normalize_markup(input);
        assert_eq!(output, "first\n\nsecond");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "## Title\n**bold** and *italic*\n- one\n- two\n\n\nplain",
            "<div>already canonical</div>",
            "<h2 class=\"text-xl font-bold mb-4 mt-6\">Done</h2>\n<ul class=\"list-disc list-inside space-y-2 mb-4\">\n<li>x</li>\n</ul>",
        ];
        for input in inputs {
            let once = normalize_markup(input);
            let twice = normalize_markup(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_unpaired_markers_left_alone() {
        let output = normalize_markup("a ** b");
        assert_eq!(output, "a ** b");
    }

    #[tokio::test]
    async fn test_merge_degrades_when_backend_unconfigured() {
        let backend = FixedBackend { reply: None };
        let result = merge(&backend, "<div>X</div>", "add a table", &[], None).await;
        assert_eq!(result.action, MergeAction::Error);
        assert!(!result.content.is_empty());
        assert!(result.explanation.contains("not configured"));
    }

    #[tokio::test]
    async fn test_merge_happy_path() {
        let backend = FixedBackend {
            reply: Some(
                r#"{"action":"add","content":"<div>X</div><div>TABLE</div>","explanation":"added a table"}"#
                    .to_string(),
            ),
        };
        let result = merge(&backend, "<div>X</div>", "أضف جدول", &[], None).await;
        assert_eq!(result.action, MergeAction::Add);
        assert_eq!(result.content, "<div>X</div><div>TABLE</div>");
    }
}
