// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use skiff_model::{CompletionRequest, Message, MessageContent, Role};

// ─── Compaction prompts ───────────────────────────────────────────────────────

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

/// Used when the summarisation call fails or returns nothing.
pub const SUMMARY_PLACEHOLDER: &str =
    "[Earlier conversation was removed to save context; no summary could be produced.]";

/// First line of every summary message.
pub const SUMMARY_HEADER: &str = "[Summary of earlier conversation]";

/// Maximum number of facts a summary carries.
const MAX_FACTS: usize = 20;

// ─── Critical-info extraction ─────────────────────────────────────────────────

/// Pulls facts out of messages that are about to be summarised so they
/// survive even a poor summary.
pub trait CriticalInfoExtractor: Send + Sync {
    fn extract(&self, messages: &[Message]) -> Vec<String>;
}

/// Default extractor: error lines, files written or edited, and
/// `path:line:` search hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexExtractor;

fn error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^.*\b(error|failed|panicked|exception)\b.*$").expect("valid regex")
    })
}

fn search_hit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([\w./-]+\.\w+):(\d+):").expect("valid regex"))
}

impl CriticalInfoExtractor for RegexExtractor {
    fn extract(&self, messages: &[Message]) -> Vec<String> {
        let mut facts: Vec<String> = Vec::new();
        let mut add = |fact: String| {
            if facts.len() < MAX_FACTS && !facts.contains(&fact) {
                facts.push(fact);
            }
        };

        for m in messages {
            match &m.content {
                MessageContent::ToolCall { function, .. }
                    if matches!(function.name.as_str(), "write_file" | "edit_file") =>
                {
                    let path = serde_json::from_str::<serde_json::Value>(&function.arguments)
                        .ok()
                        .and_then(|v| v.get("path").and_then(|p| p.as_str()).map(str::to_string));
                    if let Some(path) = path {
                        add(format!("file changed: {path}"));
                    }
                }
                MessageContent::ToolResult { content, .. } | MessageContent::Text(content) => {
                    for line in error_re().find_iter(content) {
                        add(format!("error: {}", crate::detector::normalize_error(line.as_str())));
                    }
                    for hit in search_hit_re().captures_iter(content) {
                        add(format!("search hit: {}:{}", &hit[1], &hit[2]));
                    }
                }
                MessageContent::ToolCall { .. } => {}
            }
        }
        facts
    }
}

// ─── Compaction ───────────────────────────────────────────────────────────────

/// The slice of history to summarise, or `None` when no compaction is due.
///
/// Compaction is due when the history holds more than `ceiling` messages.
/// The leading message and at least the last `keep_recent` messages are
/// kept.  The boundary moves back to the first call of a tool batch so the
/// kept tail never starts with a result whose call was summarised.
pub fn compaction_range(messages: &[Message], ceiling: usize, keep_recent: usize) -> Option<Range<usize>> {
    let len = messages.len();
    if len <= ceiling {
        return None;
    }
    let is_call = |i: usize| matches!(messages.get(i).map(|m| &m.content), Some(MessageContent::ToolCall { .. }));
    let is_result = |i: usize| matches!(messages.get(i).map(|m| &m.content), Some(MessageContent::ToolResult { .. }));

    let mut end = len.saturating_sub(keep_recent);
    while end > 1 && is_result(end) {
        end -= 1;
    }
    while end > 1 && is_call(end) && is_call(end - 1) {
        end -= 1;
    }
    (end > 1).then_some(1..end)
}

/// Tool-free request asking the model to summarise `messages`.
pub fn summary_request(messages: &[Message]) -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system(SUMMARIZE_PROMPT), Message::user(serialize_history(messages))],
        tools: Vec::new(),
        stream: false,
        model: None,
    }
}

/// Compose the text of a summary message.
pub fn summary_text(facts: &[String], summary: Option<&str>) -> String {
    let mut text = String::from(SUMMARY_HEADER);
    if !facts.is_empty() {
        text.push_str("\n\nKey facts:");
        for f in facts {
            text.push_str("\n- ");
            text.push_str(f);
        }
    }
    text.push_str("\n\n");
    match summary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => text.push_str(s),
        None => text.push_str(SUMMARY_PLACEHOLDER),
    }
    text
}

/// Replace `range` of `messages` with one summary message.  Returns the new
/// message list.
pub fn splice_summary(messages: &[Message], range: Range<usize>, summary: String) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len() - range.len() + 1);
    out.extend_from_slice(&messages[..range.start]);
    out.push(Message::user(summary));
    out.extend_from_slice(&messages[range.end..]);
    out
}

// ─── Truncation ───────────────────────────────────────────────────────────────

/// Keep the head and tail of `content` when it is longer than `cap` chars,
/// joined by an omission marker.  Character-based, so never splits a
/// multi-byte character.
pub fn truncate_head_tail(content: &str, cap: usize) -> String {
    let total = content.chars().count();
    if cap == 0 || total <= cap {
        return content.to_string();
    }
    let head_len = cap / 2;
    let tail_len = cap - head_len;
    let omitted = total - cap;
    let head: String = content.chars().take(head_len).collect();
    let tail: String = content.chars().skip(total - tail_len).collect();
    format!("{head}\n\n[... {omitted} characters omitted ...]\n\n{tail}")
}

// ─── Private helpers ──────────────────────────────────────────────────────────

/// Serialise a message list into plain text for inclusion in a compaction prompt.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };
            let text = match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::ToolCall { function, .. } => {
                    format!("[tool_call: {}({})]", function.name, function.arguments)
                }
                MessageContent::ToolResult { content, .. } => {
                    format!("[tool_result: {content}]")
                }
            };
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
