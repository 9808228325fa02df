// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Assembling streamed model responses.
//!
//! A streamed response arrives as many small fragments.  Each fragment is a
//! partial view of the final assistant message; [`Fragment::merge`] folds
//! one into another:
//!
//! | existing          | incoming          | result                               |
//! |-------------------|-------------------|--------------------------------------|
//! | `Append(a)`       | `Append(b)`       | `a + b`                              |
//! | `Indexed(a)`      | `Indexed(b)`      | merged per index                     |
//! | `Object(a)`       | `Object(b)`       | merged per key                       |
//! | `Scalar(Null)`    | `Scalar(v)`       | `v`                                  |
//! | `Scalar(v)`       | `Scalar(_)`       | `v` (first write wins)               |
//!
//! Mismatched kinds keep the existing value.
//!
//! The module also holds the per-round phase machine and the word chunker
//! used to re-split text deltas for display.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde_json::Value;
use skiff_model::ResponseEvent;
use skiff_tools::ToolCall;
use tracing::warn;

use crate::error::InvalidTransition;

// ─── Fragments ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Append(String),
    Indexed(BTreeMap<usize, Fragment>),
    Object(BTreeMap<String, Fragment>),
    Scalar(Value),
}

impl Fragment {
    pub fn merge(&mut self, incoming: Fragment) {
        match (self, incoming) {
            (Fragment::Append(a), Fragment::Append(b)) => a.push_str(&b),
            (Fragment::Indexed(a), Fragment::Indexed(b)) => {
                for (k, v) in b {
                    match a.entry(k) {
                        Entry::Occupied(mut e) => e.get_mut().merge(v),
                        Entry::Vacant(e) => {
                            e.insert(v);
                        }
                    }
                }
            }
            (Fragment::Object(a), Fragment::Object(b)) => {
                for (k, v) in b {
                    match a.entry(k) {
                        Entry::Occupied(mut e) => e.get_mut().merge(v),
                        Entry::Vacant(e) => {
                            e.insert(v);
                        }
                    }
                }
            }
            (Fragment::Scalar(a), Fragment::Scalar(b)) => {
                if a.is_null() {
                    *a = b;
                }
            }
            (existing, incoming) => {
                warn!(?existing, ?incoming, "ignoring fragment of mismatched kind");
            }
        }
    }

    fn object<const N: usize>(fields: [(&str, Fragment); N]) -> Fragment {
        Fragment::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Fragment::Append(s) => Some(s),
            Fragment::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

// ─── Assembly ─────────────────────────────────────────────────────────────────

/// One logical assistant message built from streamed fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledMessage {
    pub content: String,
    pub reasoning: String,
    /// Tool calls ordered by stream index.
    pub tool_calls: Vec<ToolCall>,
}

/// Accumulates [`ResponseEvent`]s of one model call.
#[derive(Debug, Clone)]
pub struct StreamAssembly {
    root: Fragment,
}

impl Default for StreamAssembly {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembly {
    pub fn new() -> Self {
        Self { root: Fragment::Object(BTreeMap::new()) }
    }

    /// Fold one event in.  Usage, completion and error events carry no
    /// message content and are ignored.
    pub fn apply(&mut self, event: &ResponseEvent) {
        let fragment = match event {
            ResponseEvent::TextDelta(t) => Fragment::object([("content", Fragment::Append(t.clone()))]),
            ResponseEvent::ThinkingDelta(t) => {
                Fragment::object([("reasoning", Fragment::Append(t.clone()))])
            }
            ResponseEvent::ToolCall { index, id, name, arguments } => {
                let mut call = BTreeMap::new();
                if !id.is_empty() {
                    call.insert("id".to_string(), Fragment::Scalar(Value::String(id.clone())));
                }
                if !name.is_empty() {
                    call.insert("name".to_string(), Fragment::Scalar(Value::String(name.clone())));
                }
                call.insert("arguments".to_string(), Fragment::Append(arguments.clone()));
                let indexed = BTreeMap::from([(*index as usize, Fragment::Object(call))]);
                Fragment::object([("tool_calls", Fragment::Indexed(indexed))])
            }
            ResponseEvent::Usage { .. } | ResponseEvent::Done | ResponseEvent::Error(_) => return,
        };
        self.root.merge(fragment);
    }

    /// The assembled message so far.
    pub fn finish(&self) -> AssembledMessage {
        let Fragment::Object(root) = &self.root else {
            return AssembledMessage::default();
        };

        let mut tool_calls = Vec::new();
        if let Some(Fragment::Indexed(calls)) = root.get("tool_calls") {
            for (index, call) in calls {
                let Fragment::Object(fields) = call else { continue };
                let name = str_field(fields, "name");
                let id = str_field(fields, "id");
                if name.is_empty() {
                    warn!(index, tool_call_id = %id, "dropping tool call with empty name; cannot dispatch");
                    continue;
                }
                let id = if id.is_empty() {
                    let synthetic = format!("call_{index}");
                    warn!(tool_name = %name, tool_call_id = %synthetic, "tool call had empty id; generated synthetic id");
                    synthetic
                } else {
                    id.to_string()
                };
                let args = parse_arguments(name, str_field(fields, "arguments"));
                tool_calls.push(ToolCall { id, name: name.to_string(), args });
            }
        }

        AssembledMessage {
            content: str_field(root, "content").to_string(),
            reasoning: str_field(root, "reasoning").to_string(),
            tool_calls,
        }
    }
}

fn str_field<'a>(fields: &'a BTreeMap<String, Fragment>, key: &str) -> &'a str {
    fields.get(key).and_then(Fragment::as_str).unwrap_or_default()
}

/// Parse a tool-call argument string; empty or invalid input becomes `{}`.
pub fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(tool, error = %e, "unparseable tool arguments; using empty object");
            Value::Object(Default::default())
        }
    }
}

// ─── Round phases ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Thinking,
    PlanningTools,
    ExecutingTools,
    Responding,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The first text delta of a response arrived
    TextStarted,
    /// The response requested tool calls
    ToolCallsReceived,
    /// Tool dispatch began
    ToolsDispatched,
    /// Every requested tool finished; a new model call follows
    ToolsFinished,
    /// The response ended without tool calls
    ResponseFinished,
    Cancel,
    Fail,
}

impl PhaseEvent {
    pub fn name(self) -> &'static str {
        match self {
            PhaseEvent::TextStarted => "text_started",
            PhaseEvent::ToolCallsReceived => "tool_calls_received",
            PhaseEvent::ToolsDispatched => "tools_dispatched",
            PhaseEvent::ToolsFinished => "tools_finished",
            PhaseEvent::ResponseFinished => "response_finished",
            PhaseEvent::Cancel => "cancel",
            PhaseEvent::Fail => "fail",
        }
    }
}

impl RoundPhase {
    pub fn advance(self, event: PhaseEvent) -> Result<RoundPhase, InvalidTransition> {
        use PhaseEvent as E;
        use RoundPhase as P;
        let next = match (self, event) {
            (_, E::Cancel | E::Fail) => P::Error,
            (P::Thinking, E::TextStarted) => P::Responding,
            (P::Thinking | P::Responding, E::ToolCallsReceived) => P::PlanningTools,
            (P::PlanningTools, E::ToolsDispatched) => P::ExecutingTools,
            (P::ExecutingTools, E::ToolsFinished) => P::Thinking,
            (P::Thinking | P::Responding, E::ResponseFinished) => P::Done,
            (from, event) => return Err(InvalidTransition { from, event: event.name() }),
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoundPhase::Done | RoundPhase::Error)
    }
}

// ─── Word chunking ────────────────────────────────────────────────────────────

/// Re-splits arbitrary text deltas so each emitted chunk is one word plus
/// its trailing whitespace.
#[derive(Debug, Default)]
pub struct WordChunker {
    buf: String,
}

impl WordChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta and return the words it completed.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);
        let mut out = Vec::new();
        let mut start = 0;
        let mut prev_ws = false;
        for (i, c) in self.buf.char_indices() {
            let ws = c.is_whitespace();
            if prev_ws && !ws && i > start {
                out.push(self.buf[start..i].to_string());
                start = i;
            }
            prev_ws = ws;
        }
        self.buf.drain(..start);
        out
    }

    /// Return whatever is left once the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tc(index: u32, id: &str, name: &str, args: &str) -> ResponseEvent {
        ResponseEvent::ToolCall {
            index,
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    // ── Fragment merge ────────────────────────────────────────────────────────

    #[test]
    fn append_concatenates() {
        let mut f = Fragment::Append("ab".into());
        f.merge(Fragment::Append("cd".into()));
        assert_eq!(f, Fragment::Append("abcd".into()));
    }

    #[test]
    fn scalar_is_set_once() {
        let mut f = Fragment::Scalar(Value::Null);
        f.merge(Fragment::Scalar(json!("first")));
        f.merge(Fragment::Scalar(json!("second")));
        assert_eq!(f, Fragment::Scalar(json!("first")));
    }

    #[test]
    fn objects_merge_recursively_and_indexed_positionally() {
        let mut f = Fragment::Object(BTreeMap::from([(
            "list".to_string(),
            Fragment::Indexed(BTreeMap::from([(0, Fragment::Append("a".into()))])),
        )]));
        f.merge(Fragment::Object(BTreeMap::from([(
            "list".to_string(),
            Fragment::Indexed(BTreeMap::from([
                (1, Fragment::Append("x".into())),
                (0, Fragment::Append("b".into())),
            ])),
        )])));
        let Fragment::Object(o) = f else { panic!() };
        let Fragment::Indexed(list) = &o["list"] else { panic!() };
        assert_eq!(list[&0], Fragment::Append("ab".into()));
        assert_eq!(list[&1], Fragment::Append("x".into()));
    }

    #[test]
    fn mismatched_kinds_keep_existing() {
        let mut f = Fragment::Append("keep".into());
        f.merge(Fragment::Scalar(json!(1)));
        assert_eq!(f, Fragment::Append("keep".into()));
    }

    // ── Assembly ──────────────────────────────────────────────────────────────

    #[test]
    fn text_and_reasoning_are_concatenated() {
        let mut a = StreamAssembly::new();
        for e in [
            ResponseEvent::ThinkingDelta("let me ".into()),
            ResponseEvent::ThinkingDelta("think".into()),
            ResponseEvent::TextDelta("Hel".into()),
            ResponseEvent::Usage { input_tokens: 1, output_tokens: 1 },
            ResponseEvent::TextDelta("lo".into()),
            ResponseEvent::Done,
        ] {
            a.apply(&e);
        }
        let m = a.finish();
        assert_eq!(m.content, "Hello");
        assert_eq!(m.reasoning, "let me think");
        assert!(m.tool_calls.is_empty());
    }

    #[test]
    fn interleaved_out_of_order_tool_calls_sorted_by_index() {
        let mut a = StreamAssembly::new();
        for e in [
            tc(1, "b", "grep", "{\"pat"),
            tc(0, "a", "read_file", "{\"path\":"),
            tc(1, "", "", "tern\":\"x\"}"),
            tc(0, "ignored", "ignored", "\"a.rs\"}"),
        ] {
            a.apply(&e);
        }
        let calls = a.finish().tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].name, "read_file", "id and name are first-write-wins");
        assert_eq!(calls[0].args, json!({"path": "a.rs"}));
        assert_eq!(calls[1].name, "grep");
        assert_eq!(calls[1].args, json!({"pattern": "x"}));
    }

    #[test]
    fn nameless_calls_dropped_and_missing_ids_synthesised() {
        let mut a = StreamAssembly::new();
        a.apply(&tc(0, "x", "", "{}"));
        a.apply(&tc(2, "", "glob", "{}"));
        let calls = a.finish().tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_2");
    }

    #[test]
    fn bad_arguments_become_empty_object() {
        let mut a = StreamAssembly::new();
        a.apply(&tc(0, "a", "grep", "{not json"));
        a.apply(&tc(1, "b", "glob", ""));
        let calls = a.finish().tool_calls;
        assert_eq!(calls[0].args, json!({}));
        assert_eq!(calls[1].args, json!({}));
    }

    // ── Phases ────────────────────────────────────────────────────────────────

    #[test]
    fn tool_round_then_answer() {
        let p = RoundPhase::Thinking
            .advance(PhaseEvent::ToolCallsReceived)
            .and_then(|p| p.advance(PhaseEvent::ToolsDispatched))
            .and_then(|p| p.advance(PhaseEvent::ToolsFinished))
            .and_then(|p| p.advance(PhaseEvent::TextStarted))
            .and_then(|p| p.advance(PhaseEvent::ResponseFinished))
            .unwrap();
        assert_eq!(p, RoundPhase::Done);
    }

    #[test]
    fn undocumented_transitions_are_rejected() {
        let err = RoundPhase::Done.advance(PhaseEvent::TextStarted).unwrap_err();
        assert_eq!(err.from, RoundPhase::Done);
        assert_eq!(err.event, "text_started");
        assert!(RoundPhase::Thinking.advance(PhaseEvent::ToolsFinished).is_err());
        assert!(RoundPhase::ExecutingTools.advance(PhaseEvent::TextStarted).is_err());
    }

    #[test]
    fn cancel_and_fail_reach_error_from_anywhere() {
        for p in [
            RoundPhase::Thinking,
            RoundPhase::PlanningTools,
            RoundPhase::ExecutingTools,
            RoundPhase::Responding,
            RoundPhase::Done,
        ] {
            assert_eq!(p.advance(PhaseEvent::Cancel), Ok(RoundPhase::Error));
            assert_eq!(p.advance(PhaseEvent::Fail), Ok(RoundPhase::Error));
        }
    }

    // ── Word chunking ─────────────────────────────────────────────────────────

    #[test]
    fn chunker_splits_at_word_boundaries() {
        let mut c = WordChunker::new();
        let mut out = c.push("Hel");
        out.extend(c.push("lo wor"));
        out.extend(c.push("ld,  again"));
        out.extend(c.flush());
        assert_eq!(out, vec!["Hello ", "world,  ", "again"]);
    }

    #[test]
    fn chunker_flush_on_empty_is_none() {
        let mut c = WordChunker::new();
        assert!(c.flush().is_none());
        assert!(c.push("word").is_empty());
        assert_eq!(c.flush().as_deref(), Some("word"));
    }
}
