// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;

use skiff_model::{Message, Usage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::detector::ToolOutcome;

/// In-memory state of one conversation.  Owned by a single engine and
/// never shared between agents.
#[derive(Debug)]
pub struct ConversationState {
    pub id: String,
    pub messages: Vec<Message>,
    /// Summary text produced by the latest compaction.
    pub summary: Option<String>,
    /// Approximate token count of `messages` (chars/4).
    pub token_count: usize,
    /// Running totals of endpoint-reported usage.
    pub input_tokens_total: u64,
    pub output_tokens_total: u64,
    /// Model calls made in the current turn.
    pub rounds: u32,
    /// Recent tool outcomes, oldest first.
    pub outcomes: VecDeque<ToolOutcome>,
    /// Reflection prompts injected in the current turn.
    pub reflections: u32,
    /// Distinct dispatched tools, in order of first use.  Survives compaction.
    tools_used: Vec<String>,
    cancel: CancellationToken,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            summary: None,
            token_count: 0,
            input_tokens_total: 0,
            output_tokens_total: 0,
            rounds: 0,
            outcomes: VecDeque::new(),
            reflections: 0,
            tools_used: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    pub fn add_usage(&mut self, usage: Usage) {
        self.input_tokens_total += u64::from(usage.input_tokens);
        self.output_tokens_total += u64::from(usage.output_tokens);
    }

    /// Reset per-turn counters before a new user message.
    pub fn begin_turn(&mut self) {
        self.rounds = 0;
        self.reflections = 0;
        self.outcomes.clear();
    }

    /// Record a tool outcome, keeping at most `keep` recent entries.
    pub fn record_outcome(&mut self, outcome: ToolOutcome, keep: usize) {
        self.outcomes.push_back(outcome);
        while self.outcomes.len() > keep.max(1) {
            self.outcomes.pop_front();
        }
    }

    pub fn record_tool_use(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }

    /// Distinct tool names dispatched so far, in order of first use.
    pub fn tools_used(&self) -> Vec<String> {
        self.tools_used.clone()
    }

    /// Token observed at each cancellation checkpoint.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Install a fresh token once a cancellation has been honoured, so the
    /// next turn starts uncancelled.
    pub(crate) fn rearm_cancellation(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
