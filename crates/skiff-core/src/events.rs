// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use skiff_tools::ToolCall;

use crate::detector::StuckReason;

/// Events emitted by the agent during a single turn.
/// Consumers (CLI, delegation tool) subscribe to these to drive their output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A reasoning chunk from the model
    ThinkingDelta(String),
    /// A word-granular text chunk streamed from the model
    TextDelta(String),
    /// The complete text of one model response (after streaming finishes)
    TextComplete(String),
    /// The model requested these tool calls, in dispatch order
    ToolCallsAnnounced(Vec<ToolCall>),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Usage reported by the endpoint, with running session totals
    TokenUsage {
        input: u32,
        output: u32,
        input_total: u64,
        output_total: u64,
    },
    /// Older history was replaced by a summary
    ContextCompacted {
        messages_before: usize,
        messages_after: usize,
    },
    /// The stuck-loop detector injected a reflection prompt
    StuckDetected {
        reason: StuckReason,
        tools: Vec<String>,
    },
    /// The round ceiling was reached; no further model calls this turn
    RoundLimitReached { rounds: u32 },
    /// The turn stopped at a cancellation checkpoint
    Cancelled,
    /// A non-recoverable error ended the turn
    Error(String),
    /// The agent has finished processing the current user turn
    TurnComplete,
}
