// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Stuck-loop detection.
//!
//! Looks at the rolling window of recent tool outcomes and decides whether
//! the agent is spinning: either the same calls keep failing back to back,
//! or one tool dominates the window while mostly failing.  When it is, the
//! engine injects a reflection prompt asking the model to change course.
//! Detection stops once the per-turn reflection cap is reached.

use std::collections::HashMap;

use skiff_config::DetectorConfig;

/// Maximum length of a normalised error sample.
pub const ERROR_SAMPLE_CHARS: usize = 160;

/// Maximum number of distinct error samples quoted in a reflection.
pub const MAX_ERROR_SAMPLES: usize = 3;

/// The result of one tool call, as the detector sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub tool: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(tool: impl Into<String>) -> Self {
        Self { tool: tool.into(), success: true, error: None }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self { tool: tool.into(), success: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckReason {
    ConsecutiveFailures,
    LoopDetected,
}

impl StuckReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StuckReason::ConsecutiveFailures => "consecutive_failures",
            StuckReason::LoopDetected => "loop_detected",
        }
    }
}

impl std::fmt::Display for StuckReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StuckAssessment {
    NotStuck,
    Stuck {
        reason: StuckReason,
        /// Prompt injected into the conversation.
        reflection: String,
        /// Offending tools, in order of first appearance.
        tools: Vec<String>,
        /// Up to three distinct normalised error messages.
        sampled_errors: Vec<String>,
    },
}

impl StuckAssessment {
    pub fn is_stuck(&self) -> bool {
        matches!(self, StuckAssessment::Stuck { .. })
    }
}

/// Assess the most recent outcomes (oldest first).
pub fn assess(
    outcomes: &[ToolOutcome],
    config: &DetectorConfig,
    reflection_count: u32,
) -> StuckAssessment {
    let threshold = config.failure_threshold.max(1);
    if reflection_count >= config.reflection_cap || outcomes.len() < threshold {
        return StuckAssessment::NotStuck;
    }

    let recent = &outcomes[outcomes.len() - threshold..];
    if recent.iter().all(|o| !o.success) {
        return stuck(StuckReason::ConsecutiveFailures, recent);
    }

    let window = config.window_size;
    if window == 0 || outcomes.len() < window {
        return StuckAssessment::NotStuck;
    }
    let sample = &outcomes[outcomes.len() - window..];

    let mut per_tool: HashMap<&str, (usize, usize)> = HashMap::new();
    for o in sample {
        let entry = per_tool.entry(o.tool.as_str()).or_default();
        entry.0 += 1;
        if !o.success {
            entry.1 += 1;
        }
    }
    let dominant = sample.iter().map(|o| o.tool.as_str()).find(|tool| {
        let (calls, failures) = per_tool[tool];
        calls + 1 >= window && failures * 2 > calls
    });

    match dominant {
        Some(tool) => {
            let offending: Vec<ToolOutcome> =
                sample.iter().filter(|o| o.tool == tool).cloned().collect();
            stuck(StuckReason::LoopDetected, &offending)
        }
        None => StuckAssessment::NotStuck,
    }
}

fn stuck(reason: StuckReason, offending: &[ToolOutcome]) -> StuckAssessment {
    let mut tools: Vec<String> = Vec::new();
    for o in offending {
        if !tools.contains(&o.tool) {
            tools.push(o.tool.clone());
        }
    }

    let mut sampled_errors: Vec<String> = Vec::new();
    for error in offending.iter().rev().filter_map(|o| o.error.as_deref()) {
        let normalised = normalize_error(error);
        if !sampled_errors.contains(&normalised) {
            sampled_errors.push(normalised);
        }
        if sampled_errors.len() == MAX_ERROR_SAMPLES {
            break;
        }
    }

    let reflection = reflection_prompt(reason, &tools, &sampled_errors);
    StuckAssessment::Stuck { reason, reflection, tools, sampled_errors }
}

fn reflection_prompt(reason: StuckReason, tools: &[String], errors: &[String]) -> String {
    let situation = match reason {
        StuckReason::ConsecutiveFailures => "Your last several tool calls all failed.",
        StuckReason::LoopDetected => {
            "You keep calling the same tool and most of those calls are failing."
        }
    };
    let mut text = format!(
        "[Loop check] {situation}\nTools involved: {}.",
        tools.iter().map(|t| format!("`{t}`")).collect::<Vec<_>>().join(", ")
    );
    if !errors.is_empty() {
        text.push_str("\nRecent errors:");
        for e in errors {
            text.push_str("\n- ");
            text.push_str(e);
        }
    }
    text.push_str(
        "\nStop and reconsider. Check your assumptions about paths and arguments, \
         try a different tool or approach, or explain what is blocking you.",
    );
    text
}

/// Collapse whitespace and cap the length so similar errors compare equal.
pub fn normalize_error(message: &str) -> String {
    let compact = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.is_empty() {
        return "unknown".to_string();
    }
    match compact.char_indices().nth(ERROR_SAMPLE_CHARS) {
        Some((cut, _)) => compact[..cut].to_string(),
        None => compact,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
