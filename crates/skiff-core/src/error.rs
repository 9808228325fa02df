// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use crate::stream::RoundPhase;

/// Failures the engine reports.  Neither variant aborts a turn with `Err`:
/// tool failures are fed back to the model as tool results, and endpoint
/// failures end the turn with a visible assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("tool '{tool}' failed: {cause}")]
    ToolExecution { tool: String, cause: String },

    #[error("model request failed: {0}")]
    ModelEndpoint(String),
}

/// A phase transition the round state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phase transition from {from:?} on {event}")]
pub struct InvalidTransition {
    pub from: RoundPhase,
    pub event: &'static str,
}
