// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;
use uuid::Uuid;

use crate::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: TaskStatus, to: TaskStatus },

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("task execution failed: {0}")]
    Execution(String),

    #[error("max concurrent tasks must be between {min} and {max} (got {value})")]
    ConcurrencyOutOfRange { value: usize, min: usize, max: usize },
}
