// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillError {
    /// A skill file violated a parse or validation rule.
    #[error("invalid skill {path}: {rule}")]
    Validation { path: String, rule: String },

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("skill scan aborted: {0}")]
    ScanAborted(String),
}

impl SkillError {
    pub(crate) fn validation(path: &std::path::Path, rule: impl Into<String>) -> Self {
        Self::Validation { path: path.display().to_string(), rule: rule.into() }
    }

    /// The violated rule, for validation errors.
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::Validation { rule, .. } => Some(rule),
            _ => None,
        }
    }
}
