// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Error text recorded on a task cancelled before it started.
pub const CANCELLED: &str = "cancelled";

/// Lifecycle status of an [`AgentTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurements attached to every [`AgentResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub duration_ms: u64,
    /// Distinct tools the sub-agent called, in order of first use.
    pub tools_used: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub rounds: u32,
}

/// Outcome of one sub-agent execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ResultMetadata,
}

impl AgentResult {
    pub fn success(output: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self { success: true, output: output.into(), error: None, metadata }
    }

    pub fn failure(error: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self { success: false, output: String::new(), error: Some(error.into()), metadata }
    }
}

/// A unit of delegated work tracked by the orchestrator.
///
/// Status moves strictly `pending → running → completed | failed`.  The
/// only other edge is `pending → failed`, taken by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    /// Capability id the task is delegated to.
    pub agent_type: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub result: Option<AgentResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parent_id: Option<Uuid>,
    /// Round ceiling for this task; the capability's own ceiling still applies.
    pub max_rounds: Option<u32>,
}

impl AgentTask {
    pub fn new(
        agent_type: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            description: description.into(),
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            parent_id: None,
            max_rounds: None,
        }
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Wall-clock time between start and completion, if both are known.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    fn transition_error(&self, to: TaskStatus) -> TaskError {
        TaskError::InvalidTransition { id: self.id, from: self.status, to }
    }

    pub(crate) fn start(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error(TaskStatus::Running));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn finish(&mut self, result: AgentResult) -> Result<(), TaskError> {
        let to = if result.success { TaskStatus::Completed } else { TaskStatus::Failed };
        if self.status != TaskStatus::Running {
            return Err(self.transition_error(to));
        }
        self.status = to;
        self.error = result.error.clone();
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn cancel(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.error = Some(CANCELLED.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
