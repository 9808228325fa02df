// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! TaskTool: delegates a focused sub-task to a capability-defined sub-agent.
//!
//! Lives in `skiff-tasks` rather than `skiff-core` so the engine never
//! depends on the orchestrator (skiff-tasks → skiff-core, not the reverse).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use skiff_config::TaskConfig;
use skiff_core::truncate_head_tail;
use skiff_skills::CapabilityResolver;
use skiff_tools::{Tool, ToolCall, ToolOutput};

use crate::orchestrator::TaskOrchestrator;
use crate::runner::SubAgentRunner;
use crate::task::AgentTask;

/// Longest task description stored on the [`AgentTask`].
/// Name the delegation tool registers under.  Sub-agents never see it.
pub const TASK_TOOL_NAME: &str = "task";

const DESCRIPTION_CHARS: usize = 80;

/// How much effort the caller wants the sub-agent to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Thoroughness {
    Quick,
    #[default]
    Medium,
    Thorough,
}

impl Thoroughness {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(Thoroughness::Quick),
            "medium" => Some(Thoroughness::Medium),
            "thorough" => Some(Thoroughness::Thorough),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Thoroughness::Quick => "quick",
            Thoroughness::Medium => "medium",
            Thoroughness::Thorough => "thorough",
        }
    }

    pub fn rounds(self, config: &TaskConfig) -> u32 {
        match self {
            Thoroughness::Quick => config.quick_rounds,
            Thoroughness::Medium => config.medium_rounds,
            Thoroughness::Thorough => config.thorough_rounds,
        }
    }
}

/// Lifecycle notifications for one delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationEvent {
    Starting { task_id: Uuid, agent_type: String, description: String },
    Running { task_id: Uuid, agent_type: String },
    Completed { task_id: Uuid, agent_type: String, duration_ms: u64 },
    Failed { task_id: Uuid, agent_type: String, duration_ms: u64, error: String },
}

impl DelegationEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            DelegationEvent::Starting { task_id, .. }
            | DelegationEvent::Running { task_id, .. }
            | DelegationEvent::Completed { task_id, .. }
            | DelegationEvent::Failed { task_id, .. } => *task_id,
        }
    }
}

/// Delegates work to a sub-agent and returns its result as JSON.
pub struct TaskTool {
    orchestrator: Arc<TaskOrchestrator>,
    resolver: Arc<dyn CapabilityResolver>,
    runner: Arc<dyn SubAgentRunner>,
    config: TaskConfig,
    events: Option<mpsc::Sender<DelegationEvent>>,
}

impl TaskTool {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        resolver: Arc<dyn CapabilityResolver>,
        runner: Arc<dyn SubAgentRunner>,
        config: TaskConfig,
    ) -> Self {
        Self { orchestrator, resolver, runner, config, events: None }
    }

    /// Send lifecycle events to `tx`.  Events are dropped, not awaited,
    /// when the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<DelegationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// A bounded channel sized from `tasks.event_buffer`.
    pub fn event_channel(
        config: &TaskConfig,
    ) -> (mpsc::Sender<DelegationEvent>, mpsc::Receiver<DelegationEvent>) {
        mpsc::channel(config.event_buffer.max(1))
    }

    fn notify(&self, event: DelegationEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!("delegation event dropped: {e}");
            }
        }
    }

    fn unknown_type_message(&self, agent_type: &str) -> String {
        let available = self.resolver.available_ids();
        if available.is_empty() {
            format!("unknown agent type '{agent_type}'; no capabilities are available")
        } else {
            format!(
                "unknown agent type '{agent_type}'. Available types: {}",
                available.join(", ")
            )
        }
    }
}

/// Pass short output through; cut long output to head and tail.
pub fn summarize_output(output: &str, limit: usize) -> String {
    truncate_head_tail(output, limit)
}

fn short_description(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= DESCRIPTION_CHARS {
        first_line.to_string()
    } else {
        let mut s: String = first_line.chars().take(DESCRIPTION_CHARS - 3).collect();
        s.push_str("...");
        s
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        TASK_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegate a focused, self-contained task to a specialised sub-agent and return \
         its result. The sub-agent starts with a fresh conversation and only the tools \
         its capability declares. Choose agent_type from the capabilities listed in the \
         system prompt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_type": {
                    "type": "string",
                    "description": "Capability id of the sub-agent to use"
                },
                "task_description": {
                    "type": "string",
                    "description": "Complete instructions for the sub-agent"
                },
                "thoroughness": {
                    "type": "string",
                    "enum": ["quick", "medium", "thorough"],
                    "description": "Effort level; sets the sub-agent's round limit (default: medium)"
                }
            },
            "required": ["agent_type", "task_description"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let agent_type = match call.args.get("agent_type").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return ToolOutput::err(&call.id, "missing 'agent_type'"),
        };
        let description = match call.args.get("task_description").and_then(|v| v.as_str()) {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => return ToolOutput::err(&call.id, "missing 'task_description'"),
        };
        let thoroughness = match call.args.get("thoroughness").and_then(|v| v.as_str()) {
            None => Thoroughness::default(),
            Some(s) => match Thoroughness::parse(s) {
                Some(t) => t,
                None => {
                    return ToolOutput::err(
                        &call.id,
                        format!("invalid thoroughness '{s}'; expected quick, medium or thorough"),
                    )
                }
            },
        };

        let Some(skill) = self.resolver.resolve(&agent_type) else {
            warn!(agent_type = %agent_type, "task: unknown agent type");
            return ToolOutput::err(&call.id, self.unknown_type_message(&agent_type));
        };

        let mut rounds = thoroughness.rounds(&self.config);
        if let Some(max) = skill.max_rounds {
            rounds = rounds.min(max);
        }

        let task = AgentTask::new(&agent_type, short_description(&description), &description)
            .with_max_rounds(rounds);
        let task_id = self.orchestrator.insert_task(task);
        debug!(task_id = %task_id, agent_type = %agent_type, rounds, "task: delegating");

        self.notify(DelegationEvent::Starting {
            task_id,
            agent_type: agent_type.clone(),
            description: short_description(&description),
        });

        let started = |task: &AgentTask| {
            self.notify(DelegationEvent::Running { task_id: task.id, agent_type: task.agent_type.clone() });
        };
        let result = match self
            .orchestrator
            .execute_task_with(task_id, self.runner.as_ref(), started)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.notify(DelegationEvent::Failed {
                    task_id,
                    agent_type: agent_type.clone(),
                    duration_ms: 0,
                    error: e.to_string(),
                });
                return ToolOutput::err(&call.id, e.to_string());
            }
        };

        let metadata = json!({
            "agent_type": agent_type,
            "task_id": task_id.to_string(),
            "duration_ms": result.metadata.duration_ms,
            "tools_used": result.metadata.tools_used,
            "thoroughness": thoroughness.as_str(),
        });

        if result.success {
            self.notify(DelegationEvent::Completed {
                task_id,
                agent_type,
                duration_ms: result.metadata.duration_ms,
            });
            let body = json!({
                "success": true,
                "output": summarize_output(&result.output, self.config.output_char_limit),
                "metadata": metadata,
            });
            ToolOutput::ok(&call.id, body.to_string())
        } else {
            let error = result.error.unwrap_or_else(|| "sub-agent failed".to_string());
            self.notify(DelegationEvent::Failed {
                task_id,
                agent_type,
                duration_ms: result.metadata.duration_ms,
                error: error.clone(),
            });
            let body = json!({ "success": false, "error": error, "metadata": metadata });
            ToolOutput::err(&call.id, body.to_string())
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
