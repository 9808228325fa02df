// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sub-agent runners.
//!
//! The orchestrator never builds an [`Agent`] itself; it hands a
//! [`SubAgentRequest`] to a [`SubAgentRunner`].  [`AgentRunner`] is the
//! production implementation: every request gets a fresh agent whose tool
//! registry is restricted to the capability's declared tools.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use tracing::debug;

use skiff_config::{AgentConfig, DetectorConfig};
use skiff_core::{Agent, TurnOutcome};
use skiff_model::ModelProvider;
use skiff_skills::SkillDefinition;
use skiff_tools::ToolRegistry;

use crate::task_tool::TASK_TOOL_NAME;

/// Skill model value meaning "use the parent's model".
const INHERIT_MODEL: &str = "inherit";

/// Everything needed to drive one sub-agent.
#[derive(Debug, Clone)]
pub struct SubAgentRequest {
    pub skill: SkillDefinition,
    /// Prompt with the capability's instructions and tools already embedded.
    pub prompt: String,
    pub max_rounds: u32,
}

/// What a finished sub-agent reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubAgentRun {
    pub output: String,
    pub tools_used: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub rounds: u32,
}

#[async_trait]
pub trait SubAgentRunner: Send + Sync {
    /// Drive a sub-agent to completion.  Errors become failed task results.
    async fn run(&self, request: SubAgentRequest) -> anyhow::Result<SubAgentRun>;
}

/// Runs each request through a fresh [`Agent`] on the non-streaming path.
pub struct AgentRunner {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
    detector: DetectorConfig,
}

impl AgentRunner {
    /// `tools` is the parent's registry; each sub-agent sees only the subset
    /// its capability declares, and never the delegation tool.
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
    ) -> Self {
        let tools = Arc::new(tools.without(TASK_TOOL_NAME));
        Self { model, tools, config, detector: DetectorConfig::default() }
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Build the agent that would serve `request`.
    pub fn build_agent(&self, request: &SubAgentRequest) -> Agent {
        let tools = Arc::new(self.tools.subset(&request.skill.tools));
        let config = AgentConfig {
            max_rounds: request.max_rounds,
            system_prompt: None,
            ..(*self.config).clone()
        };
        let agent = Agent::new(Arc::clone(&self.model), tools, Arc::new(config))
            .with_detector(self.detector.clone());
        match request.skill.model.as_deref() {
            Some(tier) if tier != INHERIT_MODEL => agent.with_model_tier(tier),
            _ => agent,
        }
    }
}

#[async_trait]
impl SubAgentRunner for AgentRunner {
    async fn run(&self, request: SubAgentRequest) -> anyhow::Result<SubAgentRun> {
        let mut agent = self.build_agent(&request);
        debug!(
            capability = %request.skill.id,
            max_rounds = request.max_rounds,
            tools = agent.tools().len(),
            "starting sub-agent"
        );

        let outcome = agent.run(&request.prompt).await;
        let state = agent.state();
        match outcome {
            TurnOutcome::Completed { text } => Ok(SubAgentRun {
                output: text,
                tools_used: state.tools_used(),
                input_tokens: state.input_tokens_total,
                output_tokens: state.output_tokens_total,
                rounds: state.rounds,
            }),
            TurnOutcome::RoundLimit { rounds } => {
                bail!("sub-agent stopped after reaching its limit of {rounds} rounds")
            }
            TurnOutcome::Cancelled => bail!("sub-agent was cancelled"),
            TurnOutcome::ModelError(message) => bail!(message),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
