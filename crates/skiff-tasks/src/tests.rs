//! Fixtures shared by the unit tests in this crate.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use skiff_skills::{display_name, SkillDefinition};
use tokio::sync::{mpsc, Semaphore};

use crate::runner::{SubAgentRequest, SubAgentRun, SubAgentRunner};

pub(crate) const PROMPT: &str =
    "You are a careful assistant. Work step by step and report what you found.";

pub(crate) fn skill(id: &str, tools: &[&str], max_rounds: Option<u32>) -> SkillDefinition {
    SkillDefinition {
        id: id.to_string(),
        name: display_name(id),
        description: format!("Handles {id} work for tests."),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        system_prompt: PROMPT.to_string(),
        trigger_keywords: Vec::new(),
        max_rounds,
        model: None,
        source_path: PathBuf::from(format!("{id}.skill.md")),
        source: None,
    }
}

/// Reports each run as it starts, then blocks until the test releases it.
/// The run's name is the last line of its prompt.
pub(crate) struct GatedRunner {
    gate: Semaphore,
    started: mpsc::UnboundedSender<String>,
}

impl GatedRunner {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { gate: Semaphore::new(0), started }), rx)
    }

    /// Let `n` blocked runs finish.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl SubAgentRunner for GatedRunner {
    async fn run(&self, request: SubAgentRequest) -> anyhow::Result<SubAgentRun> {
        let name = request.prompt.lines().last().unwrap_or_default().to_string();
        let _ = self.started.send(name.clone());
        self.gate.acquire().await?.forget();
        Ok(SubAgentRun { output: format!("did {name}"), ..SubAgentRun::default() })
    }
}
