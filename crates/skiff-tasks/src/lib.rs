//! Sub-agent tasks: the orchestrator that runs them and the `task` tool
//! that lets a parent agent delegate to them.
//!
//! `skiff-core` knows nothing about this crate; the delegation tool is an
//! ordinary [`skiff_tools::Tool`] registered next to the others.

pub mod error;
pub mod orchestrator;
pub mod runner;
pub mod task;
pub mod task_tool;
#[cfg(test)]
mod tests;

pub use error::TaskError;
pub use orchestrator::{augmented_prompt, effective_rounds, TaskOrchestrator, TaskStatistics};
pub use runner::{AgentRunner, SubAgentRequest, SubAgentRun, SubAgentRunner};
pub use task::{AgentResult, AgentTask, ResultMetadata, TaskStatus, CANCELLED};
pub use task_tool::{summarize_output, DelegationEvent, TaskTool, Thoroughness, TASK_TOOL_NAME};
