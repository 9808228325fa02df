// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
}

impl Config {
    /// Reject combinations that the runtime cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent.max_rounds == 0 {
            bail!("agent.max_rounds must be at least 1");
        }
        if self.agent.compaction_message_ceiling <= self.agent.compaction_keep_recent + 1 {
            bail!(
                "agent.compaction_message_ceiling ({}) must exceed compaction_keep_recent + 1 ({})",
                self.agent.compaction_message_ceiling,
                self.agent.compaction_keep_recent + 1
            );
        }
        if self.detector.failure_threshold == 0 {
            bail!("detector.failure_threshold must be at least 1");
        }
        if self.detector.window_size < self.detector.failure_threshold {
            bail!(
                "detector.window_size ({}) must be >= failure_threshold ({})",
                self.detector.window_size,
                self.detector.failure_threshold
            );
        }
        if !TaskConfig::CONCURRENCY_RANGE.contains(&self.tasks.max_concurrent) {
            bail!(
                "tasks.max_concurrent ({}) must be within [{}, {}]",
                self.tasks.max_concurrent,
                TaskConfig::CONCURRENCY_RANGE.start(),
                TaskConfig::CONCURRENCY_RANGE.end()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier.  Only `"mock"` ships with the runtime; other
    /// providers are wired in by the embedding application.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name forwarded to the provider
    #[serde(default = "default_model_name")]
    pub name: String,
}

fn default_provider() -> String {
    "mock".into()
}
fn default_model_name() -> String {
    "mock-model".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
        }
    }
}

fn default_max_rounds() -> u32 {
    200
}
fn default_compaction_message_ceiling() -> usize {
    80
}
fn default_compaction_keep_recent() -> usize {
    10
}
fn default_tool_result_char_cap() -> usize {
    16_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of model-call-then-dispatch rounds per user turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Compaction runs once the history holds more than this many messages.
    #[serde(default = "default_compaction_message_ceiling")]
    pub compaction_message_ceiling: usize,
    /// Number of most recent messages kept verbatim by compaction.
    /// The leading system message is always kept in addition to these.
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
    /// Tool results longer than this many characters are cut to a head and
    /// tail window before entering the history.  0 disables truncation.
    #[serde(default = "default_tool_result_char_cap")]
    pub tool_result_char_cap: usize,
    /// System prompt override; leave None to use the built-in prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            compaction_message_ceiling: default_compaction_message_ceiling(),
            compaction_keep_recent: default_compaction_keep_recent(),
            tool_result_char_cap: default_tool_result_char_cap(),
            system_prompt: None,
        }
    }
}

fn default_failure_threshold() -> usize {
    3
}
fn default_window_size() -> usize {
    5
}
fn default_reflection_cap() -> u32 {
    2
}

/// Thresholds for the stuck-loop heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Consecutive failures that count as stuck
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    /// Number of recent outcomes inspected for a repeated-tool loop
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Reflections injected per turn before the detector goes quiet
    #[serde(default = "default_reflection_cap")]
    pub reflection_cap: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_size: default_window_size(),
            reflection_cap: default_reflection_cap(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}
fn default_output_char_limit() -> usize {
    8_000
}
fn default_quick_rounds() -> u32 {
    10
}
fn default_medium_rounds() -> u32 {
    25
}
fn default_thorough_rounds() -> u32 {
    50
}
fn default_event_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Sub-agent tasks allowed to execute at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Sub-agent output longer than this is cut to a head and tail window
    #[serde(default = "default_output_char_limit")]
    pub output_char_limit: usize,
    #[serde(default = "default_quick_rounds")]
    pub quick_rounds: u32,
    #[serde(default = "default_medium_rounds")]
    pub medium_rounds: u32,
    #[serde(default = "default_thorough_rounds")]
    pub thorough_rounds: u32,
    /// Capacity of the delegation lifecycle channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl TaskConfig {
    pub const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=10;
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            output_char_limit: default_output_char_limit(),
            quick_rounds: default_quick_rounds(),
            medium_rounds: default_medium_rounds(),
            thorough_rounds: default_thorough_rounds(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Skill directory overrides.  Unset entries fall back to the standard
/// locations returned by the `*_or_default` helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default)]
    pub builtin_dir: Option<PathBuf>,
    #[serde(default)]
    pub user_dir: Option<PathBuf>,
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
}

impl SkillsConfig {
    pub fn builtin_dir_or_default(&self) -> PathBuf {
        self.builtin_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/usr/share/skiff/skills"))
    }

    pub fn user_dir_or_default(&self) -> Option<PathBuf> {
        self.user_dir
            .clone()
            .or_else(|| dirs::config_dir().map(|d| d.join("skiff").join("skills")))
    }

    pub fn project_dir_or_default(&self) -> PathBuf {
        self.project_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".skiff").join("skills"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn compaction_ceiling_must_exceed_keep_window() {
        let mut cfg = Config::default();
        cfg.agent.compaction_message_ceiling = 11;
        cfg.agent.compaction_keep_recent = 10;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("compaction_message_ceiling"), "{err}");
    }

    #[test]
    fn concurrency_outside_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.tasks.max_concurrent = 11;
        assert!(cfg.validate().is_err());
        cfg.tasks.max_concurrent = 0;
        assert!(cfg.validate().is_err());
        cfg.tasks.max_concurrent = 10;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn window_smaller_than_threshold_is_rejected() {
        let mut cfg = Config::default();
        cfg.detector.window_size = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_skill_dirs_take_precedence() {
        let cfg = SkillsConfig {
            builtin_dir: Some(PathBuf::from("/opt/skills")),
            user_dir: None,
            project_dir: Some(PathBuf::from("custom/skills")),
        };
        assert_eq!(cfg.builtin_dir_or_default(), PathBuf::from("/opt/skills"));
        assert_eq!(cfg.project_dir_or_default(), PathBuf::from("custom/skills"));
    }
}
