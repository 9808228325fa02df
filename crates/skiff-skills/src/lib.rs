// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Skill-defined capabilities.
//!
//! A skill is a Markdown file describing a specialised sub-agent: what it is
//! for, which tools it may use and the system prompt it runs under.  This
//! crate parses and validates those files, loads them from layered
//! directories into a [`SkillRegistry`], and exposes them to the rest of the
//! workspace through the [`CapabilityResolver`] trait.

mod definition;
mod error;
mod registry;
mod resolver;
mod snapshot;

pub use definition::{
    display_name, parse, SkillDefinition, SkillSource, ALLOWED_MODELS, ALLOWED_TOOLS,
    DESCRIPTION_CHARS, MAX_ROUNDS, SKILL_FILE_SUFFIX, SYSTEM_PROMPT_CHARS, TOOL_COUNT,
};
pub use error::SkillError;
pub use registry::{
    LoadError, RegistrySnapshot, SkillDirectories, SkillRegistry, SkillStatistics,
    MAX_SKILL_FILE_BYTES,
};
pub use resolver::{CapabilityResolver, CapabilitySummary, RegistryResolver, StaticResolver};
pub use snapshot::SnapshotCell;
