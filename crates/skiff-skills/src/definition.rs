// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Skill definition files and their validation rules.
//!
//! ## File format
//!
//! A skill is a single `*.skill.md` file.  The first level-one heading holds
//! the skill id; an optional `Skill:` or `Agent:` label before the id is
//! ignored.  Labelled level-two sections follow:
//!
//! ```text
//! # Skill: code-reviewer
//!
//! ## Description
//! Reviews a change for correctness and style problems.
//!
//! ## Tools
//! - read_file
//! - grep
//!
//! ## System Prompt
//! You are a meticulous reviewer ...
//!
//! ## Trigger Keywords
//! review, audit
//!
//! ## Max Rounds
//! 20
//!
//! ## Model
//! balanced
//! ```
//!
//! `Description`, `Tools` and `System Prompt` are required and must appear in
//! that order after the id heading.  Section names match case-insensitively
//! with runs of whitespace collapsed.  A `##` heading whose name is not a
//! known section is treated as body text, so system prompts may contain
//! their own Markdown headings.  Only the first `#` heading is the id; later
//! ones are body text too.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::SkillError;

/// Tool identifiers a skill may request.  The delegation tool is absent so
/// that sub-agents cannot delegate further.
pub const ALLOWED_TOOLS: &[&str] = &[
    "read_file",
    "write_file",
    "edit_file",
    "list_dir",
    "glob",
    "grep",
    "search_codebase",
    "run_terminal_command",
    "web_fetch",
    "web_search",
    "todo_write",
];

/// Model preferences a skill may name.
pub const ALLOWED_MODELS: &[&str] = &["inherit", "fast", "balanced", "powerful"];

pub const DESCRIPTION_CHARS: std::ops::RangeInclusive<usize> = 10..=500;
pub const SYSTEM_PROMPT_CHARS: std::ops::RangeInclusive<usize> = 50..=50_000;
pub const TOOL_COUNT: std::ops::RangeInclusive<usize> = 1..=10;
pub const MAX_ROUNDS: std::ops::RangeInclusive<u32> = 5..=100;

/// File suffix that marks a skill definition.
pub const SKILL_FILE_SUFFIX: &str = ".skill.md";

/// Directory role a skill was loaded from.  Ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkillSource {
    Builtin,
    User,
    Project,
}

impl std::fmt::Display for SkillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillSource::Builtin => write!(f, "built-in"),
            SkillSource::User => write!(f, "user"),
            SkillSource::Project => write!(f, "project"),
        }
    }
}

/// A validated capability definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillDefinition {
    /// Unique lowercase-kebab identifier.
    pub id: String,
    /// Title-cased form of `id` for display.
    pub name: String,
    pub description: String,
    /// Tool identifiers in declaration order, without duplicates.
    pub tools: Vec<String>,
    pub system_prompt: String,
    pub trigger_keywords: Vec<String>,
    pub max_rounds: Option<u32>,
    pub model: Option<String>,
    pub source_path: PathBuf,
    /// Set by the registry; `None` for definitions parsed directly.
    pub source: Option<SkillSource>,
}

impl SkillDefinition {
    /// True when any trigger keyword occurs in `text`, ignoring case.
    pub fn matches_keywords(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.trigger_keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase()))
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Description,
    Tools,
    SystemPrompt,
    TriggerKeywords,
    MaxRounds,
    Model,
}

impl Section {
    fn from_heading(name: &str) -> Option<Self> {
        let normalised = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalised.as_str() {
            "description" => Some(Self::Description),
            "tools" => Some(Self::Tools),
            "system prompt" => Some(Self::SystemPrompt),
            "trigger keywords" => Some(Self::TriggerKeywords),
            "max rounds" => Some(Self::MaxRounds),
            "model" => Some(Self::Model),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Description => "Description",
            Self::Tools => "Tools",
            Self::SystemPrompt => "System Prompt",
            Self::TriggerKeywords => "Trigger Keywords",
            Self::MaxRounds => "Max Rounds",
            Self::Model => "Model",
        }
    }
}

/// Parse and validate one skill definition.  `path` is recorded as the
/// source path and named in every error.
pub fn parse(text: &str, path: &Path) -> Result<SkillDefinition, SkillError> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut id: Option<String> = None;
    let mut order: Vec<Section> = Vec::new();
    let mut bodies: HashMap<Section, Vec<&str>> = HashMap::new();
    let mut current: Option<Section> = None;

    for line in normalised.lines() {
        let trimmed = line.trim_start();
        if id.is_none() && trimmed.starts_with("# ") {
            id = Some(id_from_heading(trimmed));
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix("## ") {
            if let Some(section) = Section::from_heading(heading) {
                if bodies.contains_key(&section) {
                    return Err(SkillError::validation(
                        path,
                        format!("duplicate section '{}'", section.label()),
                    ));
                }
                if id.is_none() {
                    return Err(SkillError::validation(
                        path,
                        format!("missing id heading before section '{}'", section.label()),
                    ));
                }
                order.push(section);
                bodies.insert(section, Vec::new());
                current = Some(section);
                continue;
            }
        }
        if let Some(section) = current {
            bodies.entry(section).or_default().push(line);
        }
    }

    let id = id.ok_or_else(|| SkillError::validation(path, "missing id heading"))?;
    validate_id(&id, path)?;
    check_required_order(&order, path)?;

    let description = bodies[&Section::Description]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let len = description.chars().count();
    if !DESCRIPTION_CHARS.contains(&len) {
        return Err(SkillError::validation(
            path,
            format!(
                "description length {len} outside {}..={} characters",
                DESCRIPTION_CHARS.start(),
                DESCRIPTION_CHARS.end()
            ),
        ));
    }

    let tools = parse_tools(&bodies[&Section::Tools], path)?;

    let system_prompt = bodies[&Section::SystemPrompt].join("\n").trim().to_string();
    let len = system_prompt.chars().count();
    if !SYSTEM_PROMPT_CHARS.contains(&len) {
        return Err(SkillError::validation(
            path,
            format!(
                "system prompt length {len} outside {}..={} characters",
                SYSTEM_PROMPT_CHARS.start(),
                SYSTEM_PROMPT_CHARS.end()
            ),
        ));
    }

    let trigger_keywords = bodies
        .get(&Section::TriggerKeywords)
        .map(|lines| parse_keywords(lines))
        .unwrap_or_default();

    let max_rounds = match bodies.get(&Section::MaxRounds).and_then(|l| first_value(l)) {
        Some(raw) => Some(parse_max_rounds(raw, path)?),
        None => None,
    };

    let model = match bodies.get(&Section::Model).and_then(|l| first_value(l)) {
        Some(raw) => {
            let m = raw.to_lowercase();
            if !ALLOWED_MODELS.contains(&m.as_str()) {
                return Err(SkillError::validation(
                    path,
                    format!("model '{raw}' not allowed (allowed: {})", ALLOWED_MODELS.join(", ")),
                ));
            }
            Some(m)
        }
        None => None,
    };

    Ok(SkillDefinition {
        name: display_name(&id),
        id,
        description,
        tools,
        system_prompt,
        trigger_keywords,
        max_rounds,
        model,
        source_path: path.to_path_buf(),
        source: None,
    })
}

fn id_from_heading(line: &str) -> String {
    let text = line.trim_start_matches('#').trim();
    for label in ["skill:", "agent:"] {
        if let Some(prefix) = text.get(..label.len()) {
            if prefix.eq_ignore_ascii_case(label) {
                return text[label.len()..].trim().to_string();
            }
        }
    }
    text.to_string()
}

fn validate_id(id: &str, path: &Path) -> Result<(), SkillError> {
    let valid = !id.is_empty()
        && id.split('-').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        });
    if valid {
        Ok(())
    } else {
        Err(SkillError::validation(
            path,
            format!("invalid id '{id}': must be lowercase-kebab (a-z, 0-9, single hyphens)"),
        ))
    }
}

fn check_required_order(order: &[Section], path: &Path) -> Result<(), SkillError> {
    let required = [Section::Description, Section::Tools, Section::SystemPrompt];
    let mut last = None;
    for section in required {
        let pos = order.iter().position(|s| *s == section).ok_or_else(|| {
            SkillError::validation(path, format!("missing required section '{}'", section.label()))
        })?;
        if let Some((prev_pos, prev)) = last {
            if pos < prev_pos {
                return Err(SkillError::validation(
                    path,
                    format!(
                        "section '{}' must come after '{}'",
                        section.label(),
                        Section::label(prev)
                    ),
                ));
            }
        }
        last = Some((pos, section));
    }
    Ok(())
}

/// Strip a Markdown list marker (`-`, `*`, `+`, `1.`, `1)`) from an item.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

fn parse_tools(lines: &[&str], path: &Path) -> Result<Vec<String>, SkillError> {
    let mut tools: Vec<String> = Vec::new();
    for line in lines {
        let item = strip_list_marker(line).trim_matches('`').trim();
        if item.is_empty() {
            continue;
        }
        if !ALLOWED_TOOLS.contains(&item) {
            return Err(SkillError::validation(
                path,
                format!("unknown tool '{item}' (allowed: {})", ALLOWED_TOOLS.join(", ")),
            ));
        }
        if !tools.iter().any(|t| t == item) {
            tools.push(item.to_string());
        }
    }
    if tools.is_empty() {
        return Err(SkillError::validation(path, "tools list is empty"));
    }
    if !TOOL_COUNT.contains(&tools.len()) {
        return Err(SkillError::validation(
            path,
            format!("too many tools ({}), at most {}", tools.len(), TOOL_COUNT.end()),
        ));
    }
    Ok(tools)
}

fn parse_keywords(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| strip_list_marker(line).split(','))
        .map(|k| k.trim().trim_matches('`').trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn first_value<'a>(lines: &[&'a str]) -> Option<&'a str> {
    lines.iter().map(|l| l.trim()).find(|l| !l.is_empty())
}

fn parse_max_rounds(raw: &str, path: &Path) -> Result<u32, SkillError> {
    let n: i64 = raw.parse().map_err(|_| {
        SkillError::validation(path, format!("maxRounds is not a number ('{raw}')"))
    })?;
    match u32::try_from(n) {
        Ok(n) if MAX_ROUNDS.contains(&n) => Ok(n),
        // Accepted range is MAX_ROUNDS (5..=100).
        _ => Err(SkillError::validation(path, format!("maxRounds out of range ({n})"))),
    }
}

/// `code-reviewer` → `Code Reviewer`.
pub fn display_name(id: &str) -> String {
    id.split('-')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
