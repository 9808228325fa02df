// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use skiff_skills::CapabilitySummary;

/// Maximum total characters for the `<available_capabilities>` block.
pub const MAX_CAPABILITIES_PROMPT_CHARS: usize = 10_000;

const IDENTITY: &str = "\
You are Skiff, a tool-using assistant for software work.  You can call tools to \
inspect and change the workspace.  Work systematically, verify results before \
reporting them, and say plainly when something failed.";

const GUIDELINES: &str = "\
## Guidelines
- Prefer reading before writing; confirm a file's contents before editing it.
- Call one tool at a time when later calls depend on earlier results.
- When a tool fails, read the error and change your approach instead of retrying blindly.
- Keep the final answer short and concrete.";

/// Format the delegatable capabilities block.
///
/// Returns an empty string when `capabilities` is empty.
pub fn build_capabilities_section(capabilities: &[CapabilitySummary]) -> String {
    if capabilities.is_empty() {
        return String::new();
    }

    let entries: Vec<String> = capabilities
        .iter()
        .map(|c| {
            format!(
                "  <capability>\n    <id>{}</id>\n    <name>{}</name>\n    <description>{}</description>\n  </capability>",
                c.id,
                c.name,
                c.description.trim(),
            )
        })
        .collect();

    let mut used = 0usize;
    let fitted_count = entries
        .iter()
        .take_while(|e| {
            let next = used + e.len();
            if next <= MAX_CAPABILITIES_PROMPT_CHARS {
                used = next;
                true
            } else {
                false
            }
        })
        .count();

    if fitted_count == 0 {
        return String::new();
    }

    let truncation_note = if fitted_count < entries.len() {
        format!("\nCapabilities truncated: showing {} of {}.", fitted_count, entries.len())
    } else {
        String::new()
    };

    format!(
        "## Delegation\n\n\
         Use the `task` tool to hand a self-contained piece of work to a specialised \
         sub-agent.  Pass one of the capability ids below as `agent_type`.\
         {truncation_note}\n\n\
         <available_capabilities>\n{}\n</available_capabilities>",
        entries[..fitted_count].join("\n")
    )
}

/// Build the system prompt.
///
/// A `custom` prompt is returned verbatim.  Otherwise the prompt lists the
/// available tools and, when any are given, the delegatable capabilities.
pub fn system_prompt(
    custom: Option<&str>,
    tool_names: &[String],
    capabilities: &[CapabilitySummary],
) -> String {
    if let Some(custom) = custom {
        return custom.to_string();
    }

    let tools_section = if tool_names.is_empty() {
        String::new()
    } else {
        let list = tool_names
            .iter()
            .map(|n| format!("- `{n}`"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n\n## Available Tools\n{list}")
    };

    let capabilities_section = build_capabilities_section(capabilities);
    let capabilities_section = if capabilities_section.is_empty() {
        capabilities_section
    } else {
        format!("\n\n{capabilities_section}")
    };

    format!("{IDENTITY}{tools_section}{capabilities_section}\n\n{GUIDELINES}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
