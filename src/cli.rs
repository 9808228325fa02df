// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "skiff",
    about = "A tool-calling agent runtime with skill-defined sub-agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (merged on top of the discovered layers)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).  RUST_LOG overrides.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect skill definitions
    Skills {
        #[command(subcommand)]
        action: SkillsCommand,
    },

    /// Print the effective configuration as YAML
    ShowConfig,

    /// Run one prompt through the agent and print the answer
    Run {
        /// The prompt to send
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Use the non-streaming model path
        #[arg(long)]
        no_stream: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SkillsCommand {
    /// List every effective skill
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one skill in full
    Show {
        /// Skill id, e.g. "code-reviewer"
        id: String,
    },

    /// Validate a single skill file without loading the registry
    Check {
        /// Path to a `.skill.md` file
        file: PathBuf,
    },

    /// Print registry statistics
    Stats,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
