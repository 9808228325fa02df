mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, SkillsCommand};
use skiff_config::Config;
use skiff_core::{Agent, AgentEvent, TurnOutcome};
use skiff_skills::{
    CapabilityResolver, RegistryResolver, SkillDirectories, SkillError, SkillRegistry,
    SKILL_FILE_SUFFIX,
};
use skiff_tasks::{AgentRunner, DelegationEvent, TaskOrchestrator, TaskTool};
use skiff_tools::ToolRegistry;

/// Process-wide registry.  Library crates never reach for this; they get
/// their registry or resolver injected.
static REGISTRY: OnceLock<Arc<SkillRegistry>> = OnceLock::new();

fn default_registry(config: &Config) -> Arc<SkillRegistry> {
    Arc::clone(REGISTRY.get_or_init(|| {
        let dirs = SkillDirectories {
            builtin: Some(config.skills.builtin_dir_or_default()),
            user: config.skills.user_dir_or_default(),
            project: Some(config.skills.project_dir_or_default()),
        };
        Arc::new(SkillRegistry::new(dirs))
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = skiff_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Skills { action } => skills_cmd(&config, action).await,
        Commands::Run { prompt, no_stream } => run_cmd(config, &prompt, !no_stream).await,
    }
}

// ── skills ────────────────────────────────────────────────────────────────────

async fn skills_cmd(config: &Config, action: SkillsCommand) -> anyhow::Result<()> {
    if let SkillsCommand::Check { file } = &action {
        return check_skill_file(file);
    }

    let registry = default_registry(config);
    let count = registry.load().await?;
    info!(count, "skills loaded");
    for e in registry.errors() {
        eprintln!("warning: {}: {}", e.file.display(), e.error);
    }

    match action {
        SkillsCommand::List { json } => {
            let skills = registry.list();
            if json {
                let entries: Vec<_> = skills
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "name": s.name,
                            "description": s.description,
                            "tools": s.tools,
                            "source": s.source.map(|src| src.to_string()),
                            "path": s.source_path.display().to_string(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if skills.is_empty() {
                println!("No skills found.");
                return Ok(());
            }
            let id_w = skills.iter().map(|s| s.id.len()).max().unwrap_or(2).max(2);
            println!("{:<id_w$}  {:<8}  {:>5}  DESCRIPTION", "ID", "SOURCE", "TOOLS");
            println!("{}", "-".repeat(id_w + 30));
            for s in &skills {
                let source = s.source.map(|src| src.to_string()).unwrap_or_default();
                let first_line = s.description.lines().next().unwrap_or_default();
                println!("{:<id_w$}  {:<8}  {:>5}  {}", s.id, source, s.tools.len(), first_line);
            }
        }
        SkillsCommand::Show { id } => {
            let skill = registry
                .lookup(&id)
                .ok_or_else(|| SkillError::UnknownCapability(id.clone()))?;
            println!("id:          {}", skill.id);
            println!("name:        {}", skill.name);
            if let Some(src) = skill.source {
                println!("source:      {src} ({})", skill.source_path.display());
            }
            println!("tools:       {}", skill.tools.join(", "));
            if let Some(r) = skill.max_rounds {
                println!("max rounds:  {r}");
            }
            if let Some(m) = &skill.model {
                println!("model:       {m}");
            }
            if !skill.trigger_keywords.is_empty() {
                println!("keywords:    {}", skill.trigger_keywords.join(", "));
            }
            println!("\n{}\n\n{}", skill.description, skill.system_prompt);
        }
        SkillsCommand::Stats => {
            let stats = registry.statistics();
            println!("total:                 {}", stats.total);
            println!("  built-in:            {}", stats.builtin);
            println!("  user:                {}", stats.user);
            println!("  project:             {}", stats.project);
            println!("with trigger keywords: {}", stats.with_trigger_keywords);
            println!("load errors:           {}", stats.load_errors);
        }
        SkillsCommand::Check { .. } => {}
    }
    Ok(())
}

fn check_skill_file(file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading skill file {}", file.display()))?;
    if !file.to_string_lossy().ends_with(SKILL_FILE_SUFFIX) {
        warn!(path = %file.display(), "file name lacks the {SKILL_FILE_SUFFIX} suffix; the registry will not pick it up");
    }
    let skill = skiff_skills::parse(&text, file)?;
    println!("{}: ok ({} tools: {})", skill.id, skill.tools.len(), skill.tools.join(", "));
    Ok(())
}

// ── run ───────────────────────────────────────────────────────────────────────

async fn run_cmd(config: Config, prompt: &str, stream: bool) -> anyhow::Result<()> {
    let registry = default_registry(&config);
    if let Err(e) = registry.load().await {
        warn!(error = %e, "skill registry failed to load; delegation disabled");
    }
    let resolver: Arc<dyn CapabilityResolver> = Arc::new(RegistryResolver::new(registry));

    let model: Arc<dyn skiff_model::ModelProvider> =
        Arc::from(skiff_model::from_name(&config.model.provider)?);
    let agent_config = Arc::new(config.agent.clone());

    // Concrete tools are registered here and shared with sub-agents; the
    // runner strips `task` from its copy.
    let mut tools = ToolRegistry::new();
    let runner = AgentRunner::new(Arc::clone(&model), Arc::new(tools.clone()), Arc::clone(&agent_config))
        .with_detector(config.detector.clone());

    let orchestrator = Arc::new(TaskOrchestrator::new(Arc::clone(&resolver), &config.tasks));
    let (delegation_tx, mut delegation_rx) = TaskTool::event_channel(&config.tasks);
    let task_tool = TaskTool::new(orchestrator, Arc::clone(&resolver), Arc::new(runner), config.tasks.clone())
        .with_events(delegation_tx);

    tools.register(task_tool);

    let mut agent = Agent::new(model, Arc::new(tools), agent_config)
        .with_detector(config.detector.clone())
        .with_resolver(resolver);

    let cancel = agent.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[interrupted]");
            cancel.cancel();
        }
    });

    tokio::spawn(async move {
        while let Some(ev) = delegation_rx.recv().await {
            match ev {
                DelegationEvent::Starting { agent_type, description, .. } => {
                    eprintln!("[task] {agent_type}: {description}");
                }
                DelegationEvent::Completed { agent_type, duration_ms, .. } => {
                    eprintln!("[task] {agent_type} finished in {duration_ms} ms");
                }
                DelegationEvent::Failed { agent_type, error, .. } => {
                    eprintln!("[task] {agent_type} failed: {error}");
                }
                DelegationEvent::Running { .. } => {}
            }
        }
    });

    let outcome = if stream {
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(256);
        let printer = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            while let Some(ev) = rx.recv().await {
                match ev {
                    AgentEvent::TextDelta(t) => {
                        let _ = write!(stdout, "{t}");
                        let _ = stdout.flush();
                    }
                    AgentEvent::ToolCallsAnnounced(calls) => {
                        for c in calls {
                            eprintln!("[tool] {} {}", c.name, c.args);
                        }
                    }
                    AgentEvent::StuckDetected { reason, tools } => {
                        eprintln!("[stuck] {reason}: {}", tools.join(", "));
                    }
                    AgentEvent::ContextCompacted { messages_before, messages_after } => {
                        eprintln!("[compacted] {messages_before} -> {messages_after} messages");
                    }
                    _ => {}
                }
            }
            println!();
        });
        let outcome = agent.submit(prompt, tx).await;
        let _ = printer.await;
        outcome
    } else {
        let outcome = agent.run(prompt).await;
        if let TurnOutcome::Completed { text } = &outcome {
            println!("{text}");
        }
        outcome
    };

    match outcome {
        TurnOutcome::Completed { .. } => Ok(()),
        TurnOutcome::RoundLimit { rounds } => {
            eprintln!("warning: stopped after {rounds} rounds without a final answer");
            Ok(())
        }
        TurnOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(())
        }
        TurnOutcome::ModelError(e) => anyhow::bail!(e),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
