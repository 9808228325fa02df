// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task orchestrator: owns every [`AgentTask`] and bounds how many run at once.
//!
//! Execution waits on a [`Semaphore`] slot, resolves the task's capability,
//! and drives a sub-agent through a [`SubAgentRunner`].  Runner errors and
//! panics never escape; they become failed [`AgentResult`]s recorded on the
//! task.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use skiff_config::TaskConfig;
use skiff_skills::{CapabilityResolver, SkillDefinition};

use crate::error::TaskError;
use crate::runner::{SubAgentRequest, SubAgentRunner};
use crate::task::{AgentResult, AgentTask, ResultMetadata, TaskStatus};

/// Counts of tracked tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub by_type: BTreeMap<String, usize>,
    pub max_concurrent: usize,
}

pub struct TaskOrchestrator {
    tasks: RwLock<HashMap<Uuid, AgentTask>>,
    resolver: Arc<dyn CapabilityResolver>,
    semaphore: Arc<Semaphore>,
    max_concurrent: AtomicUsize,
    /// Serialises ceiling changes.
    resize: Mutex<()>,
    default_rounds: u32,
}

impl TaskOrchestrator {
    /// Out-of-range `max_concurrent` values in `config` are clamped.
    pub fn new(resolver: Arc<dyn CapabilityResolver>, config: &TaskConfig) -> Self {
        let range = TaskConfig::CONCURRENCY_RANGE;
        let ceiling = config.max_concurrent.clamp(*range.start(), *range.end());
        if ceiling != config.max_concurrent {
            warn!(requested = config.max_concurrent, using = ceiling, "max_concurrent out of range; clamped");
        }
        Self {
            tasks: RwLock::new(HashMap::new()),
            resolver,
            semaphore: Arc::new(Semaphore::new(ceiling)),
            max_concurrent: AtomicUsize::new(ceiling),
            resize: Mutex::new(()),
            default_rounds: config.medium_rounds,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Change the concurrency ceiling.  Lowering it waits until enough
    /// running tasks have released their slots.
    pub async fn set_max_concurrent(&self, value: usize) -> Result<(), TaskError> {
        let range = TaskConfig::CONCURRENCY_RANGE;
        if !range.contains(&value) {
            return Err(TaskError::ConcurrencyOutOfRange {
                value,
                min: *range.start(),
                max: *range.end(),
            });
        }

        let _guard = self.resize.lock().await;
        let current = self.max_concurrent();
        if value > current {
            self.semaphore.add_permits(value - current);
        } else if value < current {
            let permits = self
                .semaphore
                .acquire_many((current - value) as u32)
                .await
                .map_err(|e| TaskError::Execution(e.to_string()))?;
            permits.forget();
        }
        self.max_concurrent.store(value, Ordering::SeqCst);
        info!(from = current, to = value, "task concurrency ceiling changed");
        Ok(())
    }

    // ── Task bookkeeping ──────────────────────────────────────────────────────

    /// Register a new pending task and return its id.
    pub fn create_task(
        &self,
        agent_type: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Uuid {
        self.insert_task(AgentTask::new(agent_type, description, prompt))
    }

    /// Register a pre-built task (e.g. one with a parent or round ceiling).
    pub fn insert_task(&self, task: AgentTask) -> Uuid {
        let id = task.id;
        debug!(task_id = %id, agent_type = %task.agent_type, "task created");
        self.tasks.write().expect("task table lock poisoned").insert(id, task);
        id
    }

    pub fn get_task(&self, id: Uuid) -> Option<AgentTask> {
        self.tasks.read().expect("task table lock poisoned").get(&id).cloned()
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Vec<AgentTask> {
        let mut tasks: Vec<AgentTask> =
            self.tasks.read().expect("task table lock poisoned").values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Cancel a task that has not started yet.
    pub fn cancel_task(&self, id: Uuid) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().expect("task table lock poisoned");
        let task = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        task.cancel()?;
        info!(task_id = %id, "task cancelled");
        Ok(())
    }

    /// Drop completed and failed tasks.  Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut tasks = self.tasks.write().expect("task table lock poisoned");
        let before = tasks.len();
        tasks.retain(|_, t| !t.status.is_finished());
        before - tasks.len()
    }

    pub fn statistics(&self) -> TaskStatistics {
        let tasks = self.tasks.read().expect("task table lock poisoned");
        let mut stats = TaskStatistics {
            total: tasks.len(),
            max_concurrent: self.max_concurrent(),
            ..TaskStatistics::default()
        };
        for t in tasks.values() {
            match t.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            *stats.by_type.entry(t.agent_type.clone()).or_default() += 1;
        }
        stats
    }

    fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AgentTask) -> Result<T, TaskError>,
    ) -> Result<T, TaskError> {
        let mut tasks = self.tasks.write().expect("task table lock poisoned");
        let task = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        f(task)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Run one pending task to completion, waiting for a free slot first.
    pub async fn execute_task(
        &self,
        id: Uuid,
        runner: &dyn SubAgentRunner,
    ) -> Result<AgentResult, TaskError> {
        self.execute_task_with(id, runner, |_| {}).await
    }

    /// Like [`execute_task`](Self::execute_task), calling `on_start` once the
    /// task holds a slot and has moved to running.  A task still queued for
    /// a slot never reaches `on_start`.
    pub async fn execute_task_with<F>(
        &self,
        id: Uuid,
        runner: &dyn SubAgentRunner,
        on_start: F,
    ) -> Result<AgentResult, TaskError>
    where
        F: FnOnce(&AgentTask) + Send,
    {
        let status = self.get_task(id).ok_or(TaskError::NotFound(id))?.status;
        if status != TaskStatus::Pending {
            return Err(TaskError::InvalidTransition { id, from: status, to: TaskStatus::Running });
        }

        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| TaskError::Execution(e.to_string()))?;

        // May fail if the task was cancelled while waiting for the slot.
        let task = self.update(id, |t| {
            t.start()?;
            Ok(t.clone())
        })?;
        info!(task_id = %id, agent_type = %task.agent_type, "task started");
        on_start(&task);

        let started = Instant::now();
        let result = self.run_task(&task, runner, started).await;

        match &result.error {
            None => info!(task_id = %id, duration_ms = result.metadata.duration_ms, "task completed"),
            Some(e) => warn!(task_id = %id, duration_ms = result.metadata.duration_ms, error = %e, "task failed"),
        }
        self.update(id, |t| t.finish(result.clone()))?;
        Ok(result)
    }

    async fn run_task(
        &self,
        task: &AgentTask,
        runner: &dyn SubAgentRunner,
        started: Instant,
    ) -> AgentResult {
        let elapsed_meta = |started: Instant| ResultMetadata {
            duration_ms: started.elapsed().as_millis() as u64,
            ..ResultMetadata::default()
        };

        let Some(skill) = self.resolver.resolve(&task.agent_type) else {
            let err = TaskError::UnknownCapability(task.agent_type.clone());
            return AgentResult::failure(err.to_string(), elapsed_meta(started));
        };

        let max_rounds = effective_rounds(task.max_rounds, skill.max_rounds, self.default_rounds);
        let request = SubAgentRequest {
            prompt: augmented_prompt(&skill, &task.prompt),
            skill,
            max_rounds,
        };

        match AssertUnwindSafe(runner.run(request)).catch_unwind().await {
            Ok(Ok(run)) => {
                let mut tools_used: Vec<String> = Vec::new();
                for tool in run.tools_used {
                    if !tools_used.contains(&tool) {
                        tools_used.push(tool);
                    }
                }
                AgentResult::success(
                    run.output,
                    ResultMetadata {
                        duration_ms: started.elapsed().as_millis() as u64,
                        tools_used,
                        input_tokens: run.input_tokens,
                        output_tokens: run.output_tokens,
                        rounds: run.rounds,
                    },
                )
            }
            Ok(Err(e)) => AgentResult::failure(
                TaskError::Execution(format!("{e:#}")).to_string(),
                elapsed_meta(started),
            ),
            Err(panic) => AgentResult::failure(
                TaskError::Execution(format!("sub-agent panicked: {}", panic_message(&*panic)))
                    .to_string(),
                elapsed_meta(started),
            ),
        }
    }

    /// Run tasks concurrently, subject to the ceiling.  Results are in `ids`
    /// order.
    pub async fn execute_parallel(
        &self,
        ids: &[Uuid],
        runner: &dyn SubAgentRunner,
    ) -> Vec<Result<AgentResult, TaskError>> {
        join_all(ids.iter().map(|id| self.execute_task(*id, runner))).await
    }

    /// Run tasks one after another, stopping at the first failure.  The
    /// returned list ends with the failing entry; later tasks stay pending.
    pub async fn execute_sequential(
        &self,
        ids: &[Uuid],
        runner: &dyn SubAgentRunner,
    ) -> Vec<Result<AgentResult, TaskError>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.execute_task(*id, runner).await;
            let failed = !matches!(&result, Ok(r) if r.success);
            results.push(result);
            if failed {
                debug!(task_id = %id, "sequential execution stopped at failure");
                break;
            }
        }
        results
    }
}

/// Requested ceiling, else the capability's, else `default`; never above
/// the capability's own ceiling.
pub fn effective_rounds(requested: Option<u32>, skill_max: Option<u32>, default: u32) -> u32 {
    let rounds = requested.or(skill_max).unwrap_or(default);
    match skill_max {
        Some(max) => rounds.min(max),
        None => rounds,
    }
}

/// Task prompt prefixed with the capability's instructions and tool list.
pub fn augmented_prompt(skill: &SkillDefinition, prompt: &str) -> String {
    let tools = skill
        .tools
        .iter()
        .map(|t| format!("- `{t}`"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are acting as the `{}` capability.\n\n{}\n\n## Tools for this task\n{}\n\n## Task\n{}",
        skill.id,
        skill.system_prompt.trim(),
        tools,
        prompt.trim()
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use skiff_skills::StaticResolver;

    use super::*;
    use crate::runner::SubAgentRun;
    use crate::tests::{skill, GatedRunner};

    /// Test double: sleeps briefly, records start/end order and peak
    /// concurrency.  Prompts containing "fail" error; "panic" panics.
    #[derive(Default)]
    struct RecordingRunner {
        active: AtomicUsize,
        peak: AtomicUsize,
        log: StdMutex<Vec<String>>,
        requests: StdMutex<Vec<SubAgentRequest>>,
    }

    #[async_trait]
    impl SubAgentRunner for RecordingRunner {
        async fn run(&self, request: SubAgentRequest) -> anyhow::Result<SubAgentRun> {
            let name = request.prompt.lines().last().unwrap_or_default().to_string();
            self.requests.lock().unwrap().push(request.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("start {name}"));

            tokio::time::sleep(Duration::from_millis(20)).await;

            self.log.lock().unwrap().push(format!("end {name}"));
            self.active.fetch_sub(1, Ordering::SeqCst);

            if name.contains("panic") {
                panic!("runner exploded");
            }
            if name.contains("fail") {
                anyhow::bail!("could not finish {name}");
            }
            Ok(SubAgentRun {
                output: format!("did {name}"),
                tools_used: vec!["grep".into(), "read_file".into(), "grep".into()],
                input_tokens: 10,
                output_tokens: 4,
                rounds: 2,
            })
        }
    }

    fn orchestrator(max_concurrent: usize) -> TaskOrchestrator {
        let resolver = StaticResolver::new([
            skill("explore", &["grep", "read_file"], Some(30)),
            skill("code-reviewer", &["read_file"], None),
        ]);
        let config = TaskConfig { max_concurrent, ..TaskConfig::default() };
        TaskOrchestrator::new(Arc::new(resolver), &config)
    }

    // ── Single execution ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn execute_task_completes_and_records_result() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let id = orch.create_task("explore", "find entry point", "alpha");

        let result = orch.execute_task(id, &runner).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, "did alpha");
        assert_eq!(result.metadata.tools_used, vec!["grep", "read_file"]);
        assert_eq!(result.metadata.input_tokens, 10);
        assert!(result.metadata.duration_ms >= 20);

        let task = orch.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.started_at.is_some() && task.completed_at.is_some());
        assert_eq!(task.result, Some(result));
    }

    #[tokio::test]
    async fn prompt_embeds_capability_instructions_and_tools() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let id = orch.create_task("explore", "d", "alpha");
        orch.execute_task(id, &runner).await.unwrap();

        let requests = runner.requests.lock().unwrap();
        let prompt = &requests[0].prompt;
        assert!(prompt.contains(crate::tests::PROMPT));
        assert!(prompt.contains("- `grep`"));
        assert!(prompt.ends_with("alpha"));
        assert_eq!(requests[0].max_rounds, 30);
    }

    #[tokio::test]
    async fn task_round_ceiling_is_clamped_by_capability() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let id = orch.insert_task(AgentTask::new("explore", "d", "alpha").with_max_rounds(50));
        orch.execute_task(id, &runner).await.unwrap();
        assert_eq!(runner.requests.lock().unwrap()[0].max_rounds, 30);
    }

    #[tokio::test]
    async fn unknown_capability_fails_the_task() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let id = orch.create_task("nope", "d", "alpha");

        let result = orch.execute_task(id, &runner).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown capability: nope"));
        assert_eq!(orch.get_task(id).unwrap().status, TaskStatus::Failed);
        assert!(runner.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn runner_error_and_panic_become_failed_results() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let failing = orch.create_task("explore", "d", "fail");
        let panicking = orch.create_task("explore", "d", "panic");

        let r1 = orch.execute_task(failing, &runner).await.unwrap();
        let r2 = orch.execute_task(panicking, &runner).await.unwrap();

        assert!(r1.error.unwrap().contains("could not finish fail"));
        assert!(r2.error.unwrap().contains("panicked: runner exploded"));
        assert_eq!(orch.get_task(panicking).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn executing_twice_is_rejected() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let id = orch.create_task("explore", "d", "alpha");
        orch.execute_task(id, &runner).await.unwrap();

        let err = orch.execute_task(id, &runner).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { from: TaskStatus::Completed, .. }));
        assert!(matches!(
            orch.execute_task(Uuid::new_v4(), &runner).await,
            Err(TaskError::NotFound(_))
        ));
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancel_only_while_pending() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let pending = orch.create_task("explore", "d", "alpha");
        let done = orch.create_task("explore", "d", "beta");
        orch.execute_task(done, &runner).await.unwrap();

        orch.cancel_task(pending).unwrap();
        let task = orch.get_task(pending).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("cancelled"));

        assert!(orch.cancel_task(done).is_err());
        assert!(orch.execute_task(pending, &runner).await.is_err());
        assert!(matches!(orch.cancel_task(Uuid::new_v4()), Err(TaskError::NotFound(_))));
    }

    // ── Concurrency ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn parallel_execution_respects_ceiling() {
        let orch = orchestrator(2);
        let runner = RecordingRunner::default();
        let ids: Vec<Uuid> =
            (0..6).map(|i| orch.create_task("explore", "d", format!("t{i}"))).collect();

        let results = orch.execute_parallel(&ids, &runner).await;

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.as_ref().unwrap().success));
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(orch.statistics().completed, 6);
    }

    #[tokio::test]
    async fn task_beyond_ceiling_stays_pending_until_a_slot_frees() {
        let orch = Arc::new(orchestrator(3));
        let (runner, mut started) = GatedRunner::new();
        let ids: Vec<Uuid> =
            (0..4).map(|i| orch.create_task("explore", "d", format!("t{i}"))).collect();

        let handle = {
            let (orch, runner, ids) = (Arc::clone(&orch), Arc::clone(&runner), ids.clone());
            tokio::spawn(async move { orch.execute_parallel(&ids, runner.as_ref()).await })
        };

        let mut first = Vec::new();
        for _ in 0..3 {
            first.push(started.recv().await.unwrap());
        }
        let quiet = tokio::time::timeout(Duration::from_millis(50), started.recv()).await;
        assert!(quiet.is_err(), "a fourth run started while all slots were held");
        let stats = orch.statistics();
        assert_eq!((stats.running, stats.pending), (3, 1));

        runner.release(1);
        let fourth = started.recv().await.unwrap();
        assert!(!first.contains(&fourth));
        let stats = orch.statistics();
        assert_eq!((stats.running, stats.pending, stats.completed), (3, 0, 1));

        runner.release(3);
        let results = handle.await.unwrap();
        assert!(results.iter().all(|r| r.as_ref().unwrap().success));
        assert_eq!(orch.statistics().completed, 4);
    }

    #[tokio::test]
    async fn start_callback_fires_only_once_a_slot_is_held() {
        let orch = Arc::new(orchestrator(1));
        let (runner, mut started) = GatedRunner::new();
        let a = orch.create_task("explore", "d", "A");
        let b = orch.create_task("explore", "d", "B");
        let (tx, mut on_start) = tokio::sync::mpsc::unbounded_channel::<Uuid>();

        let spawn = |id: Uuid| {
            let (orch, runner, tx) = (Arc::clone(&orch), Arc::clone(&runner), tx.clone());
            tokio::spawn(async move {
                orch.execute_task_with(id, runner.as_ref(), move |t| {
                    let _ = tx.send(t.id);
                })
                .await
            })
        };

        let ha = spawn(a);
        assert_eq!(started.recv().await.as_deref(), Some("A"));
        let hb = spawn(b);
        assert_eq!(on_start.recv().await, Some(a));
        let quiet = tokio::time::timeout(Duration::from_millis(50), on_start.recv()).await;
        assert!(quiet.is_err(), "queued task was reported as started");
        assert_eq!(orch.get_task(b).unwrap().status, TaskStatus::Pending);

        runner.release(1);
        assert_eq!(on_start.recv().await, Some(b));
        runner.release(1);
        assert!(ha.await.unwrap().unwrap().success);
        assert!(hb.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn ceiling_of_one_serialises_parallel_tasks() {
        let orch = orchestrator(1);
        let runner = RecordingRunner::default();
        let a = orch.create_task("explore", "d", "A");
        let b = orch.create_task("explore", "d", "B");

        orch.execute_parallel(&[a, b], &runner).await;

        let log = runner.log.lock().unwrap().clone();
        assert_eq!(log, vec!["start A", "end A", "start B", "end B"]);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_execution_stops_at_first_failure() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let ids = [
            orch.create_task("explore", "d", "one"),
            orch.create_task("explore", "d", "fail"),
            orch.create_task("explore", "d", "three"),
        ];

        let results = orch.execute_sequential(&ids, &runner).await;

        assert_eq!(results.len(), 2);
        assert!(!results[1].as_ref().unwrap().success);
        assert_eq!(orch.get_task(ids[2]).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn ceiling_can_be_changed_within_range() {
        let orch = orchestrator(3);
        orch.set_max_concurrent(5).await.unwrap();
        assert_eq!(orch.max_concurrent(), 5);
        orch.set_max_concurrent(1).await.unwrap();
        assert_eq!(orch.max_concurrent(), 1);

        let err = orch.set_max_concurrent(11).await.unwrap_err();
        assert_eq!(err.to_string(), "max concurrent tasks must be between 1 and 10 (got 11)");
        assert!(orch.set_max_concurrent(0).await.is_err());
        assert_eq!(orch.max_concurrent(), 1);

        let runner = RecordingRunner::default();
        let ids: Vec<Uuid> = (0..3).map(|i| orch.create_task("explore", "d", format!("t{i}"))).collect();
        orch.execute_parallel(&ids, &runner).await;
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    // ── Bookkeeping ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn statistics_group_by_status_and_type() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let a = orch.create_task("explore", "d", "alpha");
        orch.create_task("explore", "d", "beta");
        let c = orch.create_task("code-reviewer", "d", "fail");
        orch.execute_task(a, &runner).await.unwrap();
        orch.execute_task(c, &runner).await.unwrap();

        let stats = orch.statistics();
        assert_eq!((stats.total, stats.pending, stats.completed, stats.failed), (3, 1, 1, 1));
        assert_eq!(stats.by_type.get("explore"), Some(&2));
        assert_eq!(stats.by_type.get("code-reviewer"), Some(&1));
        assert_eq!(stats.max_concurrent, 3);
    }

    #[tokio::test]
    async fn clear_finished_keeps_pending() {
        let orch = orchestrator(3);
        let runner = RecordingRunner::default();
        let a = orch.create_task("explore", "d", "alpha");
        let b = orch.create_task("explore", "d", "beta");
        orch.execute_task(a, &runner).await.unwrap();

        assert_eq!(orch.clear_finished(), 1);
        assert_eq!(orch.list_tasks().len(), 1);
        assert_eq!(orch.list_tasks()[0].id, b);
    }

    #[test]
    fn round_selection() {
        assert_eq!(effective_rounds(None, None, 25), 25);
        assert_eq!(effective_rounds(None, Some(40), 25), 40);
        assert_eq!(effective_rounds(Some(10), Some(40), 25), 10);
        assert_eq!(effective_rounds(Some(50), Some(40), 25), 40);
        assert_eq!(effective_rounds(Some(50), None, 25), 50);
    }

    #[test]
    fn config_ceiling_is_clamped() {
        assert_eq!(orchestrator(0).max_concurrent(), 1);
        assert_eq!(orchestrator(50).max_concurrent(), 10);
    }
}
