// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skiff_config::{AgentConfig, DetectorConfig};
use skiff_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, Usage};
use skiff_skills::CapabilityResolver;
use skiff_tools::{ToolCall, ToolOutput, ToolRegistry};

use crate::{
    compact::{
        compaction_range, splice_summary, summary_request, summary_text, truncate_head_tail,
        CriticalInfoExtractor, RegexExtractor,
    },
    detector::{assess, StuckAssessment, ToolOutcome},
    error::AgentError,
    events::AgentEvent,
    prompts::system_prompt,
    state::ConversationState,
    stream::{parse_arguments, AssembledMessage, PhaseEvent, RoundPhase, StreamAssembly, WordChunker},
};

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting more tools.
    Completed { text: String },
    /// The round ceiling was reached; a warning was appended instead of an answer.
    RoundLimit { rounds: u32 },
    /// The turn stopped at a cancellation checkpoint.
    Cancelled,
    /// The model endpoint failed; the message is also in the history.
    ModelError(String),
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

enum RoundError {
    Cancelled,
    Model(String),
}

type EventSink<'a> = Option<&'a mpsc::Sender<AgentEvent>>;

async fn emit(tx: EventSink<'_>, event: AgentEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

/// The core agent.  Owns a conversation and drives the model ↔ tool loop.
pub struct Agent {
    state: ConversationState,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    config: Arc<AgentConfig>,
    detector: DetectorConfig,
    resolver: Option<Arc<dyn CapabilityResolver>>,
    extractor: Arc<dyn CriticalInfoExtractor>,
    /// Overrides both the configured and the generated system prompt.
    system_prompt: Option<String>,
    /// Model tier requested on every call, including summaries.
    model_tier: Option<String>,
    phase: RoundPhase,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self {
            state: ConversationState::new(),
            tools,
            model,
            config,
            detector: DetectorConfig::default(),
            resolver: None,
            extractor: Arc::new(RegexExtractor),
            system_prompt: None,
            model_tier: None,
            phase: RoundPhase::Thinking,
        }
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Capabilities from `resolver` are listed in the generated system prompt.
    pub fn with_resolver(mut self, resolver: Arc<dyn CapabilityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn CriticalInfoExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model_tier(mut self, tier: impl Into<String>) -> Self {
        self.model_tier = Some(tier.into());
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.state.set_cancel_token(token);
        self
    }

    /// Token checked at every cancellation point of the current turn.  Once
    /// a turn has honoured a cancellation the agent installs a fresh token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.cancel_token()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Pre-load conversation history without submitting.
    ///
    /// System messages in `messages` are dropped and the agent's own system
    /// message is put first.
    pub fn seed_history(&mut self, messages: Vec<Message>) {
        let mut msgs: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.role != skiff_model::Role::System)
            .collect();
        msgs.insert(0, self.system_message());
        self.state.replace_messages(msgs);
    }

    /// Run one user turn, streaming events through `tx`.  The last event is
    /// always [`AgentEvent::TurnComplete`].
    pub async fn submit(&mut self, user_input: &str, tx: mpsc::Sender<AgentEvent>) -> TurnOutcome {
        self.run_turn(user_input, Some(&tx), true).await
    }

    /// Run one user turn against the endpoint's non-streaming path.
    pub async fn run(&mut self, user_input: &str) -> TurnOutcome {
        self.run_turn(user_input, None, false).await
    }

    async fn run_turn(&mut self, user_input: &str, tx: EventSink<'_>, streaming: bool) -> TurnOutcome {
        self.state.begin_turn();
        self.phase = RoundPhase::Thinking;

        if self.state.messages.is_empty() {
            let sys = self.system_message();
            self.state.push(sys);
        }
        self.state.push(Message::user(user_input));

        let outcome = loop {
            self.compact_if_needed(tx).await;

            if self.state.is_cancelled() {
                break self.cancelled(tx).await;
            }

            if self.state.rounds >= self.config.max_rounds {
                break self.round_limit(tx).await;
            }
            self.state.rounds += 1;
            debug!(round = self.state.rounds, session = %self.state.id, "model round");

            let reply = if streaming {
                self.stream_round(tx).await
            } else {
                self.blocking_round(tx).await
            };
            let reply = match reply {
                Ok(r) => r,
                Err(RoundError::Cancelled) => break self.cancelled(tx).await,
                Err(RoundError::Model(msg)) => break self.model_failed(msg, tx).await,
            };

            if reply.tool_calls.is_empty() {
                self.state.push(Message::assistant(&reply.content));
                self.transition(PhaseEvent::ResponseFinished);
                break TurnOutcome::Completed { text: reply.content };
            }

            if !reply.content.is_empty() {
                self.state.push(Message::assistant(&reply.content));
            }
            if let Some(outcome) = self.dispatch(reply.tool_calls, tx).await {
                break outcome;
            }
            self.check_stuck(tx).await;
        };

        emit(tx, AgentEvent::TurnComplete).await;
        outcome
    }

    // ── Model calls ───────────────────────────────────────────────────────────

    fn request(&self, stream: bool) -> CompletionRequest {
        let tools = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| skiff_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();
        CompletionRequest {
            messages: self.state.messages.clone(),
            tools,
            stream,
            model: self.model_tier.clone(),
        }
    }

    async fn stream_round(&mut self, tx: EventSink<'_>) -> Result<AssembledMessage, RoundError> {
        let req = self.request(true);
        let mut stream = self
            .model
            .complete(req)
            .await
            .map_err(|e| RoundError::Model(format!("{e:#}")))?;

        if self.state.is_cancelled() {
            return Err(RoundError::Cancelled);
        }

        let mut assembly = StreamAssembly::new();
        let mut chunker = WordChunker::new();
        let mut text_started = false;

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| RoundError::Model(format!("{e:#}")))?;
            match &event {
                ResponseEvent::ThinkingDelta(delta) => {
                    emit(tx, AgentEvent::ThinkingDelta(delta.clone())).await;
                }
                ResponseEvent::TextDelta(delta) if !delta.is_empty() => {
                    if !text_started {
                        text_started = true;
                        self.transition(PhaseEvent::TextStarted);
                    }
                    for word in chunker.push(delta) {
                        emit(tx, AgentEvent::TextDelta(word)).await;
                    }
                }
                ResponseEvent::Usage { input_tokens, output_tokens } => {
                    let usage = Usage { input_tokens: *input_tokens, output_tokens: *output_tokens };
                    self.record_usage(usage, tx).await;
                }
                ResponseEvent::Error(e) => warn!("model stream error: {e}"),
                _ => {}
            }
            assembly.apply(&event);
            if event == ResponseEvent::Done {
                break;
            }
        }
        if let Some(rest) = chunker.flush() {
            emit(tx, AgentEvent::TextDelta(rest)).await;
        }

        if self.state.is_cancelled() {
            return Err(RoundError::Cancelled);
        }

        let message = assembly.finish();
        if !message.content.is_empty() {
            emit(tx, AgentEvent::TextComplete(message.content.clone())).await;
        }
        Ok(message)
    }

    async fn blocking_round(&mut self, tx: EventSink<'_>) -> Result<AssembledMessage, RoundError> {
        let req = self.request(false);
        let completion = self
            .model
            .complete_blocking(req)
            .await
            .map_err(|e| RoundError::Model(format!("{e:#}")))?;
        self.record_usage(completion.usage, tx).await;

        let tool_calls = completion
            .tool_calls
            .into_iter()
            .enumerate()
            .filter_map(|(i, tc)| {
                if tc.name.is_empty() {
                    warn!(tool_call_id = %tc.id, "dropping tool call with empty name; cannot dispatch");
                    return None;
                }
                let id = if tc.id.is_empty() { format!("call_{i}") } else { tc.id };
                let args = match tc.arguments {
                    serde_json::Value::String(raw) => parse_arguments(&tc.name, &raw),
                    other => other,
                };
                Some(ToolCall { id, name: tc.name, args })
            })
            .collect();

        if !completion.text.is_empty() {
            self.transition(PhaseEvent::TextStarted);
            emit(tx, AgentEvent::TextComplete(completion.text.clone())).await;
        }
        Ok(AssembledMessage { content: completion.text, reasoning: completion.reasoning, tool_calls })
    }

    async fn record_usage(&mut self, usage: Usage, tx: EventSink<'_>) {
        self.state.add_usage(usage);
        emit(
            tx,
            AgentEvent::TokenUsage {
                input: usage.input_tokens,
                output: usage.output_tokens,
                input_total: self.state.input_tokens_total,
                output_total: self.state.output_tokens_total,
            },
        )
        .await;
    }

    // ── Tool dispatch ─────────────────────────────────────────────────────────

    /// Dispatch `calls` in order.  Returns an outcome only when the turn
    /// was cancelled between calls.
    async fn dispatch(&mut self, calls: Vec<ToolCall>, tx: EventSink<'_>) -> Option<TurnOutcome> {
        self.transition(PhaseEvent::ToolCallsReceived);
        emit(tx, AgentEvent::ToolCallsAnnounced(calls.clone())).await;

        for tc in &calls {
            self.state.push(Message::tool_call(&tc.id, &tc.name, tc.args.to_string()));
        }
        self.transition(PhaseEvent::ToolsDispatched);

        let keep = self.detector.window_size.max(self.detector.failure_threshold);
        for (i, call) in calls.iter().enumerate() {
            if self.state.is_cancelled() {
                for skipped in &calls[i..] {
                    self.state.push(Message::tool_result(&skipped.id, "[not executed: turn cancelled]"));
                }
                return Some(self.cancelled(tx).await);
            }

            self.state.record_tool_use(&call.name);
            let output = self.execute_tool(call).await;
            let content = truncate_head_tail(&output.content, self.config.tool_result_char_cap);
            self.state.push(Message::tool_result(&call.id, &content));

            let outcome = if output.is_error {
                ToolOutcome::failure(&call.name, &output.content)
            } else {
                ToolOutcome::success(&call.name)
            };
            self.state.record_outcome(outcome, keep);

            emit(
                tx,
                AgentEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: content,
                    is_error: output.is_error,
                },
            )
            .await;
        }

        self.transition(PhaseEvent::ToolsFinished);
        None
    }

    /// Run one tool in its own task so a panic becomes an error result.
    async fn execute_tool(&self, call: &ToolCall) -> ToolOutput {
        let registry = Arc::clone(&self.tools);
        let task_call = call.clone();
        match tokio::spawn(async move { registry.execute(&task_call).await }).await {
            Ok(output) => output,
            Err(e) => {
                let err = AgentError::ToolExecution {
                    tool: call.name.clone(),
                    cause: format!("panicked: {e}"),
                };
                warn!(tool = %call.name, call_id = %call.id, error = %err, "tool task failed");
                ToolOutput::err(&call.id, err.to_string())
            }
        }
    }

    async fn check_stuck(&mut self, tx: EventSink<'_>) {
        let outcomes: Vec<ToolOutcome> = self.state.outcomes.iter().cloned().collect();
        if let StuckAssessment::Stuck { reason, reflection, tools, .. } =
            assess(&outcomes, &self.detector, self.state.reflections)
        {
            warn!(%reason, ?tools, reflections = self.state.reflections, "agent appears stuck; injecting reflection");
            self.state.push(Message::user(reflection));
            self.state.reflections += 1;
            self.state.outcomes.clear();
            emit(tx, AgentEvent::StuckDetected { reason, tools }).await;
        }
    }

    // ── Compaction ────────────────────────────────────────────────────────────

    async fn compact_if_needed(&mut self, tx: EventSink<'_>) {
        let before = self.state.messages.len();
        let Some(range) = compaction_range(
            &self.state.messages,
            self.config.compaction_message_ceiling,
            self.config.compaction_keep_recent,
        ) else {
            return;
        };
        // The summary is a model call; a cancelled turn makes none.
        if self.state.is_cancelled() {
            debug!("compaction due but turn is cancelled; skipping");
            return;
        }

        let middle = &self.state.messages[range.clone()];
        let facts = self.extractor.extract(middle);
        let mut req = summary_request(middle);
        req.model = self.model_tier.clone();

        let summary = match self.model.complete_blocking(req).await {
            Ok(c) => {
                self.state.add_usage(c.usage);
                Some(c.text)
            }
            Err(e) => {
                warn!(error = %e, "summarisation failed; using placeholder");
                None
            }
        };

        let text = summary_text(&facts, summary.as_deref());
        let messages = splice_summary(&self.state.messages, range, text.clone());
        self.state.replace_messages(messages);
        self.state.summary = Some(text);

        let after = self.state.messages.len();
        info!(messages_before = before, messages_after = after, "context compacted");
        emit(tx, AgentEvent::ContextCompacted { messages_before: before, messages_after: after }).await;
    }

    // ── Turn endings ──────────────────────────────────────────────────────────

    async fn cancelled(&mut self, tx: EventSink<'_>) -> TurnOutcome {
        info!(session = %self.state.id, round = self.state.rounds, "turn cancelled");
        self.transition(PhaseEvent::Cancel);
        self.state.rearm_cancellation();
        emit(tx, AgentEvent::Cancelled).await;
        TurnOutcome::Cancelled
    }

    async fn round_limit(&mut self, tx: EventSink<'_>) -> TurnOutcome {
        let rounds = self.state.rounds;
        warn!(rounds, "round ceiling reached; ending turn");
        self.state.push(Message::assistant(format!(
            "Stopped after reaching the limit of {rounds} model rounds for this turn. \
             The task may be incomplete; continue in a new turn if needed."
        )));
        self.transition(PhaseEvent::ResponseFinished);
        emit(tx, AgentEvent::RoundLimitReached { rounds }).await;
        TurnOutcome::RoundLimit { rounds }
    }

    async fn model_failed(&mut self, message: String, tx: EventSink<'_>) -> TurnOutcome {
        let err = AgentError::ModelEndpoint(message).to_string();
        warn!(error = %err, "ending turn after endpoint failure");
        self.state.push(Message::assistant(&err));
        self.transition(PhaseEvent::Fail);
        emit(tx, AgentEvent::Error(err.clone())).await;
        TurnOutcome::ModelError(err)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn transition(&mut self, event: PhaseEvent) {
        match self.phase.advance(event) {
            Ok(next) => self.phase = next,
            Err(e) => warn!(error = %e, "ignoring phase transition"),
        }
    }

    fn system_message(&self) -> Message {
        let custom = self.system_prompt.as_deref().or(self.config.system_prompt.as_deref());
        let capabilities = self
            .resolver
            .as_ref()
            .map(|r| r.available())
            .unwrap_or_default();
        Message::system(system_prompt(custom, &self.tools.names(), &capabilities))
    }
}
