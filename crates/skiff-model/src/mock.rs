// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use futures::stream;

use crate::{
    provider::ResponseStream, Completion, CompletionRequest, RequestedToolCall, ResponseEvent,
    Role, Usage,
};

/// Deterministic mock provider.  Echoes the last user message back as the
/// assistant response.
#[derive(Default)]
pub struct MockProvider;

impl MockProvider {
    fn reply(req: &CompletionRequest) -> String {
        let last = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]");
        format!("MOCK: {last}")
    }
}

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(Self::reply(&req))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }

    async fn complete_blocking(&self, req: CompletionRequest) -> anyhow::Result<Completion> {
        Ok(Completion {
            text: Self::reply(&req),
            usage: Usage { input_tokens: 10, output_tokens: 10 },
            ..Default::default()
        })
    }
}

/// A pre-scripted mock provider.  Each call to `complete` or
/// `complete_blocking` pops the next response script from the front of the
/// queue.  This lets tests specify exact event sequences – including tool
/// calls – without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    /// Zero-based call numbers that fail instead of consuming a script.
    failing_calls: Vec<usize>,
    calls: Arc<Mutex<usize>>,
    /// Every `CompletionRequest` seen by this provider, in call order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts.
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// sequence of [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            failing_calls: Vec::new(),
            calls: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the `n`th call (zero-based) return an endpoint error.
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.failing_calls.push(n);
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            ResponseEvent::TextDelta(reply.into()),
            ResponseEvent::Usage { input_tokens: 5, output_tokens: 5 },
            ResponseEvent::Done,
        ]])
    }

    /// Convenience: provider that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                ResponseEvent::ToolCall {
                    index: 0,
                    id: tool_id.into(),
                    name: tool_name.into(),
                    arguments: args_json.into(),
                },
                ResponseEvent::Done,
            ],
            vec![ResponseEvent::TextDelta(final_text.into()), ResponseEvent::Done],
        ])
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn next_script(&self, req: CompletionRequest) -> anyhow::Result<Vec<ResponseEvent>> {
        self.requests.lock().unwrap().push(req);
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = *calls;
            *calls += 1;
            n
        };
        if self.failing_calls.contains(&call) {
            bail!("scripted endpoint failure on call {call}");
        }
        let mut scripts = self.scripts.lock().unwrap();
        Ok(if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            vec![ResponseEvent::TextDelta("[no more scripts]".into()), ResponseEvent::Done]
        } else {
            scripts.remove(0)
        })
    }
}

/// Fold a script into the shape a non-streaming endpoint would return.
fn fold_script(events: Vec<ResponseEvent>) -> Completion {
    let mut completion = Completion::default();
    let mut calls: BTreeMap<u32, (String, String, String)> = BTreeMap::new();
    for event in events {
        match event {
            ResponseEvent::TextDelta(t) => completion.text.push_str(&t),
            ResponseEvent::ThinkingDelta(t) => completion.reasoning.push_str(&t),
            ResponseEvent::ToolCall { index, id, name, arguments } => {
                let entry = calls.entry(index).or_default();
                if entry.0.is_empty() {
                    entry.0 = id;
                }
                if entry.1.is_empty() {
                    entry.1 = name;
                }
                entry.2.push_str(&arguments);
            }
            ResponseEvent::Usage { input_tokens, output_tokens } => {
                completion.usage = Usage { input_tokens, output_tokens };
            }
            ResponseEvent::Done | ResponseEvent::Error(_) => {}
        }
    }
    completion.tool_calls = calls
        .into_values()
        .map(|(id, name, args)| RequestedToolCall {
            id,
            name,
            arguments: serde_json::from_str(&args)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
        })
        .collect();
    completion
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let events = self.next_script(req)?;
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }

    async fn complete_blocking(&self, req: CompletionRequest) -> anyhow::Result<Completion> {
        Ok(fold_script(self.next_script(req)?))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
