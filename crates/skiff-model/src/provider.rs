use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{Completion, CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// Boundary to a language-model endpoint.  The runtime treats it as an
/// opaque request/response and delta-stream contract; transports live
/// outside this workspace.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Send a completion request and wait for the whole response.
    async fn complete_blocking(&self, req: CompletionRequest) -> anyhow::Result<Completion>;
}
