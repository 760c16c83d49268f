use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wayfinder_core::{Message, ToolCall};

/// Sampling parameters for one completion request.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.3,
        }
    }
}

/// Tool definition advertised to the model (JSON Schema parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One complete (non-streaming) model response: narrative text plus any
/// requested tool calls.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Incremental item of a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A chunk of assistant narrative text.
    TextDelta(String),
    /// A fully assembled tool call (arguments accumulated by the provider).
    ToolCall(ToolCall),
    Done,
    Error(String),
}

/// An LLM backend. Both methods treat the model as an untrusted black box:
/// any transport failure surfaces as `Err`, never as a panic.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<Completion>;

    /// Streaming variant; the receiver yields text deltas and assembled tool
    /// calls, terminated by `Done` or `Error`.
    async fn stream_complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>>;
}
