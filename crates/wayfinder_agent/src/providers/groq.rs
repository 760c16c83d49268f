//! Groq provider — OpenAI-compatible chat completions with native tool
//! calling and SSE streaming.

use crate::llm::{Completion, CompletionParams, LlmClient, StreamEvent, ToolSpec};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use wayfinder_core::retry::{send_with_retry, RetryConfig};
use wayfinder_core::{Message, Role, ToolCall};

#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl GroqClient {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .context("Failed to build HTTP client")?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }

    fn payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &CompletionParams,
        stream: bool,
    ) -> Value {
        let mut wire_messages = vec![json!({ "role": "system", "content": system })];
        for msg in messages {
            wire_messages.push(to_wire_message(msg));
        }

        let mut payload = json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "stream": stream,
        });
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            payload["tools"] = json!(wire_tools);
        }
        payload
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        send_with_retry(&self.retry, "groq", || async {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await
                .context("groq request failed")
        })
        .await
    }
}

#[async_trait::async_trait]
impl LlmClient for GroqClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<Completion> {
        let payload = self.payload(system, messages, tools, &params, false);
        let response = self.post(&payload).await?;
        let body: Value = response
            .json()
            .await
            .context("Failed to decode completion response")?;

        let message = &body["choices"][0]["message"];
        let text = message["content"].as_str().unwrap_or_default().to_string();
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| calls.iter().filter_map(parse_wire_tool_call).collect())
            .unwrap_or_default();

        Ok(Completion { text, tool_calls })
    }

    async fn stream_complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        let payload = self.payload(system, messages, tools, &params, true);
        let response = self.post(&payload).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = SseBuffer::new();
            let mut assembler = ToolCallAssembler::default();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.push_bytes(&chunk);

                for line in buffer.extract_lines() {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        for call in assembler.finish() {
                            let _ = tx.send(StreamEvent::ToolCall(call)).await;
                        }
                        let _ = tx.send(StreamEvent::Done).await;
                        return;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(data) else {
                        tracing::debug!("Skipping unparseable SSE chunk");
                        continue;
                    };
                    let delta = &value["choices"][0]["delta"];
                    if let Some(text) = delta["content"].as_str() {
                        if !text.is_empty() {
                            let _ = tx.send(StreamEvent::TextDelta(text.to_string())).await;
                        }
                    }
                    if let Some(calls) = delta["tool_calls"].as_array() {
                        for piece in calls {
                            assembler.push(piece);
                        }
                    }
                }
            }

            // Stream ended without [DONE]; flush what we have.
            for call in assembler.finish() {
                let _ = tx.send(StreamEvent::ToolCall(call)).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }
}

/// Map one history message to the OpenAI chat wire shape.
fn to_wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::User => json!({ "role": "user", "content": msg.text() }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.text(),
        }),
        Role::Assistant => {
            let mut wire = json!({ "role": "assistant", "content": msg.text() });
            if !msg.tool_calls.is_empty() {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                // The wire format wants stringified JSON.
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                wire["tool_calls"] = json!(calls);
            }
            wire
        }
    }
}

fn parse_wire_tool_call(value: &Value) -> Option<ToolCall> {
    let id = value["id"].as_str()?.to_string();
    let name = value["function"]["name"].as_str()?.to_string();
    let raw_args = value["function"]["arguments"].as_str().unwrap_or("{}");
    let arguments = serde_json::from_str(raw_args).unwrap_or_else(|_| json!({}));
    Some(ToolCall {
        id,
        name,
        arguments,
    })
}

// ============================================================================
// Streaming helpers
// ============================================================================

/// Line-oriented SSE buffer: push raw bytes, pull complete lines, keep the
/// partial tail.
struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn push_bytes(&mut self, chunk: &bytes::Bytes) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Accumulates streamed tool-call deltas (indexed fragments with argument
/// text arriving piecewise) into complete `ToolCall`s.
#[derive(Default)]
struct ToolCallAssembler {
    partial: BTreeMap<u64, (String, String, String)>, // index -> (id, name, args)
}

impl ToolCallAssembler {
    fn push(&mut self, piece: &Value) {
        let index = piece["index"].as_u64().unwrap_or(0);
        let entry = self.partial.entry(index).or_default();
        if let Some(id) = piece["id"].as_str() {
            entry.0 = id.to_string();
        }
        if let Some(name) = piece["function"]["name"].as_str() {
            entry.1.push_str(name);
        }
        if let Some(args) = piece["function"]["arguments"].as_str() {
            entry.2.push_str(args);
        }
    }

    fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .filter(|(_, name, _)| !name.is_empty())
            .map(|(id, name, args)| ToolCall {
                id,
                name,
                arguments: serde_json::from_str(&args).unwrap_or_else(|_| json!({})),
            })
            .collect()
    }
}
