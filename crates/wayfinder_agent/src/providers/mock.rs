//! Scripted LLM client — deterministic responses for tests without API keys.
//!
//! Each call (streaming or not) pops the next `Completion` from the queue;
//! an exhausted queue yields an empty response. Because the preference
//! extraction step shares the client, scripts normally end with an
//! extraction response such as `{"preferences": [], "title": "..."}`.

use crate::llm::{Completion, CompletionParams, LlmClient, StreamEvent, ToolSpec};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use wayfinder_core::Message;

pub struct ScriptedClient {
    responses: Mutex<VecDeque<ScriptItem>>,
    call_count: AtomicUsize,
    /// Simulated latency before each response, for cancellation tests.
    delay: Duration,
}

enum ScriptItem {
    Respond(Completion),
    /// Simulate a transport failure (rate limit, network error).
    TransportError(String),
}

impl ScriptedClient {
    pub fn new(responses: Vec<Completion>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(ScriptItem::Respond).collect()),
            call_count: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// A client whose every call fails at the transport layer.
    pub fn always_failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            call_count: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
        .with_default_failure(message)
    }

    fn with_default_failure(self, message: &str) -> Self {
        // Empty queue + failure marker: every pop yields a transport error.
        let mut queue = VecDeque::new();
        for _ in 0..16 {
            queue.push_back(ScriptItem::TransportError(message.to_string()));
        }
        Self {
            responses: Mutex::new(queue),
            ..self
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of completion calls made so far (streaming included).
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<Completion> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut queue = self.responses.lock().await;
        match queue.pop_front() {
            Some(ScriptItem::Respond(completion)) => Ok(completion),
            Some(ScriptItem::TransportError(msg)) => anyhow::bail!("{}", msg),
            None => Ok(Completion::default()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _params: CompletionParams,
    ) -> Result<Completion> {
        self.next().await
    }

    async fn stream_complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _params: CompletionParams,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        let completion = self.next().await?;
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        tokio::spawn(async move {
            // Stream text word by word so token events exercise ordering.
            for word in split_keeping_spaces(&completion.text) {
                if tx.send(StreamEvent::TextDelta(word)).await.is_err() {
                    return;
                }
            }
            for call in completion.tool_calls {
                if tx.send(StreamEvent::ToolCall(call)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });
        Ok(rx)
    }
}

fn split_keeping_spaces(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch == ' ' {
            parts.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
