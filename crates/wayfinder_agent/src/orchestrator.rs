//! The turn state machine.
//!
//! One orchestrator instance drives one turn of one session to completion as
//! a single logical task; sessions are independent. The branching logic is
//! an explicit finite-state machine so the retry ceiling and terminal-state
//! guarantees are mechanically checkable.

use crate::correction::{self, CorrectionContext};
use crate::events::{AgentEvent, EventSink};
use crate::extraction;
use crate::llm::{CompletionParams, LlmClient, StreamEvent, ToolSpec};
use crate::prompts;
use crate::registry::{ToolContext, ToolOutcome, ToolRegistry};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use wayfinder_core::{
    CheckpointStore, Message, PreferenceStore, Role, ToolCall, ToolResult, TurnError,
};

/// Cooperative cancellation flag, checked at step boundaries only: an
/// in-flight tool call is allowed to complete, no new steps start after it.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One inbound user utterance plus the identity and credentials it runs
/// under.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub user_id: String,
    pub message: String,
    pub credentials: ToolContext,
}

/// The FSM phases. Each variant carries only the data that phase needs; the
/// message history lives in the per-turn context owned by `run_turn`.
enum TurnPhase {
    Reasoning,
    Executing { calls: Vec<ToolCall> },
    Correcting { calls: Vec<ToolCall>, results: Vec<ToolResult> },
    Extracting { final_text: String },
    Done { final_text: String },
    Failed { error: TurnError },
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    /// Tried exactly once when the primary fails at the transport layer
    /// (rate-limit rotation).
    fallback_llm: Option<Arc<dyn LlmClient>>,
    registry: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    preferences: Arc<dyn PreferenceStore>,
    max_retries: u32,
    max_steps: u32,
    params: CompletionParams,
    /// Sessions with a turn in flight, keyed by thread id. A second
    /// concurrent `run_turn` for the same session is rejected.
    active: Arc<Mutex<HashMap<String, CancelToken>>>,
}

/// Removes the thread from the active map when the turn ends, however it
/// ends.
struct ActiveTurnGuard {
    active: Arc<Mutex<HashMap<String, CancelToken>>>,
    thread_id: String,
}

impl Drop for ActiveTurnGuard {
    fn drop(&mut self) {
        let mut map = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(&self.thread_id);
    }
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            llm,
            fallback_llm: None,
            registry,
            checkpoints,
            preferences,
            max_retries: 2,
            max_steps: 10,
            params: CompletionParams::default(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LlmClient>) -> Self {
        self.fallback_llm = Some(fallback);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    /// Flag the active turn for `thread_id`, if any. The turn finishes its
    /// current step and transitions to failed with a cancellation reason.
    pub fn cancel(&self, thread_id: &str) -> bool {
        let map = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match map.get(thread_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one turn: drive the FSM, emit ordered events onto `events`, and
    /// return the final assistant text.
    ///
    /// At most one turn per `thread_id` runs concurrently; a second call is
    /// rejected with `TurnError::SessionBusy`.
    #[tracing::instrument(skip(self, request, events), fields(thread_id = %request.thread_id))]
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<String, TurnError> {
        let cancel = {
            let mut map = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if map.contains_key(&request.thread_id) {
                return Err(TurnError::SessionBusy(request.thread_id.clone()));
            }
            let token = CancelToken::default();
            map.insert(request.thread_id.clone(), token.clone());
            token
        };
        let _guard = ActiveTurnGuard {
            active: self.active.clone(),
            thread_id: request.thread_id.clone(),
        };

        let mut sink = EventSink::new(events);
        let result = self.drive(&request, &cancel, &mut sink).await;

        match &result {
            Ok(final_text) => {
                sink.emit(AgentEvent::Done {
                    session_id: request.thread_id.clone(),
                    final_text: final_text.clone(),
                })
                .await;
            }
            Err(error) => {
                sink.emit(AgentEvent::Error {
                    message: error.user_message(),
                })
                .await;
            }
        }
        result
    }

    /// The FSM proper. Returns the final text on the `Done` path; the
    /// terminal event is emitted by `run_turn` so it is always exactly one.
    async fn drive(
        &self,
        request: &TurnRequest,
        cancel: &CancelToken,
        sink: &mut EventSink,
    ) -> Result<String, TurnError> {
        self.checkpoints
            .ensure_session(&request.thread_id, &request.user_id, "Untitled Trip")
            .await
            .map_err(TurnError::Store)?;

        let mut history = self
            .checkpoints
            .load(&request.thread_id)
            .await
            .map_err(TurnError::Store)?;
        let first_turn = history.is_empty();
        history.push(Message::user(request.message.clone()));

        // Stored preferences are injected into every reasoning prompt so
        // the user never has to restate them (cross-session memory).
        let stored_prefs = match self.preferences.preferences(&request.user_id).await {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("Preference load failed, continuing without: {}", e);
                Vec::new()
            }
        };
        let system_prompt = prompts::assemble_system_prompt(&stored_prefs);
        let tool_specs = self.registry.specs();

        let mut phase = TurnPhase::Reasoning;
        let mut retry_count: u32 = 0;
        let mut steps: u32 = 0;

        loop {
            match phase {
                TurnPhase::Reasoning => {
                    if cancel.is_cancelled() {
                        phase = TurnPhase::Failed {
                            error: TurnError::Cancelled,
                        };
                        continue;
                    }
                    steps += 1;
                    if steps > self.max_steps {
                        tracing::warn!("Reasoning step limit reached, aborting turn");
                        phase = TurnPhase::Failed {
                            error: TurnError::RetryExhausted {
                                attempts: retry_count,
                                summary: "reasoning step limit reached".to_string(),
                            },
                        };
                        continue;
                    }

                    let (text, calls) = self
                        .reason(&system_prompt, &history, &tool_specs, sink)
                        .await?;
                    history.push(Message::assistant(text.clone(), calls.clone()));

                    phase = if calls.is_empty() {
                        TurnPhase::Extracting { final_text: text }
                    } else {
                        TurnPhase::Executing { calls }
                    };
                }

                TurnPhase::Executing { calls } => {
                    if cancel.is_cancelled() {
                        phase = TurnPhase::Failed {
                            error: TurnError::Cancelled,
                        };
                        continue;
                    }

                    let results = self
                        .execute_batch(&calls, &request.credentials, sink, &mut history)
                        .await;

                    phase = if results.iter().any(|r| !r.success) {
                        TurnPhase::Correcting { calls, results }
                    } else {
                        TurnPhase::Reasoning
                    };
                }

                TurnPhase::Correcting { calls, results } => {
                    if retry_count == self.max_retries {
                        let summary = summarize_failures(&calls, &results);
                        tracing::warn!(
                            "Retry ceiling ({}) reached: {}",
                            self.max_retries,
                            summary
                        );
                        phase = TurnPhase::Failed {
                            error: TurnError::RetryExhausted {
                                attempts: retry_count,
                                summary,
                            },
                        };
                        continue;
                    }
                    retry_count += 1;

                    let ctx: CorrectionContext =
                        correction::build_context(&calls, &results, retry_count);
                    sink.emit(AgentEvent::SelfCorrection {
                        message: ctx.event_summary(),
                    })
                    .await;
                    history.push(Message::user(ctx.instruction(self.max_retries)));

                    phase = TurnPhase::Reasoning;
                }

                TurnPhase::Extracting { final_text } => {
                    self.extract_and_store(request, &history, first_turn).await;
                    phase = TurnPhase::Done { final_text };
                }

                TurnPhase::Done { final_text } => {
                    self.checkpoints
                        .save(&request.thread_id, &history)
                        .await
                        .map_err(TurnError::Store)?;
                    return Ok(final_text);
                }

                TurnPhase::Failed { error } => {
                    // Best effort: a failed turn still leaves the session
                    // resumable for the next message.
                    close_dangling_tool_calls(&mut history);
                    if let Err(e) = self.checkpoints.save(&request.thread_id, &history).await {
                        tracing::error!("Checkpoint save after failure also failed: {}", e);
                    }
                    return Err(error);
                }
            }
        }
    }

    /// One reasoning step: stream the model, forward text deltas as `token`
    /// events, collect tool calls. A transport failure is retried against
    /// the fallback credential exactly once before surfacing.
    async fn reason(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolSpec],
        sink: &mut EventSink,
    ) -> Result<(String, Vec<ToolCall>), TurnError> {
        match self.stream_once(self.llm.as_ref(), system, history, tools, sink).await {
            Ok(output) => Ok(output),
            Err(primary_err) => match &self.fallback_llm {
                Some(fallback) => {
                    tracing::warn!(
                        "Primary model call failed ({}), trying fallback credential",
                        primary_err
                    );
                    self.stream_once(fallback.as_ref(), system, history, tools, sink)
                        .await
                        .map_err(|e| TurnError::ModelTransport(e.to_string()))
                }
                None => Err(TurnError::ModelTransport(primary_err.to_string())),
            },
        }
    }

    async fn stream_once(
        &self,
        client: &dyn LlmClient,
        system: &str,
        history: &[Message],
        tools: &[ToolSpec],
        sink: &mut EventSink,
    ) -> anyhow::Result<(String, Vec<ToolCall>)> {
        let mut rx = client
            .stream_complete(system, history, tools, self.params.clone())
            .await?;

        let mut text = String::new();
        let mut calls = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    sink.emit(AgentEvent::Token {
                        text: delta.clone(),
                    })
                    .await;
                    text.push_str(&delta);
                }
                StreamEvent::ToolCall(call) => calls.push(call),
                StreamEvent::Done => break,
                StreamEvent::Error(e) => {
                    // Nothing produced yet means the call itself failed and
                    // is eligible for the fallback credential; otherwise
                    // keep the partial output.
                    if text.is_empty() && calls.is_empty() {
                        anyhow::bail!("stream failed: {}", e);
                    }
                    tracing::warn!("Stream error after partial output: {}", e);
                    break;
                }
            }
        }
        Ok((text, calls))
    }

    /// Execute one batch of tool calls concurrently, reassembling results in
    /// original call order. Every call gets a `tool_start`/`tool_end` pair;
    /// one tool's failure never blocks its siblings.
    async fn execute_batch(
        &self,
        calls: &[ToolCall],
        credentials: &ToolContext,
        sink: &mut EventSink,
        history: &mut Vec<Message>,
    ) -> Vec<ToolResult> {
        for call in calls {
            sink.emit(AgentEvent::ToolStart {
                tool: call.name.clone(),
                input: call.arguments.clone(),
            })
            .await;
        }

        let futures = calls.iter().map(|call| {
            let registry = self.registry.clone();
            let ctx = credentials.clone();
            async move { registry.dispatch(&call.name, &call.arguments, &ctx).await }
        });
        let outcomes = futures_util::future::join_all(futures).await;

        let mut results = Vec::with_capacity(calls.len());
        for (call, outcome) in calls.iter().zip(outcomes) {
            let result = match outcome {
                ToolOutcome::Ok(data) => ToolResult::ok(&call.id, data),
                ToolOutcome::Err(error) => {
                    tracing::warn!("Tool '{}' failed: {}", call.name, error);
                    ToolResult::err(&call.id, error)
                }
            };
            history.push(Message::tool(&call.id, result.as_message_content()));
            sink.emit(AgentEvent::ToolEnd {
                tool: call.name.clone(),
                success: result.success,
                output: result
                    .data
                    .clone()
                    .unwrap_or_else(|| json!({ "error": result.error })),
            })
            .await;
            results.push(result);
        }
        results
    }

    /// Post-turn preference extraction. Failures are logged and swallowed;
    /// they must never alter the already-final assistant answer.
    async fn extract_and_store(&self, request: &TurnRequest, history: &[Message], first_turn: bool) {
        let outcome = extraction::extract(
            self.llm.as_ref(),
            history,
            &request.user_id,
            &request.thread_id,
        )
        .await;

        for fact in &outcome.facts {
            if let Err(e) = self.preferences.upsert(fact).await {
                tracing::warn!("Preference upsert failed for '{}': {}", fact.key, e);
            }
        }
        if first_turn {
            if let Some(title) = outcome.title {
                if let Err(e) = self.checkpoints.set_title(&request.thread_id, &title).await {
                    tracing::warn!("Session title update failed: {}", e);
                }
            }
        }
    }
}

/// A turn that ends between reasoning and execution leaves a trailing
/// assistant message whose tool calls were never answered. Chat completion
/// endpoints reject such a history on the next turn, so each dangling call
/// gets an error tool message before the checkpoint is written.
fn close_dangling_tool_calls(history: &mut Vec<Message>) {
    let calls = match history.last() {
        Some(m) if m.role == Role::Assistant && !m.tool_calls.is_empty() => m.tool_calls.clone(),
        _ => return,
    };
    for call in &calls {
        let result = ToolResult::err(&call.id, "The turn ended before this tool call ran.");
        history.push(Message::tool(&call.id, result.as_message_content()));
    }
}

fn summarize_failures(calls: &[ToolCall], results: &[ToolResult]) -> String {
    results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            let tool = calls
                .iter()
                .find(|c| c.id == r.tool_call_id)
                .map(|c| c.name.as_str())
                .unwrap_or("?");
            format!("{}: {}", tool, r.error.as_deref().unwrap_or("unknown"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
