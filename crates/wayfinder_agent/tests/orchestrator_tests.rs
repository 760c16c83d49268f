//! Integration tests for the turn state machine.
//!
//! A scripted LLM client and in-memory stores drive the full `run_turn`
//! pipeline without network access: scenarios cover the happy path, tool
//! failure correction, the retry ceiling, checkpoint resume, cross-session
//! preference injection, cancellation, and concurrent-turn rejection.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use wayfinder_agent::llm::{Completion, CompletionParams, LlmClient, StreamEvent, ToolSpec};
use wayfinder_agent::orchestrator::{Orchestrator, TurnRequest};
use wayfinder_agent::providers::ScriptedClient;
use wayfinder_agent::registry::{object_schema, Tool, ToolContext, ToolOutcome, ToolRegistry};
use wayfinder_agent::AgentEvent;
use wayfinder_core::{
    CheckpointStore, Message, PreferenceFact, PreferenceStore, SessionSummary, ToolCall, TurnError,
};

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    histories: Mutex<HashMap<String, Vec<Message>>>,
    threads: Mutex<HashMap<String, (String, String)>>, // thread -> (user, title)
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .histories
            .lock()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, thread_id: &str, history: &[Message]) -> Result<()> {
        self.histories
            .lock()
            .await
            .insert(thread_id.to_string(), history.to_vec());
        Ok(())
    }

    async fn ensure_session(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()> {
        self.threads
            .lock()
            .await
            .entry(thread_id.to_string())
            .or_insert_with(|| (user_id.to_string(), title.to_string()));
        Ok(())
    }

    async fn set_title(&self, thread_id: &str, title: &str) -> Result<()> {
        if let Some(entry) = self.threads.lock().await.get_mut(thread_id) {
            entry.1 = title.to_string();
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        Ok(self
            .threads
            .lock()
            .await
            .iter()
            .filter(|(_, (owner, _))| owner == user_id)
            .map(|(id, (_, title))| SessionSummary {
                id: id.clone(),
                title: title.clone(),
                updated_at: String::new(),
            })
            .collect())
    }

    async fn session_exists(&self, thread_id: &str) -> Result<bool> {
        Ok(self.threads.lock().await.contains_key(thread_id))
    }

    async fn session_owned_by(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .threads
            .lock()
            .await
            .get(thread_id)
            .is_some_and(|(owner, _)| owner == user_id))
    }

    async fn delete_session(&self, thread_id: &str) -> Result<()> {
        self.threads.lock().await.remove(thread_id);
        self.histories.lock().await.remove(thread_id);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryPrefs {
    facts: Mutex<HashMap<(String, String), PreferenceFact>>,
}

#[async_trait]
impl PreferenceStore for MemoryPrefs {
    async fn preferences(&self, user_id: &str) -> Result<Vec<PreferenceFact>> {
        let mut facts: Vec<PreferenceFact> = self
            .facts
            .lock()
            .await
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        facts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(facts)
    }

    async fn upsert(&self, fact: &PreferenceFact) -> Result<()> {
        self.facts
            .lock()
            .await
            .insert((fact.user_id.clone(), fact.key.clone()), fact.clone());
        Ok(())
    }
}

// ============================================================================
// Scriptable tool
// ============================================================================

struct ScriptedTool {
    name: String,
    outcomes: Mutex<VecDeque<ToolOutcome>>,
}

impl ScriptedTool {
    fn new(name: &str, outcomes: Vec<ToolOutcome>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outcomes: Mutex::new(outcomes.into()),
        })
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "scripted test tool"
    }
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: "scripted test tool".into(),
            parameters: object_schema(json!({}), &[]),
        }
    }
    async fn invoke(&self, _arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ToolOutcome::err("script exhausted"))
    }
}

/// Wraps a client and records the system prompt of every call, for
/// asserting preference injection.
struct RecordingClient {
    inner: ScriptedClient,
    systems: std::sync::Mutex<Vec<String>>,
}

impl RecordingClient {
    fn new(inner: ScriptedClient) -> Self {
        Self {
            inner,
            systems: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn systems(&self) -> Vec<String> {
        self.systems.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for RecordingClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<Completion> {
        self.systems.lock().unwrap().push(system.to_string());
        self.inner.complete(system, messages, tools, params).await
    }

    async fn stream_complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        self.systems.lock().unwrap().push(system.to_string());
        self.inner
            .stream_complete(system, messages, tools, params)
            .await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn text(t: &str) -> Completion {
    Completion {
        text: t.to_string(),
        tool_calls: vec![],
    }
}

fn tool_request(calls: Vec<ToolCall>) -> Completion {
    Completion {
        text: String::new(),
        tool_calls: calls,
    }
}

fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

fn empty_extraction() -> Completion {
    text(r#"{"preferences": [], "title": "Test chat"}"#)
}

fn request(thread: &str) -> TurnRequest {
    TurnRequest {
        thread_id: thread.to_string(),
        user_id: "u1".to_string(),
        message: "flights from TelAviv to Rome".to_string(),
        credentials: ToolContext::default(),
    }
}

async fn run_and_collect(
    orchestrator: &Orchestrator,
    req: TurnRequest,
) -> (Result<String, TurnError>, Vec<AgentEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let result = orchestrator.run_turn(req, tx).await;
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    (result, events)
}

fn wire_names(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.wire_name()).collect()
}

/// Every `tool_start` must have exactly one matching `tool_end` with the
/// same tool identity appearing later in the stream.
fn assert_tool_pairing(events: &[AgentEvent]) {
    let mut open: Vec<&str> = Vec::new();
    for ev in events {
        match ev {
            AgentEvent::ToolStart { tool, .. } => open.push(tool),
            AgentEvent::ToolEnd { tool, .. } => {
                let pos = open
                    .iter()
                    .position(|t| *t == tool)
                    .unwrap_or_else(|| panic!("tool_end without tool_start: {}", tool));
                open.remove(pos);
            }
            _ => {}
        }
    }
    assert!(open.is_empty(), "unmatched tool_start events: {:?}", open);
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_b_greeting_with_no_tools() {
    let client = Arc::new(ScriptedClient::new(vec![
        text("Hello! Where would you like to travel?"),
        empty_extraction(),
    ]));
    let orchestrator = Orchestrator::new(
        client,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    );

    let mut req = request("t-greeting");
    req.message = "hi".into();
    let (result, events) = run_and_collect(&orchestrator, req).await;

    assert_eq!(result.unwrap(), "Hello! Where would you like to travel?");
    let names = wire_names(&events);
    assert!(!names.contains(&"tool_start"));
    assert_eq!(names.iter().filter(|n| **n == "done").count(), 1);
    assert_eq!(names.last(), Some(&"done"));
}

#[tokio::test]
async fn scenario_a_failed_lookup_corrected_then_done() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_request(vec![call(
            "c1",
            "search_airport_by_city",
            json!({"city_name": "TelAviv"}),
        )]),
        // After the correction instruction the model retries the lookup.
        tool_request(vec![call(
            "c2",
            "search_airport_by_city",
            json!({"city_name": "Tel Aviv"}),
        )]),
        text("Found flights from **TLV** to Rome: 3 offers from $210."),
        empty_extraction(),
    ]));

    let mut registry = ToolRegistry::new();
    registry.register(ScriptedTool::new(
        "search_airport_by_city",
        vec![
            ToolOutcome::err("ambiguous city"),
            ToolOutcome::Ok(json!({"airports": [{"iata_code": "TLV"}]})),
        ],
    ));

    let orchestrator = Orchestrator::new(
        client,
        Arc::new(registry),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    );

    let (result, events) = run_and_collect(&orchestrator, request("t-correct")).await;
    assert!(result.unwrap().contains("flights"));

    assert_tool_pairing(&events);
    let ends: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolEnd { success, .. } => Some(*success),
            _ => None,
        })
        .collect();
    assert_eq!(ends, vec![false, true]);

    let corrections: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::SelfCorrection { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(corrections.len(), 1);
    assert!(corrections[0].contains("ambiguous"));

    match events.last().unwrap() {
        AgentEvent::Done { final_text, .. } => assert!(final_text.contains("TLV")),
        other => panic!("expected done, got {:?}", other.wire_name()),
    }
}

#[tokio::test]
async fn scenario_c_retry_ceiling_yields_error_not_done() {
    // Three consecutive failures against MAX_RETRIES=2.
    let client = Arc::new(ScriptedClient::new(vec![
        tool_request(vec![call("c1", "search_flights", json!({}))]),
        tool_request(vec![call("c2", "search_flights", json!({}))]),
        tool_request(vec![call("c3", "search_flights", json!({}))]),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(ScriptedTool::new(
        "search_flights",
        vec![
            ToolOutcome::err("upstream 500"),
            ToolOutcome::err("upstream 500"),
            ToolOutcome::err("upstream 500"),
        ],
    ));

    let orchestrator = Orchestrator::new(
        client,
        Arc::new(registry),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    )
    .with_max_retries(2);

    let (result, events) = run_and_collect(&orchestrator, request("t-ceiling")).await;
    assert!(matches!(
        result,
        Err(TurnError::RetryExhausted { attempts: 2, .. })
    ));

    let names = wire_names(&events);
    assert_eq!(
        names.iter().filter(|n| **n == "self_correction").count(),
        2
    );
    assert!(!names.contains(&"done"));
    assert_eq!(names.last(), Some(&"error"));
    assert_tool_pairing(&events);

    // Correction cycles strictly alternate with execution steps.
    let relevant: Vec<&str> = names
        .iter()
        .filter(|n| **n == "tool_start" || **n == "self_correction")
        .copied()
        .collect();
    assert_eq!(
        relevant,
        vec!["tool_start", "self_correction", "tool_start", "self_correction", "tool_start"]
    );
}

#[tokio::test]
async fn scenario_d_preferences_cross_turns() {
    let store = Arc::new(MemoryStore::default());
    let prefs = Arc::new(MemoryPrefs::default());

    // Turn 1: the user states a preference; extraction persists it.
    let client1 = Arc::new(RecordingClient::new(ScriptedClient::new(vec![
        text("Noted — aisle seats from now on."),
        text(r#"{"preferences": [{"key": "seat", "value": "aisle", "confidence": 0.9}], "title": "Seat preferences"}"#),
    ])));
    let orch1 = Orchestrator::new(
        client1.clone(),
        Arc::new(ToolRegistry::new()),
        store.clone(),
        prefs.clone(),
    );
    let mut req1 = request("t-prefs");
    req1.message = "I prefer aisle seats".into();
    let (result, _) = run_and_collect(&orch1, req1).await;
    result.unwrap();

    // Turn 2: the reasoning prompt must carry the fact without the user
    // restating it.
    let client2 = Arc::new(RecordingClient::new(ScriptedClient::new(vec![
        text("Booking with an aisle seat in mind."),
        empty_extraction(),
    ])));
    let orch2 = Orchestrator::new(
        client2.clone(),
        Arc::new(ToolRegistry::new()),
        store.clone(),
        prefs.clone(),
    );
    let mut req2 = request("t-prefs");
    req2.message = "find me a flight to Rome in May".into();
    let (result, _) = run_and_collect(&orch2, req2).await;
    result.unwrap();

    let systems = client2.systems();
    assert!(systems[0].contains("seat: aisle"));

    // The title from turn 1 stuck; turn 2 must not overwrite it.
    let sessions = store.list_sessions("u1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].title, "Seat preferences");
}

#[tokio::test]
async fn resumed_session_continues_from_checkpoint() {
    let store = Arc::new(MemoryStore::default());
    let prefs = Arc::new(MemoryPrefs::default());

    let orch1 = Orchestrator::new(
        Arc::new(ScriptedClient::new(vec![
            text("Where to?"),
            empty_extraction(),
        ])),
        Arc::new(ToolRegistry::new()),
        store.clone(),
        prefs.clone(),
    );
    let mut req = request("t-resume");
    req.message = "hi".into();
    run_and_collect(&orch1, req).await.0.unwrap();

    // A restart is nothing more than a fresh orchestrator over the same
    // store; no in-process state may be required to continue the session.
    drop(orch1);
    let orch2 = Orchestrator::new(
        Arc::new(ScriptedClient::new(vec![
            text("Rome it is."),
            empty_extraction(),
        ])),
        Arc::new(ToolRegistry::new()),
        store.clone(),
        prefs.clone(),
    );
    let mut req = request("t-resume");
    req.message = "Rome please".into();
    run_and_collect(&orch2, req).await.0.unwrap();

    let history = store.load("t-resume").await.unwrap();
    let texts: Vec<&str> = history.iter().map(|m| m.text()).collect();
    assert_eq!(texts, vec!["hi", "Where to?", "Rome please", "Rome it is."]);
    assert!(matches!(history[0].role, wayfinder_core::Role::User));
    assert!(matches!(history[1].role, wayfinder_core::Role::Assistant));
}

#[tokio::test]
async fn unknown_tool_is_normalized_and_corrected() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_request(vec![call("c1", "teleport", json!({"to": "Rome"}))]),
        text("I can't teleport you, but I can find flights."),
        empty_extraction(),
    ]));
    let orchestrator = Orchestrator::new(
        client,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    );

    let (result, events) = run_and_collect(&orchestrator, request("t-unknown")).await;
    result.unwrap();

    let end = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolEnd {
                success, output, ..
            } => Some((*success, output.clone())),
            _ => None,
        })
        .unwrap();
    assert!(!end.0);
    assert!(end.1["error"].as_str().unwrap().contains("Unknown tool"));
    assert_eq!(wire_names(&events).last(), Some(&"done"));
}

#[tokio::test]
async fn concurrent_turn_on_same_session_is_rejected() {
    let client = Arc::new(
        ScriptedClient::new(vec![text("slow reply"), empty_extraction()])
            .with_delay(Duration::from_millis(200)),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        client,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    ));

    let first = {
        let orch = orchestrator.clone();
        tokio::spawn(async move { run_and_collect(&orch, request("t-busy")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (second, _) = run_and_collect(&orchestrator, request("t-busy")).await;
    assert!(matches!(second, Err(TurnError::SessionBusy(_))));

    // A different session is unaffected.
    let other_client_turn = run_and_collect(&orchestrator, request("t-other")).await;
    // (Shares the script queue; only the rejection semantics matter here.)
    drop(other_client_turn);

    let (first_result, _) = first.await.unwrap();
    first_result.unwrap();

    // After completion the session accepts turns again.
    let (third, _) = run_and_collect(&orchestrator, request("t-busy")).await;
    third.unwrap();
}

#[tokio::test]
async fn cancellation_stops_before_tool_dispatch() {
    let client = Arc::new(
        ScriptedClient::new(vec![tool_request(vec![call(
            "c1",
            "search_flights",
            json!({}),
        )])])
        .with_delay(Duration::from_millis(200)),
    );
    let mut registry = ToolRegistry::new();
    registry.register(ScriptedTool::new(
        "search_flights",
        vec![ToolOutcome::Ok(json!({"flights": []}))],
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        client,
        Arc::new(registry),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    ));

    let handle = {
        let orch = orchestrator.clone();
        tokio::spawn(async move { run_and_collect(&orch, request("t-cancel")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.cancel("t-cancel"));

    let (result, events) = handle.await.unwrap();
    assert!(matches!(result, Err(TurnError::Cancelled)));
    let names = wire_names(&events);
    // Reasoning finished (it was in flight) but no tool was dispatched.
    assert!(!names.contains(&"tool_start"));
    assert_eq!(names.last(), Some(&"error"));

    // Cancelling an idle session is a no-op.
    assert!(!orchestrator.cancel("t-cancel"));
}

#[tokio::test]
async fn failed_turn_checkpoint_leaves_no_unanswered_tool_calls() {
    // Cancel after reasoning produced tool calls but before dispatch. The
    // saved history must still be a transcript the model accepts on the
    // next turn: every issued call id answered by a tool message.
    let client = Arc::new(
        ScriptedClient::new(vec![tool_request(vec![
            call("c1", "search_flights", json!({"origin": "TLV"})),
            call("c2", "search_airport_by_city", json!({"city_name": "Rome"})),
        ])])
        .with_delay(Duration::from_millis(200)),
    );
    let store = Arc::new(MemoryStore::default());
    let orchestrator = Arc::new(Orchestrator::new(
        client,
        Arc::new(ToolRegistry::new()),
        store.clone(),
        Arc::new(MemoryPrefs::default()),
    ));

    let handle = {
        let orch = orchestrator.clone();
        tokio::spawn(async move { run_and_collect(&orch, request("t-dangling")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.cancel("t-dangling"));
    let (result, _) = handle.await.unwrap();
    assert!(matches!(result, Err(TurnError::Cancelled)));

    let history = store.load("t-dangling").await.unwrap();
    let issued: Vec<&str> = history
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
        .collect();
    let answered: Vec<&str> = history
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(issued, vec!["c1", "c2"]);
    assert_eq!(answered, issued);
    assert!(history.last().unwrap().text().contains("error"));
}

#[tokio::test]
async fn model_transport_failure_uses_fallback_once() {
    let fallback = Arc::new(ScriptedClient::new(vec![
        text("recovered on fallback"),
        empty_extraction(),
    ]));
    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedClient::always_failing("429 rate limited")),
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    )
    .with_fallback(fallback.clone());

    let (result, events) = run_and_collect(&orchestrator, request("t-fallback")).await;
    assert_eq!(result.unwrap(), "recovered on fallback");
    assert!(fallback.calls() >= 1);
    assert_eq!(wire_names(&events).last(), Some(&"done"));
}

#[tokio::test]
async fn model_transport_failure_without_fallback_is_terminal() {
    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedClient::always_failing("connection refused")),
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    );

    let (result, events) = run_and_collect(&orchestrator, request("t-transport")).await;
    assert!(matches!(result, Err(TurnError::ModelTransport(_))));
    match events.last().unwrap() {
        AgentEvent::Error { message } => {
            // Internal detail is never forwarded verbatim.
            assert!(!message.contains("connection refused"));
        }
        other => panic!("expected error, got {:?}", other.wire_name()),
    }
}

#[tokio::test]
async fn extraction_failure_never_breaks_the_turn() {
    let client = Arc::new(ScriptedClient::new(vec![
        text("Safe travels!"),
        text("this is not json at all"),
    ]));
    let prefs = Arc::new(MemoryPrefs::default());
    let orchestrator = Orchestrator::new(
        client,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryStore::default()),
        prefs.clone(),
    );

    let (result, events) = run_and_collect(&orchestrator, request("t-extract")).await;
    assert_eq!(result.unwrap(), "Safe travels!");
    assert_eq!(wire_names(&events).last(), Some(&"done"));
    assert!(prefs.preferences("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn sibling_tool_failure_does_not_block_batch() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_request(vec![
            call("c1", "search_flights", json!({"origin": "TLV"})),
            call("c2", "search_aircraft_by_callsign", json!({"callsign": "LY316"})),
        ]),
        tool_request(vec![call("c3", "search_flights", json!({"origin": "TLV"}))]),
        text("Here are your options."),
        empty_extraction(),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(ScriptedTool::new(
        "search_flights",
        vec![
            ToolOutcome::err("upstream 500"),
            ToolOutcome::Ok(json!({"flights": [], "count": 0})),
        ],
    ));
    registry.register(ScriptedTool::new(
        "search_aircraft_by_callsign",
        vec![ToolOutcome::Ok(json!({"aircraft_type": "B789"}))],
    ));

    let orchestrator = Orchestrator::new(
        client,
        Arc::new(registry),
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPrefs::default()),
    );

    let (result, events) = run_and_collect(&orchestrator, request("t-batch")).await;
    result.unwrap();
    assert_tool_pairing(&events);

    // Both calls of the first batch ran; results arrive in call order.
    let ends: Vec<(String, bool)> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolEnd { tool, success, .. } => Some((tool.clone(), *success)),
            _ => None,
        })
        .collect();
    assert_eq!(ends.len(), 3);
    assert_eq!(ends[0], ("search_flights".to_string(), false));
    assert_eq!(ends[1], ("search_aircraft_by_callsign".to_string(), true));
    assert_eq!(ends[2], ("search_flights".to_string(), true));
}
