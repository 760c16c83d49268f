//! The ordered, typed progress stream one turn emits.
//!
//! The orchestrator produces events onto an mpsc channel; the transport
//! layer (SSE or otherwise) is a separate consumer that maps them to wire
//! frames. A consumer disconnecting mid-stream does not affect the turn.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// One JSON object per event on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental assistant text.
    Token { text: String },
    /// Emitted before a tool is invoked.
    ToolStart { tool: String, input: Value },
    /// Emitted after the tool completes; always follows the matching
    /// `ToolStart`.
    ToolEnd {
        tool: String,
        success: bool,
        output: Value,
    },
    /// One per correction cycle, with a human-readable summary.
    SelfCorrection { message: String },
    /// Terminal: the turn finished with a final answer.
    Done {
        session_id: String,
        final_text: String,
    },
    /// Terminal: the turn failed. Carries a short description only.
    Error { message: String },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }

    /// SSE event name for this variant.
    pub fn wire_name(&self) -> &'static str {
        match self {
            AgentEvent::Token { .. } => "token",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolEnd { .. } => "tool_end",
            AgentEvent::SelfCorrection { .. } => "self_correction",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Error { .. } => "error",
        }
    }
}

/// Ordered emitter enforcing the terminal-event invariant: after `Done` or
/// `Error` nothing further is emitted. Send failures (consumer went away)
/// are ignored so the turn's persistence is unaffected.
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
    terminated: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            tx,
            terminated: false,
        }
    }

    pub async fn emit(&mut self, event: AgentEvent) {
        if self.terminated {
            tracing::debug!("Dropping event after terminal: {:?}", event.wire_name());
            return;
        }
        if event.is_terminal() {
            self.terminated = true;
        }
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event consumer disconnected; continuing turn");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_events_after_terminal() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut sink = EventSink::new(tx);
        sink.emit(AgentEvent::Token { text: "hi".into() }).await;
        sink.emit(AgentEvent::Done {
            session_id: "s".into(),
            final_text: "hi".into(),
        })
        .await;
        sink.emit(AgentEvent::Error {
            message: "late".into(),
        })
        .await;
        drop(sink);

        let mut names = Vec::new();
        while let Some(ev) = rx.recv().await {
            names.push(ev.wire_name());
        }
        assert_eq!(names, vec!["token", "done"]);
    }

    #[tokio::test]
    async fn test_disconnected_consumer_is_ignored() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let mut sink = EventSink::new(tx);
        // Must not panic or error.
        sink.emit(AgentEvent::Token { text: "x".into() }).await;
        assert!(!sink.is_terminated());
    }

    #[test]
    fn test_wire_shape() {
        let ev = AgentEvent::ToolEnd {
            tool: "search_flights".into(),
            success: false,
            output: serde_json::json!({"error": "boom"}),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "tool_end");
        assert_eq!(v["success"], false);
    }
}
