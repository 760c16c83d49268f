//! Request/response bodies for the chat API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wayfinder_agent::AgentEvent;
use wayfinder_core::SessionSummary;

/// Body of `POST /api/chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted on the first message; the server mints an id and returns it
    /// in the `done` event.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Google OAuth bearer token for document/calendar tools, if the user
    /// has connected their account.
    #[serde(default)]
    pub google_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub session_id: String,
}

/// SSE data payload for an event. The variant name travels as the SSE event
/// name, so the embedded `type` tag is stripped from the body.
pub fn sse_payload(event: &AgentEvent) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.remove("type");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_minimal() {
        let req: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.session_id.is_none());
        assert!(req.google_token.is_none());
    }

    #[test]
    fn test_chat_request_full() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message": "hi", "session_id": "t1", "google_token": "ya29.abc"}"#,
        )
        .unwrap();
        assert_eq!(req.session_id.as_deref(), Some("t1"));
        assert_eq!(req.google_token.as_deref(), Some("ya29.abc"));
    }

    #[test]
    fn test_sse_payload_strips_type_tag() {
        let payload = sse_payload(&AgentEvent::Token { text: "hi".into() });
        assert_eq!(payload, json!({"text": "hi"}));

        let payload = sse_payload(&AgentEvent::Done {
            session_id: "t1".into(),
            final_text: "bye".into(),
        });
        assert_eq!(payload, json!({"session_id": "t1", "final_text": "bye"}));
    }
}
