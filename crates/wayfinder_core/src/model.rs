use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Conversation messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One entry of a session's message history.
///
/// Serializes to the OpenAI-compatible chat wire shape: assistant messages
/// may carry `tool_calls`, tool messages carry the `tool_call_id` they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool message answering `tool_call_id` with the serialized result.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ============================================================================
// Tool calls and results
// ============================================================================

/// A structured request to invoke an external capability, issued by the
/// reasoning step. The `id` is assigned by the model and stays stable
/// through execution and correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Normalized outcome of one tool invocation. Exactly one of `data`/`error`
/// is populated; adapters produce this regardless of their native failure
/// mode (HTTP status, malformed input, timeout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, data: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Payload for the tool message appended to history.
    pub fn as_message_content(&self) -> String {
        match (&self.data, &self.error) {
            (Some(data), _) => data.to_string(),
            (None, Some(error)) => serde_json::json!({ "error": error }).to_string(),
            (None, None) => "{}".to_string(),
        }
    }
}

// ============================================================================
// Long-term preference memory
// ============================================================================

/// A durable per-user key-value datum inferred from conversation, reused
/// across sessions. Upserted by `(user_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceFact {
    pub user_id: String,
    pub key: String,
    pub value: String,
    pub confidence: f32,
    /// Thread the fact was extracted from.
    pub source_turn: String,
}

/// One row of the session index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
}
