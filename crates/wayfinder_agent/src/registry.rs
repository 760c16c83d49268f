//! Tool capability interface and name-based dispatch.
//!
//! New tools are added by implementing `Tool` and registering under a name,
//! never by special-casing the orchestrator.

use crate::llm::ToolSpec;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-turn credentials forwarded to tools that need them. The OAuth flow
/// that produces the token lives outside this crate.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Google OAuth bearer token for Docs/Calendar creation, if granted.
    pub google_token: Option<String>,
}

/// Outcome of one tool invocation before it is tied to a call id. Adapters
/// normalize every native failure mode (HTTP error, malformed input,
/// timeout) into `Err` here; they never panic and never raise past the
/// execution step.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok(Value),
    Err(String),
}

impl ToolOutcome {
    pub fn err(msg: impl Into<String>) -> Self {
        ToolOutcome::Err(msg.into())
    }
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for dispatch (must match the name in the schema).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema sent to the LLM so it knows how to call this tool.
    fn spec(&self) -> ToolSpec;

    async fn invoke(&self, arguments: &Value, ctx: &ToolContext) -> ToolOutcome;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!("Registered tool: {}", name);
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for every registered tool, sorted by name for a stable
    /// prompt.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Invoke `name` with `arguments`. An unknown name yields an error
    /// outcome rather than an `Err` return, so sibling calls in the same
    /// batch are unaffected.
    pub async fn dispatch(&self, name: &str, arguments: &Value, ctx: &ToolContext) -> ToolOutcome {
        match self.get(name) {
            Some(tool) => tool.invoke(arguments, ctx).await,
            None => ToolOutcome::err(format!("Unknown tool: {}", name)),
        }
    }
}

/// Helper for building object schemas without repeating boilerplate in every
/// adapter.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "Echo the input back".into(),
                parameters: object_schema(json!({"text": {"type": "string"}}), &["text"]),
            }
        }
        async fn invoke(&self, arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::Ok(arguments.clone())
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let outcome = registry
            .dispatch("echo", &json!({"text": "hi"}), &ToolContext::default())
            .await;
        match outcome {
            ToolOutcome::Ok(v) => assert_eq!(v["text"], "hi"),
            ToolOutcome::Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_data_not_failure() {
        let registry = ToolRegistry::new();
        let outcome = registry
            .dispatch("nope", &json!({}), &ToolContext::default())
            .await;
        match outcome {
            ToolOutcome::Err(e) => assert!(e.contains("Unknown tool")),
            ToolOutcome::Ok(_) => panic!("expected error outcome"),
        }
    }
}
