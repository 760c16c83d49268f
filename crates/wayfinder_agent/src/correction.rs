//! Self-correction: classify tool failures, build a corrective instruction,
//! and summarise the cycle for the event stream.

use wayfinder_core::{ToolCall, ToolResult};

/// One failed call, flattened for prompt construction.
#[derive(Debug, Clone)]
pub struct FailedCall {
    pub tool: String,
    pub arguments_excerpt: String,
    pub error: String,
}

/// Built fresh each correction cycle and discarded after producing the next
/// reasoning prompt.
#[derive(Debug, Clone)]
pub struct CorrectionContext {
    pub failures: Vec<FailedCall>,
    /// 1-based attempt number for this cycle.
    pub attempt: u32,
    pub hint: Option<String>,
}

const ARG_EXCERPT_CHARS: usize = 120;

/// Fixed table of known-recoverable failure shapes. Matching is on the
/// error text; the first hit wins.
fn hint_for(tool: &str, error: &str) -> Option<String> {
    let lower = error.to_lowercase();
    if lower.contains("iata") || lower.contains("locationcode") || lower.contains("ambiguous") {
        return Some(format!(
            "The input to '{}' looks like a location name rather than an airport code. \
             Call search_airport_by_city first to resolve the IATA code, then retry.",
            tool
        ));
    }
    if lower.contains("authentication required") || lower.contains("401") {
        return Some(
            "Google authentication is missing or expired. Ask the user to re-authenticate \
             before retrying document or calendar creation."
                .to_string(),
        );
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return Some(format!("'{}' timed out. Retry the same call once.", tool));
    }
    if lower.contains("no flights found") {
        return Some(
            "No offers for those dates. Retry with adjacent dates and tell the user."
                .to_string(),
        );
    }
    None
}

/// Pair failed results with their originating calls and derive a hint.
pub fn build_context(
    calls: &[ToolCall],
    results: &[ToolResult],
    attempt: u32,
) -> CorrectionContext {
    let mut failures = Vec::new();
    let mut hint = None;

    for result in results.iter().filter(|r| !r.success) {
        let call = calls.iter().find(|c| c.id == result.tool_call_id);
        let tool = call.map(|c| c.name.clone()).unwrap_or_default();
        let args = call
            .map(|c| c.arguments.to_string())
            .unwrap_or_else(|| "{}".to_string());
        let error = result.error.clone().unwrap_or_default();

        if hint.is_none() {
            hint = hint_for(&tool, &error);
        }
        failures.push(FailedCall {
            tool,
            arguments_excerpt: args.chars().take(ARG_EXCERPT_CHARS).collect(),
            error,
        });
    }

    CorrectionContext {
        failures,
        attempt,
        hint,
    }
}

impl CorrectionContext {
    /// The corrective instruction appended to history before the next
    /// reasoning call.
    pub fn instruction(&self, max_retries: u32) -> String {
        let summary: Vec<String> = self
            .failures
            .iter()
            .map(|f| {
                format!(
                    "- Tool '{}' failed with arguments {}: {}",
                    f.tool, f.arguments_excerpt, f.error
                )
            })
            .collect();
        let mut text = format!(
            "The following tool calls failed:\n{}\n\nThis is retry attempt {} of {}.\n\
             Analyze what went wrong, correct your approach, and try again. \
             State your correction reasoning clearly before retrying.",
            summary.join("\n"),
            self.attempt,
            max_retries
        );
        if let Some(ref hint) = self.hint {
            text.push_str("\nHint: ");
            text.push_str(hint);
        }
        text
    }

    /// Human-readable one-liner for the `self_correction` event.
    pub fn event_summary(&self) -> String {
        let tools: Vec<&str> = self.failures.iter().map(|f| f.tool.as_str()).collect();
        let first_error = self
            .failures
            .first()
            .map(|f| f.error.as_str())
            .unwrap_or("unknown error");
        format!(
            "Adjusting approach after {} failed ({})",
            tools.join(", "),
            first_error
        )
    }
}
