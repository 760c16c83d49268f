//! Preference extraction: a post-turn LLM call that distills durable travel
//! preferences and a session title from the transcript.
//!
//! Runs once per turn, only on the final-answer path. Its own failures are
//! isolated: errors are logged and swallowed, never surfaced to the user.

use crate::llm::{CompletionParams, LlmClient};
use anyhow::{Context, Result};
use serde::Deserialize;
use wayfinder_core::{Message, PreferenceFact, Role};

const EXTRACTION_PROMPT: &str = r#"Analyze the following conversation and extract any long-term travel preferences the user has stated (e.g. "I always prefer aisle seats", "I only fly Delta").

Rules:
1. Only extract preferences the user stated explicitly; do not guess.
2. Each preference is a short key (e.g. "seat", "airline", "cabin_class") and a value.
3. confidence: direct statement = 0.9, hedged = 0.5, implied = 0.3.
4. Also provide a short 3-5 word title for the conversation.
5. If there is nothing to extract, return an empty preferences array.

Return JSON only:
{"preferences": [{"key": "seat", "value": "aisle", "confidence": 0.9}], "title": "Rome flight search"}"#;

/// How many trailing messages to include (saves tokens; matches the
/// reasoning window a short exchange needs).
const TRANSCRIPT_WINDOW: usize = 5;

#[derive(Debug, Deserialize)]
struct RawPreference {
    key: String,
    value: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.7
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    preferences: Vec<RawPreference>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub facts: Vec<PreferenceFact>,
    pub title: Option<String>,
}

/// Extract preference facts and a title from the turn transcript.
///
/// Never fails: any error is logged and an empty outcome returned.
pub async fn extract(
    client: &dyn LlmClient,
    transcript: &[Message],
    user_id: &str,
    thread_id: &str,
) -> ExtractionOutcome {
    match extract_inner(client, transcript, user_id, thread_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Preference extraction failed (non-fatal): {}", e);
            ExtractionOutcome::default()
        }
    }
}

async fn extract_inner(
    client: &dyn LlmClient,
    transcript: &[Message],
    user_id: &str,
    thread_id: &str,
) -> Result<ExtractionOutcome> {
    if transcript.len() < 2 {
        return Ok(ExtractionOutcome::default());
    }

    let window: Vec<String> = transcript
        .iter()
        .rev()
        .take(TRANSCRIPT_WINDOW)
        .filter(|m| !matches!(m.role, Role::Tool))
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            format!("{}: {}", role, m.text())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let params = CompletionParams {
        max_tokens: 512,
        temperature: 0.1, // structured output
    };
    let completion = client
        .complete(
            EXTRACTION_PROMPT,
            &[Message::user(format!("Conversation:\n{}", window.join("\n")))],
            &[],
            params,
        )
        .await
        .context("Extraction LLM call failed")?;

    let parsed = parse_response(&completion.text);
    let facts = parsed
        .preferences
        .into_iter()
        .filter(|p| {
            !p.key.is_empty() && !p.value.is_empty() && p.confidence > 0.0 && p.confidence <= 1.0
        })
        .map(|p| PreferenceFact {
            user_id: user_id.to_string(),
            key: p.key,
            value: p.value,
            confidence: p.confidence,
            source_turn: thread_id.to_string(),
        })
        .collect::<Vec<_>>();

    tracing::debug!("Extracted {} preference fact(s)", facts.len());
    Ok(ExtractionOutcome {
        facts,
        title: parsed.title.filter(|t| !t.trim().is_empty()),
    })
}

/// Parse the LLM's response, handling common formatting quirks (markdown
/// fences, leading prose). Falls back to an empty outcome rather than an
/// error.
fn parse_response(text: &str) -> ExtractionResponse {
    let trimmed = text.trim();

    if let Ok(resp) = serde_json::from_str::<ExtractionResponse>(trimmed) {
        return resp;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(resp) = serde_json::from_str::<ExtractionResponse>(&trimmed[start..=end]) {
                return resp;
            }
        }
    }

    tracing::debug!("Could not parse extraction response: {}", trimmed);
    ExtractionResponse::default()
}
