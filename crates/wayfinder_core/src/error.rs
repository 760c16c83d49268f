use thiserror::Error;

/// Turn-level failure taxonomy.
///
/// Tool failures never appear here: they are recorded as data in
/// `ToolResult.error` and drive self-correction. Only the state machine's
/// transition logic decides user-visible failure, and it does so through
/// these variants.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The correction ceiling was reached. The session stays usable for the
    /// next turn.
    #[error("correction retries exhausted after {attempts} attempts: {summary}")]
    RetryExhausted { attempts: u32, summary: String },

    /// The reasoning call failed at the transport/credential layer, after
    /// the one-shot fallback credential was also tried.
    #[error("model transport failure: {0}")]
    ModelTransport(String),

    /// The caller requested cancellation; the turn stopped at a step
    /// boundary.
    #[error("turn cancelled")]
    Cancelled,

    /// A turn is already in flight for this session.
    #[error("session {0} already has a turn in flight")]
    SessionBusy(String),

    /// Checkpoint load/save failure.
    #[error("checkpoint store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl TurnError {
    /// Short natural-language message for the client. Internal diagnostic
    /// detail (raw provider errors, backtraces) is never forwarded verbatim.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::RetryExhausted { .. } => {
                "I'm sorry — I wasn't able to complete that after several attempts. \
                 Could you rephrase or try again?"
                    .to_string()
            }
            TurnError::ModelTransport(_) => {
                "The assistant is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            TurnError::Cancelled => "The request was cancelled.".to_string(),
            TurnError::SessionBusy(_) => {
                "This conversation is still processing a previous message.".to_string()
            }
            TurnError::Store(_) => "A storage error occurred. Please try again.".to_string(),
        }
    }
}
