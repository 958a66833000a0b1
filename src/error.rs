//! Error taxonomy for the conversation core.
//!
//! Summarizer failures never appear here: the memory manager recovers from them
//! with a fallback summary. See [`crate::summarizer::SummarizerError`].

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BrainError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("summary {summary_id} not found in conversation {conversation_id}")]
    SummaryNotFound {
        conversation_id: String,
        summary_id: String,
    },

    #[error("turn {turn_id} not found in conversation {conversation_id}")]
    TurnNotFound {
        conversation_id: String,
        turn_id: String,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    /// Persistence failures, passed through without retry.
    #[error("storage failure: {0}")]
    Storage(#[source] BoxError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrainError {
    /// Wrap a plain message as a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Storage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<rusqlite::Error> for BrainError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BrainError>;

/// Reject empty or whitespace-only identifiers before touching storage.
pub fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(BrainError::validation(format!("{kind} id must not be empty")));
    }
    Ok(())
}
