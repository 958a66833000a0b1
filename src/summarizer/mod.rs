//! Turn summarization.
//!
//! Provides the [`Summarizer`] trait, an Anthropic-backed implementation, and the
//! deterministic [`fallback::fallback_summary`] the memory manager uses whenever
//! the AI call fails. The provider is created via [`create_summarizer`] from
//! configuration.

pub mod anthropic;
pub mod fallback;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::conversation::types::ConversationTurn;

pub use fallback::{fallback_summary, FallbackSummarizer};

/// Soft cap on summary length, stated in the prompt.
pub const SUMMARY_WORD_LIMIT: usize = 250;

/// Why a summarizer could not produce text. Never surfaced to callers of the
/// memory services.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("summarizer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("summarizer API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("summarizer returned no text")]
    EmptyResponse,

    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
}

/// Produces a condensed natural-language summary of an ordered run of turns.
///
/// Implementations return an error instead of degrading; the caller owns the
/// fallback.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_turns(&self, turns: &[ConversationTurn]) -> Result<String, SummarizerError>;

    /// Short identifier recorded in summary metadata.
    fn name(&self) -> &str;

    /// `false` for deterministic summarizers, whose output is stored with
    /// `isFallback: true`.
    fn is_ai(&self) -> bool {
        true
    }
}

/// Create a summarizer from config.
///
/// `"anthropic"` needs an API key (config or `ANTHROPIC_API_KEY`); without one the
/// deterministic summarizer is used and a warning is logged. `"fallback"` always
/// uses the deterministic summarizer.
pub fn create_summarizer(config: &SummarizerConfig) -> anyhow::Result<Arc<dyn Summarizer>> {
    match config.provider.as_str() {
        "anthropic" => match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Ok(Arc::new(anthropic::AnthropicSummarizer::new(key, config))),
            None => {
                tracing::warn!("no Anthropic API key configured, summaries will use the offline fallback");
                Ok(Arc::new(FallbackSummarizer))
            }
        },
        "fallback" => Ok(Arc::new(FallbackSummarizer)),
        other => anyhow::bail!("unknown summarizer provider: {other}. Supported: anthropic, fallback"),
    }
}

/// Render turns as a plain transcript for a summarization prompt.
pub fn transcript(turns: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let speaker = turn
            .user_name
            .as_deref()
            .or(turn.user_id.as_deref())
            .unwrap_or("User");
        if !turn.query.is_empty() {
            out.push_str(&format!("{speaker}: {}\n", turn.query));
        }
        if !turn.response_text().is_empty() {
            out.push_str(&format!("Assistant: {}\n", turn.response_text()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummarizerConfig;

    #[test]
    fn missing_key_falls_back_to_offline_summarizer() {
        let config = SummarizerConfig {
            api_key: None,
            ..Default::default()
        };
        let summarizer = create_summarizer(&config).unwrap();
        assert_eq!(summarizer.name(), "fallback");
        assert!(!summarizer.is_ai());
    }

    #[test]
    fn configured_key_selects_anthropic() {
        let config = SummarizerConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let summarizer = create_summarizer(&config).unwrap();
        assert_eq!(summarizer.name(), "anthropic");
        assert!(summarizer.is_ai());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = SummarizerConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        let err = create_summarizer(&config).err().unwrap();
        assert!(err.to_string().contains("unknown summarizer provider"));
    }
}
