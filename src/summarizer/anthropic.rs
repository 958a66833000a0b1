//! Anthropic Messages API summarizer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{transcript, Summarizer, SummarizerError, SUMMARY_WORD_LIMIT};
use crate::config::SummarizerConfig;
use crate::conversation::types::ConversationTurn;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Summarizes turns with a single non-streaming Claude call.
pub struct AnthropicSummarizer {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicSummarizer {
    pub fn new(api_key: impl Into<String>, config: &SummarizerConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    fn prompt(turns: &[ConversationTurn]) -> String {
        format!(
            "Summarize the following conversation excerpt in at most {SUMMARY_WORD_LIMIT} words. \
             Keep the topics discussed, any decisions or facts established, and open questions. \
             Write plain prose with no preamble.\n\n---\n{}---",
            transcript(turns)
        )
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize_turns(&self, turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: Self::prompt(turns),
            }],
        };

        tracing::debug!(model = %self.model, turns = turns.len(), "requesting summary");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(SummarizerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.r#type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizerError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
