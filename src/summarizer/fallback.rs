//! Deterministic, non-AI summaries.
//!
//! Used when the AI summarizer errors or times out, and as the whole summarizer
//! when no API key is configured. Same input always yields the same text.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{Summarizer, SummarizerError};
use crate::conversation::types::ConversationTurn;

const KEYWORD_COUNT: usize = 5;
const EXCERPT_CHARS: usize = 80;

const STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "this", "that", "these", "those", "from", "into",
    "have", "has", "had", "was", "were", "are", "been", "being", "will", "would", "should",
    "could", "can", "may", "might", "must", "shall", "what", "when", "where", "which", "who",
    "how", "why", "you", "your", "yours", "our", "ours", "they", "them", "their", "its",
    "about", "there", "here", "then", "than", "also", "just", "some", "any", "all", "not",
    "does", "did", "doing", "please", "thanks", "thank", "like", "want", "need", "know",
];

/// Build a summary from turn count, frequent keywords, and the opening and
/// closing utterances.
pub fn fallback_summary(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "Conversation segment of 0 turns.".to_string();
    }

    let first = &turns[0];
    let last = &turns[turns.len() - 1];
    let mut summary = format!(
        "Conversation segment of {} turns ({} to {}).",
        turns.len(),
        first.timestamp.format("%Y-%m-%d %H:%M"),
        last.timestamp.format("%Y-%m-%d %H:%M"),
    );

    let keywords = top_keywords(turns, KEYWORD_COUNT);
    if !keywords.is_empty() {
        summary.push_str(&format!(" Key topics: {}.", keywords.join(", ")));
    }

    if let Some(opening) = leading_text(first) {
        summary.push_str(&format!(" Opened with: \"{}\".", truncate(opening, EXCERPT_CHARS)));
    }
    if turns.len() > 1 {
        if let Some(closing) = leading_text(last) {
            summary.push_str(&format!(" Ended with: \"{}\".", truncate(closing, EXCERPT_CHARS)));
        }
    }

    summary
}

/// The query, or the response for assistant-authored turns with no query.
fn leading_text(turn: &ConversationTurn) -> Option<&str> {
    [turn.query.as_str(), turn.response_text()]
        .into_iter()
        .map(str::trim)
        .find(|text| !text.is_empty())
}

/// Most frequent non-stop-words, ties broken by first appearance.
fn top_keywords(turns: &[ConversationTurn], count: usize) -> Vec<String> {
    let mut frequency: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    for turn in turns {
        for text in [turn.query.as_str(), turn.response_text()] {
            for word in text.split(|c: char| !c.is_alphanumeric()) {
                let word = word.to_lowercase();
                if word.chars().count() <= 3 || STOP_WORDS.contains(&word.as_str()) {
                    continue;
                }
                if word.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                let entry = frequency.entry(word).or_insert((0, position));
                entry.0 += 1;
                position += 1;
            }
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(count).map(|(word, _)| word).collect()
}

/// Truncate content to max_chars, appending "..." if truncated.
fn truncate(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Summarizer that never calls out: always the deterministic summary.
pub struct FallbackSummarizer;

#[async_trait]
impl Summarizer for FallbackSummarizer {
    async fn summarize_turns(&self, turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        Ok(fallback_summary(turns))
    }

    fn name(&self) -> &str {
        "fallback"
    }

    fn is_ai(&self) -> bool {
        false
    }
}
