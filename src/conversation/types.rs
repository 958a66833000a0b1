//! Conversation record types.
//!
//! Defines [`InterfaceType`] (where a conversation happens), [`Conversation`],
//! [`ConversationTurn`] (one query/response exchange), [`ConversationSummary`]
//! (a compacted run of turns), and the read-time [`TieredHistory`] projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open, caller-extensible metadata attached to conversations, turns, and summaries.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Well-known metadata keys written by this crate.
pub mod keys {
    /// `false` once a turn has been folded into a summary.
    pub const IS_ACTIVE: &str = "isActive";
    /// Id of the summary that absorbed a turn.
    pub const SUMMARY_ID: &str = "summaryId";
    /// Ordered turn ids absorbed into a summary.
    pub const ORIGINAL_TURN_IDS: &str = "originalTurnIds";
    /// `true` when a summary was produced without the AI summarizer.
    pub const IS_FALLBACK: &str = "isFallback";
    /// Consolidation depth: 0 for summaries of raw turns.
    pub const LEVEL: &str = "level";
    /// Summaries merged into a consolidated summary.
    pub const CONSOLIDATED_SUMMARY_IDS: &str = "consolidatedSummaryIds";
    /// Links a synthetic turn back to the summary it stands in for.
    pub const ORIGINAL_SUMMARY_ID: &str = "originalSummaryId";
    /// Caller-supplied timestamp of a turn restamped to follow summarized history.
    pub const ORIGINAL_TIMESTAMP: &str = "originalTimestamp";
    pub const TITLE: &str = "title";
}

/// The front-end a conversation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Cli,
    Matrix,
}

impl InterfaceType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Matrix => "matrix",
        }
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(Self::Cli),
            "matrix" => Ok(Self::Matrix),
            _ => Err(format!("unknown interface type: {s}")),
        }
    }
}

/// A conversation, one per `(room_id, interface_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub interface_type: InterfaceType,
    /// External channel identifier: a Matrix room id or a CLI session name.
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Title, highlights, linked note ids, and anything else callers attach.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Conversation {
    /// The `title` metadata entry, if it is a string.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get(keys::TITLE).and_then(|v| v.as_str())
    }
}

/// Input for creating a conversation. The storage layer assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub interface_type: InterfaceType,
    pub room_id: String,
    pub metadata: Metadata,
}

/// One query/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    /// User utterance. Empty for assistant-authored turns.
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ConversationTurn {
    /// A turn is active until it is explicitly flagged `isActive: false`.
    pub fn is_active(&self) -> bool {
        self.metadata
            .get(keys::IS_ACTIVE)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// Response text, or `""` when the turn has none.
    pub fn response_text(&self) -> &str {
        self.response.as_deref().unwrap_or("")
    }

    /// Rough token count (4 characters per token) of query plus response.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.query) + estimate_tokens(self.response_text())
    }
}

/// Input for appending a turn. Missing timestamps default to now.
#[derive(Debug, Clone, Default)]
pub struct NewTurn {
    pub query: String,
    pub response: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl NewTurn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: Some(response.into()),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_name = Some(user_name.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A condensed run of consecutive turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub conversation_id: String,
    /// Natural-language summary, about 250 words at most.
    pub content: String,
    /// Position of the first covered turn in the conversation's full turn order.
    pub start_turn_index: usize,
    /// Position of the last covered turn (inclusive).
    pub end_turn_index: usize,
    pub start_turn_id: String,
    pub end_turn_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    /// Number of raw turns this summary stands in for.
    pub turn_count: usize,
    /// Always carries `originalTurnIds`; `isFallback` and `level` are set by the manager.
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Ordered ids of the raw turns folded into this summary.
    pub fn original_turn_ids(&self) -> Vec<String> {
        self.metadata
            .get(keys::ORIGINAL_TURN_IDS)
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get(keys::IS_FALLBACK)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn level(&self) -> u64 {
        self.metadata
            .get(keys::LEVEL)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }
}

/// Three-way partition of a conversation's history, recomputed on each read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TieredHistory {
    /// Turns not yet summarized, oldest first.
    pub active_turns: Vec<ConversationTurn>,
    /// Summaries in chronological order.
    pub summaries: Vec<ConversationSummary>,
    /// Summarized turns whose raw text is kept for audit.
    pub archived_turns: Vec<ConversationTurn>,
}

/// Filter, sort, and pagination for conversation lookups.
#[derive(Debug, Clone, Default)]
pub struct ConversationQuery {
    pub interface_type: Option<InterfaceType>,
    pub room_id: Option<String>,
    /// ASCII case-insensitive match against the title or any turn's text.
    /// Non-ASCII letters must match exactly.
    pub text: Option<String>,
    /// Only conversations updated at or after this instant.
    pub start_date: Option<DateTime<Utc>>,
    /// Only conversations updated at or before this instant.
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Per-tier counts for one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub total_turns: usize,
    pub active_turns: usize,
    pub archived_turns: usize,
    pub summaries: usize,
    pub fallback_summaries: usize,
    pub estimated_active_tokens: usize,
}

/// Same heuristic the search budget uses: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn_with(metadata: serde_json::Value) -> ConversationTurn {
        ConversationTurn {
            id: "t1".into(),
            conversation_id: "c1".into(),
            timestamp: Utc::now(),
            query: "hello".into(),
            response: None,
            user_id: None,
            user_name: None,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn interface_type_parses_and_displays() {
        assert_eq!("cli".parse::<InterfaceType>().unwrap(), InterfaceType::Cli);
        assert_eq!("matrix".parse::<InterfaceType>().unwrap(), InterfaceType::Matrix);
        assert!("irc".parse::<InterfaceType>().is_err());
        assert_eq!(InterfaceType::Matrix.to_string(), "matrix");
    }

    #[test]
    fn turns_are_active_unless_flagged() {
        assert!(turn_with(json!({})).is_active());
        assert!(turn_with(json!({"isActive": true})).is_active());
        assert!(!turn_with(json!({"isActive": false})).is_active());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
