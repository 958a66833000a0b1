//! Read-side queries: listings, formatted history, and export.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use super::formatter::{ConversationFormatter, FormatOptions, OutputFormat};
use super::storage::ConversationStorage;
use super::tiered::TieredMemoryManager;
use super::types::{
    Conversation, ConversationQuery, ConversationSummary, ConversationTurn, InterfaceType,
};
use crate::error::{require_id, BrainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(format!("unknown export format: {s}. Supported: json, markdown")),
        }
    }
}

/// Lossless export shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExport {
    pub conversation: Conversation,
    pub turns: Vec<ConversationTurn>,
    pub summaries: Vec<ConversationSummary>,
}

/// What [`ConversationQueryService::get_conversation_history`] renders.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    pub format: FormatOptions,
    /// Keep only the newest N turns.
    pub max_turns: Option<usize>,
    /// Include archived turns next to the summaries that replaced them.
    pub include_archived: bool,
}

pub struct ConversationQueryService {
    storage: Arc<dyn ConversationStorage>,
    manager: Arc<TieredMemoryManager>,
    formatter: ConversationFormatter,
}

impl ConversationQueryService {
    pub fn new(storage: Arc<dyn ConversationStorage>, manager: Arc<TieredMemoryManager>) -> Self {
        Self {
            storage,
            manager,
            formatter: ConversationFormatter::new(),
        }
    }

    pub async fn find_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        self.storage.find_conversations(query).await
    }

    pub async fn get_recent_conversations(
        &self,
        limit: usize,
        interface_type: Option<InterfaceType>,
    ) -> Result<Vec<Conversation>> {
        self.storage
            .get_recent_conversations(limit, interface_type)
            .await
    }

    /// Render a conversation's history: summaries plus active turns, or the
    /// full turn log when `include_archived` is set.
    pub async fn get_conversation_history(
        &self,
        conversation_id: &str,
        options: &HistoryOptions,
    ) -> Result<String> {
        let history = self.manager.get_tiered_history(conversation_id).await?;

        let mut turns = if options.include_archived {
            let mut all = history.archived_turns;
            all.extend(history.active_turns);
            all.sort_by_key(|t| t.timestamp);
            all
        } else {
            history.active_turns
        };
        if let Some(max) = options.max_turns {
            let skip = turns.len().saturating_sub(max);
            turns.drain(..skip);
        }

        self.formatter
            .format(&turns, &history.summaries, &options.format)
    }

    /// Export a conversation as lossless JSON or readable markdown.
    pub async fn export_conversation(
        &self,
        conversation_id: &str,
        format: ExportFormat,
    ) -> Result<String> {
        require_id("conversation", conversation_id)?;
        let conversation = self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| BrainError::ConversationNotFound(conversation_id.to_string()))?;
        let turns = self.storage.get_turns(conversation_id, None, None).await?;
        let summaries = self.storage.get_summaries(conversation_id).await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            format = format.as_str(),
            turns = turns.len(),
            summaries = summaries.len(),
            "exporting conversation"
        );

        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&ConversationExport {
                conversation,
                turns,
                summaries,
            })?),
            ExportFormat::Markdown => self.export_markdown(&conversation, turns, &summaries),
        }
    }

    fn export_markdown(
        &self,
        conversation: &Conversation,
        turns: Vec<ConversationTurn>,
        summaries: &[ConversationSummary],
    ) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# {}\n",
            conversation.title().unwrap_or("Conversation")
        );
        let _ = writeln!(out, "- **ID**: {}", conversation.id);
        let _ = writeln!(out, "- **Interface**: {}", conversation.interface_type);
        let _ = writeln!(out, "- **Room**: {}", conversation.room_id);
        let _ = writeln!(out, "- **Created**: {}", conversation.created_at.to_rfc3339());
        let _ = writeln!(out, "- **Updated**: {}", conversation.updated_at.to_rfc3339());

        let (active, archived): (Vec<_>, Vec<_>) =
            turns.into_iter().partition(ConversationTurn::is_active);
        let options = FormatOptions {
            format: OutputFormat::Markdown,
            include_timestamps: true,
            ..Default::default()
        };

        let body = self.formatter.format(&active, summaries, &options)?;
        if !body.is_empty() {
            let _ = write!(out, "\n## History\n\n{body}\n");
        }

        if !archived.is_empty() {
            let archived_options = FormatOptions {
                include_summaries: false,
                ..options
            };
            let body = self.formatter.format(&archived, &[], &archived_options)?;
            let _ = write!(out, "\n## Archived turns\n\n{body}\n");
        }

        Ok(out)
    }
}
