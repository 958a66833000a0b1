//! Tiered conversation memory.
//!
//! Keeps a bounded set of *active* turns per conversation. Once the active set
//! grows past `max_active_turns`, the oldest `summary_turn_count` active turns are
//! summarized, the summary is stored, and the turns are flagged inactive. Their
//! raw text stays in storage as the *archived* tier.
//!
//! Compaction for a conversation is serialized by a per-conversation async mutex
//! and always re-reads the active flags inside it, so racing `add_turn` calls
//! converge on one summary per batch. When the summarizer fails or times out, a
//! deterministic fallback summary (`isFallback: true`) is stored instead. Summaries
//! from a summarizer that is not AI-backed carry the same flag.
//!
//! When summaries exceed `max_summaries`, the oldest are consolidated into one
//! higher-level summary covering their combined range.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::storage::ConversationStorage;
use super::types::{
    estimate_tokens, keys, ConversationSummary, ConversationTurn, Metadata, TieredHistory,
};
use crate::config::MemoryConfig;
use crate::error::{require_id, BrainError, Result};
use crate::summarizer::{fallback_summary, Summarizer, SummarizerError};

const BLOCK_SEPARATOR: &str = "\n\n";

/// Summary text plus whether it came from the deterministic fallback.
struct SummaryText {
    content: String,
    is_fallback: bool,
}

pub struct TieredMemoryManager {
    storage: Arc<dyn ConversationStorage>,
    summarizer: Arc<dyn Summarizer>,
    config: MemoryConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TieredMemoryManager {
    pub fn new(
        storage: Arc<dyn ConversationStorage>,
        summarizer: Arc<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            storage,
            summarizer,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Batch size for one compaction pass. Never zero, or a pass could not make progress.
    fn batch_size(&self) -> usize {
        self.config.summary_turn_count.max(1)
    }

    fn conversation_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(conversation_id.to_string()).or_default())
    }

    /// Drop the compaction lock for a deleted conversation.
    pub fn forget(&self, conversation_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(conversation_id);
    }

    async fn require_conversation(&self, conversation_id: &str) -> Result<()> {
        require_id("conversation", conversation_id)?;
        match self.storage.get_conversation(conversation_id).await? {
            Some(_) => Ok(()),
            None => Err(BrainError::ConversationNotFound(conversation_id.to_string())),
        }
    }

    // ── Turns ───────────────────────────────────────────────────────────────

    /// Persist a turn under the conversation lock.
    ///
    /// Archived turns always precede active ones, so a turn stamped earlier than
    /// the end of the newest summary is moved up to that instant. The original
    /// stamp is kept in `originalTimestamp` metadata.
    pub async fn record_turn(&self, mut turn: ConversationTurn) -> Result<ConversationTurn> {
        require_id("conversation", &turn.conversation_id)?;
        let lock = self.conversation_lock(&turn.conversation_id);
        let _guard = lock.lock().await;

        let floor = self
            .storage
            .get_summaries(&turn.conversation_id)
            .await?
            .iter()
            .map(|s| s.end_timestamp)
            .max();
        if let Some(floor) = floor.filter(|floor| turn.timestamp < *floor) {
            debug!(
                conversation_id = %turn.conversation_id,
                turn_id = %turn.id,
                "turn predates summarized history, restamping"
            );
            turn.metadata.insert(
                keys::ORIGINAL_TIMESTAMP.into(),
                json!(turn.timestamp.to_rfc3339()),
            );
            turn.timestamp = floor;
        }

        self.storage.add_turn(&turn).await?;
        Ok(turn)
    }

    // ── Compaction ──────────────────────────────────────────────────────────

    /// Summarize the oldest active turns while the active set is over
    /// `max_active_turns`. Returns whether any summary was written.
    pub async fn check_and_summarize(&self, conversation_id: &str) -> Result<bool> {
        self.require_conversation(conversation_id).await?;

        let lock = self.conversation_lock(conversation_id);
        let _guard = lock.lock().await;

        let mut summarized = false;
        loop {
            let turns = self.storage.get_turns(conversation_id, None, None).await?;
            let active: Vec<&ConversationTurn> = turns.iter().filter(|t| t.is_active()).collect();
            if active.len() <= self.config.max_active_turns {
                break;
            }

            let batch: Vec<ConversationTurn> = active
                .into_iter()
                .take(self.batch_size())
                .cloned()
                .collect();
            debug!(
                conversation_id = %conversation_id,
                batch = batch.len(),
                "active turns over threshold, compacting"
            );
            self.compact(conversation_id, &turns, batch).await?;
            summarized = true;
        }

        if summarized {
            self.enforce_summary_cap(conversation_id).await?;
        }
        Ok(summarized)
    }

    /// Fold every active turn into a single summary regardless of threshold.
    /// Returns `false` when there is nothing active to summarize.
    pub async fn force_summarize(&self, conversation_id: &str) -> Result<bool> {
        self.require_conversation(conversation_id).await?;

        let lock = self.conversation_lock(conversation_id);
        let _guard = lock.lock().await;

        let turns = self.storage.get_turns(conversation_id, None, None).await?;
        let active: Vec<ConversationTurn> = turns.iter().filter(|t| t.is_active()).cloned().collect();
        if active.is_empty() {
            debug!(conversation_id = %conversation_id, "force summarize: no active turns");
            return Ok(false);
        }

        self.compact(conversation_id, &turns, active).await?;
        self.enforce_summary_cap(conversation_id).await?;
        Ok(true)
    }

    /// Summarize `batch` (a run of active turns, oldest first) and archive it.
    async fn compact(
        &self,
        conversation_id: &str,
        all_turns: &[ConversationTurn],
        batch: Vec<ConversationTurn>,
    ) -> Result<ConversationSummary> {
        let (first, last) = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(BrainError::validation("cannot summarize an empty batch")),
        };
        let index_of = |id: &str| all_turns.iter().position(|t| t.id == id).unwrap_or(0);

        let text = self.summarize_with_fallback(conversation_id, &batch).await;
        let turn_ids: Vec<String> = batch.iter().map(|t| t.id.clone()).collect();

        let mut metadata = Metadata::new();
        metadata.insert(keys::ORIGINAL_TURN_IDS.into(), json!(turn_ids));
        metadata.insert(keys::IS_FALLBACK.into(), json!(text.is_fallback));
        metadata.insert(keys::LEVEL.into(), json!(0));
        metadata.insert("summarizer".into(), json!(self.summarizer_label(text.is_fallback)));

        let summary = ConversationSummary {
            id: uuid::Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            content: text.content,
            start_turn_index: index_of(&first.id),
            end_turn_index: index_of(&last.id),
            start_turn_id: first.id.clone(),
            end_turn_id: last.id.clone(),
            start_timestamp: first.timestamp,
            end_timestamp: last.timestamp,
            turn_count: batch.len(),
            metadata,
            created_at: Utc::now(),
        };

        self.storage.commit_summary(&summary, &turn_ids).await?;

        info!(
            conversation_id = %conversation_id,
            summary_id = %summary.id,
            turns = summary.turn_count,
            fallback = text.is_fallback,
            "turns summarized"
        );
        Ok(summary)
    }

    fn summarizer_label(&self, is_fallback: bool) -> String {
        if is_fallback {
            "fallback".to_string()
        } else {
            self.summarizer.name().to_string()
        }
    }

    /// Call the summarizer under the configured timeout. Any error, timeout, or
    /// blank result yields the deterministic summary instead.
    async fn summarize_with_fallback(
        &self,
        conversation_id: &str,
        turns: &[ConversationTurn],
    ) -> SummaryText {
        let timeout = self.config.summarizer_timeout();
        let outcome = match tokio::time::timeout(timeout, self.summarizer.summarize_turns(turns)).await
        {
            Ok(Ok(content)) if !content.trim().is_empty() => {
                return SummaryText {
                    content: content.trim().to_string(),
                    is_fallback: !self.summarizer.is_ai(),
                }
            }
            Ok(Ok(_)) => SummarizerError::EmptyResponse,
            Ok(Err(e)) => e,
            Err(_) => SummarizerError::Timeout(timeout),
        };

        warn!(
            conversation_id = %conversation_id,
            turns = turns.len(),
            error = %outcome,
            "summarizer failed, using fallback summary"
        );
        SummaryText {
            content: fallback_summary(turns),
            is_fallback: true,
        }
    }

    /// Consolidate the oldest summaries while there are more than `max_summaries`.
    async fn enforce_summary_cap(&self, conversation_id: &str) -> Result<()> {
        let max = self.config.max_summaries.max(1);
        let summaries = self.storage.get_summaries(conversation_id).await?;
        if summaries.len() <= max {
            return Ok(());
        }

        // Merging the oldest (len - max + 1) leaves exactly `max`.
        let merge_count = summaries.len() - max + 1;
        let merged = &summaries[..merge_count];
        self.consolidate(conversation_id, merged).await
    }

    async fn consolidate(&self, conversation_id: &str, merged: &[ConversationSummary]) -> Result<()> {
        let (first, last) = match (merged.first(), merged.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(()),
        };

        // The summarizer works on turns, so each summary stands in as one assistant turn.
        let synthetic: Vec<ConversationTurn> = merged
            .iter()
            .map(|s| {
                let mut metadata = Metadata::new();
                metadata.insert(keys::ORIGINAL_SUMMARY_ID.into(), json!(s.id));
                ConversationTurn {
                    id: format!("summary:{}", s.id),
                    conversation_id: conversation_id.to_string(),
                    timestamp: s.start_timestamp,
                    query: String::new(),
                    response: Some(s.content.clone()),
                    user_id: Some("assistant".into()),
                    user_name: Some("assistant".into()),
                    metadata,
                }
            })
            .collect();

        let text = self.summarize_with_fallback(conversation_id, &synthetic).await;

        let original_turn_ids: Vec<String> =
            merged.iter().flat_map(|s| s.original_turn_ids()).collect();
        let removed: Vec<String> = merged.iter().map(|s| s.id.clone()).collect();
        let level = merged.iter().map(|s| s.level()).max().unwrap_or(0) + 1;

        let mut metadata = Metadata::new();
        metadata.insert(keys::ORIGINAL_TURN_IDS.into(), json!(original_turn_ids));
        metadata.insert(keys::IS_FALLBACK.into(), json!(text.is_fallback));
        metadata.insert(keys::LEVEL.into(), json!(level));
        metadata.insert(keys::CONSOLIDATED_SUMMARY_IDS.into(), json!(removed));
        metadata.insert("summarizer".into(), json!(self.summarizer_label(text.is_fallback)));

        let replacement = ConversationSummary {
            id: uuid::Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            content: text.content,
            start_turn_index: first.start_turn_index,
            end_turn_index: last.end_turn_index,
            start_turn_id: first.start_turn_id.clone(),
            end_turn_id: last.end_turn_id.clone(),
            start_timestamp: first.start_timestamp,
            end_timestamp: last.end_timestamp,
            turn_count: merged.iter().map(|s| s.turn_count).sum(),
            metadata,
            created_at: Utc::now(),
        };

        self.storage
            .replace_summaries(conversation_id, &removed, &replacement)
            .await?;

        info!(
            conversation_id = %conversation_id,
            summary_id = %replacement.id,
            merged = removed.len(),
            level,
            "summaries consolidated"
        );
        Ok(())
    }

    // ── Views ───────────────────────────────────────────────────────────────

    /// Recompute the active / summarized / archived partition from storage.
    pub async fn get_tiered_history(&self, conversation_id: &str) -> Result<TieredHistory> {
        self.require_conversation(conversation_id).await?;

        let turns = self.storage.get_turns(conversation_id, None, None).await?;
        let summaries = self.storage.get_summaries(conversation_id).await?;
        let (active_turns, archived_turns): (Vec<_>, Vec<_>) =
            turns.into_iter().partition(ConversationTurn::is_active);

        Ok(TieredHistory {
            active_turns,
            summaries,
            archived_turns,
        })
    }

    /// History as prompt text: summaries first, then active turns verbatim.
    ///
    /// Whole entries are dropped from the oldest end until the joined text fits
    /// `max_tokens`, or [`MemoryConfig::prompt_token_budget`] when none is given.
    /// Entries are never cut mid-turn.
    pub async fn format_history_for_prompt(
        &self,
        conversation_id: &str,
        max_tokens: Option<usize>,
    ) -> Result<String> {
        let history = self.get_tiered_history(conversation_id).await?;
        let budget = max_tokens.unwrap_or_else(|| self.config.prompt_token_budget());

        let blocks: Vec<String> = history
            .summaries
            .iter()
            .map(prompt_summary_block)
            .chain(history.active_turns.iter().map(prompt_turn_block))
            .filter(|block| !block.is_empty())
            .collect();

        let mut dropped = 0usize;
        while dropped < blocks.len()
            && estimate_tokens(&blocks[dropped..].join(BLOCK_SEPARATOR)) > budget
        {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(
                conversation_id = %conversation_id,
                dropped,
                budget,
                "trimmed prompt history to token budget"
            );
        }

        Ok(blocks[dropped..].join(BLOCK_SEPARATOR))
    }
}

fn prompt_summary_block(summary: &ConversationSummary) -> String {
    format!(
        "[Summary of turns {}-{}]\n{}",
        summary.start_turn_index + 1,
        summary.end_turn_index + 1,
        summary.content
    )
}

fn prompt_turn_block(turn: &ConversationTurn) -> String {
    let speaker = turn
        .user_name
        .as_deref()
        .or(turn.user_id.as_deref())
        .unwrap_or("User");
    let mut lines = Vec::with_capacity(2);
    if !turn.query.is_empty() {
        lines.push(format!("{speaker}: {}", turn.query));
    }
    if !turn.response_text().is_empty() {
        lines.push(format!("Assistant: {}", turn.response_text()));
    }
    lines.join("\n")
}
