//! Conversation memory service: the write path and tiered reads.
//!
//! Thin orchestration over [`ConversationStorage`] and [`TieredMemoryManager`].
//! Adding a turn persists it and then runs the threshold check, so callers never
//! schedule compaction themselves.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::storage::ConversationStorage;
use super::tiered::TieredMemoryManager;
use super::types::{
    keys, Conversation, ConversationStats, ConversationSummary, ConversationTurn, InterfaceType,
    Metadata, NewConversation, NewTurn, TieredHistory,
};
use crate::error::{require_id, BrainError, Result};

pub struct ConversationMemoryService {
    storage: Arc<dyn ConversationStorage>,
    manager: Arc<TieredMemoryManager>,
    /// Serializes room lookups so two first messages in a room share one conversation.
    room_lock: tokio::sync::Mutex<()>,
}

impl ConversationMemoryService {
    pub fn new(storage: Arc<dyn ConversationStorage>, manager: Arc<TieredMemoryManager>) -> Self {
        Self {
            storage,
            manager,
            room_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn manager(&self) -> &Arc<TieredMemoryManager> {
        &self.manager
    }

    // ── Conversations ───────────────────────────────────────────────────────

    pub async fn create_conversation(
        &self,
        interface_type: InterfaceType,
        room_id: &str,
        metadata: Metadata,
    ) -> Result<Conversation> {
        require_id("room", room_id)?;
        let conversation = self
            .storage
            .create_conversation(NewConversation {
                interface_type,
                room_id: room_id.to_string(),
                metadata,
            })
            .await?;
        info!(
            conversation_id = %conversation.id,
            room_id = %room_id,
            interface = %interface_type,
            "conversation created"
        );
        Ok(conversation)
    }

    /// Look up the conversation for a room, creating it on first use.
    ///
    /// `title` is recorded as metadata only when a new conversation is created.
    pub async fn get_or_create_conversation_for_room(
        &self,
        room_id: &str,
        interface_type: InterfaceType,
        title: Option<&str>,
    ) -> Result<Conversation> {
        require_id("room", room_id)?;
        let _guard = self.room_lock.lock().await;

        if let Some(existing) = self
            .storage
            .get_conversation_by_room(room_id, interface_type)
            .await?
        {
            debug!(conversation_id = %existing.id, room_id = %room_id, "reusing room conversation");
            return Ok(existing);
        }

        let mut metadata = Metadata::new();
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            metadata.insert(keys::TITLE.into(), title.into());
        }
        self.create_conversation(interface_type, room_id, metadata)
            .await
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        require_id("conversation", conversation_id)?;
        self.storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| BrainError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Delete a conversation with its turns and summaries.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        require_id("conversation", conversation_id)?;
        if !self.storage.delete_conversation(conversation_id).await? {
            return Err(BrainError::ConversationNotFound(conversation_id.to_string()));
        }
        self.manager.forget(conversation_id);
        info!(conversation_id = %conversation_id, "conversation deleted");
        Ok(())
    }

    pub async fn update_metadata(&self, conversation_id: &str, patch: &Metadata) -> Result<()> {
        require_id("conversation", conversation_id)?;
        self.storage.update_metadata(conversation_id, patch).await
    }

    pub async fn get_metadata(&self, conversation_id: &str) -> Result<Metadata> {
        require_id("conversation", conversation_id)?;
        self.storage.get_metadata(conversation_id).await
    }

    // ── Turns ───────────────────────────────────────────────────────────────

    /// Persist a turn, then compact if the active tier is over threshold.
    ///
    /// Returns the turn as stored, which may carry a later timestamp than the one
    /// requested (see [`TieredMemoryManager::record_turn`]). A turn needs a query
    /// or a response.
    pub async fn add_turn(&self, conversation_id: &str, new: NewTurn) -> Result<ConversationTurn> {
        require_id("conversation", conversation_id)?;
        if new.query.trim().is_empty()
            && new.response.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(BrainError::validation(
                "turn must have a query or a response",
            ));
        }
        self.get_conversation(conversation_id).await?;

        let turn = ConversationTurn {
            id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            timestamp: new.timestamp.unwrap_or_else(Utc::now),
            query: new.query,
            response: new.response,
            user_id: new.user_id,
            user_name: new.user_name,
            metadata: new.metadata,
        };
        let turn = self.manager.record_turn(turn).await?;
        debug!(conversation_id = %conversation_id, turn_id = %turn.id, "turn added");

        self.manager.check_and_summarize(conversation_id).await?;
        Ok(turn)
    }

    pub async fn get_turns(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>> {
        self.get_conversation(conversation_id).await?;
        self.storage.get_turns(conversation_id, limit, offset).await
    }

    pub async fn get_summaries(&self, conversation_id: &str) -> Result<Vec<ConversationSummary>> {
        self.get_conversation(conversation_id).await?;
        self.storage.get_summaries(conversation_id).await
    }

    // ── Tiering ─────────────────────────────────────────────────────────────

    pub async fn force_summarize(&self, conversation_id: &str) -> Result<bool> {
        self.manager.force_summarize(conversation_id).await
    }

    pub async fn get_tiered_history(&self, conversation_id: &str) -> Result<TieredHistory> {
        self.manager.get_tiered_history(conversation_id).await
    }

    pub async fn format_history_for_prompt(
        &self,
        conversation_id: &str,
        max_tokens: Option<usize>,
    ) -> Result<String> {
        self.manager
            .format_history_for_prompt(conversation_id, max_tokens)
            .await
    }

    /// The archived raw turns a summary stands in for, in original order.
    pub async fn expand_summary(
        &self,
        conversation_id: &str,
        summary_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        require_id("summary", summary_id)?;
        let summary = self
            .get_summaries(conversation_id)
            .await?
            .into_iter()
            .find(|s| s.id == summary_id)
            .ok_or_else(|| BrainError::SummaryNotFound {
                conversation_id: conversation_id.to_string(),
                summary_id: summary_id.to_string(),
            })?;

        let mut by_id: HashMap<String, ConversationTurn> = self
            .storage
            .get_turns(conversation_id, None, None)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        summary
            .original_turn_ids()
            .into_iter()
            .map(|turn_id| {
                by_id.remove(&turn_id).ok_or(BrainError::TurnNotFound {
                    conversation_id: conversation_id.to_string(),
                    turn_id,
                })
            })
            .collect()
    }

    pub async fn conversation_stats(&self, conversation_id: &str) -> Result<ConversationStats> {
        let history = self.get_tiered_history(conversation_id).await?;
        Ok(ConversationStats {
            conversation_id: conversation_id.to_string(),
            total_turns: history.active_turns.len() + history.archived_turns.len(),
            active_turns: history.active_turns.len(),
            archived_turns: history.archived_turns.len(),
            summaries: history.summaries.len(),
            fallback_summaries: history.summaries.iter().filter(|s| s.is_fallback()).count(),
            estimated_active_tokens: history
                .active_turns
                .iter()
                .map(ConversationTurn::estimated_tokens)
                .sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::conversation::memory_storage::InMemoryConversationStorage;
    use crate::summarizer::FallbackSummarizer;

    fn service(max_active_turns: usize, summary_turn_count: usize) -> ConversationMemoryService {
        let storage: Arc<dyn ConversationStorage> = Arc::new(InMemoryConversationStorage::new());
        let config = MemoryConfig {
            max_active_turns,
            summary_turn_count,
            ..Default::default()
        };
        let manager = Arc::new(TieredMemoryManager::new(
            Arc::clone(&storage),
            Arc::new(FallbackSummarizer),
            config,
        ));
        ConversationMemoryService::new(storage, manager)
    }

    #[tokio::test]
    async fn empty_turn_is_rejected() {
        let svc = service(10, 5);
        let conv = svc
            .create_conversation(InterfaceType::Cli, "s1", Metadata::new())
            .await
            .unwrap();
        let err = svc
            .add_turn(&conv.id, NewTurn::new("  ", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::Validation(_)));
        assert!(svc.get_turns(&conv.id, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_turn_to_unknown_conversation_is_not_found() {
        let svc = service(10, 5);
        let err = svc
            .add_turn("missing", NewTurn::new("hi", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::ConversationNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn room_title_recorded_on_create_only() {
        let svc = service(10, 5);
        let first = svc
            .get_or_create_conversation_for_room("!room:example.org", InterfaceType::Matrix, Some("Garden"))
            .await
            .unwrap();
        let second = svc
            .get_or_create_conversation_for_room("!room:example.org", InterfaceType::Matrix, Some("Other"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title(), Some("Garden"));
    }

    #[tokio::test]
    async fn expand_summary_returns_archived_turns_in_order() {
        let svc = service(2, 2);
        let conv = svc
            .create_conversation(InterfaceType::Cli, "s1", Metadata::new())
            .await
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..3 {
            let turn = svc
                .add_turn(&conv.id, NewTurn::new(format!("q{i}"), format!("a{i}")))
                .await
                .unwrap();
            ids.push(turn.id);
        }

        let summaries = svc.get_summaries(&conv.id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        let expanded = svc.expand_summary(&conv.id, &summaries[0].id).await.unwrap();
        let expanded_ids: Vec<_> = expanded.iter().map(|t| t.id.clone()).collect();
        assert_eq!(expanded_ids, ids[..2].to_vec());
        assert!(expanded.iter().all(|t| !t.is_active()));

        let err = svc.expand_summary(&conv.id, "nope").await.unwrap_err();
        assert!(matches!(err, BrainError::SummaryNotFound { .. }));
    }

    #[tokio::test]
    async fn stats_count_each_tier() {
        let svc = service(2, 1);
        let conv = svc
            .create_conversation(InterfaceType::Cli, "s1", Metadata::new())
            .await
            .unwrap();
        for i in 0..4 {
            svc.add_turn(&conv.id, NewTurn::new(format!("question {i}"), "ok"))
                .await
                .unwrap();
        }
        let stats = svc.conversation_stats(&conv.id).await.unwrap();
        assert_eq!(stats.total_turns, 4);
        assert_eq!(stats.active_turns, 2);
        assert_eq!(stats.archived_turns, 2);
        assert_eq!(stats.summaries, 2);
        // The offline summarizer is not AI-backed, so its summaries are flagged.
        assert_eq!(stats.fallback_summaries, 2);
        assert!(stats.estimated_active_tokens > 0);
    }

    #[tokio::test]
    async fn delete_missing_conversation_is_not_found() {
        let svc = service(10, 5);
        let conv = svc
            .create_conversation(InterfaceType::Cli, "s1", Metadata::new())
            .await
            .unwrap();
        svc.delete_conversation(&conv.id).await.unwrap();
        let err = svc.delete_conversation(&conv.id).await.unwrap_err();
        assert!(matches!(err, BrainError::ConversationNotFound(_)));
    }
}
