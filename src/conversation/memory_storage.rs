//! In-process [`ConversationStorage`] backed by hash maps.
//!
//! Used by tests and by the `memory` storage backend. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::storage::{merge_metadata, ConversationStorage};
use super::types::{
    Conversation, ConversationQuery, ConversationSummary, ConversationTurn, InterfaceType,
    Metadata, NewConversation,
};
use crate::error::{BrainError, Result};

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    turns: HashMap<String, Vec<ConversationTurn>>,
    summaries: HashMap<String, Vec<ConversationSummary>>,
}

impl Inner {
    fn conversation_mut(&mut self, conversation_id: &str) -> Result<&mut Conversation> {
        self.conversations
            .get_mut(conversation_id)
            .ok_or_else(|| BrainError::ConversationNotFound(conversation_id.to_string()))
    }

    fn require(&self, conversation_id: &str) -> Result<()> {
        if self.conversations.contains_key(conversation_id) {
            Ok(())
        } else {
            Err(BrainError::ConversationNotFound(conversation_id.to_string()))
        }
    }

    /// ASCII case folding, matching SQLite's `LOWER`.
    fn matches_text(&self, conversation: &Conversation, needle: &str) -> bool {
        if conversation
            .title()
            .is_some_and(|t| t.to_ascii_lowercase().contains(needle))
        {
            return true;
        }
        self.turns
            .get(&conversation.id)
            .map(|turns| {
                turns.iter().any(|t| {
                    t.query.to_ascii_lowercase().contains(needle)
                        || t.response_text().to_ascii_lowercase().contains(needle)
                })
            })
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct InMemoryConversationStorage {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStorage for InMemoryConversationStorage {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::now_v7().to_string(),
            interface_type: new.interface_type,
            room_id: new.room_id,
            created_at: now,
            updated_at: now,
            metadata: new.metadata,
        };
        let mut inner = self.inner.write().await;
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        inner.turns.insert(conversation.id.clone(), Vec::new());
        inner.summaries.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.inner.read().await.conversations.get(conversation_id).cloned())
    }

    async fn get_conversation_by_room(
        &self,
        room_id: &str,
        interface_type: InterfaceType,
    ) -> Result<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.room_id == room_id && c.interface_type == interface_type)
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.conversation_mut(&conversation.id)?;
        stored.room_id = conversation.room_id.clone();
        stored.interface_type = conversation.interface_type;
        stored.metadata = conversation.metadata.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.turns.remove(conversation_id);
        inner.summaries.remove(conversation_id);
        Ok(inner.conversations.remove(conversation_id).is_some())
    }

    async fn add_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.conversation_mut(&turn.conversation_id)?.updated_at = Utc::now();
        let turns = inner.turns.entry(turn.conversation_id.clone()).or_default();
        // Insert after every turn with an equal or earlier timestamp.
        let position = turns.partition_point(|t| t.timestamp <= turn.timestamp);
        turns.insert(position, turn.clone());
        Ok(())
    }

    async fn get_turns(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>> {
        let inner = self.inner.read().await;
        inner.require(conversation_id)?;
        let turns = inner.turns.get(conversation_id).map(Vec::as_slice).unwrap_or_default();
        Ok(turns
            .iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_turn(
        &self,
        conversation_id: &str,
        turn_id: &str,
        patch: &Metadata,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require(conversation_id)?;
        let turn = inner
            .turns
            .get_mut(conversation_id)
            .and_then(|turns| turns.iter_mut().find(|t| t.id == turn_id))
            .ok_or_else(|| BrainError::TurnNotFound {
                conversation_id: conversation_id.to_string(),
                turn_id: turn_id.to_string(),
            })?;
        merge_metadata(&mut turn.metadata, patch);
        Ok(())
    }

    async fn add_summary(&self, summary: &ConversationSummary) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require(&summary.conversation_id)?;
        let summaries = inner
            .summaries
            .entry(summary.conversation_id.clone())
            .or_default();
        summaries.push(summary.clone());
        summaries.sort_by_key(|s| s.start_turn_index);
        Ok(())
    }

    async fn get_summaries(&self, conversation_id: &str) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read().await;
        inner.require(conversation_id)?;
        Ok(inner
            .summaries
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_summaries(
        &self,
        conversation_id: &str,
        removed: &[String],
        replacement: &ConversationSummary,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require(conversation_id)?;
        let summaries = inner.summaries.entry(conversation_id.to_string()).or_default();
        summaries.retain(|s| !removed.contains(&s.id));
        summaries.push(replacement.clone());
        summaries.sort_by_key(|s| s.start_turn_index);
        Ok(())
    }

    async fn commit_summary(
        &self,
        summary: &ConversationSummary,
        turn_ids: &[String],
    ) -> Result<()> {
        // One write guard for the whole step keeps readers from seeing half a compaction.
        let mut inner = self.inner.write().await;
        inner.require(&summary.conversation_id)?;
        let patch = super::storage::archived_patch(&summary.id);
        if let Some(turns) = inner.turns.get_mut(&summary.conversation_id) {
            for turn in turns.iter_mut().filter(|t| turn_ids.contains(&t.id)) {
                merge_metadata(&mut turn.metadata, &patch);
            }
        }
        let summaries = inner
            .summaries
            .entry(summary.conversation_id.clone())
            .or_default();
        summaries.push(summary.clone());
        summaries.sort_by_key(|s| s.start_turn_index);
        Ok(())
    }

    async fn find_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let needle = query.text.as_ref().map(|t| t.to_ascii_lowercase());

        let mut matched: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| query.interface_type.map_or(true, |i| c.interface_type == i))
            .filter(|c| query.room_id.as_ref().map_or(true, |r| &c.room_id == r))
            .filter(|c| query.start_date.map_or(true, |d| c.updated_at >= d))
            .filter(|c| query.end_date.map_or(true, |d| c.updated_at <= d))
            .filter(|c| needle.as_ref().map_or(true, |n| inner.matches_text(c, n)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_metadata(&self, conversation_id: &str, patch: &Metadata) -> Result<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(conversation_id)?;
        merge_metadata(&mut conversation.metadata, patch);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn get_metadata(&self, conversation_id: &str) -> Result<Metadata> {
        let inner = self.inner.read().await;
        inner
            .conversations
            .get(conversation_id)
            .map(|c| c.metadata.clone())
            .ok_or_else(|| BrainError::ConversationNotFound(conversation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn turn(conversation_id: &str, id: &str, offset_secs: i64) -> ConversationTurn {
        ConversationTurn {
            id: id.into(),
            conversation_id: conversation_id.into(),
            timestamp: chrono::DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(offset_secs),
            query: format!("query {id}"),
            response: Some(format!("response {id}")),
            user_id: None,
            user_name: None,
            metadata: Metadata::new(),
        }
    }

    async fn storage_with_conversation() -> (InMemoryConversationStorage, String) {
        let storage = InMemoryConversationStorage::new();
        let conversation = storage
            .create_conversation(NewConversation {
                interface_type: InterfaceType::Cli,
                room_id: "room-1".into(),
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        (storage, conversation.id)
    }

    #[tokio::test]
    async fn turns_sort_by_timestamp_then_insertion() {
        let (storage, cid) = storage_with_conversation().await;
        storage.add_turn(&turn(&cid, "b", 20)).await.unwrap();
        storage.add_turn(&turn(&cid, "a", 10)).await.unwrap();
        storage.add_turn(&turn(&cid, "c", 20)).await.unwrap();

        let ids: Vec<String> = storage
            .get_turns(&cid, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn get_turns_paginates() {
        let (storage, cid) = storage_with_conversation().await;
        for i in 0..5 {
            storage.add_turn(&turn(&cid, &format!("t{i}"), i)).await.unwrap();
        }
        let page = storage.get_turns(&cid, Some(2), Some(1)).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn add_turn_to_unknown_conversation_fails() {
        let storage = InMemoryConversationStorage::new();
        let err = storage.add_turn(&turn("missing", "t1", 0)).await.unwrap_err();
        assert!(matches!(err, BrainError::ConversationNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn delete_removes_turns_and_summaries() {
        let (storage, cid) = storage_with_conversation().await;
        storage.add_turn(&turn(&cid, "t1", 0)).await.unwrap();

        assert!(storage.delete_conversation(&cid).await.unwrap());
        assert!(!storage.delete_conversation(&cid).await.unwrap());
        assert!(storage.get_conversation(&cid).await.unwrap().is_none());
        assert!(storage.get_turns(&cid, None, None).await.is_err());
    }

    #[tokio::test]
    async fn metadata_patches_merge() {
        let (storage, cid) = storage_with_conversation().await;
        let mut patch = Metadata::new();
        patch.insert("title".into(), "Trip planning".into());
        storage.update_metadata(&cid, &patch).await.unwrap();

        let mut second = Metadata::new();
        second.insert("pinned".into(), true.into());
        storage.update_metadata(&cid, &second).await.unwrap();

        let metadata = storage.get_metadata(&cid).await.unwrap();
        assert_eq!(metadata["title"], "Trip planning");
        assert_eq!(metadata["pinned"], true);
    }
}
