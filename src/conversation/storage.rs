//! The storage contract the conversation core is written against.
//!
//! Implementations: [`super::memory_storage::InMemoryConversationStorage`] and
//! [`super::sqlite_storage::SqliteConversationStorage`]. Any type satisfying
//! [`ConversationStorage`] can back the services.

use async_trait::async_trait;

use super::types::{
    Conversation, ConversationQuery, ConversationSummary, ConversationTurn, InterfaceType,
    Metadata, NewConversation,
};
use crate::error::Result;

/// CRUD over conversations, their turns, and their summaries.
///
/// Turns come back ordered by `timestamp`, ties in insertion order. Summaries come
/// back ordered by `start_turn_index`. Operations on an unknown conversation return
/// [`crate::error::BrainError::ConversationNotFound`].
#[async_trait]
pub trait ConversationStorage: Send + Sync {
    /// Persist a new conversation with a fresh id and `created_at = updated_at = now`.
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn get_conversation_by_room(
        &self,
        room_id: &str,
        interface_type: InterfaceType,
    ) -> Result<Option<Conversation>>;

    /// Overwrite room, interface, and metadata, bumping `updated_at`.
    async fn update_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Remove a conversation with all of its turns and summaries.
    /// Returns `false` if it did not exist.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool>;

    /// Append a turn and bump the conversation's `updated_at`.
    async fn add_turn(&self, turn: &ConversationTurn) -> Result<()>;

    async fn get_turns(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>>;

    /// Merge `patch` into a turn's metadata. Other turn fields are immutable.
    async fn update_turn(&self, conversation_id: &str, turn_id: &str, patch: &Metadata)
        -> Result<()>;

    async fn add_summary(&self, summary: &ConversationSummary) -> Result<()>;

    async fn get_summaries(&self, conversation_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Swap the summaries named in `removed` for `replacement` in one step.
    async fn replace_summaries(
        &self,
        conversation_id: &str,
        removed: &[String],
        replacement: &ConversationSummary,
    ) -> Result<()>;

    /// Persist a summary and flag every turn in `turn_ids` inactive.
    ///
    /// The default runs the steps one by one, summary first, so a failure part-way
    /// leaves turns duplicated across tiers rather than lost. Backends with
    /// transactions should override it.
    async fn commit_summary(
        &self,
        summary: &ConversationSummary,
        turn_ids: &[String],
    ) -> Result<()> {
        self.add_summary(summary).await?;
        let patch = archived_patch(&summary.id);
        for turn_id in turn_ids {
            self.update_turn(&summary.conversation_id, turn_id, &patch)
                .await?;
        }
        Ok(())
    }

    /// Filtered, newest-first listing.
    async fn find_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>>;

    async fn get_recent_conversations(
        &self,
        limit: usize,
        interface_type: Option<InterfaceType>,
    ) -> Result<Vec<Conversation>> {
        self.find_conversations(&ConversationQuery {
            interface_type,
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }

    /// Merge `patch` into the conversation's metadata.
    async fn update_metadata(&self, conversation_id: &str, patch: &Metadata) -> Result<()>;

    async fn get_metadata(&self, conversation_id: &str) -> Result<Metadata>;
}

/// Metadata patch applied to turns absorbed into `summary_id`.
pub fn archived_patch(summary_id: &str) -> Metadata {
    let mut patch = Metadata::new();
    patch.insert(super::types::keys::IS_ACTIVE.into(), false.into());
    patch.insert(super::types::keys::SUMMARY_ID.into(), summary_id.into());
    patch
}

/// Shallow merge: keys in `patch` overwrite keys in `target`.
pub fn merge_metadata(target: &mut Metadata, patch: &Metadata) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}
