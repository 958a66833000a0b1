//! Composition root: builds storage, summarizer, and services once from config.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{BrainConfig, MemoryConfig};
use crate::conversation::{
    ConversationMemoryService, ConversationQueryService, ConversationStorage,
    InMemoryConversationStorage, SqliteConversationStorage, TieredMemoryManager,
};
use crate::summarizer::{create_summarizer, Summarizer};

/// The wired conversation memory: one write-side and one read-side service
/// sharing the same storage and tier manager.
pub struct Brain {
    pub memory: ConversationMemoryService,
    pub query: ConversationQueryService,
}

impl Brain {
    /// Open the configured storage backend and summarizer.
    pub fn open(config: &BrainConfig) -> Result<Self> {
        let storage: Arc<dyn ConversationStorage> = match config.storage.backend.as_str() {
            "sqlite" => {
                let db_path = config.resolved_db_path();
                let conn = crate::db::open_database(&db_path)
                    .with_context(|| format!("failed to open {}", db_path.display()))?;
                Arc::new(SqliteConversationStorage::new(conn))
            }
            "memory" => Arc::new(InMemoryConversationStorage::new()),
            other => anyhow::bail!("unknown storage backend: {other}. Supported: sqlite, memory"),
        };
        let summarizer = create_summarizer(&config.summarizer)?;

        info!(
            backend = %config.storage.backend,
            summarizer = summarizer.name(),
            max_active_turns = config.memory.max_active_turns,
            "brain ready"
        );
        Ok(Self::from_parts(storage, summarizer, config.memory.clone()))
    }

    pub fn from_parts(
        storage: Arc<dyn ConversationStorage>,
        summarizer: Arc<dyn Summarizer>,
        memory: MemoryConfig,
    ) -> Self {
        let manager = Arc::new(TieredMemoryManager::new(
            Arc::clone(&storage),
            summarizer,
            memory,
        ));
        Self {
            memory: ConversationMemoryService::new(Arc::clone(&storage), Arc::clone(&manager)),
            query: ConversationQueryService::new(storage, manager),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::types::{InterfaceType, NewTurn};

    #[tokio::test]
    async fn opens_in_memory_backend() {
        let mut config = BrainConfig::default();
        config.storage.backend = "memory".into();
        config.summarizer.provider = "fallback".into();

        let brain = Brain::open(&config).unwrap();
        let conv = brain
            .memory
            .get_or_create_conversation_for_room("session", InterfaceType::Cli, None)
            .await
            .unwrap();
        brain
            .memory
            .add_turn(&conv.id, NewTurn::new("hello", "hi"))
            .await
            .unwrap();
        let recent = brain.query.get_recent_conversations(5, None).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = BrainConfig::default();
        config.storage.backend = "redis".into();
        config.summarizer.provider = "fallback".into();
        let err = Brain::open(&config).err().unwrap();
        assert!(err.to_string().contains("redis"));
    }
}
