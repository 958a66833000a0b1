#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use personal_brain::config::MemoryConfig;
use personal_brain::conversation::storage::ConversationStorage;
use personal_brain::conversation::types::{ConversationTurn, InterfaceType, Metadata, NewTurn};
use personal_brain::conversation::InMemoryConversationStorage;
use personal_brain::db;
use personal_brain::summarizer::{Summarizer, SummarizerError};
use personal_brain::Brain;

/// Policy with the given threshold and batch size; everything else default.
pub fn memory_config(max_active_turns: usize, summary_turn_count: usize) -> MemoryConfig {
    MemoryConfig {
        max_active_turns,
        summary_turn_count,
        ..Default::default()
    }
}

/// A brain over fresh in-memory storage.
pub fn brain_with(summarizer: Arc<dyn Summarizer>, config: MemoryConfig) -> Brain {
    let storage: Arc<dyn ConversationStorage> = Arc::new(InMemoryConversationStorage::new());
    Brain::from_parts(storage, summarizer, config)
}

/// A brain over an in-memory SQLite database with schema and migrations applied.
pub fn sqlite_brain_with(summarizer: Arc<dyn Summarizer>, config: MemoryConfig) -> Brain {
    let conn = db::open_memory_database().unwrap();
    let storage: Arc<dyn ConversationStorage> =
        Arc::new(personal_brain::conversation::SqliteConversationStorage::new(conn));
    Brain::from_parts(storage, summarizer, config)
}

/// Create a CLI conversation and return its id.
pub async fn new_conversation(brain: &Brain, room: &str) -> String {
    brain
        .memory
        .get_or_create_conversation_for_room(room, InterfaceType::Cli, None)
        .await
        .unwrap()
        .id
}

/// Add `count` numbered turns, returning their ids in order.
pub async fn add_turns(brain: &Brain, conversation_id: &str, count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let turn = brain
            .memory
            .add_turn(
                conversation_id,
                NewTurn::new(format!("question {i} about gardening"), format!("answer {i}")),
            )
            .await
            .unwrap();
        ids.push(turn.id);
    }
    ids
}

/// Every summarized turn id plus every active turn id, checking for duplicates.
pub async fn covered_turn_ids(brain: &Brain, conversation_id: &str) -> HashSet<String> {
    let history = brain.memory.get_tiered_history(conversation_id).await.unwrap();
    let mut seen = HashSet::new();
    for summary in &history.summaries {
        for id in summary.original_turn_ids() {
            assert!(seen.insert(id.clone()), "turn {id} appears in two summaries");
        }
    }
    for turn in &history.active_turns {
        assert!(seen.insert(turn.id.clone()), "turn {} is both active and summarized", turn.id);
    }
    seen
}

/// Summaries tile the archived prefix of the turn log: ordered, no gaps, no
/// overlaps, and every active turn sorts after the last summarized one.
pub async fn assert_contiguous_summaries(brain: &Brain, conversation_id: &str) {
    let history = brain.memory.get_tiered_history(conversation_id).await.unwrap();
    let turns = brain.memory.get_turns(conversation_id, None, None).await.unwrap();

    let mut next_index = 0usize;
    for summary in &history.summaries {
        assert_eq!(
            summary.start_turn_index, next_index,
            "summary {} leaves a gap or overlaps its predecessor",
            summary.id
        );
        assert!(summary.end_turn_index >= summary.start_turn_index);
        assert_eq!(
            summary.end_turn_index - summary.start_turn_index + 1,
            summary.turn_count,
            "summary {} range disagrees with its turn count",
            summary.id
        );
        let covered: Vec<String> = turns[summary.start_turn_index..=summary.end_turn_index]
            .iter()
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(covered, summary.original_turn_ids());
        next_index = summary.end_turn_index + 1;
    }

    assert_eq!(next_index, history.archived_turns.len());
    assert!(turns[next_index..].iter().all(|t| t.is_active()));
}

pub fn empty_metadata() -> Metadata {
    Metadata::new()
}

// ── Test summarizers ────────────────────────────────────────────────────────

/// Always returns the same text.
pub struct StaticSummarizer(pub &'static str);

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize_turns(&self, _turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Always fails, forcing the fallback path.
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize_turns(&self, _turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        Err(SummarizerError::Api {
            status: 529,
            message: "overloaded".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Sleeps before answering; pair with a short timeout.
pub struct SlowSummarizer(pub Duration);

#[async_trait]
impl Summarizer for SlowSummarizer {
    async fn summarize_turns(&self, _turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Counts calls and yields so concurrent callers interleave.
#[derive(Default)]
pub struct CountingSummarizer {
    pub calls: AtomicUsize,
}

impl CountingSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize_turns(&self, turns: &[ConversationTurn]) -> Result<String, SummarizerError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(format!("summary #{n} of {} turns", turns.len()))
    }

    fn name(&self) -> &str {
        "counting"
    }
}
