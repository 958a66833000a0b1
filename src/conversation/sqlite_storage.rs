//! SQLite-backed [`ConversationStorage`].
//!
//! All statements run on a blocking thread (`spawn_blocking`) against a single
//! shared connection. Multi-row mutations (`commit_summary`, `replace_summaries`,
//! `delete_conversation`) run inside a transaction and write an entry to
//! `conversation_log`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use super::storage::{archived_patch, merge_metadata, ConversationStorage};
use super::types::{
    Conversation, ConversationQuery, ConversationSummary, ConversationTurn, InterfaceType,
    Metadata, NewConversation,
};
use crate::error::{BrainError, Result};

const CONVERSATION_COLUMNS: &str =
    "id, interface_type, room_id, created_at, updated_at, metadata";
const TURN_COLUMNS: &str =
    "id, conversation_id, timestamp, query, response, user_id, user_name, metadata";
const SUMMARY_COLUMNS: &str = "id, conversation_id, content, start_turn_index, end_turn_index, \
     start_turn_id, end_turn_id, start_timestamp, end_timestamp, turn_count, metadata, created_at";

pub struct SqliteConversationStorage {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConversationStorage {
    /// Wrap a connection opened with [`crate::db::open_database`] (schema and
    /// migrations already applied).
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| BrainError::storage(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BrainError::storage(format!("db task failed: {e}")))?
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn format_ts(ts: &DateTime<Utc>) -> String {
    // Fixed-width UTC so lexical order in SQL matches chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn read_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn read_metadata(row: &Row, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let interface: String = row.get(1)?;
    Ok(Conversation {
        id: row.get(0)?,
        interface_type: interface.parse().map_err(|e: String| conversion_error(1, e))?,
        room_id: row.get(2)?,
        created_at: read_ts(row, 3)?,
        updated_at: read_ts(row, 4)?,
        metadata: read_metadata(row, 5)?,
    })
}

fn row_to_turn(row: &Row) -> rusqlite::Result<ConversationTurn> {
    Ok(ConversationTurn {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        timestamp: read_ts(row, 2)?,
        query: row.get(3)?,
        response: row.get(4)?,
        user_id: row.get(5)?,
        user_name: row.get(6)?,
        metadata: read_metadata(row, 7)?,
    })
}

fn row_to_summary(row: &Row) -> rusqlite::Result<ConversationSummary> {
    Ok(ConversationSummary {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        start_turn_index: row.get::<_, i64>(3)? as usize,
        end_turn_index: row.get::<_, i64>(4)? as usize,
        start_turn_id: row.get(5)?,
        end_turn_id: row.get(6)?,
        start_timestamp: read_ts(row, 7)?,
        end_timestamp: read_ts(row, 8)?,
        turn_count: row.get::<_, i64>(9)? as usize,
        metadata: read_metadata(row, 10)?,
        created_at: read_ts(row, 11)?,
    })
}

// ── Statement helpers ────────────────────────────────────────────────────────

fn conversation_exists(conn: &Connection, conversation_id: &str) -> Result<()> {
    let found: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM conversations WHERE id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;
    if found {
        Ok(())
    } else {
        Err(BrainError::ConversationNotFound(conversation_id.to_string()))
    }
}

fn insert_summary(conn: &Connection, summary: &ConversationSummary) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO summaries ({SUMMARY_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            summary.id,
            summary.conversation_id,
            summary.content,
            summary.start_turn_index as i64,
            summary.end_turn_index as i64,
            summary.start_turn_id,
            summary.end_turn_id,
            format_ts(&summary.start_timestamp),
            format_ts(&summary.end_timestamp),
            summary.turn_count as i64,
            serde_json::to_string(&summary.metadata)?,
            format_ts(&summary.created_at),
        ],
    )?;
    Ok(())
}

fn patch_turn_metadata(
    conn: &Connection,
    conversation_id: &str,
    turn_id: &str,
    patch: &Metadata,
) -> Result<()> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT metadata FROM turns WHERE id = ?1 AND conversation_id = ?2",
            params![turn_id, conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| BrainError::TurnNotFound {
        conversation_id: conversation_id.to_string(),
        turn_id: turn_id.to_string(),
    })?;

    let mut metadata: Metadata = serde_json::from_str(&raw)?;
    merge_metadata(&mut metadata, patch);
    conn.execute(
        "UPDATE turns SET metadata = ?1 WHERE id = ?2",
        params![serde_json::to_string(&metadata)?, turn_id],
    )?;
    Ok(())
}

fn read_conversation_metadata(conn: &Connection, conversation_id: &str) -> Result<Metadata> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT metadata FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| BrainError::ConversationNotFound(conversation_id.to_string()))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write an entry to the conversation_log audit table.
fn write_audit_log(
    conn: &Connection,
    operation: &str,
    conversation_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = format_ts(&Utc::now());
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO conversation_log (operation, conversation_id, details, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![operation, conversation_id, details_json, now],
    )?;
    Ok(())
}

#[async_trait]
impl ConversationStorage for SqliteConversationStorage {
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
        let record = conversation.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!("INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    record.id,
                    record.interface_type.as_str(),
                    record.room_id,
                    format_ts(&record.created_at),
                    format_ts(&record.updated_at),
                    serde_json::to_string(&record.metadata)?,
                ],
            )?;
            write_audit_log(
                &tx,
                "create",
                &record.id,
                Some(&serde_json::json!({
                    "room_id": record.room_id,
                    "interface_type": record.interface_type,
                })),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::debug!(conversation_id = %conversation.id, "conversation row inserted");
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                    params![conversation_id],
                    row_to_conversation,
                )
                .optional()?)
        })
        .await
    }

    async fn get_conversation_by_room(
        &self,
        room_id: &str,
        interface_type: InterfaceType,
    ) -> Result<Option<Conversation>> {
        let room_id = room_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                         WHERE room_id = ?1 AND interface_type = ?2"
                    ),
                    params![room_id, interface_type.as_str()],
                    row_to_conversation,
                )
                .optional()?)
        })
        .await
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        let record = conversation.clone();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE conversations SET interface_type = ?1, room_id = ?2, metadata = ?3, updated_at = ?4 \
                 WHERE id = ?5",
                params![
                    record.interface_type.as_str(),
                    record.room_id,
                    serde_json::to_string(&record.metadata)?,
                    format_ts(&Utc::now()),
                    record.id,
                ],
            )?;
            if rows == 0 {
                return Err(BrainError::ConversationNotFound(record.id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let turns: i64 = tx.query_row(
                "SELECT COUNT(*) FROM turns WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            let rows = tx.execute(
                "DELETE FROM conversations WHERE id = ?1",
                params![conversation_id],
            )?;
            if rows > 0 {
                write_audit_log(
                    &tx,
                    "delete",
                    &conversation_id,
                    Some(&serde_json::json!({ "turns": turns })),
                )?;
            }
            tx.commit()?;
            Ok(rows > 0)
        })
        .await
    }

    async fn add_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let turn = turn.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let touched = tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![format_ts(&Utc::now()), turn.conversation_id],
            )?;
            if touched == 0 {
                return Err(BrainError::ConversationNotFound(turn.conversation_id));
            }
            tx.execute(
                &format!("INSERT INTO turns ({TURN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    turn.id,
                    turn.conversation_id,
                    format_ts(&turn.timestamp),
                    turn.query,
                    turn.response,
                    turn.user_id,
                    turn.user_name,
                    serde_json::to_string(&turn.metadata)?,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_turns(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conversation_exists(conn, &conversation_id)?;
            let limit = limit.map(|l| l as i64).unwrap_or(-1);
            let offset = offset.unwrap_or(0) as i64;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TURN_COLUMNS} FROM turns WHERE conversation_id = ?1 \
                 ORDER BY timestamp, seq LIMIT ?2 OFFSET ?3"
            ))?;
            let turns = stmt
                .query_map(params![conversation_id, limit, offset], row_to_turn)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(turns)
        })
        .await
    }

    async fn update_turn(
        &self,
        conversation_id: &str,
        turn_id: &str,
        patch: &Metadata,
    ) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let turn_id = turn_id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            conversation_exists(&tx, &conversation_id)?;
            patch_turn_metadata(&tx, &conversation_id, &turn_id, &patch)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn add_summary(&self, summary: &ConversationSummary) -> Result<()> {
        let summary = summary.clone();
        self.with_conn(move |conn| {
            conversation_exists(conn, &summary.conversation_id)?;
            insert_summary(conn, &summary)
        })
        .await
    }

    async fn get_summaries(&self, conversation_id: &str) -> Result<Vec<ConversationSummary>> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conversation_exists(conn, &conversation_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM summaries WHERE conversation_id = ?1 \
                 ORDER BY start_turn_index, created_at"
            ))?;
            let summaries = stmt
                .query_map(params![conversation_id], row_to_summary)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
        .await
    }

    async fn replace_summaries(
        &self,
        conversation_id: &str,
        removed: &[String],
        replacement: &ConversationSummary,
    ) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let removed = removed.to_vec();
        let replacement = replacement.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            conversation_exists(&tx, &conversation_id)?;
            for id in &removed {
                tx.execute(
                    "DELETE FROM summaries WHERE id = ?1 AND conversation_id = ?2",
                    params![id, conversation_id],
                )?;
            }
            insert_summary(&tx, &replacement)?;
            write_audit_log(
                &tx,
                "consolidate",
                &conversation_id,
                Some(&serde_json::json!({
                    "summary_id": replacement.id,
                    "replaced": removed,
                })),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn commit_summary(
        &self,
        summary: &ConversationSummary,
        turn_ids: &[String],
    ) -> Result<()> {
        let summary = summary.clone();
        let turn_ids = turn_ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            conversation_exists(&tx, &summary.conversation_id)?;
            insert_summary(&tx, &summary)?;
            let patch = archived_patch(&summary.id);
            for turn_id in &turn_ids {
                patch_turn_metadata(&tx, &summary.conversation_id, turn_id, &patch)?;
            }
            write_audit_log(
                &tx,
                "summarize",
                &summary.conversation_id,
                Some(&serde_json::json!({
                    "summary_id": summary.id,
                    "turn_count": turn_ids.len(),
                    "fallback": summary.is_fallback(),
                })),
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(interface_type) = query.interface_type {
                values.push(interface_type.as_str().to_string());
                clauses.push(format!("c.interface_type = ?{}", values.len()));
            }
            if let Some(room_id) = &query.room_id {
                values.push(room_id.clone());
                clauses.push(format!("c.room_id = ?{}", values.len()));
            }
            if let Some(start) = &query.start_date {
                values.push(format_ts(start));
                clauses.push(format!("c.updated_at >= ?{}", values.len()));
            }
            if let Some(end) = &query.end_date {
                values.push(format_ts(end));
                clauses.push(format!("c.updated_at <= ?{}", values.len()));
            }
            // SQLite's LOWER folds ASCII only; fold the needle the same way.
            if let Some(text) = &query.text {
                values.push(text.to_ascii_lowercase());
                let n = values.len();
                clauses.push(format!(
                    "(instr(LOWER(COALESCE(json_extract(c.metadata, '$.title'), '')), ?{n}) > 0 \
                     OR EXISTS (SELECT 1 FROM turns t WHERE t.conversation_id = c.id \
                       AND (instr(LOWER(t.query), ?{n}) > 0 \
                         OR instr(LOWER(COALESCE(t.response, '')), ?{n}) > 0)))"
                ));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
            let offset = query.offset.unwrap_or(0) as i64;

            let sql = format!(
                "SELECT c.id, c.interface_type, c.room_id, c.created_at, c.updated_at, c.metadata \
                 FROM conversations c {where_sql} \
                 ORDER BY c.updated_at DESC, c.id DESC LIMIT {limit} OFFSET {offset}"
            );
            tracing::debug!(filters = clauses.len(), "finding conversations");

            let mut stmt = conn.prepare(&sql)?;
            let conversations = stmt
                .query_map(params_from_iter(values.iter()), row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(conversations)
        })
        .await
    }

    async fn update_metadata(&self, conversation_id: &str, patch: &Metadata) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut metadata = read_conversation_metadata(&tx, &conversation_id)?;
            merge_metadata(&mut metadata, &patch);
            tx.execute(
                "UPDATE conversations SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&metadata)?,
                    format_ts(&Utc::now()),
                    conversation_id
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_metadata(&self, conversation_id: &str) -> Result<Metadata> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| read_conversation_metadata(conn, &conversation_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn storage() -> SqliteConversationStorage {
        SqliteConversationStorage::new(db::open_memory_database().unwrap())
    }

    fn new_conversation(room: &str) -> NewConversation {
        NewConversation {
            interface_type: InterfaceType::Matrix,
            room_id: room.into(),
            metadata: Metadata::new(),
        }
    }

    fn turn(conversation_id: &str, id: &str, ts: DateTime<Utc>) -> ConversationTurn {
        ConversationTurn {
            id: id.into(),
            conversation_id: conversation_id.into(),
            timestamp: ts,
            query: format!("question {id}"),
            response: Some(format!("answer {id}")),
            user_id: Some("@alice:example.org".into()),
            user_name: Some("Alice".into()),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn conversation_round_trips_through_sqlite() {
        let storage = storage();
        let mut new = new_conversation("!room:example.org");
        new.metadata.insert("title".into(), "Reading list".into());
        let created = storage.create_conversation(new).await.unwrap();

        let loaded = storage.get_conversation(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.room_id, "!room:example.org");
        assert_eq!(loaded.interface_type, InterfaceType::Matrix);
        assert_eq!(loaded.title(), Some("Reading list"));

        let by_room = storage
            .get_conversation_by_room("!room:example.org", InterfaceType::Matrix)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_room.id, created.id);
        assert!(storage
            .get_conversation_by_room("!room:example.org", InterfaceType::Cli)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let storage = storage();
        let conversation = storage.create_conversation(new_conversation("r")).await.unwrap();
        let ts = Utc::now();
        for id in ["x", "y", "z"] {
            storage.add_turn(&turn(&conversation.id, id, ts)).await.unwrap();
        }
        let ids: Vec<String> = storage
            .get_turns(&conversation.id, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn commit_summary_archives_turns_and_logs() {
        let storage = storage();
        let conversation = storage.create_conversation(new_conversation("r")).await.unwrap();
        let ts = Utc::now();
        storage.add_turn(&turn(&conversation.id, "t1", ts)).await.unwrap();
        storage.add_turn(&turn(&conversation.id, "t2", ts)).await.unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("originalTurnIds".into(), serde_json::json!(["t1"]));
        let summary = ConversationSummary {
            id: "s1".into(),
            conversation_id: conversation.id.clone(),
            content: "Alice asked a question.".into(),
            start_turn_index: 0,
            end_turn_index: 0,
            start_turn_id: "t1".into(),
            end_turn_id: "t1".into(),
            start_timestamp: ts,
            end_timestamp: ts,
            turn_count: 1,
            metadata,
            created_at: ts,
        };
        storage.commit_summary(&summary, &["t1".to_string()]).await.unwrap();

        let turns = storage.get_turns(&conversation.id, None, None).await.unwrap();
        assert!(!turns[0].is_active());
        assert_eq!(turns[0].metadata["summaryId"], "s1");
        assert!(turns[1].is_active());

        let summaries = storage.get_summaries(&conversation.id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].original_turn_ids(), vec!["t1"]);

        let logged: i64 = storage
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM conversation_log WHERE operation = 'summarize'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_turns() {
        let storage = storage();
        let conversation = storage.create_conversation(new_conversation("r")).await.unwrap();
        storage
            .add_turn(&turn(&conversation.id, "t1", Utc::now()))
            .await
            .unwrap();

        assert!(storage.delete_conversation(&conversation.id).await.unwrap());

        let orphaned: i64 = storage
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(orphaned, 0);
        assert!(matches!(
            storage.get_turns(&conversation.id, None, None).await,
            Err(BrainError::ConversationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn find_conversations_matches_turn_text() {
        let storage = storage();
        let a = storage.create_conversation(new_conversation("a")).await.unwrap();
        let b = storage.create_conversation(new_conversation("b")).await.unwrap();
        let mut t = turn(&a.id, "t1", Utc::now());
        t.query = "Where is the Rust meetup?".into();
        storage.add_turn(&t).await.unwrap();
        storage.add_turn(&turn(&b.id, "t2", Utc::now())).await.unwrap();

        let found = storage
            .find_conversations(&ConversationQuery {
                text: Some("rust MEETUP".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
