use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use personal_brain::conversation::types::{InterfaceType, NewTurn};
use personal_brain::Brain;

/// Record each stdin line as a turn in the room's CLI conversation.
///
/// The assistant layer supplies responses, so turns are stored query-only.
pub async fn chat(brain: &Brain, room: &str, user: Option<&str>, title: Option<&str>) -> Result<()> {
    let conversation = brain
        .memory
        .get_or_create_conversation_for_room(room, InterfaceType::Cli, title)
        .await
        .context("failed to open room conversation")?;
    eprintln!("Conversation {} (room {room}). Ctrl-D to finish.", conversation.id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recorded = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut turn = NewTurn {
            query: line.to_string(),
            ..Default::default()
        };
        if let Some(user) = user {
            turn = turn.with_user(user, user);
        }
        brain.memory.add_turn(&conversation.id, turn).await?;
        recorded += 1;
    }

    let stats = brain.memory.conversation_stats(&conversation.id).await?;
    println!(
        "Recorded {recorded} turn(s). Active: {}, summaries: {}.",
        stats.active_turns, stats.summaries
    );
    Ok(())
}
