use anyhow::{Context, Result};

use personal_brain::conversation::types::{ConversationQuery, InterfaceType};
use personal_brain::Brain;

/// List conversations, newest activity first.
pub async fn list(
    brain: &Brain,
    interface: Option<&str>,
    search: Option<&str>,
    limit: usize,
) -> Result<()> {
    let interface_type = interface
        .map(|s| s.parse::<InterfaceType>().map_err(anyhow::Error::msg))
        .transpose()
        .context("invalid --interface")?;

    let conversations = brain
        .query
        .find_conversations(&ConversationQuery {
            interface_type,
            text: search.map(str::to_string),
            limit: Some(limit),
            ..Default::default()
        })
        .await?;

    if conversations.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    for conversation in &conversations {
        println!(
            "  {}  {:<7} {:<30} {}  {}",
            conversation.id,
            conversation.interface_type,
            conversation.room_id,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.title().unwrap_or("")
        );
    }
    eprintln!("{} conversation(s).", conversations.len());
    Ok(())
}
