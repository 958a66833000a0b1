use anyhow::Result;

use personal_brain::Brain;

/// Display tier statistics for one conversation.
pub async fn stats(brain: &Brain, conversation_id: &str) -> Result<()> {
    let conversation = brain.memory.get_conversation(conversation_id).await?;
    let stats = brain.memory.conversation_stats(conversation_id).await?;
    let limits = brain.memory.manager().config();

    println!("Conversation Statistics");
    println!("{}", "=".repeat(40));
    if let Some(title) = conversation.title() {
        println!("  Title:               {title}");
    }
    println!("  Room:                {} ({})", conversation.room_id, conversation.interface_type);
    println!("  Total turns:         {}", stats.total_turns);
    println!(
        "  Active:              {} / {}",
        stats.active_turns, limits.max_active_turns
    );
    println!("  Archived:            {}", stats.archived_turns);
    println!();

    println!("Summaries:");
    println!("  Total:               {} / {}", stats.summaries, limits.max_summaries);
    println!("  Fallback:            {}", stats.fallback_summaries);
    println!();

    println!("Active token estimate: ~{}", stats.estimated_active_tokens);
    println!("Created:               {}", conversation.created_at.to_rfc3339());
    println!("Updated:               {}", conversation.updated_at.to_rfc3339());

    Ok(())
}
