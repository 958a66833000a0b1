pub mod chat;
pub mod export;
pub mod history;
pub mod list;
pub mod stats;

use anyhow::Result;

use personal_brain::Brain;

/// Fold every active turn of a conversation into one summary.
pub async fn summarize(brain: &Brain, conversation_id: &str) -> Result<()> {
    if brain.memory.force_summarize(conversation_id).await? {
        let summaries = brain.memory.get_summaries(conversation_id).await?;
        if let Some(latest) = summaries.last() {
            println!(
                "Summarized {} turn(s){}:\n",
                latest.turn_count,
                if latest.is_fallback() { " (fallback)" } else { "" }
            );
            println!("{}", latest.content);
        }
    } else {
        println!("No active turns to summarize.");
    }
    Ok(())
}

/// Delete a conversation and everything recorded in it.
pub async fn delete(brain: &Brain, conversation_id: &str) -> Result<()> {
    brain.memory.delete_conversation(conversation_id).await?;
    println!("Deleted conversation {conversation_id}.");
    Ok(())
}
