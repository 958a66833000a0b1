use anyhow::{Context, Result};

use personal_brain::conversation::ExportFormat;
use personal_brain::Brain;

/// Export one conversation to stdout.
pub async fn export(brain: &Brain, conversation_id: &str, format: &str) -> Result<()> {
    let format: ExportFormat = format
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid --format")?;

    let text = brain
        .query
        .export_conversation(conversation_id, format)
        .await?;
    println!("{text}");

    eprintln!("Exported conversation {conversation_id} as {}.", format.as_str());
    Ok(())
}
