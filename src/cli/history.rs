use anyhow::{Context, Result};

use personal_brain::conversation::{FormatOptions, HistoryOptions, OutputFormat};
use personal_brain::Brain;

/// Print a conversation's history, or the prompt-ready form with `--prompt`.
pub async fn history(
    brain: &Brain,
    conversation_id: &str,
    format: &str,
    prompt: bool,
    max_tokens: Option<usize>,
    all: bool,
) -> Result<()> {
    if prompt {
        let text = brain
            .memory
            .format_history_for_prompt(conversation_id, max_tokens)
            .await?;
        println!("{text}");
        return Ok(());
    }

    let format: OutputFormat = format
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid --format")?;
    let options = HistoryOptions {
        format: FormatOptions {
            include_timestamps: true,
            ..FormatOptions::with_format(format)
        },
        max_turns: None,
        include_archived: all,
    };
    let text = brain
        .query
        .get_conversation_history(conversation_id, &options)
        .await?;
    if text.is_empty() {
        println!("No history.");
    } else {
        println!("{text}");
    }
    Ok(())
}
