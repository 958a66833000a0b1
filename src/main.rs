mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use personal_brain::config::BrainConfig;
use personal_brain::Brain;

#[derive(Parser)]
#[command(name = "brain", version, about = "Tiered conversation memory for a personal AI assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record stdin lines as turns in a CLI room
    Chat {
        /// Room (session) name
        #[arg(long)]
        room: String,
        /// Display name recorded on each turn
        #[arg(long)]
        user: Option<String>,
        /// Title for a newly created conversation
        #[arg(long)]
        title: Option<String>,
    },
    /// Show a conversation's history
    History {
        conversation_id: String,
        /// text, markdown, json, or html
        #[arg(long, default_value = "text")]
        format: String,
        /// Print the prompt-ready history instead
        #[arg(long)]
        prompt: bool,
        /// Token budget for --prompt
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Include archived turns
        #[arg(long)]
        all: bool,
    },
    /// List conversations, newest first
    List {
        /// cli or matrix
        #[arg(long)]
        interface: Option<String>,
        /// Match title or turn text
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Summarize all active turns now
    Summarize { conversation_id: String },
    /// Export a conversation
    Export {
        conversation_id: String,
        /// json or markdown
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Show tier statistics
    Stats { conversation_id: String },
    /// Delete a conversation with its turns and summaries
    Delete { conversation_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BrainConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let brain = Brain::open(&config)?;

    match cli.command {
        Command::Chat { room, user, title } => {
            cli::chat::chat(&brain, &room, user.as_deref(), title.as_deref()).await?;
        }
        Command::History {
            conversation_id,
            format,
            prompt,
            max_tokens,
            all,
        } => {
            cli::history::history(&brain, &conversation_id, &format, prompt, max_tokens, all)
                .await?;
        }
        Command::List {
            interface,
            search,
            limit,
        } => {
            cli::list::list(&brain, interface.as_deref(), search.as_deref(), limit).await?;
        }
        Command::Summarize { conversation_id } => {
            cli::summarize(&brain, &conversation_id).await?;
        }
        Command::Export {
            conversation_id,
            format,
        } => {
            cli::export::export(&brain, &conversation_id, &format).await?;
        }
        Command::Stats { conversation_id } => {
            cli::stats::stats(&brain, &conversation_id).await?;
        }
        Command::Delete { conversation_id } => {
            cli::delete(&brain, &conversation_id).await?;
        }
    }

    Ok(())
}
