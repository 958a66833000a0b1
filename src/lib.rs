//! Personal Brain: tiered conversation memory for an AI assistant.
//!
//! Every conversation (one per CLI session or Matrix room) keeps its newest turns
//! verbatim and folds older ones into summaries, so prompt history stays bounded
//! while nothing is lost:
//!
//! | Tier | Contents | Used for |
//! |------|----------|----------|
//! | **Active** | Newest turns, verbatim | Prompt context |
//! | **Summarized** | Condensed runs of older turns | Prompt context, display |
//! | **Archived** | Raw text of summarized turns | Audit, `expand_summary` |
//!
//! # Architecture
//!
//! - **Storage**: [`conversation::ConversationStorage`] trait, backed by SQLite
//!   (`rusqlite`, bundled) or an in-process map
//! - **Summaries**: Anthropic Messages API, with a deterministic offline fallback
//!   whenever the call fails or times out
//! - **Wiring**: [`brain::Brain`] builds everything once from [`config::BrainConfig`]
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite schema and migrations
//! - [`conversation`]: Storage, tier manager, services, and formatter
//! - [`summarizer`]: AI and fallback summarizers
//! - [`error`]: Error taxonomy shared by the services

pub mod brain;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod summarizer;

pub use brain::Brain;
pub use error::{BrainError, Result};
