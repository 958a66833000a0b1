use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BrainConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub memory: MemoryConfig,
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// `"sqlite"` or `"memory"`.
    pub backend: String,
    pub db_path: String,
}

/// Tiering policy for the conversation memory manager.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Active turns kept verbatim before the oldest become eligible for summarization.
    pub max_active_turns: usize,
    /// Oldest active turns compacted per summarization pass.
    pub summary_turn_count: usize,
    /// Per-turn token estimate used to size prompt budgets.
    pub max_tokens_per_turn: usize,
    /// Summaries kept before the oldest are consolidated into one.
    pub max_summaries: usize,
    pub summarizer_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizerConfig {
    /// `"anthropic"` or `"fallback"`.
    pub provider: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_brain_dir()
            .join("brain.db")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "sqlite".into(),
            db_path,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_active_turns: 10,
            summary_turn_count: 5,
            max_tokens_per_turn: 400,
            max_summaries: 20,
            summarizer_timeout_secs: 30,
        }
    }
}

impl MemoryConfig {
    /// Token budget for a full prompt history: every active turn at its estimate.
    pub fn prompt_token_budget(&self) -> usize {
        self.max_active_turns * self.max_tokens_per_turn
    }

    pub fn summarizer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.summarizer_timeout_secs)
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-3-5-haiku-latest".into(),
            api_base: "https://api.anthropic.com".into(),
            max_tokens: 512,
            api_key: None,
        }
    }
}

/// Returns `~/.brain/`, or `./.brain/` when no home directory is known.
pub fn default_brain_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".brain")
}

/// Returns the default config file path: `~/.brain/config.toml`
pub fn default_config_path() -> PathBuf {
    default_brain_dir().join("config.toml")
}

impl BrainConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            BrainConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (BRAIN_DB, BRAIN_STORAGE,
    /// BRAIN_LOG_LEVEL, ANTHROPIC_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BRAIN_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("BRAIN_STORAGE") {
            self.storage.backend = val;
        }
        if let Ok(val) = std::env::var("BRAIN_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ANTHROPIC_API_KEY") {
            self.summarizer.api_key = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BrainConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.memory.max_active_turns, 10);
        assert_eq!(config.memory.summary_turn_count, 5);
        assert_eq!(config.summarizer.provider, "anthropic");
        assert!(config.storage.db_path.ends_with("brain.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[memory]
max_active_turns = 3
summary_turn_count = 2
"#;
        let config: BrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.memory.max_active_turns, 3);
        assert_eq!(config.memory.summary_turn_count, 2);
        // defaults still apply for unset fields
        assert_eq!(config.memory.max_summaries, 20);
        assert_eq!(config.storage.backend, "sqlite");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = BrainConfig::default();
        std::env::set_var("BRAIN_DB", "/tmp/override.db");
        std::env::set_var("BRAIN_STORAGE", "memory");
        std::env::set_var("BRAIN_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("BRAIN_DB");
        std::env::remove_var("BRAIN_STORAGE");
        std::env::remove_var("BRAIN_LOG_LEVEL");
    }

    #[test]
    fn prompt_budget_scales_with_active_turns() {
        let config = MemoryConfig::default();
        assert_eq!(config.prompt_token_budget(), 4000);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrainConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.memory.max_active_turns, 10);
    }
}
