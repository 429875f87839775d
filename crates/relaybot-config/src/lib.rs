use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Top-level relaybot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a public message as a command (e.g. "!").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// The bot's own user ID; a leading mention of it also triggers
    /// command parsing in public channels.
    #[serde(default)]
    pub bot_user_id: String,
    /// User IDs that bypass the admin check unconditionally.
    #[serde(default)]
    pub owners: Vec<String>,
    /// Whether newly discovered modules are enabled and loaded
    /// immediately instead of being inserted disabled.
    #[serde(default)]
    pub auto_enable_modules: bool,
    /// Path to the registry database. Defaults to `<config dir>/bot.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            bot_user_id: String::new(),
            owners: Vec::new(),
            auto_enable_modules: false,
            db_path: None,
        }
    }
}

impl BotConfig {
    /// The mention prefix that also triggers command parsing in public
    /// channels ("<@BOTID> ").
    pub fn mention_prefix(&self) -> String {
        format!("<@{}> ", self.bot_user_id)
    }

    /// Resolve the registry database path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("bot.db")),
        }
    }
}

/// Resolve the relaybot config directory (~/.relaybot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".relaybot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.relaybot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<BotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<BotConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(BotConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: BotConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Save configuration to the default path.
pub fn save_config(config: &BotConfig) -> Result<(), ConfigError> {
    let dir = ensure_config_dir()?;
    let path = dir.join("config.json5");
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert!(config.owners.is_empty());
        assert!(!config.auto_enable_modules);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: BotConfig = json5::from_str(
            r#"{
                // local overrides
                command_prefix: "%",
                bot_user_id: "U0BOT",
                owners: ["U0OWNER"],
            }"#,
        )
        .unwrap();
        assert_eq!(config.command_prefix, "%");
        assert_eq!(config.mention_prefix(), "<@U0BOT> ");
        assert_eq!(config.owners, vec!["U0OWNER".to_string()]);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_from(Path::new("/nonexistent/config.json5")).unwrap();
        assert_eq!(config.command_prefix, "!");
    }
}
