use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/nova_chat.json";

/// Environment variables checked for the Gemini API key, in order.
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful, witty, and professional AI assistant in a chat application. \
Keep your responses concise and conversational, suitable for a messaging app interface. \
Do not use markdown headers or long paragraphs unless asked.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: String,
    pub api_base_url: String,
    /// Falls back to the environment when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub system_instruction: String,
    pub human_reply_delay_ms: u64,
    pub human_reply_text: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            human_reply_delay_ms: 3000,
            human_reply_text: "I'm currently away from my keyboard, but I received your message!"
                .to_string(),
        }
    }
}

impl AppConfig {
    pub fn human_reply_delay(&self) -> Duration {
        Duration::from_millis(self.human_reply_delay_ms)
    }

    /// Config value first, then `GEMINI_API_KEY`, then `API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                API_KEY_VARS
                    .iter()
                    .filter_map(|var| env::var(var).ok())
                    .find(|key| !key.trim().is_empty())
            })
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "model": "gemini-2.5-pro", "human_reply_delay_ms": 10 }"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.human_reply_delay(), Duration::from_millis(10));
        assert_eq!(config.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn save_then_load_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/config.json");
        let path = path.to_str().unwrap();

        let config = AppConfig {
            human_reply_text: "brb".to_string(),
            ..AppConfig::default()
        };
        save_config(path, &config).unwrap();
        assert_eq!(load_config(path), config);
    }

    #[test]
    fn configured_api_key_wins() {
        let config = AppConfig {
            api_key: Some("from-config".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-config"));
    }
}
