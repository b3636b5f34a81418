use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TonusError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coach: CoachConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default)]
    pub turso_url: String,
    #[serde(default)]
    pub turso_token: String,
}

fn default_db_path() -> String {
    "tonus.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            turso_url: String::new(),
            turso_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachConfig {
    /// How many past conversation messages to replay into each turn.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// IANA timezone used when a user has no (or an invalid) stored timezone.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// How long to wait for the rest of a photo album before analyzing it.
    #[serde(default = "default_album_debounce_ms")]
    pub album_debounce_ms: u64,
    #[serde(default = "default_calorie_goal")]
    pub calorie_goal: i64,
    #[serde(default = "default_water_goal")]
    pub water_goal: i64,
    #[serde(default = "default_protein_goal")]
    pub protein_goal: i64,
}

fn default_context_window() -> usize {
    20
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

fn default_album_debounce_ms() -> u64 {
    1500
}

fn default_calorie_goal() -> i64 {
    2000
}

fn default_water_goal() -> i64 {
    2000
}

fn default_protein_goal() -> i64 {
    100
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            default_timezone: default_timezone(),
            album_debounce_ms: default_album_debounce_ms(),
            calorie_goal: default_calorie_goal(),
            water_goal: default_water_goal(),
            protein_goal: default_protein_goal(),
        }
    }
}

impl Config {
    /// Load config: defaults → tonus.toml → env vars (env wins).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TonusError::Config(format!("failed to read config: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| TonusError::Config(format!("failed to parse config: {e}")))?
        } else {
            Self::default()
        };

        // Override with env vars
        if let Ok(v) = std::env::var("TONUS_TELEGRAM_TOKEN") {
            config.telegram.token = v;
        }
        if let Ok(v) = std::env::var("TONUS_LLM_API_KEY") {
            config.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("TONUS_TURSO_URL") {
            config.database.turso_url = v;
        }
        if let Ok(v) = std::env::var("TONUS_TURSO_TOKEN") {
            config.database.turso_token = v;
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            coach: CoachConfig::default(),
        }
    }
}
