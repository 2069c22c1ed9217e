//! # Configuration Management Module
//!
//! Centralized, TOML-backed configuration for the questroom client with
//! defaults for every section and a validation pass on load.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - Backend location and request timeout
//! - [`SessionConfig`] - Where the logged-in identity and token are remembered
//! - [`RoomConfig`] - Poll cadence and narrator identities for shared rooms
//! - [`BattleConfig`] - Pacing delays, flee chance and fallback player vitals
//! - [`LoggingConfig`] - Logging level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questroom::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("questroom.toml").await?;
//!     println!("Backend: {}", config.server.base_url);
//!     println!("Poll every {}ms", config.room.poll_interval_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "http://127.0.0.1:5000"
//! request_timeout_seconds = 10
//!
//! [room]
//! poll_interval_ms = 5000
//! narrator_followup_delay_ms = 2000
//! # must match the backend's sender names exactly or no choices are offered
//! narrator_name = "龙与地下城"
//! system_name = "系统"
//!
//! [battle]
//! opponent_delay_ms = 1500
//! flee_chance = 0.7
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::battle::PlayerVitals;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub battle: BattleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the game backend, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remember the identity and token between runs.
    #[serde(default = "default_true")]
    pub remember: bool,
    /// JSON file holding the remembered session.
    #[serde(default = "default_session_file")]
    pub file: String,
}

fn default_true() -> bool {
    true
}

fn default_session_file() -> String {
    "./data/session.json".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            remember: true,
            file: default_session_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Interval between room polls while a room is active.
    pub poll_interval_ms: u64,
    /// Delay before the extra refresh that picks up the narrator's reply.
    pub narrator_followup_delay_ms: u64,
    /// Sender name the backend uses for narrator (game master) messages.
    /// Choice sets are only extracted from this sender. The stock backend
    /// uses `龙与地下城`.
    pub narrator_name: String,
    /// Sender name the backend uses for system notices (`系统` by default).
    pub system_name: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            narrator_followup_delay_ms: 2000,
            narrator_name: "龙与地下城".to_string(),
            system_name: "系统".to_string(),
        }
    }
}

impl RoomConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn narrator_followup_delay(&self) -> Duration {
        Duration::from_millis(self.narrator_followup_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Opponent "thinking time" before its counter-action.
    pub opponent_delay_ms: u64,
    /// Probability that a flee attempt succeeds.
    pub flee_chance: f64,
    pub victory_display_ms: u64,
    pub defeat_display_ms: u64,
    pub escape_display_ms: u64,
    /// Vitals used when the backend profile cannot be fetched.
    #[serde(default)]
    pub default_player: PlayerVitals,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            opponent_delay_ms: 1500,
            flee_chance: 0.7,
            victory_display_ms: 2000,
            defeat_display_ms: 2000,
            escape_display_ms: 1000,
            default_player: PlayerVitals::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values that would break polling or battle pacing.
    pub fn validate(&self) -> Result<()> {
        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "server.base_url must start with http:// or https:// (got '{}')",
                self.server.base_url
            ));
        }
        if self.server.request_timeout_seconds == 0 {
            return Err(anyhow!("server.request_timeout_seconds must be > 0"));
        }
        if self.room.poll_interval_ms < 100 {
            return Err(anyhow!("room.poll_interval_ms must be >= 100"));
        }
        if self.room.narrator_name.trim().is_empty() {
            return Err(anyhow!("room.narrator_name must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.battle.flee_chance) {
            return Err(anyhow!(
                "battle.flee_chance must be within [0, 1] (got {})",
                self.battle.flee_chance
            ));
        }
        let p = &self.battle.default_player;
        if p.max_hp == 0 {
            return Err(anyhow!("battle.default_player.max_hp must be > 0"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                base_url: "http://127.0.0.1:5000".to_string(),
                request_timeout_seconds: default_request_timeout(),
            },
            session: SessionConfig::default(),
            room: RoomConfig::default(),
            battle: BattleConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("questroom.log".to_string()),
            },
        }
    }
}
