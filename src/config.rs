use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_VERSION: u64 = 1;

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("agenda")
}

fn default_check_slots() -> Vec<NaiveTime> {
    [8, 12, 17]
        .into_iter()
        .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
        .collect()
}

fn default_version() -> u64 {
    CONFIG_VERSION
}

fn default_user_name() -> String {
    "there".to_string()
}

fn default_catch_up_threshold_hours() -> u32 {
    2
}

fn default_planning_hour() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

/// Hosted chat-completion endpoint used by the assistant.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AssistantConfig {
    pub url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            url: "https://api.groq.com/openai/v1/chat/completions".into(),
            model: "llama-3.1-8b-instant".into(),
            max_tokens: 400,
            temperature: 0.7,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AgendaConfig {
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "default_data_dir")]
    pub data_directory: PathBuf,
    /// Name the assistant and the welcome notification address.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Times of day at which the daemon runs a verification pass.
    #[serde(default = "default_check_slots")]
    pub check_slots: Vec<NaiveTime>,
    /// Minimum gap between two catch-up checks.
    #[serde(default = "default_catch_up_threshold_hours")]
    pub catch_up_threshold_hours: u32,
    /// Hour of day at which day-after-tomorrow reminders are sent.
    #[serde(default = "default_planning_hour")]
    pub planning_hour: u32,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            data_directory: default_data_dir(),
            user_name: default_user_name(),
            check_slots: default_check_slots(),
            catch_up_threshold_hours: default_catch_up_threshold_hours(),
            planning_hour: default_planning_hour(),
            notifications_enabled: true,
            debug_logging: false,
            assistant: AssistantConfig::default(),
        }
    }
}

impl AgendaConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("agenda")
            .join("config.json")
    }

    /// Load the config, falling back to defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path.display(), e);
                return Self::default();
            }
        };

        let config: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Malformed config {}, using defaults: {}", path.display(), e);
                return Self::default();
            }
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_slots.is_empty() {
            return Err(Error::InvalidConfig(
                "check_slots must list at least one time of day".into(),
            ));
        }
        if self.planning_hour > 23 {
            return Err(Error::InvalidConfig(format!(
                "planning_hour {} is not an hour of the day",
                self.planning_hour
            )));
        }
        if self.catch_up_threshold_hours == 0 {
            return Err(Error::InvalidConfig(
                "catch_up_threshold_hours must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_directory.join("storage.json")
    }

    pub fn catch_up_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.catch_up_threshold_hours))
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_daily_slots() {
        let config = AgendaConfig::default();
        let hours: Vec<u32> = config
            .check_slots
            .iter()
            .map(|t| chrono::Timelike::hour(t))
            .collect();
        assert_eq!(hours, vec![8, 12, 17]);
        assert_eq!(config.catch_up_threshold(), chrono::Duration::hours(2));
        assert_eq!(config.planning_hour, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: AgendaConfig = serde_json::from_str(r#"{"user_name": "Ana"}"#).unwrap();
        assert_eq!(config.user_name, "Ana");
        assert_eq!(config.check_slots.len(), 3);
        assert_eq!(config.assistant.model, "llama-3.1-8b-instant");
        assert!(config.notifications_enabled);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AgendaConfig::default();
        config.user_name = "Sam".into();
        config.notifications_enabled = false;
        config.save(&path).unwrap();

        assert_eq!(AgendaConfig::load(&path), config);
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"check_slots": []}"#).unwrap();
        assert_eq!(AgendaConfig::load(&path), AgendaConfig::default());

        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(AgendaConfig::load(&path), AgendaConfig::default());
    }

    #[test]
    fn rejects_out_of_range_planning_hour() {
        let config = AgendaConfig {
            planning_hour: 24,
            ..AgendaConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
