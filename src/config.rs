use crate::errors::{AppError, AppResult};
use crate::notification::DEFAULT_BROADCAST_TOPIC;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Highest point value the reward store accepts.
pub const REWARD_POINT_CEILING: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub request_timeout_ms: u64,
    pub reward_multiplier: i64,
    pub min_reward_point: i64,
    pub max_reward_point: i64,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub broadcast_topic: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("peerly.db"),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            request_timeout_ms: 5_000,
            reward_multiplier: 10,
            min_reward_point: 1,
            max_reward_point: REWARD_POINT_CEILING,
            default_page_size: 10,
            max_page_size: 100,
            broadcast_topic: DEFAULT_BROADCAST_TOPIC.to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let settings: Settings = if raw.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(AppError::Validation("requestTimeoutMs must be positive".to_string()));
        }
        if self.reward_multiplier <= 0 {
            return Err(AppError::Validation("rewardMultiplier must be positive".to_string()));
        }
        if self.min_reward_point < 1
            || self.min_reward_point > self.max_reward_point
            || self.max_reward_point > REWARD_POINT_CEILING
        {
            return Err(AppError::Validation(format!(
                "reward point bounds must satisfy 1 <= min <= max <= {} (got {}..={})",
                REWARD_POINT_CEILING, self.min_reward_point, self.max_reward_point
            )));
        }
        if self.broadcast_topic.trim().is_empty() {
            return Err(AppError::Validation("broadcastTopic must not be blank".to_string()));
        }
        if self.default_page_size < 1 || self.default_page_size > self.max_page_size {
            return Err(AppError::Validation(
                "defaultPageSize must be between 1 and maxPageSize".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
