//! Environment-driven settings.

use std::time::Duration;

use crate::breaker::DEFAULT_BREAKER_THRESHOLD;
use crate::client::{RetryConfig, UpstreamConfig};
use crate::error::InputError;

pub const API_KEY_VAR: &str = "CURSEFORGE_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.curseforge.com";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub game_id: i64,
    /// Free-form environment tag included in cycle logs.
    pub environment: String,
    pub upstream: UpstreamConfig,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Unparseable numbers fall back
    /// to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let num = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let retry = RetryConfig {
            max_attempts: num("ADDONPULSE_RETRY_MAX", 3).clamp(1, 10) as u32,
            base_delay_ms: num("ADDONPULSE_RETRY_BASE_MS", 1000),
            max_delay_ms: num("ADDONPULSE_RETRY_MAX_MS", 30_000),
        };

        Self {
            api_key: non_empty(API_KEY_VAR),
            base_url: non_empty("CURSEFORGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            game_id: num("ADDONPULSE_GAME_ID", 1) as i64,
            environment: non_empty("ADDONPULSE_ENV").unwrap_or_else(|| "development".to_string()),
            upstream: UpstreamConfig {
                retry,
                breaker_threshold: num(
                    "ADDONPULSE_BREAKER_THRESHOLD",
                    DEFAULT_BREAKER_THRESHOLD as u64,
                ) as u32,
                request_delay: Duration::from_millis(num("ADDONPULSE_REQUEST_DELAY_MS", 250)),
            },
        }
    }

    pub fn require_api_key(&self) -> Result<&str, InputError> {
        self.api_key
            .as_deref()
            .ok_or(InputError::MissingEnv(API_KEY_VAR))
    }
}
