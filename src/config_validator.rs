use regex::Regex;
use std::sync::OnceLock;

use crate::config::{Config, StoreBackend};
use crate::error::{GatekeeperError, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn redis_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^rediss?://\S+$").expect("static regex is valid"))
}

/// Startup checks for process settings
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(GatekeeperError::ConfigValidation(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !redis_url_pattern().is_match(url) {
            return Err(GatekeeperError::ConfigValidation(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<()> {
        if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(GatekeeperError::ConfigValidation(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// The redis URL only matters when redis is the selected store.
    pub fn validate(config: &Config) -> Result<()> {
        if config.store == StoreBackend::Redis {
            Self::validate_redis_url(&config.redis_url)?;
        }
        Self::validate_log_level(&config.log_level)
    }
}
