//! Runtime configuration: YAML file, then environment overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const MIN_TICK_INTERVAL_MS: u64 = 1000;

pub const ENV_FULL_DOMAIN: &str = "SCAVBOT_FULL_DOMAIN";
pub const ENV_TICK_MS: &str = "SCAVBOT_TICK_MS";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "SCAVBOT_COMMAND_TIMEOUT_MS";
pub const ENV_STORAGE_DIR: &str = "SCAVBOT_STORAGE_DIR";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game-world host every message is addressed to.
    pub full_domain: String,
    pub tick_interval_ms: u64,
    pub command_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    /// Where the key-value store lives; in-memory when unset.
    pub storage_dir: Option<PathBuf>,
    /// Page the simulated tab opens on.
    pub start_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            full_domain: "localhost".to_string(),
            tick_interval_ms: 1000,
            command_timeout_ms: 30_000,
            ready_timeout_ms: 10_000,
            storage_dir: None,
            start_url: "http://localhost/game.php".to_string(),
        }
    }
}

impl Config {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Apply `SCAVBOT_*` variables on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(domain) = lookup(ENV_FULL_DOMAIN) {
            self.full_domain = domain;
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            self.tick_interval_ms = parse_ms(ENV_TICK_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COMMAND_TIMEOUT_MS) {
            self.command_timeout_ms = parse_ms(ENV_COMMAND_TIMEOUT_MS, &raw)?;
        }
        if let Some(dir) = lookup(ENV_STORAGE_DIR) {
            self.storage_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.full_domain.trim().is_empty() {
            return Err(AppError::InvalidConfig("full_domain must not be empty".into()));
        }
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(AppError::InvalidConfig(format!(
                "tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS} (got {})",
                self.tick_interval_ms
            )));
        }
        if self.command_timeout_ms == 0 {
            return Err(AppError::InvalidConfig("command_timeout_ms must be positive".into()));
        }
        if self.ready_timeout_ms == 0 {
            return Err(AppError::InvalidConfig("ready_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

fn parse_ms(key: &str, raw: &str) -> Result<u64, AppError> {
    raw.trim().parse().map_err(|_| AppError::InvalidEnv {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("full_domain: pl201.plemiona.pl\n").unwrap();
        assert_eq!(config.full_domain, "pl201.plemiona.pl");
        assert_eq!(config.tick_interval_ms, 1000);
        assert!(config.storage_dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_FULL_DOMAIN, "pl202.plemiona.pl"),
            (ENV_TICK_MS, "2000"),
            (ENV_STORAGE_DIR, "/tmp/scavbot"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.full_domain, "pl202.plemiona.pl");
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/scavbot")));
    }

    #[test]
    fn malformed_env_number_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == ENV_COMMAND_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEnv { .. }));
    }

    #[test]
    fn sub_second_ticks_are_invalid() {
        let config = Config {
            tick_interval_ms: 250,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
