use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::env::LogFormat;
use crate::config::Config;
use crate::errors::AppError;

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    /// File the values came from; `None` when defaults were used.
    pub path: Option<PathBuf>,
}

fn default_config_path() -> Option<PathBuf> {
    // Priority: ./config/scavbot.yaml > <config dir>/scavbot/config.yaml
    let local = PathBuf::from("config/scavbot.yaml");
    if local.exists() {
        return Some(local);
    }
    let mut path = dirs::config_dir()?;
    path.push("scavbot");
    path.push("config.yaml");
    Some(path)
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let candidate = match config_path {
        Some(path) => Some(path.clone()),
        None => default_config_path(),
    };

    let (mut config, path) = match candidate {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| AppError::ConfigRead {
                    path: path.clone(),
                    source,
                })?;
            let config: Config = serde_yaml::from_str(&content).map_err(|source| {
                AppError::ConfigParse {
                    path: path.clone(),
                    source,
                }
            })?;
            (config, Some(path))
        }
        Some(path) if config_path.is_some() => {
            return Err(AppError::ConfigRead {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            }
            .into());
        }
        other => {
            if let Some(path) = other {
                warn!("Config file not found, using defaults: {}", path.display());
            }
            (Config::default(), None)
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(LoadedConfig { config, path })
}
