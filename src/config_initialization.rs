//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use tracing::debug;

use crate::adapters::{IndexerConfig, TomlConfigAdapter};
use crate::error::IndexerResult;
use crate::utils::logging::LogFormat;

/// Environment variables and the setting each overrides
pub const ENV_PROCESSING_DIR: &str = "MEMESRC_PROCESSING_DIR";
pub const ENV_FFMPEG: &str = "MEMESRC_FFMPEG";
pub const ENV_FFPROBE: &str = "MEMESRC_FFPROBE";
pub const ENV_LOG_LEVEL: &str = "MEMESRC_LOG_LEVEL";

/// Settings taken from command-line flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub processing_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Build the effective configuration with precedence CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(overrides: &ConfigOverrides) -> IndexerResult<IndexerConfig> {
    resolve_configuration(overrides, |key| std::env::var(key).ok())
}

/// Same as [`initialize_configuration_hierarchy`] with an injectable environment
pub fn resolve_configuration<F>(overrides: &ConfigOverrides, env: F) -> IndexerResult<IndexerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    // Defaults, or a config file on top of them
    let mut config = match TomlConfigAdapter::find_config_file(overrides.config_file.as_deref())? {
        Some(path) => TomlConfigAdapter::load(&path)?,
        None => IndexerConfig::default(),
    };

    let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());
    let mut env_overrides = 0;
    if let Some(dir) = env(ENV_PROCESSING_DIR) {
        config.processing_dir = PathBuf::from(dir);
        env_overrides += 1;
    }
    if let Some(ffmpeg) = env(ENV_FFMPEG) {
        config.ffmpeg_path = PathBuf::from(ffmpeg);
        env_overrides += 1;
    }
    if let Some(ffprobe) = env(ENV_FFPROBE) {
        config.ffprobe_path = PathBuf::from(ffprobe);
        env_overrides += 1;
    }
    if let Some(level) = env(ENV_LOG_LEVEL) {
        config.logging.level = level;
        env_overrides += 1;
    }

    if let Some(dir) = &overrides.processing_dir {
        config.processing_dir = dir.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = overrides.log_format {
        config.logging.format = format;
    }

    config.validate()?;
    debug!(env_overrides, "Configuration resolved");
    Ok(config)
}
