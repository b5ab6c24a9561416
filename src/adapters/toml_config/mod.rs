// TOML config adapter - Indexer settings loaded from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::segmenter::SegmentSettings;
use crate::error::{IndexerError, IndexerResult};
use crate::streams::SubtitleConfig;
use crate::utils::logging::LoggingConfig;

/// Name of the optional config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "indexer.toml";

/// All indexer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexerConfig {
    /// Parent of every job working directory
    pub processing_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Extracted subtitle files below this size count as failures
    pub min_subtitle_bytes: u64,
    pub preferred_subtitle_language: String,
    /// How long interrupted tools get to exit before they are killed
    pub shutdown_grace_ms: u64,
    pub segment: SegmentSettings,
    pub logging: LoggingConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            processing_dir: memesrc_home().join("processing"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            min_subtitle_bytes: 100,
            preferred_subtitle_language: "eng".to_string(),
            shutdown_grace_ms: 3000,
            segment: SegmentSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl IndexerConfig {
    pub fn subtitle_config(&self) -> SubtitleConfig {
        SubtitleConfig {
            min_subtitle_bytes: self.min_subtitle_bytes,
            preferred_language: self.preferred_subtitle_language.clone(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> IndexerResult<()> {
        if self.processing_dir.as_os_str().is_empty() {
            return Err(IndexerError::config("processing_dir must not be empty"));
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(IndexerError::config("ffmpeg_path must not be empty"));
        }
        if self.ffprobe_path.as_os_str().is_empty() {
            return Err(IndexerError::config("ffprobe_path must not be empty"));
        }
        if self.preferred_subtitle_language.trim().is_empty() {
            return Err(IndexerError::config("preferred_subtitle_language must not be empty"));
        }
        self.segment.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// `~/.memesrc`, or `.memesrc` in the working directory when there is no home
pub fn memesrc_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".memesrc"))
        .unwrap_or_else(|| PathBuf::from(".memesrc"))
}

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// Parse a TOML document into a config, unknown keys rejected
    pub fn parse(content: &str) -> IndexerResult<IndexerConfig> {
        toml::from_str(content).map_err(|e| IndexerError::config(format!("invalid TOML: {}", e)))
    }

    /// Load a config file
    pub fn load(path: &Path) -> IndexerResult<IndexerConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IndexerError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        debug!(file = %path.display(), "Loading configuration file");
        Self::parse(&content).map_err(|e| match e {
            IndexerError::Config { message } => {
                IndexerError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Candidate config files in lookup order
    pub fn default_config_paths() -> Vec<PathBuf> {
        vec![memesrc_home().join("config.toml"), PathBuf::from(LOCAL_CONFIG_FILE)]
    }

    /// The explicit file if given (it must exist), else the first default that exists
    pub fn find_config_file(explicit: Option<&Path>) -> IndexerResult<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(IndexerError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }
        Ok(Self::default_config_paths().into_iter().find(|p| p.is_file()))
    }

    /// Render a config as TOML, used to print the effective settings
    pub fn to_toml(config: &IndexerConfig) -> IndexerResult<String> {
        toml::to_string_pretty(config).map_err(|e| IndexerError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::LogFormat;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert!(config.processing_dir.ends_with(".memesrc/processing"));
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.min_subtitle_bytes, 100);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = TomlConfigAdapter::parse(
            r#"
            processing_dir = "/srv/index"
            min_subtitle_bytes = 50

            [segment]
            crf = 28

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.processing_dir, PathBuf::from("/srv/index"));
        assert_eq!(config.min_subtitle_bytes, 50);
        assert_eq!(config.segment.crf, 28);
        assert_eq!(config.segment.segment_secs, 25);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_parse_rejects_unknown_and_invalid() {
        assert!(TomlConfigAdapter::parse("procesing_dir = \"/x\"").is_err());
        assert!(TomlConfigAdapter::parse("min_subtitle_bytes = \"many\"").is_err());
        let config = TomlConfigAdapter::parse("[segment]\nfps = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "ffmpeg_path = \"/opt/ffmpeg\"\n").unwrap();

        assert_eq!(
            TomlConfigAdapter::find_config_file(Some(&path)).unwrap(),
            Some(path.clone())
        );
        assert!(TomlConfigAdapter::find_config_file(Some(&dir.path().join("missing.toml"))).is_err());
        let config = TomlConfigAdapter::load(&path).unwrap();
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = IndexerConfig::default();
        let text = TomlConfigAdapter::to_toml(&config).unwrap();
        assert_eq!(TomlConfigAdapter::parse(&text).unwrap(), config);
    }
}
