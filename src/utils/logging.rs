//! Logging configuration, subscriber setup and stage reporting

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::model::PipelineStage;
use crate::error::{IndexerError, IndexerResult};

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or `memesrc_indexer=debug`
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            target: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Pretty,
    /// Compact single-line text format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for LogFormat {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(IndexerError::config(format!("unknown log format: {}", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        };
        f.write_str(name)
    }
}

impl LoggingConfig {
    /// Check that the level parses as a filter directive
    pub fn validate(&self) -> IndexerResult<()> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| IndexerError::config(format!("invalid log level {:?}: {}", self.level, e)))
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays parseable.
///
/// Returns `false` when a subscriber was already installed (tests, embedding hosts).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.target)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}

/// Logs start, finish and elapsed time of orchestrator stages
pub struct StageReporter {
    job_id: String,
    current: Option<(PipelineStage, Instant)>,
    job_started: Instant,
}

impl StageReporter {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            current: None,
            job_started: Instant::now(),
        }
    }

    /// Close the running stage (if any) and open `stage`
    pub fn enter(&mut self, stage: PipelineStage) {
        self.finish_current();
        tracing::info!(job_id = %self.job_id, stage = %stage, "Stage started");
        self.current = Some((stage, Instant::now()));
    }

    /// Stage currently running
    pub fn stage(&self) -> Option<PipelineStage> {
        self.current.map(|(stage, _)| stage)
    }

    fn finish_current(&mut self) {
        if let Some((stage, started)) = self.current.take() {
            tracing::info!(
                job_id = %self.job_id,
                stage = %stage,
                elapsed = %super::format_duration(started.elapsed()),
                "Stage finished"
            );
        }
    }

    /// Close the last stage and log the job outcome
    pub fn complete(&mut self, success: bool) {
        let stage = self.stage();
        self.finish_current();
        let elapsed = super::format_duration(self.job_started.elapsed());
        if success {
            tracing::info!(job_id = %self.job_id, %elapsed, "Job completed");
        } else {
            tracing::error!(
                job_id = %self.job_id,
                %elapsed,
                stage = ?stage,
                "Job failed"
            );
        }
    }
}
