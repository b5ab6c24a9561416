//! Error handling module for the indexer

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Failure of one external tool invocation
#[derive(Error, Debug)]
pub enum ToolError {
    /// The executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully
    #[error("Command failed ({status}): {command}")]
    Failed {
        command: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    /// The tool was stopped by the process registry
    #[error("Command terminated by {signal}: {command}")]
    Terminated {
        command: String,
        signal: String,
        stdout: String,
        stderr: String,
    },

    /// I/O failure while supervising the tool
    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool output could not be understood
    #[error("Unexpected output from {program}: {message}")]
    Parse { program: String, message: String },

    /// Tool reported success but its product is missing or too small
    #[error("Invalid output {path}: {message}")]
    InvalidOutput { path: PathBuf, message: String },
}

impl ToolError {
    /// Captured stderr, when the tool got far enough to produce any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } | ToolError::Terminated { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }

    /// Captured stdout, when the tool got far enough to produce any
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stdout, .. } | ToolError::Terminated { stdout, .. } => {
                Some(stdout.as_str())
            }
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ToolError::Terminated { .. })
    }
}

/// Main error type for indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Value rejected by domain validation
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Root input directory is missing or unreadable
    #[error("Cannot read media root {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory below the root could not be listed
    #[error("Traversal failed at {path}: {message}")]
    Traversal { path: PathBuf, message: String },

    /// Job working directory, status, metadata or document I/O failed
    #[error("Workspace I/O failed at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool failure that the job could not absorb
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Job was cancelled by the host
    #[error("Job {job_id} was cancelled")]
    Cancelled { job_id: String },

    /// A job with the same id is already running
    #[error("Job {job_id} is already running")]
    AlreadyRunning { job_id: String },

    /// Configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl IndexerError {
    /// Wrap an I/O error with the workspace path it concerns
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexerError::Workspace {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        IndexerError::Config {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexerError::Cancelled { .. })
    }
}

/// Result type alias for indexer operations
pub type IndexerResult<T> = std::result::Result<T, IndexerError>;
