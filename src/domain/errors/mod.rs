// Domain errors - Error types for the domain layer

use std::fmt;

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid arguments provided
    BadArgs(String),
    /// Job id cannot be used as a working directory name
    InvalidJobId(String),
    /// Subtitle text could not be parsed
    MalformedSubtitle { line: usize, reason: String },
    /// Timestamp could not be parsed
    InvalidTimestamp(String),
    /// Document line is not a caption row
    InvalidRow(String),
    /// Unknown episode state label
    UnknownState(String),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::BadArgs(msg) => write!(f, "Bad arguments: {}", msg),
            DomainError::InvalidJobId(id) => write!(f, "Invalid job id: {:?}", id),
            DomainError::MalformedSubtitle { line, reason } => {
                write!(f, "Malformed subtitle at line {}: {}", line, reason)
            }
            DomainError::InvalidTimestamp(ts) => write!(f, "Invalid timestamp: {:?}", ts),
            DomainError::InvalidRow(msg) => write!(f, "Invalid document row: {}", msg),
            DomainError::UnknownState(state) => write!(f, "Unknown episode state: {}", state),
        }
    }
}

impl std::error::Error for DomainError {}
