//! memesrc media library indexer
//!
//! Walks a media library, extracts captions into per-episode, per-season and
//! per-series caption documents, and cuts each episode into fixed-length video
//! segments. Progress is persisted per episode so an interrupted job resumes
//! where it stopped.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod library;
pub mod output;
pub mod ports;
pub mod streams;
pub mod utils;

// Re-export commonly used types
pub use adapters::IndexerConfig;
pub use app::{AppContainer, DefaultAppContainer, IndexService};
pub use domain::errors::DomainError;
pub use domain::model::{EpisodeKey, EpisodeState, JobId, JobMetadata, JobRecord, JobSummary};
pub use engine::{ProcessRegistry, Signal};
pub use error::{IndexerError, IndexerResult, ToolError};
