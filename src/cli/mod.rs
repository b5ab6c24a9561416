//! CLI module for the indexer
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config_initialization::ConfigOverrides;
use crate::utils::logging::LogFormat;

pub mod args;
pub mod commands;

/// Media library indexer
///
/// Builds per-episode caption documents and fixed-length video segments for a
/// media library, resuming where a previous run stopped.
#[derive(Parser, Debug)]
#[command(name = "indexer")]
#[command(about = "Index a media library into caption documents and video segments")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.memesrc/config.toml, then ./indexer.toml)
    #[arg(long, global = true, env = "MEMESRC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding job working directories
    #[arg(long, global = true)]
    pub processing_dir: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings given on the command line, highest precedence
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            processing_dir: self.processing_dir.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a media directory
    Index(args::IndexArgs),
    /// Show the episode status of a job
    Status(args::StatusArgs),
    /// Print decoded captions of a job
    Captions(args::CaptionsArgs),
    /// Regenerate season and series documents from episode documents
    Rebuild(args::RebuildArgs),
    /// List previous jobs and the library each was built from
    Jobs(args::JobsArgs),
}
