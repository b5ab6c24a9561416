//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

use crate::domain::model::{EpisodeState, JobMetadata};

/// Arguments for the index command
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Root directory of the media library
    #[arg(short, long)]
    pub input: PathBuf,

    /// Job id (default: a new random id)
    #[arg(long)]
    pub id: Option<String>,

    /// Title of the indexed series
    #[arg(long, default_value = "")]
    pub title: String,

    /// Description of the indexed series
    #[arg(long, default_value = "")]
    pub description: String,

    /// Frame count target
    #[arg(long, default_value_t = 10)]
    pub frame_count: u32,

    /// Main display color
    #[arg(long, default_value = "")]
    pub color_main: String,

    /// Secondary display color
    #[arg(long, default_value = "")]
    pub color_secondary: String,

    /// Display emoji
    #[arg(long, default_value = "")]
    pub emoji: String,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexArgs {
    pub fn metadata(&self) -> JobMetadata {
        JobMetadata {
            title: self.title.clone(),
            description: self.description.clone(),
            frame_count: self.frame_count,
            color_main: self.color_main.clone(),
            color_secondary: self.color_secondary.clone(),
            emoji: self.emoji.clone(),
        }
    }
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job id
    #[arg(long)]
    pub id: String,

    /// Only show episodes in this state: pending, indexing or done
    #[arg(long, value_parser = parse_state)]
    pub state: Option<EpisodeState>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

fn parse_state(label: &str) -> Result<EpisodeState, String> {
    EpisodeState::parse(label).map_err(|e| e.to_string())
}

/// Arguments for the captions command
#[derive(Args, Debug)]
pub struct CaptionsArgs {
    /// Job id
    #[arg(long)]
    pub id: String,

    /// Season document to read instead of the series document
    #[arg(long)]
    pub season: Option<u32>,

    /// Episode document to read (requires --season)
    #[arg(long, requires = "season")]
    pub episode: Option<u32>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the rebuild command
#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// Job id
    #[arg(long)]
    pub id: String,
}

/// Arguments for the jobs command
#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
