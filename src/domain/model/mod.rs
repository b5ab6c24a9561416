// Domain models - Core types and data structures

use std::fmt;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Header line shared by every caption document
pub const DOCUMENT_HEADER: &str = "season,episode,subtitle_index,subtitle_text,start_frame,end_frame";

/// Frame clock used for caption frame indexes
pub const FRAMES_PER_SECOND: u64 = 10;

/// Opaque job identifier, also the name of the job's working directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a job id
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed != id
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0'])
        {
            return Err(DomainError::InvalidJobId(id));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random job id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(season, episode)` pair identifying one unit of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeKey {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.season, self.episode)
    }
}

/// Processing state of one episode.
///
/// Variants are declared in transition order so that `Ord` reflects progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeState {
    #[default]
    Pending,
    Indexing,
    Done,
}

impl EpisodeState {
    /// Whether moving from `self` to `next` keeps the state machine monotonic
    pub fn can_transition_to(self, next: EpisodeState) -> bool {
        next >= self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeState::Pending => "pending",
            EpisodeState::Indexing => "indexing",
            EpisodeState::Done => "done",
        }
    }

    pub fn parse(label: &str) -> Result<Self, DomainError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EpisodeState::Pending),
            "indexing" => Ok(EpisodeState::Indexing),
            "done" => Ok(EpisodeState::Done),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped subtitle entry as read from a subtitle file
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Zero-based position within the source file
    pub index: usize,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    /// Sanitized plain text
    pub text: String,
}

/// One caption record of a document, in frame units
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CaptionRow {
    pub season: u32,
    pub episode: u32,
    pub subtitle_index: usize,
    pub text: String,
    pub start_frame: u64,
    pub end_frame: u64,
}

impl CaptionRow {
    /// Build a row from a cue; cues missing either timestamp yield `None`
    pub fn from_cue(key: EpisodeKey, cue: &Cue) -> Option<Self> {
        let start = cue.start_ms?;
        let end = cue.end_ms?;
        Some(Self {
            season: key.season,
            episode: key.episode,
            subtitle_index: cue.index,
            text: cue.text.clone(),
            start_frame: crate::domain::rules::frame_index(start),
            end_frame: crate::domain::rules::frame_index(end),
        })
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.episode)
    }

    /// Render as a document line (text base64 encoded)
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.season,
            self.episode,
            self.subtitle_index,
            BASE64.encode(self.text.as_bytes()),
            self.start_frame,
            self.end_frame
        )
    }

    /// Parse a document line produced by [`CaptionRow::to_csv_line`]
    pub fn parse_csv_line(line: &str) -> Result<Self, DomainError> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
        if fields.len() != 6 {
            return Err(DomainError::InvalidRow(format!(
                "expected 6 fields, found {}",
                fields.len()
            )));
        }

        let number = |value: &str, name: &str| -> Result<u64, DomainError> {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| DomainError::InvalidRow(format!("{} is not a number: {:?}", name, value)))
        };

        let decoded = BASE64
            .decode(fields[3].trim())
            .map_err(|e| DomainError::InvalidRow(format!("subtitle_text is not base64: {}", e)))?;
        let text = String::from_utf8(decoded)
            .map_err(|_| DomainError::InvalidRow("subtitle_text is not UTF-8".to_string()))?;

        let season = u32::try_from(number(fields[0], "season")?)
            .map_err(|_| DomainError::InvalidRow("season out of range".to_string()))?;
        let episode = u32::try_from(number(fields[1], "episode")?)
            .map_err(|_| DomainError::InvalidRow("episode out of range".to_string()))?;
        let subtitle_index = usize::try_from(number(fields[2], "subtitle_index")?)
            .map_err(|_| DomainError::InvalidRow("subtitle_index out of range".to_string()))?;

        Ok(Self {
            season,
            episode,
            subtitle_index,
            text,
            start_frame: number(fields[4], "start_frame")?,
            end_frame: number(fields[5], "end_frame")?,
        })
    }
}

/// Descriptive metadata written to `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "JobMetadata::default_frame_count")]
    pub frame_count: u32,
    #[serde(default)]
    pub color_main: String,
    #[serde(default)]
    pub color_secondary: String,
    #[serde(default)]
    pub emoji: String,
}

impl JobMetadata {
    fn default_frame_count() -> u32 {
        10
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            frame_count: Self::default_frame_count(),
            color_main: String::new(),
            color_secondary: String::new(),
            emoji: String::new(),
        }
    }
}

/// Subtitle stream reported by the probe tool
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStream {
    /// Absolute stream index inside the container
    pub index: u32,
    pub codec_name: Option<String>,
    pub language: Option<String>,
}

impl SubtitleStream {
    pub fn is_codec(&self, codec: &str) -> bool {
        self.codec_name
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(codec))
            .unwrap_or(false)
    }
}

/// Request to index one media root
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub job_id: JobId,
    pub root: PathBuf,
    pub metadata: JobMetadata,
}

/// Orchestrator stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Init,
    MetadataWritten,
    StatusSeeded,
    SubtitlesFromFiles,
    SubtitlesFromMedia,
    MediaSegmented,
    Summarized,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::MetadataWritten => "metadata-written",
            PipelineStage::StatusSeeded => "status-seeded",
            PipelineStage::SubtitlesFromFiles => "subtitles-from-files",
            PipelineStage::SubtitlesFromMedia => "subtitles-from-media",
            PipelineStage::MediaSegmented => "media-segmented",
            PipelineStage::Summarized => "summarized",
        };
        f.write_str(name)
    }
}

/// Per-episode line of the job summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub season: u32,
    pub episode: u32,
    pub media: bool,
    pub subtitles: bool,
    pub state: EpisodeState,
}

/// Result of a successful job run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub episodes: Vec<EpisodeSummary>,
}

impl JobSummary {
    pub fn episode(&self, key: EpisodeKey) -> Option<&EpisodeSummary> {
        self.episodes
            .iter()
            .find(|e| e.season == key.season && e.episode == key.episode)
    }

    pub fn count_in_state(&self, state: EpisodeState) -> usize {
        self.episodes.iter().filter(|e| e.state == state).count()
    }
}

/// A previous job with its metadata and the library it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    /// Library root of the latest run, `None` when it was never recorded
    pub folder_path: Option<PathBuf>,
    #[serde(flatten)]
    pub metadata: JobMetadata,
}
