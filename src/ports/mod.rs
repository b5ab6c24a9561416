// Ports - Interface definitions (contracts) for the external media tools

use std::path::Path;

use async_trait::async_trait;

use crate::domain::model::*;
use crate::engine::segmenter::SegmentSettings;
use crate::error::ToolError;

/// How an embedded subtitle stream is written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleCodec {
    /// Transcode to SRT
    Srt,
    /// Copy the stream as is
    Copy,
}

impl SubtitleCodec {
    pub fn as_ffmpeg_arg(self) -> &'static str {
        match self {
            SubtitleCodec::Srt => "srt",
            SubtitleCodec::Copy => "copy",
        }
    }
}

/// Port for media file probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// List the subtitle streams of a media file
    async fn probe_subtitle_streams(
        &self,
        job_id: &JobId,
        media: &Path,
    ) -> Result<Vec<SubtitleStream>, ToolError>;
}

/// Port for media extraction and encoding
#[async_trait]
pub trait ExecutePort: Send + Sync {
    /// Write one embedded subtitle stream to `output`
    async fn extract_subtitle_stream(
        &self,
        job_id: &JobId,
        media: &Path,
        stream_index: u32,
        output: &Path,
        codec: SubtitleCodec,
    ) -> Result<(), ToolError>;

    /// Convert a subtitle file (ASS) to SRT
    async fn convert_to_srt(&self, job_id: &JobId, input: &Path, output: &Path) -> Result<(), ToolError>;

    /// Re-encode a media file into fixed-length segments matching `pattern`
    async fn segment_media(
        &self,
        job_id: &JobId,
        media: &Path,
        pattern: &Path,
        settings: &SegmentSettings,
    ) -> Result<(), ToolError>;
}
