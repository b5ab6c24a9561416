//! FFmpeg execution adapter
//!
//! Builds ffmpeg command lines for subtitle extraction, ASS conversion and
//! segmenting, and runs them through the process registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::model::JobId;
use crate::engine::process::{ProcessRegistry, ToolCommand};
use crate::engine::segmenter::SegmentSettings;
use crate::error::ToolError;
use crate::ports::*;

/// FFmpeg-based execution adapter
pub struct FFmpegAdapter {
    ffmpeg: PathBuf,
    registry: Arc<ProcessRegistry>,
}

impl FFmpegAdapter {
    /// Create new FFmpeg adapter
    pub fn new(ffmpeg: impl Into<PathBuf>, registry: Arc<ProcessRegistry>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            registry,
        }
    }

    /// `ffmpeg -y -i <media> -map 0:<index> -c:s <codec> <output>`
    pub fn extract_command(&self, media: &Path, stream_index: u32, output: &Path, codec: SubtitleCodec) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-i"])
            .arg(media)
            .arg("-map")
            .arg(format!("0:{}", stream_index))
            .args(["-c:s", codec.as_ffmpeg_arg()])
            .arg(output)
    }

    /// `ffmpeg -y -i <input> -c:s srt <output>`
    pub fn convert_command(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-i"])
            .arg(input)
            .args(["-c:s", "srt"])
            .arg(output)
    }

    pub fn segment_command(&self, media: &Path, pattern: &Path, settings: &SegmentSettings) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg).args(settings.ffmpeg_args(media, pattern))
    }

    async fn run(&self, job_id: &JobId, command: ToolCommand) -> Result<(), ToolError> {
        let output = self.registry.run(job_id, command).await?;
        debug!(job_id = %job_id, status = %output.status, "ffmpeg finished");
        Ok(())
    }
}

#[async_trait]
impl ExecutePort for FFmpegAdapter {
    async fn extract_subtitle_stream(
        &self,
        job_id: &JobId,
        media: &Path,
        stream_index: u32,
        output: &Path,
        codec: SubtitleCodec,
    ) -> Result<(), ToolError> {
        self.run(job_id, self.extract_command(media, stream_index, output, codec))
            .await
    }

    async fn convert_to_srt(&self, job_id: &JobId, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.run(job_id, self.convert_command(input, output)).await
    }

    async fn segment_media(
        &self,
        job_id: &JobId,
        media: &Path,
        pattern: &Path,
        settings: &SegmentSettings,
    ) -> Result<(), ToolError> {
        self.run(job_id, self.segment_command(media, pattern, settings))
            .await
    }
}
