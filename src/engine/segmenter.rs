//! Media segmenter: fixed-duration, fixed-framerate re-encode of one episode

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::model::{EpisodeKey, EpisodeState};
use crate::error::{IndexerError, IndexerResult, ToolError};
use crate::output::{JobWorkspace, StatusStore};
use crate::ports::ExecutePort;

/// Encoder settings for segment output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    /// Output frame rate
    pub fps: u32,
    /// Frames wider than this are scaled down, keeping an even height
    pub max_width: u32,
    pub crf: u8,
    pub preset: String,
    /// GOP size in frames
    pub gop: u32,
    /// Forced keyframe spacing in seconds
    pub keyframe_interval_secs: u32,
    /// Length of each segment in seconds
    pub segment_secs: u32,
    pub profile: String,
    pub pix_fmt: String,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            fps: 10,
            max_width: 1280,
            crf: 31,
            preset: "fast".to_string(),
            gop: 5,
            keyframe_interval_secs: 5,
            segment_secs: 25,
            profile: "high".to_string(),
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

impl SegmentSettings {
    /// Reject values ffmpeg would refuse
    pub fn validate(&self) -> IndexerResult<()> {
        let positive = [
            ("fps", self.fps),
            ("max_width", self.max_width),
            ("gop", self.gop),
            ("keyframe_interval_secs", self.keyframe_interval_secs),
            ("segment_secs", self.segment_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(IndexerError::config(format!("segment.{} must be greater than 0", name)));
        }
        if self.crf > 51 {
            return Err(IndexerError::config("segment.crf must be between 0 and 51"));
        }
        for (name, value) in [
            ("preset", &self.preset),
            ("profile", &self.profile),
            ("pix_fmt", &self.pix_fmt),
        ] {
            if value.trim().is_empty() {
                return Err(IndexerError::config(format!("segment.{} must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Video filter: resample to `fps`, cap width at `max_width`, keep height even
    pub fn video_filter(&self) -> String {
        let width = format!("min(iw\\,{})", self.max_width);
        format!(
            "fps={},scale='{}:2*trunc(({}/iw*ih)/2)'",
            self.fps, width, width
        )
    }

    /// Full ffmpeg argument list for segmenting `input` into `pattern`
    pub fn ffmpeg_args(&self, input: &Path, pattern: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into(), "-an".into()];
        let options = [
            ("-filter:v", self.video_filter()),
            ("-crf", self.crf.to_string()),
            ("-preset", self.preset.clone()),
            ("-reset_timestamps", "1".to_string()),
            ("-sc_threshold", "0".to_string()),
            ("-g", self.gop.to_string()),
            (
                "-force_key_frames",
                format!("expr:gte(t, n_forced * {})", self.keyframe_interval_secs),
            ),
            ("-profile:v", self.profile.clone()),
            ("-pix_fmt", self.pix_fmt.clone()),
            ("-segment_time", self.segment_secs.to_string()),
            ("-f", "segment".to_string()),
        ];
        for (flag, value) in options {
            args.push(flag.into());
            args.push(value.into());
        }
        args.push("-y".into());
        args.push(pattern.into());
        args
    }
}

/// Result of segmenting one episode
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Episode was `done` before this run
    AlreadyDone,
    /// Segments written, episode is now `done`
    Segmented,
    /// Encoder failed; episode stays `indexing` for the next run
    Failed(ToolError),
}

/// Runs the segment encode and moves the episode through `indexing` to `done`
pub struct MediaSegmenter {
    executor: Arc<dyn ExecutePort>,
    settings: SegmentSettings,
}

impl MediaSegmenter {
    pub fn new(executor: Arc<dyn ExecutePort>, settings: SegmentSettings) -> Self {
        Self { executor, settings }
    }

    pub async fn segment_episode(
        &self,
        workspace: &JobWorkspace,
        status: &StatusStore,
        key: EpisodeKey,
        media: &Path,
        cancel: &CancellationToken,
    ) -> IndexerResult<SegmentOutcome> {
        if status.get(key).await == EpisodeState::Done {
            return Ok(SegmentOutcome::AlreadyDone);
        }

        status.set(key, EpisodeState::Indexing).await?;

        let episode_dir = workspace.episode_dir(key);
        tokio::fs::create_dir_all(&episode_dir)
            .await
            .map_err(|e| IndexerError::workspace(&episode_dir, e))?;

        // last chance before a long encode; the awaits above can straddle a cancel
        if cancel.is_cancelled() {
            return Err(IndexerError::Cancelled {
                job_id: workspace.job_id().to_string(),
            });
        }
        info!(job_id = %workspace.job_id(), episode = %key, file = %media.display(), "Segmenting media");
        let pattern = workspace.segment_pattern(key);
        match self
            .executor
            .segment_media(workspace.job_id(), media, &pattern, &self.settings)
            .await
        {
            Ok(()) => {
                status.set(key, EpisodeState::Done).await?;
                info!(job_id = %workspace.job_id(), episode = %key, "Episode done");
                Ok(SegmentOutcome::Segmented)
            }
            Err(e) => {
                warn!(
                    job_id = %workspace.job_id(),
                    episode = %key,
                    error = %e,
                    stderr = e.stderr().unwrap_or_default(),
                    "Segmenting failed, episode left indexing"
                );
                Ok(SegmentOutcome::Failed(e))
            }
        }
    }
}
