//! Subtitle acquisition: standalone files and embedded stream extraction

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::model::{Cue, EpisodeKey, SubtitleStream};
use crate::error::{IndexerError, IndexerResult, ToolError};
use crate::output::{JobWorkspace, OutputWriter};
use crate::ports::{ExecutePort, ProbePort, SubtitleCodec};
use crate::streams::srt::parse_srt_bytes;
use crate::utils::format_file_size;

/// Subtitle acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// Extracted files smaller than this are treated as failed extractions
    pub min_subtitle_bytes: u64,
    /// Language tag preferred when a file carries several subtitle streams
    pub preferred_language: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            min_subtitle_bytes: 100,
            preferred_language: "eng".to_string(),
        }
    }
}

/// Pick the stream tagged with `preferred` language, else the first one
pub fn select_stream<'a>(streams: &'a [SubtitleStream], preferred: &str) -> Option<&'a SubtitleStream> {
    streams
        .iter()
        .find(|s| {
            s.language
                .as_deref()
                .map(|lang| lang.eq_ignore_ascii_case(preferred))
                .unwrap_or(false)
        })
        .or_else(|| streams.first())
}

/// Produces cues for an episode from a standalone file or an embedded stream
pub struct SubtitleProcessor {
    probe: Arc<dyn ProbePort>,
    executor: Arc<dyn ExecutePort>,
    config: SubtitleConfig,
    writer: OutputWriter,
}

impl SubtitleProcessor {
    pub fn new(probe: Arc<dyn ProbePort>, executor: Arc<dyn ExecutePort>, config: SubtitleConfig) -> Self {
        Self {
            probe,
            executor,
            config,
            writer: OutputWriter::new(),
        }
    }

    /// Read and parse a subtitle file. Failures are logged and yield `None`.
    pub async fn captions_from_file(&self, path: &Path) -> Option<Vec<Cue>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot read subtitle file, skipping");
                return None;
            }
        };

        match parse_srt_bytes(&bytes) {
            Ok(cues) => {
                debug!(file = %path.display(), cues = cues.len(), "Subtitle file parsed");
                Some(cues)
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot parse subtitle file, skipping");
                None
            }
        }
    }

    /// Extract, validate and parse the best embedded subtitle stream of `media`.
    ///
    /// Tool and parse failures are logged and yield `Ok(None)`; only workspace
    /// I/O failures are errors.
    pub async fn captions_from_media(
        &self,
        workspace: &JobWorkspace,
        key: EpisodeKey,
        media: &Path,
    ) -> IndexerResult<Option<Vec<Cue>>> {
        let job_id = workspace.job_id();
        let streams = match self.probe.probe_subtitle_streams(job_id, media).await {
            Ok(streams) => streams,
            Err(e) => {
                log_tool_failure(media, "Probing subtitle streams failed", &e);
                return Ok(None);
            }
        };

        let Some(stream) = select_stream(&streams, &self.config.preferred_language) else {
            warn!(file = %media.display(), episode = %key, "No subtitle streams in media file");
            return Ok(None);
        };
        debug!(
            file = %media.display(),
            stream = stream.index,
            codec = ?stream.codec_name,
            language = ?stream.language,
            "Selected subtitle stream"
        );

        let episode_dir = workspace.episode_dir(key);
        tokio::fs::create_dir_all(&episode_dir)
            .await
            .map_err(|e| IndexerError::workspace(&episode_dir, e))?;

        let Some(srt) = self.extract_srt(workspace, key, media, stream).await? else {
            warn!(file = %media.display(), episode = %key, "No usable subtitles could be extracted");
            return Ok(None);
        };

        Ok(self.captions_from_file(&srt).await)
    }

    /// Run the extraction fallback chain; returns the validated SRT path
    async fn extract_srt(
        &self,
        workspace: &JobWorkspace,
        key: EpisodeKey,
        media: &Path,
        stream: &SubtitleStream,
    ) -> IndexerResult<Option<PathBuf>> {
        let job_id = workspace.job_id();
        let srt = workspace.extracted_subtitle(key, "srt");

        match self
            .executor
            .extract_subtitle_stream(job_id, media, stream.index, &srt, SubtitleCodec::Srt)
            .await
        {
            Ok(()) if self.is_valid_output(&srt).await => return Ok(Some(srt)),
            Ok(()) => debug!(file = %srt.display(), "Direct SRT extraction produced no usable output"),
            Err(e) => log_tool_failure(media, "Direct SRT extraction failed", &e),
        }
        self.writer.remove_if_exists(&srt).await?;

        if !stream.is_codec("ass") {
            return Ok(None);
        }

        info!(file = %media.display(), episode = %key, "Falling back to ASS extraction");
        let ass = workspace.extracted_subtitle(key, "ass");
        let converted = self.extract_via_ass(workspace, media, stream, &ass, &srt).await;
        self.writer.remove_if_exists(&ass).await?;

        if converted && self.is_valid_output(&srt).await {
            Ok(Some(srt))
        } else {
            self.writer.remove_if_exists(&srt).await?;
            Ok(None)
        }
    }

    async fn extract_via_ass(
        &self,
        workspace: &JobWorkspace,
        media: &Path,
        stream: &SubtitleStream,
        ass: &Path,
        srt: &Path,
    ) -> bool {
        let job_id = workspace.job_id();
        if let Err(e) = self
            .executor
            .extract_subtitle_stream(job_id, media, stream.index, ass, SubtitleCodec::Copy)
            .await
        {
            log_tool_failure(media, "ASS extraction failed", &e);
            return false;
        }
        if let Err(e) = self.executor.convert_to_srt(job_id, ass, srt).await {
            log_tool_failure(ass, "ASS to SRT conversion failed", &e);
            return false;
        }
        true
    }

    async fn is_valid_output(&self, path: &Path) -> bool {
        match self.writer.file_size(path).await {
            Some(size) if size >= self.config.min_subtitle_bytes => {
                debug!(file = %path.display(), size = %format_file_size(size), "Extracted subtitles");
                true
            }
            Some(size) => {
                warn!(
                    file = %path.display(),
                    size = %format_file_size(size),
                    min = self.config.min_subtitle_bytes,
                    "Extracted subtitles too small"
                );
                false
            }
            None => false,
        }
    }
}

fn log_tool_failure(file: &Path, message: &str, error: &ToolError) {
    warn!(
        file = %file.display(),
        error = %error,
        stderr = error.stderr().unwrap_or_default().trim(),
        "{}",
        message
    );
}
