//! FFprobe adapter for subtitle stream discovery
//!
//! Runs `ffprobe -v error -of json -show_streams` through the process registry
//! and keeps the streams whose `codec_type` is `subtitle`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::model::*;
use crate::engine::process::{ProcessRegistry, ToolCommand};
use crate::error::ToolError;
use crate::ports::*;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl ProbeStream {
    fn into_subtitle_stream(self) -> Option<SubtitleStream> {
        if self.codec_type.as_deref() != Some("subtitle") {
            return None;
        }
        let language = self
            .tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("language"))
            .map(|(_, v)| v.clone());
        Some(SubtitleStream {
            index: self.index,
            codec_name: self.codec_name,
            language,
        })
    }
}

/// Parse ffprobe JSON into the subtitle streams it lists
pub fn parse_subtitle_streams(json: &str) -> Result<Vec<SubtitleStream>, ToolError> {
    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| ToolError::Parse {
        program: "ffprobe".to_string(),
        message: e.to_string(),
    })?;
    Ok(output
        .streams
        .into_iter()
        .filter_map(ProbeStream::into_subtitle_stream)
        .collect())
}

/// FFprobe-based probe adapter
pub struct FFprobeAdapter {
    ffprobe: PathBuf,
    registry: Arc<ProcessRegistry>,
}

impl FFprobeAdapter {
    /// Create new FFprobe adapter
    pub fn new(ffprobe: impl Into<PathBuf>, registry: Arc<ProcessRegistry>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            registry,
        }
    }
}

#[async_trait]
impl ProbePort for FFprobeAdapter {
    async fn probe_subtitle_streams(
        &self,
        job_id: &JobId,
        media: &Path,
    ) -> Result<Vec<SubtitleStream>, ToolError> {
        let command = ToolCommand::new(&self.ffprobe)
            .args(["-v", "error", "-of", "json", "-show_streams"])
            .arg(media);

        let stdout = match self.registry.run(job_id, command).await {
            Ok(output) => output.stdout,
            // ffprobe can complain about a damaged container and still list its streams
            Err(ToolError::Failed { command, status, stdout, stderr }) => {
                match parse_subtitle_streams(&stdout) {
                    Ok(streams) => {
                        warn!(file = %media.display(), %status, "ffprobe failed but produced stream info");
                        return Ok(streams);
                    }
                    Err(_) => {
                        return Err(ToolError::Failed { command, status, stdout, stderr });
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let streams = parse_subtitle_streams(&stdout)?;
        debug!(file = %media.display(), count = streams.len(), "Subtitle streams probed");
        Ok(streams)
    }
}
