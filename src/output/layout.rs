//! Job working directory layout

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::model::{EpisodeKey, JobId};

/// Name of every caption document, at episode, season and series level
pub const DOCUMENT_FILE: &str = "_docs.csv";
pub const STATUS_FILE: &str = "status.json";
pub const METADATA_FILE: &str = "metadata.json";
/// Job id to library root map, kept directly in the processing directory
pub const JOBS_FILE: &str = "jobs.json";

/// Lock shared by every writer of one job's status and documents
pub type JobLock = Arc<Mutex<()>>;

/// Paths inside `<processing_dir>/<job_id>/` plus the job's write lock
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    job_id: JobId,
    dir: PathBuf,
    lock: JobLock,
}

impl JobWorkspace {
    pub fn new(processing_dir: &Path, job_id: JobId, lock: JobLock) -> Self {
        let dir = processing_dir.join(job_id.as_str());
        Self { job_id, dir, lock }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock(&self) -> &JobLock {
        &self.lock
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn season_dir(&self, season: u32) -> PathBuf {
        self.dir.join(season.to_string())
    }

    pub fn episode_dir(&self, key: EpisodeKey) -> PathBuf {
        self.season_dir(key.season).join(key.episode.to_string())
    }

    pub fn series_document(&self) -> PathBuf {
        self.dir.join(DOCUMENT_FILE)
    }

    pub fn season_document(&self, season: u32) -> PathBuf {
        self.season_dir(season).join(DOCUMENT_FILE)
    }

    pub fn episode_document(&self, key: EpisodeKey) -> PathBuf {
        self.episode_dir(key).join(DOCUMENT_FILE)
    }

    /// Target of embedded subtitle extraction, `<s>/<e>/<s>-<e>.<ext>`
    pub fn extracted_subtitle(&self, key: EpisodeKey, extension: &str) -> PathBuf {
        self.episode_dir(key)
            .join(format!("{}-{}.{}", key.season, key.episode, extension))
    }

    /// `%d` output pattern handed to the segment muxer
    pub fn segment_pattern(&self, key: EpisodeKey) -> PathBuf {
        self.episode_dir(key).join("%d.mp4")
    }
}
