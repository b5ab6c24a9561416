//! Job history: which library each job was built from

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::model::{JobId, JobRecord};
use crate::error::{IndexerError, IndexerResult};
use crate::output::layout::{JobLock, JobWorkspace, JOBS_FILE};
use crate::output::metadata::read_metadata;
use crate::output::writer::OutputWriter;

/// `job id -> library root`, the on-disk shape of `jobs.json`
pub type JobSources = BTreeMap<String, PathBuf>;

/// Job history backed by `<processing_dir>/jobs.json`
#[derive(Debug)]
pub struct JobHistory {
    processing_dir: PathBuf,
    writer: OutputWriter,
    /// Serializes read-modify-write cycles of the history file
    lock: Mutex<()>,
}

impl JobHistory {
    pub fn new(processing_dir: impl Into<PathBuf>) -> Self {
        Self {
            processing_dir: processing_dir.into(),
            writer: OutputWriter::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.processing_dir.join(JOBS_FILE)
    }

    /// Recorded sources. A missing or corrupt file reads as empty.
    pub async fn sources(&self) -> JobSources {
        let path = self.path();
        let bytes = match self.writer.read_optional(&path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return JobSources::new(),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Job history unreadable, treating as empty");
                return JobSources::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(file = %path.display(), error = %e, "Job history corrupt, starting over");
            JobSources::new()
        })
    }

    /// Remember `root` as the library of `job_id`, replacing an earlier entry
    pub async fn record(&self, job_id: &JobId, root: &Path) -> IndexerResult<()> {
        let _guard = self.lock.lock().await;
        let mut sources = self.sources().await;
        sources.insert(job_id.to_string(), root.to_path_buf());
        let json = serde_json::to_vec_pretty(&sources)?;
        self.writer.write_atomic(&self.path(), json).await?;
        debug!(job_id = %job_id, root = %root.display(), jobs = sources.len(), "Job source recorded");
        Ok(())
    }

    /// Every job directory that has metadata, in job id order
    pub async fn list(&self) -> IndexerResult<Vec<JobRecord>> {
        let sources = self.sources().await;
        let mut entries = match tokio::fs::read_dir(&self.processing_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IndexerError::workspace(&self.processing_dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IndexerError::workspace(&self.processing_dir, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let Some(job_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| JobId::new(name).ok())
            else {
                continue;
            };
            if !is_dir {
                continue;
            }

            let workspace = JobWorkspace::new(&self.processing_dir, job_id.clone(), JobLock::default());
            let metadata = match read_metadata(&workspace).await {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Job metadata unreadable, job not listed");
                    continue;
                }
            };
            records.push(JobRecord {
                folder_path: sources.get(job_id.as_str()).cloned(),
                job_id,
                metadata,
            });
        }
        records.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(records)
    }
}
