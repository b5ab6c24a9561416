// Job controller - Host interface: start, cancel, status and shutdown

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::index_interactor::IndexInteractor;
use crate::domain::model::*;
use crate::engine::process::{ProcessRegistry, ShutdownReport, Signal};
use crate::error::{IndexerError, IndexerResult};
use crate::output::{DocumentWriter, JobHistory, JobLock, JobWorkspace, StatusMap, StatusStore};

#[derive(Default)]
struct JobEntry {
    lock: JobLock,
    running: Option<CancellationToken>,
}

/// What a cancel request reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelReport {
    pub was_running: bool,
    pub signalled: usize,
}

/// Clears the running marker of a job when its run ends or is dropped
struct RunningGuard<'a> {
    service: &'a IndexService,
    job_id: JobId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.service.jobs().get_mut(&self.job_id) {
            entry.running = None;
        }
    }
}

/// Entry point for hosts (CLI, GUI shells) driving indexing jobs
pub struct IndexService {
    interactor: Arc<IndexInteractor>,
    registry: Arc<ProcessRegistry>,
    processing_dir: PathBuf,
    history: JobHistory,
    shutdown_grace: Duration,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    root_token: CancellationToken,
}

impl IndexService {
    pub fn new(
        interactor: Arc<IndexInteractor>,
        registry: Arc<ProcessRegistry>,
        processing_dir: PathBuf,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            interactor,
            registry,
            history: JobHistory::new(&processing_dir),
            processing_dir,
            shutdown_grace,
            jobs: Mutex::new(HashMap::new()),
            root_token: CancellationToken::new(),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The lock serializing status and document writes of a job
    pub fn lock_for(&self, job_id: &JobId) -> JobLock {
        Arc::clone(&self.jobs().entry(job_id.clone()).or_default().lock)
    }

    pub fn workspace(&self, job_id: &JobId) -> JobWorkspace {
        JobWorkspace::new(&self.processing_dir, job_id.clone(), self.lock_for(job_id))
    }

    pub fn documents(&self, job_id: &JobId) -> DocumentWriter {
        DocumentWriter::new(self.workspace(job_id))
    }

    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.jobs()
            .get(job_id)
            .map(|entry| entry.running.is_some())
            .unwrap_or(false)
    }

    /// Run a job to completion. Only one run per job id at a time.
    pub async fn start(
        &self,
        job_id: JobId,
        root: PathBuf,
        metadata: JobMetadata,
    ) -> IndexerResult<JobSummary> {
        let (lock, token) = {
            let mut jobs = self.jobs();
            let entry = jobs.entry(job_id.clone()).or_default();
            if entry.running.is_some() {
                return Err(IndexerError::AlreadyRunning {
                    job_id: job_id.to_string(),
                });
            }
            let token = self.root_token.child_token();
            entry.running = Some(token.clone());
            self.registry.reset_job(&job_id);
            (Arc::clone(&entry.lock), token)
        };
        let _running = RunningGuard {
            service: self,
            job_id: job_id.clone(),
        };

        info!(job_id = %job_id, root = %root.display(), "Starting indexing job");
        if let Err(e) = self.history.record(&job_id, &root).await {
            warn!(job_id = %job_id, error = %e, "Job source not recorded");
        }
        let request = IndexRequest {
            job_id,
            root,
            metadata,
        };
        self.interactor.run(request, lock, &token).await
    }

    /// Mark the job aborted and interrupt its live tool processes. Tools the
    /// job would start afterwards are refused.
    pub fn cancel(&self, job_id: &JobId) -> CancelReport {
        let token = self
            .jobs()
            .get(job_id)
            .and_then(|entry| entry.running.clone());
        let was_running = token.is_some();
        if let Some(token) = token {
            token.cancel();
        }
        let signalled = self.registry.cancel_job(job_id, Signal::Interrupt);
        info!(job_id = %job_id, was_running, signalled, "Cancel requested");
        CancelReport {
            was_running,
            signalled,
        }
    }

    /// Snapshot of the job's status store
    pub async fn status(&self, job_id: &JobId) -> StatusMap {
        StatusStore::new(self.workspace(job_id)).snapshot().await
    }

    /// Jobs found in the processing directory, with the library each was built from
    pub async fn previous_jobs(&self) -> IndexerResult<Vec<JobRecord>> {
        self.history.list().await
    }

    /// Abort every job and run the graceful-then-forceful process shutdown
    pub async fn shutdown(&self, grace: Option<Duration>) -> ShutdownReport {
        self.root_token.cancel();
        self.registry.shutdown(grace.unwrap_or(self.shutdown_grace)).await
    }
}
