// Index interactor - Orchestrates the indexing pipeline of one job

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::model::*;
use crate::engine::segmenter::{MediaSegmenter, SegmentOutcome, SegmentSettings};
use crate::error::{IndexerError, IndexerResult};
use crate::library::{LibraryScan, LibraryWalker};
use crate::output::metadata::write_metadata;
use crate::output::status::state_in;
use crate::output::{DocumentWriter, JobLock, JobWorkspace, StatusStore};
use crate::ports::*;
use crate::streams::{SubtitleConfig, SubtitleProcessor};
use crate::utils::logging::StageReporter;

/// Per-run state shared by the pipeline stages
struct JobRun<'a> {
    workspace: JobWorkspace,
    status: StatusStore,
    documents: DocumentWriter,
    scan: LibraryScan,
    /// Episodes whose captions are durably written
    satisfied: BTreeSet<EpisodeKey>,
    cancel: &'a CancellationToken,
}

impl JobRun<'_> {
    fn job_id(&self) -> &JobId {
        self.workspace.job_id()
    }

    fn check_cancelled(&self) -> IndexerResult<()> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Cancelled {
                job_id: self.job_id().to_string(),
            });
        }
        Ok(())
    }
}

/// Interactor for the indexing use case
pub struct IndexInteractor {
    subtitles: SubtitleProcessor,
    segmenter: MediaSegmenter,
    processing_dir: PathBuf,
}

impl IndexInteractor {
    /// Create new index interactor with injected ports
    pub fn new(
        probe_port: Arc<dyn ProbePort>,
        execute_port: Arc<dyn ExecutePort>,
        processing_dir: PathBuf,
        subtitle_config: SubtitleConfig,
        segment_settings: SegmentSettings,
    ) -> Self {
        Self {
            subtitles: SubtitleProcessor::new(probe_port, Arc::clone(&execute_port), subtitle_config),
            segmenter: MediaSegmenter::new(execute_port, segment_settings),
            processing_dir,
        }
    }

    /// Run every stage for one job. Progress already persisted survives any error.
    pub async fn run(
        &self,
        request: IndexRequest,
        lock: JobLock,
        cancel: &CancellationToken,
    ) -> IndexerResult<JobSummary> {
        let mut reporter = StageReporter::new(request.job_id.as_str());
        let result = self.run_stages(request, lock, cancel, &mut reporter).await;
        reporter.complete(result.is_ok());
        if let Err(e) = &result {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Indexing aborted");
            }
        }
        result
    }

    async fn run_stages(
        &self,
        request: IndexRequest,
        lock: JobLock,
        cancel: &CancellationToken,
        reporter: &mut StageReporter,
    ) -> IndexerResult<JobSummary> {
        let started_at = Utc::now();

        reporter.enter(PipelineStage::Init);
        let workspace = JobWorkspace::new(&self.processing_dir, request.job_id.clone(), lock);
        let scan = scan_library(request.root.clone()).await?;
        info!(
            job_id = %request.job_id,
            root = %request.root.display(),
            files = scan.entries.len(),
            episodes = scan.episode_keys().len(),
            "Media library scanned"
        );
        tokio::fs::create_dir_all(workspace.dir())
            .await
            .map_err(|e| IndexerError::workspace(workspace.dir(), e))?;

        let mut run = JobRun {
            status: StatusStore::new(workspace.clone()),
            documents: DocumentWriter::new(workspace.clone()),
            workspace,
            scan,
            satisfied: BTreeSet::new(),
            cancel,
        };
        run.check_cancelled()?;

        reporter.enter(PipelineStage::MetadataWritten);
        write_metadata(&run.workspace, &request.metadata).await?;
        run.check_cancelled()?;

        reporter.enter(PipelineStage::StatusSeeded);
        let inserted = run.status.seed(run.scan.episode_keys()).await?;
        debug!(job_id = %run.job_id(), inserted, "Status seeded");
        run.check_cancelled()?;

        reporter.enter(PipelineStage::SubtitlesFromFiles);
        self.subtitles_from_files(&mut run).await?;
        run.check_cancelled()?;

        reporter.enter(PipelineStage::SubtitlesFromMedia);
        self.subtitles_from_media(&mut run).await?;
        run.check_cancelled()?;

        reporter.enter(PipelineStage::MediaSegmented);
        self.segment_media(&run).await?;
        run.check_cancelled()?;

        reporter.enter(PipelineStage::Summarized);
        let snapshot = run.status.snapshot().await;
        let episodes = run
            .scan
            .episode_keys()
            .into_iter()
            .map(|key| EpisodeSummary {
                season: key.season,
                episode: key.episode,
                media: run.scan.media_for(key).is_some(),
                subtitles: run.satisfied.contains(&key),
                state: state_in(&snapshot, key),
            })
            .collect();

        Ok(JobSummary {
            job_id: request.job_id,
            started_at,
            finished_at: Utc::now(),
            episodes,
        })
    }

    /// Pass 1: standalone subtitle files
    async fn subtitles_from_files(&self, run: &mut JobRun<'_>) -> IndexerResult<()> {
        let entries: Vec<_> = run.scan.subtitles().cloned().collect();
        for entry in entries {
            run.check_cancelled()?;
            if run.satisfied.contains(&entry.key) {
                continue;
            }
            if run.status.get(entry.key).await == EpisodeState::Done {
                debug!(episode = %entry.key, "Episode done, captions already durable");
                run.satisfied.insert(entry.key);
                continue;
            }

            let Some(cues) = self.subtitles.captions_from_file(&entry.path).await else {
                continue;
            };
            if run.documents.write_captions(entry.key, &cues).await? > 0 {
                run.satisfied.insert(entry.key);
            } else {
                warn!(file = %entry.path.display(), episode = %entry.key, "Subtitle file has no timed captions");
            }
        }
        Ok(())
    }

    /// Pass 2: embedded streams, only for episodes still without captions
    async fn subtitles_from_media(&self, run: &mut JobRun<'_>) -> IndexerResult<()> {
        let entries: Vec<_> = run.scan.media().cloned().collect();
        for entry in entries {
            run.check_cancelled()?;
            if run.satisfied.contains(&entry.key) {
                continue;
            }
            if run.documents.has_episode_document(entry.key).await {
                debug!(episode = %entry.key, "Episode document present, skipping extraction");
                run.satisfied.insert(entry.key);
                continue;
            }

            let Some(cues) = self
                .subtitles
                .captions_from_media(&run.workspace, entry.key, &entry.path)
                .await?
            else {
                continue;
            };
            if run.documents.write_captions(entry.key, &cues).await? > 0 {
                run.satisfied.insert(entry.key);
            } else {
                warn!(file = %entry.path.display(), episode = %entry.key, "Extracted subtitles have no timed captions");
            }
        }
        Ok(())
    }

    async fn segment_media(&self, run: &JobRun<'_>) -> IndexerResult<()> {
        for key in run.scan.media_keys() {
            run.check_cancelled()?;
            if !run.satisfied.contains(&key) {
                info!(job_id = %run.job_id(), episode = %key, "No subtitles, skipping segmenting");
                continue;
            }
            let Some(media) = run.scan.media_for(key) else {
                continue;
            };

            match self
                .segmenter
                .segment_episode(&run.workspace, &run.status, key, media, run.cancel)
                .await?
            {
                SegmentOutcome::AlreadyDone => {
                    debug!(episode = %key, "Episode already done");
                }
                SegmentOutcome::Segmented => {}
                SegmentOutcome::Failed(e) if e.is_terminated() => {
                    run.check_cancelled()?;
                }
                SegmentOutcome::Failed(_) => {}
            }
        }
        Ok(())
    }
}

async fn scan_library(root: PathBuf) -> IndexerResult<LibraryScan> {
    let fallback = root.clone();
    tokio::task::spawn_blocking(move || LibraryWalker::new(root)?.scan())
        .await
        .map_err(|e| IndexerError::Traversal {
            path: fallback,
            message: e.to_string(),
        })?
}
