//! End-to-end indexing runs against scripted ffprobe/ffmpeg ports

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use memesrc_indexer::domain::model::SubtitleStream;
use memesrc_indexer::engine::SegmentSettings;
use memesrc_indexer::ports::{ExecutePort, ProbePort, SubtitleCodec};
use memesrc_indexer::*;

// Test utilities

/// Three cues, comfortably above the 100 byte minimum
fn srt_text(label: &str) -> String {
    format!(
        "1\n00:00:01,000 --> 00:00:02,500\n{label} line one\n\n\
         2\n00:00:03,000 --> 00:00:04,000\n<i>{label}</i> line two\n\n\
         3\n00:00:05,000 --> 00:00:06,040\n{label} &amp; line three\n"
    )
}

fn failure(message: &str) -> ToolError {
    ToolError::Parse {
        program: "ffmpeg".to_string(),
        message: message.to_string(),
    }
}

fn io_failure(source: std::io::Error) -> ToolError {
    ToolError::Io {
        command: "fake ffmpeg".to_string(),
        source,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stream(index: u32, codec: &str) -> SubtitleStream {
    SubtitleStream {
        index,
        codec_name: Some(codec.to_string()),
        language: Some("eng".to_string()),
    }
}

/// Valid SRT that is still under the 100 byte minimum
const TINY_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nhi\n";

/// Pauses each segment encode, after its output is written, until released
#[derive(Default)]
struct SegmentGate {
    started: Notify,
    release: Notify,
}

/// Scripted stand-in for the media tools, keyed by media file name
#[derive(Default)]
struct FakeTools {
    streams: HashMap<String, Vec<SubtitleStream>>,
    direct_srt_fails: HashSet<String>,
    /// Direct SRT extraction succeeds but writes [`TINY_SRT`]
    tiny_direct_srt: HashSet<String>,
    failing_segments: Mutex<HashSet<String>>,
    gate: Option<Arc<SegmentGate>>,
    probed: Mutex<Vec<String>>,
    segmented: Mutex<Vec<String>>,
}

impl FakeTools {
    fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    fn segmented(&self) -> Vec<String> {
        self.segmented.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.probed.lock().unwrap().clear();
        self.segmented.lock().unwrap().clear();
    }
}

#[async_trait]
impl ProbePort for FakeTools {
    async fn probe_subtitle_streams(
        &self,
        _job_id: &JobId,
        media: &Path,
    ) -> Result<Vec<SubtitleStream>, ToolError> {
        let name = file_name(media);
        self.probed.lock().unwrap().push(name.clone());
        Ok(self.streams.get(&name).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ExecutePort for FakeTools {
    async fn extract_subtitle_stream(
        &self,
        _job_id: &JobId,
        media: &Path,
        _stream_index: u32,
        output: &Path,
        codec: SubtitleCodec,
    ) -> Result<(), ToolError> {
        let name = file_name(media);
        let contents = match codec {
            SubtitleCodec::Srt if self.direct_srt_fails.contains(&name) => {
                return Err(failure("subtitle encoding not supported"));
            }
            SubtitleCodec::Srt if self.tiny_direct_srt.contains(&name) => TINY_SRT.to_string(),
            SubtitleCodec::Srt => srt_text(&name),
            SubtitleCodec::Copy => "[Script Info]\nTitle: styled\n".to_string(),
        };
        tokio::fs::write(output, contents).await.map_err(io_failure)
    }

    async fn convert_to_srt(&self, _job_id: &JobId, input: &Path, output: &Path) -> Result<(), ToolError> {
        if !input.exists() {
            return Err(failure("missing ASS input"));
        }
        tokio::fs::write(output, srt_text("converted"))
            .await
            .map_err(io_failure)
    }

    async fn segment_media(
        &self,
        _job_id: &JobId,
        media: &Path,
        pattern: &Path,
        _settings: &SegmentSettings,
    ) -> Result<(), ToolError> {
        let name = file_name(media);
        self.segmented.lock().unwrap().push(name.clone());
        if self.failing_segments.lock().unwrap().contains(&name) {
            return Err(failure("encoder crashed"));
        }
        tokio::fs::write(pattern.with_file_name("0.mp4"), b"segment")
            .await
            .map_err(io_failure)?;
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        Ok(())
    }
}

struct TestLibrary {
    _temp: TempDir,
    root: PathBuf,
    processing_dir: PathBuf,
}

impl TestLibrary {
    fn new(files: &[(&str, &str)]) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("library");
        let processing_dir = temp.path().join("processing");
        fs::create_dir_all(&root).unwrap();
        for (name, contents) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        Self {
            _temp: temp,
            root,
            processing_dir,
        }
    }

    fn service(&self, tools: Arc<FakeTools>) -> Arc<IndexService> {
        let config = IndexerConfig {
            processing_dir: self.processing_dir.clone(),
            ..IndexerConfig::default()
        };
        let container = DefaultAppContainer::with_ports(
            &config,
            Arc::clone(&tools) as Arc<dyn ProbePort>,
            tools as Arc<dyn ExecutePort>,
            Arc::new(ProcessRegistry::new()),
        );
        container.index_service()
    }
}

/// One episode per acquisition path, plus one that cannot get captions
fn mixed_library() -> (TestLibrary, Arc<FakeTools>) {
    let srt = srt_text("standalone");
    let library = TestLibrary::new(&[
        ("Season 1/Show S01E01.mkv", "media"),
        ("Season 1/Show S01E01.srt", srt.as_str()),
        ("Season 1/Show S01E02.mkv", "media"),
        ("Season 1/Show S01E03.mkv", "media"),
        ("Season 2/Show 2x01.mp4", "media"),
        ("notes.txt", "not media"),
    ]);
    let tools = FakeTools {
        streams: HashMap::from([
            ("Show S01E02.mkv".to_string(), vec![stream(2, "subrip")]),
            ("Show S01E03.mkv".to_string(), vec![stream(3, "ass")]),
        ]),
        direct_srt_fails: HashSet::from(["Show S01E03.mkv".to_string()]),
        ..FakeTools::default()
    };
    (library, Arc::new(tools))
}

fn key(season: u32, episode: u32) -> EpisodeKey {
    EpisodeKey::new(season, episode)
}

#[tokio::test]
async fn test_index_mixed_library() {
    let (library, tools) = mixed_library();
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("mixed").unwrap();
    let metadata = JobMetadata {
        title: "Show".to_string(),
        ..JobMetadata::default()
    };

    let summary = service
        .start(job_id.clone(), library.root.clone(), metadata.clone())
        .await
        .unwrap();

    assert_eq!(summary.episodes.len(), 4);
    for done in [key(1, 1), key(1, 2), key(1, 3)] {
        let episode = summary.episode(done).unwrap();
        assert!(episode.media && episode.subtitles, "{}", done);
        assert_eq!(episode.state, EpisodeState::Done);
    }
    let no_captions = summary.episode(key(2, 1)).unwrap();
    assert!(!no_captions.subtitles);
    assert_eq!(no_captions.state, EpisodeState::Pending);

    // standalone subtitles win over embedded streams
    assert!(!tools.probed().contains(&"Show S01E01.mkv".to_string()));
    assert!(!tools.segmented().contains(&"Show 2x01.mp4".to_string()));

    let workspace = service.workspace(&job_id);
    assert!(workspace.episode_dir(key(1, 1)).join("0.mp4").is_file());
    assert!(!workspace.extracted_subtitle(key(1, 3), "ass").exists());
    assert!(!workspace.episode_document(key(2, 1)).exists());

    let stored: JobMetadata =
        serde_json::from_slice(&fs::read(workspace.metadata_path()).unwrap()).unwrap();
    assert_eq!(stored, metadata);

    let documents = service.documents(&job_id);
    let first = documents
        .read_document(&workspace.episode_document(key(1, 1)))
        .await
        .unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].text, "standalone line one");
    assert_eq!((first[0].start_frame, first[0].end_frame), (10, 25));
    assert_eq!(first[1].text, "standalone line two");
    assert_eq!(first[2].text, "standalone & line three");

    let converted = documents
        .read_document(&workspace.episode_document(key(1, 3)))
        .await
        .unwrap();
    assert_eq!(converted[0].text, "converted line one");

    let season = documents.read_document(&workspace.season_document(1)).await.unwrap();
    let series = documents.read_document(&workspace.series_document()).await.unwrap();
    assert_eq!(season.len(), 9);
    assert_eq!(series, season);

    let status = service.status(&job_id).await;
    assert_eq!(status[&1][&2], EpisodeState::Done);
    assert_eq!(status[&2][&1], EpisodeState::Pending);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (library, tools) = mixed_library();
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("rerun").unwrap();

    service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();
    let workspace = service.workspace(&job_id);
    let series_before = fs::read(workspace.series_document()).unwrap();
    let season_before = fs::read(workspace.season_document(1)).unwrap();
    tools.clear_calls();

    let summary = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();

    assert_eq!(summary.count_in_state(EpisodeState::Done), 3);
    assert!(tools.segmented().is_empty());
    // only the episode without any captions is probed again
    assert_eq!(tools.probed(), vec!["Show 2x01.mp4".to_string()]);
    assert_eq!(fs::read(workspace.series_document()).unwrap(), series_before);
    assert_eq!(fs::read(workspace.season_document(1)).unwrap(), season_before);
}

#[tokio::test]
async fn test_failed_segment_resumes_on_next_run() {
    let (library, tools) = mixed_library();
    tools
        .failing_segments
        .lock()
        .unwrap()
        .insert("Show S01E02.mkv".to_string());
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("resume").unwrap();

    let summary = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();
    assert_eq!(summary.episode(key(1, 2)).unwrap().state, EpisodeState::Indexing);
    assert_eq!(summary.episode(key(1, 3)).unwrap().state, EpisodeState::Done);

    tools.failing_segments.lock().unwrap().clear();
    tools.clear_calls();

    let summary = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();
    assert_eq!(summary.episode(key(1, 2)).unwrap().state, EpisodeState::Done);
    assert_eq!(tools.segmented(), vec!["Show S01E02.mkv".to_string()]);
    // captions were already durable, no second extraction
    assert!(!tools.probed().contains(&"Show S01E02.mkv".to_string()));
}

#[tokio::test]
async fn test_rebuilt_rollups_match_incremental_documents() {
    let (library, tools) = mixed_library();
    let service = library.service(tools);
    let job_id = JobId::new("rebuild").unwrap();

    service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();
    let workspace = service.workspace(&job_id);
    let series_before = fs::read(workspace.series_document()).unwrap();
    fs::remove_file(workspace.series_document()).unwrap();
    fs::write(workspace.season_document(1), "garbage").unwrap();

    let report = service.documents(&job_id).rebuild_rollups().await.unwrap();
    assert_eq!(report.episodes, 3);
    assert_eq!(report.seasons, 1);
    assert_eq!(report.rows, 9);
    assert_eq!(fs::read(workspace.series_document()).unwrap(), series_before);
}

#[tokio::test]
async fn test_cancel_stops_between_episodes() {
    let srt = srt_text("standalone");
    let library = TestLibrary::new(&[
        ("Show S01E01.mkv", "media"),
        ("Show S01E01.srt", srt.as_str()),
        ("Show S01E02.mkv", "media"),
        ("Show S01E02.srt", srt.as_str()),
    ]);
    let gate = Arc::new(SegmentGate::default());
    let tools = Arc::new(FakeTools {
        gate: Some(Arc::clone(&gate)),
        ..FakeTools::default()
    });
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("cancelled").unwrap();

    let run = tokio::spawn({
        let service = Arc::clone(&service);
        let job_id = job_id.clone();
        let root = library.root.clone();
        async move { service.start(job_id, root, JobMetadata::default()).await }
    });

    gate.started.notified().await;
    assert!(service.is_running(&job_id));

    let second = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await;
    assert!(matches!(second, Err(IndexerError::AlreadyRunning { .. })));

    let report = service.cancel(&job_id);
    assert!(report.was_running);
    assert_eq!(report.signalled, 0);
    gate.release.notify_one();

    let result = run.await.unwrap();
    assert!(matches!(result, Err(IndexerError::Cancelled { .. })));
    assert!(!service.is_running(&job_id));
    assert_eq!(tools.segmented(), vec!["Show S01E01.mkv".to_string()]);

    let status = service.status(&job_id).await;
    assert_eq!(status[&1][&1], EpisodeState::Done);
    assert_eq!(status[&1][&2], EpisodeState::Pending);
}

/// Let every other ready task run until it blocks
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_cancel_while_waiting_on_job_lock_starts_no_encode() {
    let srt = srt_text("standalone");
    let library = TestLibrary::new(&[
        ("Show S01E01.mkv", "media"),
        ("Show S01E01.srt", srt.as_str()),
        ("Show S01E02.mkv", "media"),
        ("Show S01E02.srt", srt.as_str()),
    ]);
    let gate = Arc::new(SegmentGate::default());
    let tools = Arc::new(FakeTools {
        gate: Some(Arc::clone(&gate)),
        ..FakeTools::default()
    });
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("late-cancel").unwrap();

    let run = tokio::spawn({
        let service = Arc::clone(&service);
        let job_id = job_id.clone();
        let root = library.root.clone();
        async move { service.start(job_id, root, JobMetadata::default()).await }
    });
    gate.started.notified().await;

    // S01E01 finishes encoding and queues for the lock to mark itself done
    let held = service.lock_for(&job_id).lock_owned().await;
    gate.release.notify_one();
    settle().await;

    // the cancel takes its turn on the lock after that status write, which is
    // the moment the run has already passed its between-episodes check
    let canceller = tokio::spawn({
        let service = Arc::clone(&service);
        let job_id = job_id.clone();
        async move {
            let _turn = service.lock_for(&job_id).lock_owned().await;
            service.cancel(&job_id)
        }
    });
    settle().await;
    drop(held);

    let result = run.await.unwrap();
    assert!(matches!(result, Err(IndexerError::Cancelled { .. })));
    assert!(canceller.await.unwrap().was_running);
    assert_eq!(tools.segmented(), vec!["Show S01E01.mkv".to_string()]);

    let workspace = service.workspace(&job_id);
    assert!(!workspace.episode_dir(key(1, 2)).join("0.mp4").exists());
    let status = service.status(&job_id).await;
    assert_eq!(status[&1][&1], EpisodeState::Done);
    assert_ne!(status[&1][&2], EpisodeState::Done);
}

#[tokio::test]
async fn test_undersized_direct_srt_falls_back_for_ass_streams() {
    let library = TestLibrary::new(&[("Show S01E01.mkv", "media")]);
    let tools = Arc::new(FakeTools {
        streams: HashMap::from([("Show S01E01.mkv".to_string(), vec![stream(3, "ass")])]),
        tiny_direct_srt: HashSet::from(["Show S01E01.mkv".to_string()]),
        ..FakeTools::default()
    });
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("tiny-ass").unwrap();

    let summary = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();

    assert_eq!(summary.episode(key(1, 1)).unwrap().state, EpisodeState::Done);
    let workspace = service.workspace(&job_id);
    assert!(!workspace.extracted_subtitle(key(1, 1), "ass").exists());
    let rows = service
        .documents(&job_id)
        .read_document(&workspace.episode_document(key(1, 1)))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].text, "converted line one");
}

#[tokio::test]
async fn test_undersized_direct_srt_without_fallback_leaves_episode_pending() {
    let library = TestLibrary::new(&[("Show S01E01.mkv", "media")]);
    let tools = Arc::new(FakeTools {
        streams: HashMap::from([("Show S01E01.mkv".to_string(), vec![stream(2, "subrip")])]),
        tiny_direct_srt: HashSet::from(["Show S01E01.mkv".to_string()]),
        ..FakeTools::default()
    });
    let service = library.service(Arc::clone(&tools));
    let job_id = JobId::new("tiny-subrip").unwrap();

    let summary = service
        .start(job_id.clone(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();

    let episode = summary.episode(key(1, 1)).unwrap();
    assert!(!episode.subtitles);
    assert_eq!(episode.state, EpisodeState::Pending);
    assert!(tools.segmented().is_empty());

    let workspace = service.workspace(&job_id);
    assert!(!workspace.extracted_subtitle(key(1, 1), "srt").exists());
    assert!(!workspace.episode_document(key(1, 1)).exists());
}

#[tokio::test]
async fn test_empty_library_and_missing_root() {
    let library = TestLibrary::new(&[]);
    let service = library.service(Arc::new(FakeTools::default()));

    let summary = service
        .start(JobId::new("empty").unwrap(), library.root.clone(), JobMetadata::default())
        .await
        .unwrap();
    assert!(summary.episodes.is_empty());

    let missing = service
        .start(
            JobId::new("missing").unwrap(),
            library.root.join("nope"),
            JobMetadata::default(),
        )
        .await;
    assert!(matches!(missing, Err(IndexerError::UnreadableRoot { .. })));
}
