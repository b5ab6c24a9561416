//! Caption document writer: lossless, deduplicated CSV merges

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::model::{CaptionRow, Cue, EpisodeKey, DOCUMENT_HEADER};
use crate::error::{IndexerError, IndexerResult};
use crate::output::layout::JobWorkspace;
use crate::output::writer::OutputWriter;

/// Parsed content of one document file
#[derive(Debug, Default)]
struct DocumentContent {
    rows: BTreeSet<CaptionRow>,
    /// Lines that are neither header, blank nor a valid row, kept verbatim
    foreign: Vec<String>,
}

impl DocumentContent {
    fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut content = DocumentContent::default();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim() == DOCUMENT_HEADER {
                continue;
            }
            match CaptionRow::parse_csv_line(line) {
                Ok(row) => {
                    content.rows.insert(row);
                }
                Err(_) => {
                    if !content.foreign.iter().any(|l| l == line) {
                        content.foreign.push(line.to_string());
                    }
                }
            }
        }
        content
    }

    fn render(&self) -> Vec<u8> {
        let mut out = String::with_capacity(64 * (self.rows.len() + 1));
        out.push_str(DOCUMENT_HEADER);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.to_csv_line());
            out.push('\n');
        }
        for line in &self.foreign {
            out.push_str(line);
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Outcome of [`DocumentWriter::rebuild_rollups`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub episodes: usize,
    pub seasons: usize,
    pub rows: usize,
}

/// Writes episode, season and series caption documents of one job
#[derive(Debug, Clone)]
pub struct DocumentWriter {
    workspace: JobWorkspace,
    writer: OutputWriter,
}

impl DocumentWriter {
    pub fn new(workspace: JobWorkspace) -> Self {
        Self {
            workspace,
            writer: OutputWriter::new(),
        }
    }

    /// Merge the cues of one episode into all three documents.
    ///
    /// Cues without both timestamps are dropped. Returns the number of rows
    /// offered to the merge; zero means nothing was written.
    pub async fn write_captions(&self, key: EpisodeKey, cues: &[Cue]) -> IndexerResult<usize> {
        let episode_dir = self.workspace.episode_dir(key);
        tokio::fs::create_dir_all(&episode_dir)
            .await
            .map_err(|e| IndexerError::workspace(&episode_dir, e))?;

        let rows: Vec<CaptionRow> = cues
            .iter()
            .filter_map(|cue| CaptionRow::from_cue(key, cue))
            .collect();
        if rows.is_empty() {
            debug!(episode = %key, "No timed cues, documents left untouched");
            return Ok(0);
        }

        let _guard = self.workspace.lock().lock().await;
        for path in [
            self.workspace.episode_document(key),
            self.workspace.season_document(key.season),
            self.workspace.series_document(),
        ] {
            self.merge_into(&path, &rows).await?;
        }

        info!(
            job_id = %self.workspace.job_id(),
            episode = %key,
            rows = rows.len(),
            "Caption documents updated"
        );
        Ok(rows.len())
    }

    async fn load(&self, path: &Path) -> IndexerResult<DocumentContent> {
        match self.writer.read_optional(path).await {
            Ok(Some(bytes)) => Ok(DocumentContent::parse(&bytes)),
            Ok(None) => Ok(DocumentContent::default()),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Caption document unreadable");
                self.writer.move_aside(path).await?;
                Ok(DocumentContent::default())
            }
        }
    }

    async fn merge_into(&self, path: &Path, rows: &[CaptionRow]) -> IndexerResult<()> {
        let mut content = self.load(path).await?;
        let before = content.rows.len();
        content.rows.extend(rows.iter().cloned());
        debug!(
            file = %path.display(),
            added = content.rows.len() - before,
            total = content.rows.len(),
            "Merging caption rows"
        );
        self.writer.write_atomic(path, content.render()).await
    }

    /// Whether the episode document exists and is non-empty
    pub async fn has_episode_document(&self, key: EpisodeKey) -> bool {
        self.writer
            .file_size(&self.workspace.episode_document(key))
            .await
            .map(|size| size > 0)
            .unwrap_or(false)
    }

    /// Decode a document back into rows. A missing file has no rows.
    pub async fn read_document(&self, path: &Path) -> IndexerResult<Vec<CaptionRow>> {
        let content = match self.writer.read_optional(path).await? {
            Some(bytes) => DocumentContent::parse(&bytes),
            None => DocumentContent::default(),
        };
        Ok(content.rows.into_iter().collect())
    }

    /// Regenerate every season document and the series document from the
    /// episode documents, keeping one row per `(season, episode, index)`.
    pub async fn rebuild_rollups(&self) -> IndexerResult<RebuildReport> {
        let _guard = self.workspace.lock().lock().await;

        let mut report = RebuildReport::default();
        let mut series: BTreeMap<(u32, u32, usize), CaptionRow> = BTreeMap::new();

        for (season, season_dir) in numbered_children(self.workspace.dir()).await? {
            let mut season_rows: BTreeMap<(u32, u32, usize), CaptionRow> = BTreeMap::new();

            for (_, episode_dir) in numbered_children(&season_dir).await? {
                let doc = episode_dir.join(crate::output::layout::DOCUMENT_FILE);
                let Some(bytes) = self.writer.read_optional(&doc).await? else {
                    continue;
                };
                report.episodes += 1;
                for row in DocumentContent::parse(&bytes).rows {
                    season_rows
                        .entry((row.season, row.episode, row.subtitle_index))
                        .or_insert(row);
                }
            }

            if season_rows.is_empty() {
                continue;
            }

            let content = DocumentContent {
                rows: season_rows.values().cloned().collect(),
                foreign: Vec::new(),
            };
            self.writer
                .write_atomic(&self.workspace.season_document(season), content.render())
                .await?;
            report.seasons += 1;
            for (k, row) in season_rows {
                series.entry(k).or_insert(row);
            }
        }

        report.rows = series.len();
        let content = DocumentContent {
            rows: series.into_values().collect(),
            foreign: Vec::new(),
        };
        self.writer
            .write_atomic(&self.workspace.series_document(), content.render())
            .await?;

        info!(
            job_id = %self.workspace.job_id(),
            episodes = report.episodes,
            seasons = report.seasons,
            rows = report.rows,
            "Rollup documents rebuilt"
        );
        Ok(report)
    }
}

/// Subdirectories whose names are plain numbers, sorted numerically
async fn numbered_children(dir: &Path) -> IndexerResult<Vec<(u32, PathBuf)>> {
    let mut children = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(children),
        Err(e) => return Err(IndexerError::workspace(dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IndexerError::workspace(dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        if let Some(number) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
            children.push((number, entry.path()));
        }
    }
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::JobId;
    use crate::output::layout::JobLock;

    fn writer(dir: &Path) -> (DocumentWriter, JobWorkspace) {
        let ws = JobWorkspace::new(dir, JobId::new("job").unwrap(), JobLock::default());
        (DocumentWriter::new(ws.clone()), ws)
    }

    fn cue(index: usize, start: Option<u64>, end: Option<u64>, text: &str) -> Cue {
        Cue {
            index,
            start_ms: start,
            end_ms: end,
            text: text.to_string(),
        }
    }

    fn data_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_write_captions_fills_all_three_documents() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        let key = EpisodeKey::new(1, 2);
        let cues = vec![
            cue(0, Some(1500), Some(3700), "Hello"),
            cue(1, Some(4000), None, "dropped"),
            cue(2, Some(5000), Some(6000), ""),
        ];

        assert_eq!(docs.write_captions(key, &cues).await.unwrap(), 2);

        for path in [ws.episode_document(key), ws.season_document(1), ws.series_document()] {
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.starts_with(DOCUMENT_HEADER));
            assert_eq!(data_lines(&path), vec!["1,2,0,SGVsbG8=,15,37", "1,2,2,,50,60"]);
        }
        assert!(docs.has_episode_document(key).await);
    }

    #[tokio::test]
    async fn test_write_captions_without_timed_cues_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        let key = EpisodeKey::new(1, 1);

        let written = docs.write_captions(key, &[cue(0, None, None, "x")]).await.unwrap();
        assert_eq!(written, 0);
        assert!(!ws.episode_document(key).exists());
        assert!(!docs.has_episode_document(key).await);
    }

    #[tokio::test]
    async fn test_merge_is_a_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        let e2 = EpisodeKey::new(1, 2);
        let e1 = EpisodeKey::new(1, 1);

        docs.write_captions(e2, &[cue(0, Some(0), Some(100), "b")]).await.unwrap();
        docs.write_captions(e1, &[cue(0, Some(0), Some(100), "a")]).await.unwrap();
        docs.write_captions(e2, &[cue(0, Some(0), Some(100), "b")]).await.unwrap();

        let series = data_lines(&ws.series_document());
        assert_eq!(series.len(), 2);
        assert!(series[0].starts_with("1,1,0,"));
        assert!(series[1].starts_with("1,2,0,"));
        assert_eq!(data_lines(&ws.episode_document(e2)).len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_lines_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        std::fs::create_dir_all(ws.dir()).unwrap();
        std::fs::write(
            ws.series_document(),
            format!("{}\nhand written note\n\n9,9,0,eA==,1,2\n", DOCUMENT_HEADER),
        )
        .unwrap();

        docs.write_captions(EpisodeKey::new(1, 1), &[cue(0, Some(0), Some(100), "a")])
            .await
            .unwrap();

        let lines = data_lines(&ws.series_document());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("1,1,0,"));
        assert_eq!(lines[1], "9,9,0,eA==,1,2");
        assert_eq!(lines[2], "hand written note");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        let key = EpisodeKey::new(1, 1);
        std::fs::create_dir_all(ws.episode_dir(key)).unwrap();
        let mut bytes = format!("{}\n1,1,5,eA==,1,2\n", DOCUMENT_HEADER).into_bytes();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(ws.episode_document(key), bytes).unwrap();

        docs.write_captions(key, &[cue(0, Some(0), Some(100), "a")]).await.unwrap();
        let rows = docs.read_document(&ws.episode_document(key)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].subtitle_index, 5);
    }

    #[tokio::test]
    async fn test_read_document_decodes_text() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        let key = EpisodeKey::new(2, 3);
        docs.write_captions(key, &[cue(0, Some(1000), Some(2000), "Tom & Jerry")])
            .await
            .unwrap();

        let rows = docs.read_document(&ws.season_document(2)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "Tom & Jerry");
        assert!(docs.read_document(&ws.season_document(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_rollups_from_episode_documents() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        docs.write_captions(EpisodeKey::new(1, 1), &[cue(0, Some(0), Some(100), "a")])
            .await
            .unwrap();
        docs.write_captions(EpisodeKey::new(2, 1), &[cue(0, Some(0), Some(100), "b")])
            .await
            .unwrap();

        std::fs::write(ws.series_document(), "garbage").unwrap();
        std::fs::remove_file(ws.season_document(2)).unwrap();

        let report = docs.rebuild_rollups().await.unwrap();
        assert_eq!(report, RebuildReport { episodes: 2, seasons: 2, rows: 2 });
        assert_eq!(data_lines(&ws.series_document()).len(), 2);
        assert_eq!(data_lines(&ws.season_document(2)).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_document_is_moved_aside() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let (docs, ws) = writer(dir.path());
        std::fs::create_dir_all(ws.dir()).unwrap();
        let series = ws.series_document();
        std::fs::write(&series, "old data").unwrap();
        std::fs::set_permissions(&series, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read(&series).is_ok() {
            // running as root, permission bits are not enforced
            return;
        }

        docs.write_captions(EpisodeKey::new(1, 1), &[cue(0, Some(0), Some(100), "a")])
            .await
            .unwrap();

        let aside: Vec<_> = std::fs::read_dir(ws.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("_docs.csv.unreadable-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(data_lines(&series).len(), 1);
    }
}
