//! Directory walker and classifier

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::domain::model::EpisodeKey;
use crate::domain::rules::extract_episode_key;
use crate::error::{IndexerError, IndexerResult};
use crate::utils::path::{classify, file_name_lossy, FileKind};

/// One classified file of the media root
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub kind: FileKind,
    pub key: EpisodeKey,
}

/// Read-only walker over a media root
pub struct LibraryWalker {
    root: PathBuf,
}

impl LibraryWalker {
    /// Create a walker after checking that `root` is a readable directory
    pub fn new(root: impl Into<PathBuf>) -> IndexerResult<Self> {
        let root = root.into();
        let metadata = std::fs::metadata(&root).map_err(|source| IndexerError::UnreadableRoot {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(IndexerError::UnreadableRoot {
                path: root.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a directory",
                ),
            });
        }
        Ok(Self { root })
    }

    /// Lazy depth-first sequence of classified files with an episode key.
    ///
    /// Entries are visited in file-name order. The first traversal error is
    /// yielded as `Err` and callers are expected to stop there.
    pub fn entries(&self) -> impl Iterator<Item = IndexerResult<LibraryEntry>> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.root.clone());
                        return Some(Err(IndexerError::Traversal {
                            path,
                            message: err.to_string(),
                        }));
                    }
                };

                if !entry.file_type().is_file() {
                    return None;
                }

                let path = entry.into_path();
                let kind = classify(&path)?;
                let name = file_name_lossy(&path);
                match extract_episode_key(&name) {
                    Some(key) => {
                        debug!(file = %path.display(), ?kind, %key, "Classified library file");
                        Some(Ok(LibraryEntry { path, kind, key }))
                    }
                    None => {
                        debug!(file = %path.display(), ?kind, "No season/episode in file name, ignoring");
                        None
                    }
                }
            })
    }

    /// Walk the whole tree; any traversal error aborts the scan
    pub fn scan(&self) -> IndexerResult<LibraryScan> {
        let entries = self.entries().collect::<IndexerResult<Vec<_>>>()?;
        Ok(LibraryScan { entries })
    }
}

/// Materialized result of a walk, in traversal order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryScan {
    pub entries: Vec<LibraryEntry>,
}

impl LibraryScan {
    pub fn subtitles(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.of_kind(FileKind::Subtitle)
    }

    pub fn media(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.of_kind(FileKind::Media)
    }

    fn of_kind(&self, kind: FileKind) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// First media file found for an episode
    pub fn media_for(&self, key: EpisodeKey) -> Option<&Path> {
        self.media()
            .find(|e| e.key == key)
            .map(|e| e.path.as_path())
    }

    /// Distinct keys of every classified file
    pub fn episode_keys(&self) -> BTreeSet<EpisodeKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    /// Distinct keys that have a media file, in key order
    pub fn media_keys(&self) -> BTreeSet<EpisodeKey> {
        self.media().map(|e| e.key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_classifies_recursively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Season 1/Show.S01E02.mkv");
        touch(dir.path(), "Season 1/Show.S01E02.srt");
        touch(dir.path(), "Season 1/deep/er/Show.1x03.MP4");
        touch(dir.path(), "Season 1/notes.txt");
        touch(dir.path(), "Show.05.mp4");

        let scan = LibraryWalker::new(dir.path()).unwrap().scan().unwrap();
        assert_eq!(scan.entries.len(), 3);
        assert_eq!(scan.subtitles().count(), 1);
        assert_eq!(
            scan.media_keys().into_iter().collect::<Vec<_>>(),
            vec![EpisodeKey::new(1, 2), EpisodeKey::new(1, 3)]
        );
        assert_eq!(scan.episode_keys().len(), 2);
        assert!(scan.media_for(EpisodeKey::new(1, 3)).is_some());
        assert!(scan.media_for(EpisodeKey::new(9, 9)).is_none());
    }

    #[test]
    fn test_scan_order_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b/Show.S01E02.srt");
        touch(dir.path(), "a/Show.S01E01.srt");
        touch(dir.path(), "c.S02E01.srt");

        let scan = LibraryWalker::new(dir.path()).unwrap().scan().unwrap();
        let names: Vec<_> = scan.entries.iter().map(|e| file_name_lossy(&e.path)).collect();
        assert_eq!(names, vec!["Show.S01E01.srt", "Show.S01E02.srt", "c.S02E01.srt"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = LibraryWalker::new(dir.path().join("missing"));
        assert!(matches!(result, Err(IndexerError::UnreadableRoot { .. })));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "file.mkv");
        let result = LibraryWalker::new(dir.path().join("file.mkv"));
        assert!(matches!(result, Err(IndexerError::UnreadableRoot { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "locked/Show.S01E01.mkv");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits, nothing to assert in that case
        let readable_anyway = fs::read_dir(&locked).is_ok();
        let result = LibraryWalker::new(dir.path()).unwrap().scan();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable_anyway {
            assert!(matches!(result, Err(IndexerError::Traversal { .. })));
        }
    }
}
