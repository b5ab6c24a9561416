//! Path classification helpers

use std::path::Path;

/// Extensions treated as media inputs
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "m4v"];

/// Extensions treated as standalone subtitle inputs
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt"];

/// What a file in the media root is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Media,
    Subtitle,
}

/// Lower-cased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Classify a path by extension; `None` for files the indexer ignores
pub fn classify(path: &Path) -> Option<FileKind> {
    let ext = extension_of(path)?;
    if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Media)
    } else if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Subtitle)
    } else {
        None
    }
}

/// File name as text, lossy for non UTF-8 names
pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify(Path::new("a/Show.S01E01.mkv")), Some(FileKind::Media));
        assert_eq!(classify(Path::new("Show.S01E01.MP4")), Some(FileKind::Media));
        assert_eq!(classify(Path::new("Show.S01E01.m4v")), Some(FileKind::Media));
        assert_eq!(classify(Path::new("Show.S01E01.SRT")), Some(FileKind::Subtitle));
        assert_eq!(classify(Path::new("Show.S01E01.ass")), None);
        assert_eq!(classify(Path::new("notes.txt")), None);
        assert_eq!(classify(Path::new("README")), None);
    }

    #[test]
    fn test_file_name_lossy() {
        assert_eq!(file_name_lossy(Path::new("/x/y/Show.2x05.mp4")), "Show.2x05.mp4");
        assert_eq!(file_name_lossy(Path::new("/")), "");
    }
}
