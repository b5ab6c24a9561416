// Domain rules - Filename conventions, frame arithmetic and text cleanup

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::model::*;

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)S(\d+)E(\d+)|S(\d+)\.E(\d+)|(\d+)x(\d+)|(\d+)-(\d+)")
            .expect("valid regex")
    })
}

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<[^>]*>|\{\\[^}]*\}")
            .expect("valid regex")
    })
}

/// Extract the `(season, episode)` key from a file name.
///
/// Recognised forms are `S02E05`, `S02.E05`, `2x05` and `2-05`, matched
/// case-insensitively. The leftmost match wins.
pub fn extract_episode_key(file_name: &str) -> Option<EpisodeKey> {
    let captures = episode_pattern().captures(file_name)?;

    (1..=7).step_by(2).find_map(|group| {
        let season = captures.get(group)?.as_str().parse::<u32>().ok()?;
        let episode = captures.get(group + 1)?.as_str().parse::<u32>().ok()?;
        Some(EpisodeKey::new(season, episode))
    })
}

/// Convert milliseconds into a frame index on the 10 fps caption clock.
/// Halves round up.
pub fn frame_index(milliseconds: u64) -> u64 {
    let ms_per_frame = 1000 / FRAMES_PER_SECOND;
    let frames = milliseconds / ms_per_frame;
    if milliseconds % ms_per_frame >= ms_per_frame / 2 {
        frames + 1
    } else {
        frames
    }
}

/// Reduce subtitle markup to plain text
pub fn sanitize_caption_text(raw: &str) -> String {
    let stripped = markup_pattern().replace_all(raw, "");
    decode_entities(&stripped).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    // &amp; last so that "&amp;lt;" decodes to "&lt;" rather than "<"
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
