//! Subtitle handling: SRT parsing and subtitle acquisition

pub mod srt;
pub mod subtitle_processor;

pub use srt::{parse_srt, parse_srt_bytes};
pub use subtitle_processor::{select_stream, SubtitleConfig, SubtitleProcessor};
