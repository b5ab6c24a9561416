//! SubRip parser

use crate::domain::errors::DomainError;
use crate::domain::model::Cue;
use crate::domain::rules::sanitize_caption_text;
use crate::utils::time::TimestampParser;

const TIMING_ARROW: &str = "-->";

/// Parse raw subtitle file bytes, decoding invalid UTF-8 lossily
pub fn parse_srt_bytes(bytes: &[u8]) -> Result<Vec<Cue>, DomainError> {
    parse_srt(&String::from_utf8_lossy(bytes))
}

/// Parse SRT text into cues with zero-based sequential indexes.
///
/// Blocks are separated by blank lines. Each block is an optional numeric
/// counter, a `start --> end` timing line, then text. An empty side of the
/// arrow is a missing timestamp, which is kept as `None`.
pub fn parse_srt(text: &str) -> Result<Vec<Cue>, DomainError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut cues = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !block.is_empty() {
                cues.push(parse_block(&block, cues.len())?);
                block.clear();
            }
        } else {
            block.push((number + 1, line));
        }
    }
    if !block.is_empty() {
        cues.push(parse_block(&block, cues.len())?);
    }

    Ok(cues)
}

fn parse_block(block: &[(usize, &str)], index: usize) -> Result<Cue, DomainError> {
    let mut lines = block.iter().copied().peekable();

    if let Some(&(_, first)) = lines.peek() {
        let is_counter = !first.trim().is_empty() && first.trim().bytes().all(|b| b.is_ascii_digit());
        if is_counter && block.len() > 1 {
            lines.next();
        }
    }

    let (line_number, timing) = lines.next().ok_or(DomainError::MalformedSubtitle {
        line: block.first().map(|(n, _)| *n).unwrap_or(0),
        reason: "empty block".to_string(),
    })?;

    let (start, end) = timing
        .split_once(TIMING_ARROW)
        .ok_or_else(|| DomainError::MalformedSubtitle {
            line: line_number,
            reason: format!("expected timing line, found {:?}", timing.trim()),
        })?;

    // anything after the end time is a position hint
    let end = end.split_whitespace().next().unwrap_or("");

    let timestamp = |raw: &str| {
        TimestampParser::parse_millis(raw).map_err(|e| DomainError::MalformedSubtitle {
            line: line_number,
            reason: e.to_string(),
        })
    };
    let start_ms = timestamp(start)?;
    let end_ms = timestamp(end)?;

    let body: Vec<&str> = lines.map(|(_, line)| line).collect();
    Ok(Cue {
        index,
        start_ms,
        end_ms,
        text: sanitize_caption_text(&body.join("\n")),
    })
}
