//! Subtitle timestamp parsing and formatting utilities

use crate::domain::errors::DomainError;

/// Parser for SRT style timestamps (`HH:MM:SS,mmm`)
pub struct TimestampParser;

impl TimestampParser {
    /// Parse one side of an SRT timing line into milliseconds.
    ///
    /// An empty side is a missing timestamp and yields `Ok(None)`. Hours are
    /// optional, and `.` is accepted in place of `,` before the fraction.
    pub fn parse_millis(raw: &str) -> Result<Option<u64>, DomainError> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let invalid = || DomainError::InvalidTimestamp(value.to_string());

        let (clock, fraction) = match value.rfind([',', '.']) {
            Some(pos) => (&value[..pos], &value[pos + 1..]),
            None => (value, ""),
        };

        let parts: Vec<&str> = clock.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m, s] => (*h, *m, *s),
            [m, s] => ("0", *m, *s),
            _ => return Err(invalid()),
        };

        let hours = Self::parse_component(hours).ok_or_else(invalid)?;
        let minutes = Self::parse_component(minutes).ok_or_else(invalid)?;
        let seconds = Self::parse_component(seconds).ok_or_else(invalid)?;
        if minutes >= 60 || seconds >= 60 {
            return Err(invalid());
        }

        let millis = Self::parse_fraction(fraction).ok_or_else(invalid)?;

        // hours has no upper bound in the file
        let total = hours
            .checked_mul(3_600_000)
            .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1000 + millis))
            .ok_or_else(invalid)?;
        Ok(Some(total))
    }

    fn parse_component(part: &str) -> Option<u64> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    }

    /// Fractions are scaled to milliseconds: `5` is 500 ms, `0005` is 0 ms
    fn parse_fraction(fraction: &str) -> Option<u64> {
        if fraction.is_empty() {
            return Some(0);
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
        digits.parse().ok()
    }

    /// Format milliseconds as `HH:MM:SS,mmm`
    pub fn format_millis(millis: u64) -> String {
        let hours = millis / 3_600_000;
        let minutes = (millis % 3_600_000) / 60_000;
        let seconds = (millis % 60_000) / 1000;
        let ms = millis % 1000;
        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, ms)
    }

    /// Format a caption frame index (10 per second) as a clock time
    pub fn format_frame(frame: u64) -> String {
        Self::format_millis(frame * 100)
    }
}
