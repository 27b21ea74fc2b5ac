//! Time-string parsing and clip-window resolution.
//!
//! Users can express offsets as plain seconds (`"90"`, `"12.5"`), `MM:SS`
//! (`"30:21"`), or `HH:MM:SS` (`"1:30:21"`). A window is built from a start
//! offset plus either an explicit end or a duration, never both.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("invalid time format {0:?} (use HH:MM:SS, MM:SS, or seconds)")]
    InvalidFormat(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RangeError {
    #[error("--end-time and --duration are mutually exclusive; use one or the other")]
    ConflictingEndSpec,

    #[error("--end-time or --duration requires --start-time")]
    MissingStart,

    #[error("start time ({start}s) must be before end time ({end}s)")]
    InvertedRange { start: f64, end: f64 },

    #[error(transparent)]
    Parse(#[from] TimeParseError),
}

/// A validated extraction window in seconds from the start of the media.
///
/// `end: None` means "from `start` to the end of the media": the head is
/// trimmed but the tail is left alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    pub end: Option<f64>,
}

impl ClipWindow {
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }
}

/// Parse a single time string into an offset in seconds.
///
/// Offsets past the actual media length are not an error here; ffmpeg deals
/// with those downstream.
pub fn parse_offset(text: &str) -> Result<f64, TimeParseError> {
    let text = text.trim();
    let invalid = || TimeParseError::InvalidFormat(text.to_string());

    // Plain seconds first, then colon-separated forms.
    if let Ok(seconds) = text.parse::<f64>() {
        return if seconds.is_finite() && seconds >= 0.0 {
            Ok(seconds)
        } else {
            Err(invalid())
        };
    }

    let parts: Vec<&str> = text.split(':').collect();
    let units: &[f64] = match parts.len() {
        2 => &[60.0, 1.0],
        3 => &[3600.0, 60.0, 1.0],
        _ => return Err(invalid()),
    };

    let mut total = 0.0;
    for (part, unit) in parts.iter().zip(units) {
        let component = part.trim().parse::<f64>().map_err(|_| invalid())?;
        if !component.is_finite() || component < 0.0 {
            return Err(invalid());
        }
        total += component * unit;
    }
    Ok(total)
}

/// Combine the raw CLI time arguments into an optional [`ClipWindow`].
///
/// Returns `Ok(None)` when no times were given at all; empty or
/// whitespace-only strings count as absent, never as zero. Presence
/// conflicts are rejected before any string is parsed.
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    duration: Option<&str>,
) -> Result<Option<ClipWindow>, RangeError> {
    fn present(text: Option<&str>) -> Option<&str> {
        text.map(str::trim).filter(|t| !t.is_empty())
    }
    let (start, end, duration) = (present(start), present(end), present(duration));

    if end.is_some() && duration.is_some() {
        return Err(RangeError::ConflictingEndSpec);
    }
    if (end.is_some() || duration.is_some()) && start.is_none() {
        return Err(RangeError::MissingStart);
    }

    let start = match start {
        Some(text) => parse_offset(text)?,
        None => return Ok(None),
    };

    let end = match (end, duration) {
        (Some(text), None) => Some(parse_offset(text)?),
        (None, Some(text)) => Some(start + parse_offset(text)?),
        (None, None) => None,
        (Some(_), Some(_)) => unreachable!("rejected above"),
    };

    if let Some(end) = end {
        if end <= start {
            return Err(RangeError::InvertedRange { start, end });
        }
    }

    Ok(Some(ClipWindow { start, end }))
}
