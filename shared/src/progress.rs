//! Progress events reported by the extractor while a download runs.
//!
//! The event mirrors the progress-hook dictionary yt-dlp emits, so the
//! adapter can deserialize it straight from `%(progress)j` output.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ProgressParseError;

static ANSI_ESCAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap()
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    /// Pre-formatted percentage such as `" 42.1%"`, possibly with color codes.
    #[serde(rename = "_percent_str", default, skip_serializing_if = "Option::is_none")]
    pub percent_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<f64>,
}

impl ProgressEvent {
    fn with_status(status: ProgressStatus) -> Self {
        Self {
            status,
            percent_str: None,
            downloaded_bytes: None,
            total_bytes: None,
        }
    }

    pub fn percent(value: impl Into<String>) -> Self {
        Self {
            percent_str: Some(value.into()),
            ..Self::with_status(ProgressStatus::Downloading)
        }
    }

    pub fn bytes(downloaded: f64, total: f64) -> Self {
        Self {
            downloaded_bytes: Some(downloaded),
            total_bytes: Some(total),
            ..Self::with_status(ProgressStatus::Downloading)
        }
    }

    pub fn finished() -> Self {
        Self::with_status(ProgressStatus::Finished)
    }

    /// A downloading event with no usable payload.
    pub fn unparsed() -> Self {
        Self::with_status(ProgressStatus::Downloading)
    }

    /// Completion percentage carried by this event.
    ///
    /// The percentage string wins over byte counts when both are present.
    pub fn progress(&self) -> Result<f64, ProgressParseError> {
        if let Some(raw) = &self.percent_str {
            return parse_percent(raw);
        }
        match (self.downloaded_bytes, self.total_bytes) {
            (Some(downloaded), Some(total)) => Ok(bytes_percent(downloaded, total)),
            _ => Err(ProgressParseError::MissingFields),
        }
    }
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE_RE.replace_all(text, "").into_owned()
}

/// Parse a percentage string, discarding color codes, `%` signs, and any
/// other non-numeric characters. The result is clamped to `[0, 100]`.
pub fn parse_percent(raw: &str) -> Result<f64, ProgressParseError> {
    let digits: String = strip_ansi(raw)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return Err(ProgressParseError::Empty(raw.to_string()));
    }
    let value: f64 = digits
        .parse()
        .map_err(|_| ProgressParseError::NotNumeric(raw.to_string()))?;
    Ok(value.clamp(0.0, 100.0))
}

/// `downloaded / total * 100`, with an unknown (zero) total counting as 0.
pub fn bytes_percent(downloaded: f64, total: f64) -> f64 {
    if total <= 0.0 || !total.is_finite() || !downloaded.is_finite() {
        return 0.0;
    }
    (downloaded / total * 100.0).clamp(0.0, 100.0)
}
