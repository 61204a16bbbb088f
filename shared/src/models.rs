//! Data types shared between the job core and the HTTP boundary.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a download job.
///
/// `NotFound` is only ever produced by a status query; it is never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Downloading,
    Completed,
    Error,
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Downloading => write!(f, "downloading"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::NotFound => write!(f, "not_found"),
        }
    }
}

/// One in-flight or finished download.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Percentage in `[0.0, 100.0]`. Meaningless once terminal.
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Downloading,
            progress: 0.0,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            status: self.status,
            progress: Some(self.progress),
            error: self.error.clone(),
        }
    }
}

/// Terminal result recorded on a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

/// Wire form of `GET /status/{video_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn not_found() -> Self {
        Self {
            status: JobStatus::NotFound,
            progress: None,
            error: None,
        }
    }
}

/// Descriptive metadata for a media URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub title: String,
    /// `H:MM:SS`, or `"unknown"` when the extractor reports no duration.
    pub duration: String,
    pub author: String,
    pub description: String,
    pub thumbnail_url: String,
}

/// A file present in the download directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadedFile {
    pub name: String,
    /// Human-readable size, e.g. `"2.5 MB"`.
    pub size: String,
    pub size_bytes: u64,
    /// URL path under `/downloads/`, percent-encoded.
    pub path: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub modified: String,
}

/// Render a duration in seconds the way the status page shows it.
///
/// Fractional seconds are dropped. Zero, negative or missing durations
/// are reported as `"unknown"`.
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) if secs > 0.0 && secs.is_finite() => {
            let total = secs.trunc() as u64;
            format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
        }
        _ => "unknown".to_string(),
    }
}
