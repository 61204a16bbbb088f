//! yt-dlp subprocess adapter.
//!
//! Metadata comes from `yt-dlp -J`. Downloads run with a custom progress
//! template that prints each progress-hook dictionary as a JSON line behind
//! a marker; both stdout and stderr are scanned for it, since yt-dlp routes
//! progress to stderr in quiet mode. Everything else is forwarded to tracing.
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{DownloadError, DownloadResult, ExtractionError, ExtractionResult};
use crate::extractor::{DownloadRequest, Extractor, ProgressSender};
use crate::filename::unsafe_chars_pattern;
use crate::models::{format_duration, Metadata};
use crate::progress::{strip_ansi, ProgressEvent};

/// Prefix of progress lines produced by our `--progress-template`.
pub const PROGRESS_MARKER: &str = "reelport-progress:";

const DEFAULT_BIN: &str = "yt-dlp";

pub struct YtDlpExtractor {
    /// Executable to run.
    bin: String,
    /// Arguments placed before the generated ones (proxy, cookies, ...).
    extra_args: Vec<String>,
}

impl YtDlpExtractor {
    pub fn new(bin: Option<String>, extra_args: Vec<String>) -> Self {
        Self {
            bin: bin.unwrap_or_else(|| DEFAULT_BIN.to_string()),
            extra_args,
        }
    }

    fn command(&self, args: Vec<String>) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.extra_args).args(args).stdin(Stdio::null());
        cmd
    }
}

fn metadata_args(url: &str) -> Vec<String> {
    ["-J", "--no-warnings", "-f", "best", "--", url]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn download_args(request: &DownloadRequest) -> Vec<String> {
    let template = format!("download:{}%(progress)j", PROGRESS_MARKER);
    let unsafe_chars = unsafe_chars_pattern();
    [
        "-f",
        "best",
        "-o",
        request.output_template.as_str(),
        "--replace-in-metadata",
        "title",
        unsafe_chars.as_str(),
        "_",
        "--no-color",
        "--newline",
        "--quiet",
        "--progress",
        "--progress-template",
        template.as_str(),
        "--",
        request.url.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Subset of the `yt-dlp -J` info dictionary we care about.
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
}

impl RawInfo {
    fn into_metadata(self) -> ExtractionResult<Metadata> {
        let title = self.title.ok_or(ExtractionError::MissingField("title"))?;
        Ok(Metadata {
            title,
            duration: format_duration(self.duration),
            author: self.uploader.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            thumbnail_url: self.thumbnail.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq)]
enum OutputLine {
    Progress(ProgressEvent),
    Error(String),
    Other(String),
}

fn classify_line(line: &str) -> OutputLine {
    let line = strip_ansi(line).trim().to_string();
    if let Some(payload) = line.strip_prefix(PROGRESS_MARKER) {
        return match serde_json::from_str::<ProgressEvent>(payload) {
            Ok(event) => OutputLine::Progress(event),
            Err(e) => {
                debug!(
                    "Unparsable progress payload ({}): {}",
                    e,
                    payload.chars().take(200).collect::<String>()
                );
                OutputLine::Progress(ProgressEvent::unparsed())
            }
        };
    }
    if line.starts_with("ERROR:") {
        OutputLine::Error(line)
    } else {
        OutputLine::Other(line)
    }
}

fn last_error_line(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| match classify_line(line) {
        OutputLine::Error(message) => Some(message),
        _ => None,
    })
}

/// Read one output stream to the end, forwarding progress events.
/// Returns the last `ERROR:` line seen.
async fn pump<R: AsyncRead + Unpin>(
    reader: R,
    progress: ProgressSender,
    stream: &'static str,
) -> Option<String> {
    // Split on raw bytes: a line that is not UTF-8 must not stop the read,
    // or yt-dlp dies of SIGPIPE on its next write.
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut last_error = None;
    loop {
        let raw = match segments.next_segment().await {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(e) => {
                warn!(target: "yt_dlp", "Failed to read {}: {}", stream, e);
                break;
            }
        };
        match classify_line(&String::from_utf8_lossy(&raw)) {
            OutputLine::Progress(event) => {
                // Receiver gone means the job no longer listens; keep draining.
                let _ = progress.send(event);
            }
            OutputLine::Error(message) => {
                warn!(target: "yt_dlp", "{}", message);
                last_error = Some(message);
            }
            OutputLine::Other(text) if !text.is_empty() => {
                debug!(target: "yt_dlp", "[{}] {}", stream, text);
            }
            OutputLine::Other(_) => {}
        }
    }
    last_error
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn fetch_metadata(&self, url: &str) -> ExtractionResult<Metadata> {
        debug!("Fetching metadata for {}", url);
        let output = self
            .command(metadata_args(url))
            .output()
            .await
            .map_err(|e| ExtractionError::Spawn(format!("{}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Adapter(
                last_error_line(&stderr)
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            ));
        }

        let raw: RawInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionError::InvalidMetadata(e.to_string()))?;
        raw.into_metadata()
    }

    async fn download(&self, request: &DownloadRequest, progress: ProgressSender) -> DownloadResult<()> {
        let mut child = self
            .command(download_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DownloadError::Spawn(format!("{}: {}", self.bin, e)))?;

        info!("yt-dlp spawned (pid: {:?}) for {}", child.id(), request.url);

        let stdout = child.stdout.take()
            .ok_or_else(|| DownloadError::Spawn("No stdout handle".into()))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| DownloadError::Spawn("No stderr handle".into()))?;

        let (stdout_error, stderr_error, status) = tokio::join!(
            pump(stdout, progress.clone(), "stdout"),
            pump(stderr, progress, "stderr"),
            child.wait(),
        );
        let status = status?;

        if status.success() {
            Ok(())
        } else {
            Err(DownloadError::Adapter(
                stderr_error
                    .or(stdout_error)
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
            ))
        }
    }
}
