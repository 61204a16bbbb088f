//! Seam between the job core and whatever resolves and downloads media.
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{DownloadResult, ExtractionResult};
use crate::models::Metadata;
use crate::progress::ProgressEvent;

/// Channel the extractor reports progress on while a download runs.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Output template in yt-dlp syntax, e.g. `downloads/%(title)s.%(ext)s`.
    pub output_template: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve descriptive metadata without downloading anything.
    async fn fetch_metadata(&self, url: &str) -> ExtractionResult<Metadata>;

    /// Download the media, sending progress events until done. Returning
    /// `Ok` means the output file has been written.
    async fn download(&self, request: &DownloadRequest, progress: ProgressSender) -> DownloadResult<()>;
}

