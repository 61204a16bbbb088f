//! Download orchestration: job creation, the background download task, and
//! the progress-event protocol between the extractor and the registry.
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{DownloadError, ExtractionResult};
use crate::extractor::{DownloadRequest, Extractor};
use crate::filename::output_template;
use crate::job_registry::JobRegistry;
use crate::models::{Metadata, Outcome, StatusReport};
use crate::progress::{ProgressEvent, ProgressStatus};

/// Job id for a source URL: the first 16 hex digits of its SHA-256.
///
/// Deterministic, so resubmitting the same URL reuses (and overwrites) the
/// earlier job.
pub fn job_id_for(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut id = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}

pub struct DownloadOrchestrator {
    extractor: Arc<dyn Extractor>,
    registry: JobRegistry,
    download_dir: PathBuf,
}

impl DownloadOrchestrator {
    pub fn new(extractor: Arc<dyn Extractor>, registry: JobRegistry, download_dir: PathBuf) -> Self {
        Self {
            extractor,
            registry,
            download_dir,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn fetch_metadata(&self, url: &str) -> ExtractionResult<Metadata> {
        self.extractor.fetch_metadata(url).await
    }

    /// Register a job for `url` and start downloading it in the background.
    ///
    /// The job exists in the registry by the time this returns; the download
    /// itself is not awaited. yt-dlp names each output file after its own
    /// entry's title.
    pub async fn start_download(&self, url: &str) -> String {
        let job_id = job_id_for(url);
        self.registry.create(&job_id).await;

        let request = DownloadRequest {
            url: url.to_string(),
            output_template: output_template(&self.download_dir),
        };
        info!("Job {} starting download of {}", job_id, url);

        let registry = self.registry.clone();
        let extractor = self.extractor.clone();
        let id = job_id.clone();
        // Supervisor: the worker runs in its own task so a panic surfaces
        // as a JoinError here instead of vanishing with the handle.
        tokio::spawn(async move {
            let worker = tokio::spawn(run_download(registry.clone(), extractor, id.clone(), request));
            if let Err(e) = worker.await {
                let message = if e.is_panic() {
                    DownloadError::Panicked(panic_message(e.into_panic())).to_string()
                } else {
                    e.to_string()
                };
                registry.set_terminal(&id, Outcome::Failed(message)).await;
            }
        });

        job_id
    }

    /// Metadata lookup followed by `start_download`. Nothing is registered
    /// when the lookup fails.
    pub async fn submit(&self, url: &str) -> ExtractionResult<(String, Metadata)> {
        let info = self.fetch_metadata(url).await?;
        let job_id = self.start_download(url).await;
        Ok((job_id, info))
    }

    pub async fn status(&self, job_id: &str) -> StatusReport {
        self.registry.lookup(job_id).await
    }
}

/// Body of the background task for one job.
async fn run_download(
    registry: JobRegistry,
    extractor: Arc<dyn Extractor>,
    job_id: String,
    request: DownloadRequest,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let download = extractor.download(&request, tx);
    tokio::pin!(download);

    let result = loop {
        tokio::select! {
            biased;
            Some(event) = rx.recv() => apply_event(&registry, &job_id, event).await,
            result = &mut download => break result,
        }
    };

    // Events sent just before the extractor returned.
    while let Ok(event) = rx.try_recv() {
        apply_event(&registry, &job_id, event).await;
    }

    let outcome = match result {
        Ok(()) => Outcome::Completed,
        Err(e) => Outcome::Failed(e.to_string()),
    };
    registry.set_terminal(&job_id, outcome).await;
}

async fn apply_event(registry: &JobRegistry, job_id: &str, event: ProgressEvent) {
    match event.status {
        ProgressStatus::Downloading => {
            let percent = event.progress().unwrap_or_else(|e| {
                debug!("Job {}: {}, progress reset", job_id, e);
                0.0
            });
            registry.update_progress(job_id, percent).await;
        }
        ProgressStatus::Finished => {
            registry.set_terminal(job_id, Outcome::Completed).await;
        }
        ProgressStatus::Error | ProgressStatus::Unknown => {
            debug!("Job {}: ignoring {:?} progress event", job_id, event.status);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("Download task panicked with a non-string payload");
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DownloadResult, ExtractionError};
    use crate::extractor::ProgressSender;
    use crate::models::{format_duration, JobStatus};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Extractor whose download forwards whatever the test feeds into
    /// `script`, then returns `finish` once the script channel closes.
    struct ScriptedExtractor {
        metadata: Result<Metadata, String>,
        script: Mutex<Option<mpsc::UnboundedReceiver<ProgressEvent>>>,
        finish: Result<(), String>,
        panic: bool,
        requests: Mutex<Vec<DownloadRequest>>,
    }

    impl ScriptedExtractor {
        fn new(title: &str) -> (Self, mpsc::UnboundedSender<ProgressEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let extractor = Self {
                metadata: Ok(Metadata {
                    title: title.to_string(),
                    duration: format_duration(Some(125.0)),
                    author: "Uploader".to_string(),
                    description: String::new(),
                    thumbnail_url: "https://example.com/t.jpg".to_string(),
                }),
                script: Mutex::new(Some(rx)),
                finish: Ok(()),
                panic: false,
                requests: Mutex::new(Vec::new()),
            };
            (extractor, tx)
        }
    }

    #[async_trait]
    impl Extractor for ScriptedExtractor {
        async fn fetch_metadata(&self, _url: &str) -> ExtractionResult<Metadata> {
            self.metadata.clone().map_err(ExtractionError::Adapter)
        }

        async fn download(&self, request: &DownloadRequest, progress: ProgressSender) -> DownloadResult<()> {
            self.requests.lock().await.push(request.clone());
            if self.panic {
                panic!("extractor blew up");
            }
            let script = self.script.lock().await.take();
            if let Some(mut script) = script {
                while let Some(event) = script.recv().await {
                    let _ = progress.send(event);
                }
            }
            self.finish.clone().map_err(DownloadError::Adapter)
        }
    }

    fn setup(extractor: ScriptedExtractor) -> (DownloadOrchestrator, Arc<ScriptedExtractor>) {
        let extractor = Arc::new(extractor);
        let orchestrator = DownloadOrchestrator::new(
            extractor.clone(),
            JobRegistry::new(),
            PathBuf::from("downloads"),
        );
        (orchestrator, extractor)
    }

    /// Poll until the job's report satisfies `pred`, or fail after 2s.
    async fn wait_for(
        orchestrator: &DownloadOrchestrator,
        job_id: &str,
        pred: impl Fn(&StatusReport) -> bool,
    ) -> StatusReport {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let report = orchestrator.status(job_id).await;
            if pred(&report) {
                return report;
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out, last report: {:?}", report);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_job_id_deterministic() {
        let a = job_id_for("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, job_id_for("https://youtu.be/dQw4w9WgXcQ"));
        assert_ne!(a, job_id_for("https://youtu.be/other"));
    }

    #[tokio::test]
    async fn test_submit_progress_then_completed() {
        let (extractor, script) = ScriptedExtractor::new("Foo");
        let (orchestrator, _) = setup(extractor);

        let (job_id, info) = orchestrator.submit("https://example.com/foo").await.unwrap();
        assert_eq!(info.duration, "0:02:05");
        assert_eq!(orchestrator.status(&job_id).await.status, JobStatus::Downloading);

        script.send(ProgressEvent::percent("10%")).unwrap();
        let report = wait_for(&orchestrator, &job_id, |r| r.progress == Some(10.0)).await;
        assert_eq!(report.status, JobStatus::Downloading);

        script.send(ProgressEvent::percent("55%")).unwrap();
        let report = wait_for(&orchestrator, &job_id, |r| r.progress == Some(55.0)).await;
        assert_eq!(report.status, JobStatus::Downloading);

        script.send(ProgressEvent::finished()).unwrap();
        wait_for(&orchestrator, &job_id, |r| r.status == JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_metadata_failure_creates_no_job() {
        let (mut extractor, _script) = ScriptedExtractor::new("Foo");
        extractor.metadata = Err("ERROR: Unsupported URL: https://nope".to_string());
        let (orchestrator, extractor) = setup(extractor);

        let err = orchestrator.submit("https://nope").await.unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Unsupported URL: https://nope");

        let job_id = job_id_for("https://nope");
        assert_eq!(orchestrator.status(&job_id).await, StatusReport::not_found());
        assert_eq!(orchestrator.registry().stats().await.total, 0);
        assert!(extractor.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_download_registers_before_returning() {
        let (extractor, _script) = ScriptedExtractor::new("Foo");
        let (orchestrator, _) = setup(extractor);

        let job_id = orchestrator.start_download("https://example.com/a").await;
        let job = orchestrator.registry().get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 0.0);
    }

    #[tokio::test]
    async fn test_output_named_per_entry() {
        // Title of a playlist container; each entry must still get its own file.
        let (extractor, script) = ScriptedExtractor::new("My:Playlist");
        let (orchestrator, extractor) = setup(extractor);

        let (job_id, _) = orchestrator.submit("https://example.com/v").await.unwrap();
        drop(script);
        wait_for(&orchestrator, &job_id, |r| r.status == JobStatus::Completed).await;

        let requests = extractor.requests.lock().await;
        assert_eq!(
            requests[0].output_template,
            output_template(&PathBuf::from("downloads"))
        );
        assert!(!requests[0].output_template.contains("Playlist"));
    }

    #[tokio::test]
    async fn test_bad_progress_resets_to_zero() {
        let (extractor, script) = ScriptedExtractor::new("Foo");
        let (orchestrator, _) = setup(extractor);
        let (job_id, _) = orchestrator.submit("https://example.com/foo").await.unwrap();

        script.send(ProgressEvent::percent("\x1b[0;94m 30.0%\x1b[0m")).unwrap();
        wait_for(&orchestrator, &job_id, |r| r.progress == Some(30.0)).await;

        script.send(ProgressEvent::percent("N/A")).unwrap();
        wait_for(&orchestrator, &job_id, |r| r.progress == Some(0.0)).await;

        script.send(ProgressEvent::bytes(300.0, 1200.0)).unwrap();
        wait_for(&orchestrator, &job_id, |r| r.progress == Some(25.0)).await;

        script.send(ProgressEvent::bytes(300.0, 0.0)).unwrap();
        let report = wait_for(&orchestrator, &job_id, |r| r.progress == Some(0.0)).await;
        assert_eq!(report.status, JobStatus::Downloading);
    }

    #[tokio::test]
    async fn test_download_error_recorded() {
        let (mut extractor, script) = ScriptedExtractor::new("Foo");
        extractor.finish = Err("ERROR: HTTP Error 403: Forbidden".to_string());
        let (orchestrator, _) = setup(extractor);

        let (job_id, _) = orchestrator.submit("https://example.com/foo").await.unwrap();
        script.send(ProgressEvent::percent("12%")).unwrap();
        drop(script);

        let report = wait_for(&orchestrator, &job_id, |r| r.status.is_terminal()).await;
        assert_eq!(report.status, JobStatus::Error);
        assert_eq!(report.error.as_deref(), Some("ERROR: HTTP Error 403: Forbidden"));
    }

    #[tokio::test]
    async fn test_finished_then_failure_stays_completed() {
        let (mut extractor, script) = ScriptedExtractor::new("Foo");
        extractor.finish = Err("ERROR: Postprocessing failed".to_string());
        let (orchestrator, _) = setup(extractor);

        let (job_id, _) = orchestrator.submit("https://example.com/foo").await.unwrap();
        script.send(ProgressEvent::finished()).unwrap();
        script.send(ProgressEvent::percent("99%")).unwrap();
        drop(script);

        wait_for(&orchestrator, &job_id, |r| r.status == JobStatus::Completed).await;
        // Give the worker time to hit its own terminal transition.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let job = orchestrator.registry().get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert_eq!(job.progress, 0.0);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let (mut extractor, _script) = ScriptedExtractor::new("Foo");
        extractor.panic = true;
        let (orchestrator, _) = setup(extractor);

        let (job_id, _) = orchestrator.submit("https://example.com/foo").await.unwrap();
        let report = wait_for(&orchestrator, &job_id, |r| r.status.is_terminal()).await;
        assert_eq!(report.status, JobStatus::Error);
        assert_eq!(
            report.error.as_deref(),
            Some("Download task panicked: extractor blew up")
        );
    }

    #[tokio::test]
    async fn test_same_url_same_job() {
        let (extractor, script) = ScriptedExtractor::new("Foo");
        let (orchestrator, _) = setup(extractor);

        let (first, _) = orchestrator.submit("https://example.com/dup").await.unwrap();
        script.send(ProgressEvent::percent("40%")).unwrap();
        wait_for(&orchestrator, &first, |r| r.progress == Some(40.0)).await;

        // The script is consumed by the first download, so the second
        // finishes immediately; its registration still resets progress.
        let (second, _) = orchestrator.submit("https://example.com/dup").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(orchestrator.registry().stats().await.total, 1);
        wait_for(&orchestrator, &second, |r| r.status == JobStatus::Completed).await;
    }
}
