//! In-memory registry of download jobs.
//!
//! Cheap to clone: every clone shares the same map behind a tokio Mutex,
//! so background download tasks and request handlers can hold their own
//! handle. Nothing is persisted.
use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::{Job, JobStatus, Outcome, StatusReport};

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh downloading job. An existing job with the same id
    /// is replaced; returns true when that happened.
    pub async fn create(&self, job_id: &str) -> bool {
        let replaced = self
            .jobs
            .lock()
            .await
            .insert(job_id.to_string(), Job::new(job_id))
            .is_some();

        if replaced {
            warn!("Job {} already registered, previous state overwritten", job_id);
        } else {
            info!("Job {} registered", job_id);
        }
        replaced
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    /// Status as served to pollers. Unknown ids yield `not_found`.
    pub async fn lookup(&self, job_id: &str) -> StatusReport {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .map(Job::report)
            .unwrap_or_else(StatusReport::not_found)
    }

    /// Set progress for a job that is still downloading. Late updates after
    /// a terminal transition are dropped.
    pub async fn update_progress(&self, job_id: &str, percent: f64) {
        if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
            if job.status == JobStatus::Downloading {
                job.progress = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
            }
        }
    }

    /// Move a downloading job to its terminal state. Returns false if the
    /// job is unknown or already terminal, in which case nothing changes.
    pub async fn set_terminal(&self, job_id: &str, outcome: Outcome) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }

        match outcome {
            Outcome::Completed => {
                job.status = JobStatus::Completed;
                info!("Job {} completed", job_id);
            }
            Outcome::Failed(message) => {
                warn!("Job {} failed: {}", job_id, message);
                job.status = JobStatus::Error;
                job.error = Some(message);
            }
        }
        job.finished_at = Some(Utc::now());
        true
    }

    /// Drop terminal jobs that finished more than `max_age_secs` ago.
    /// Jobs still downloading are always kept.
    pub async fn evict_finished(&self, max_age_secs: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        before - jobs.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let jobs = self.jobs.lock().await;
        let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count();
        RegistryStats {
            downloading: count(JobStatus::Downloading),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Error),
            total: jobs.len(),
        }
    }
}

/// Registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}
