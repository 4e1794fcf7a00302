// ABOUTME: In-memory job registry mapping job ids to their current state.
// ABOUTME: Each job lives in a watch channel so waiters wake on the single terminal transition.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::record::ProductRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One scrape job as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProductRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh `processing` job with a random v4 id.
    pub fn new(url: impl Into<String>, requester_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            status: JobStatus::Processing,
            result: None,
            error: None,
            error_code: None,
            requester_id,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Processing
    }
}

/// Concurrent job table.
///
/// Terminal transitions happen at most once per job; later attempts are
/// ignored and reported as `false`.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, watch::Sender<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Uuid {
        let id = job.id;
        let (tx, _rx) = watch::channel(job);
        self.jobs.insert(id, tx);
        id
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|tx| tx.borrow().clone())
    }

    pub fn complete(&self, id: &Uuid, record: ProductRecord) -> bool {
        self.finish(id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(record);
        })
    }

    pub fn fail(&self, id: &Uuid, code: ErrorCode, error: impl Into<String>) -> bool {
        let error = error.into();
        self.finish(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
            job.error_code = Some(code);
        })
    }

    fn finish(&self, id: &Uuid, apply: impl FnOnce(&mut Job)) -> bool {
        let Some(tx) = self.jobs.get(id) else {
            return false;
        };
        tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            apply(job);
            job.completed_at = Some(Utc::now());
            true
        })
    }

    /// Waits until the job is terminal or `max_wait` elapses, then returns its
    /// current state. `None` for an unknown id.
    pub async fn wait(&self, id: &Uuid, max_wait: Duration) -> Option<Job> {
        let mut rx = self.jobs.get(id)?.subscribe();
        match tokio::time::timeout(max_wait, rx.wait_for(Job::is_terminal)).await {
            Ok(Ok(job)) => return Some(job.clone()),
            Ok(Err(_)) | Err(_) => {}
        }
        let job = rx.borrow().clone();
        Some(job)
    }

    /// Evicts terminal jobs that finished more than `max_age` ago.
    pub fn prune(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let before = self.jobs.len();
        self.jobs.retain(|_, tx| {
            let job = tx.borrow();
            !matches!(job.completed_at, Some(done) if job.is_terminal() && done < cutoff)
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record() -> ProductRecord {
        ProductRecord {
            title: Some("Desk Lamp".to_string()),
            source_url: "https://shop.test/p/1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn job_serializes_camel_case() {
        let mut job = Job::new("https://shop.test/p/1", Some("user-7".to_string()));
        job.error_code = Some(ErrorCode::BlockedContent);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["requesterId"], "user-7");
        assert_eq!(json["errorCode"], "blocked_content");
        assert!(json.get("startedAt").is_some());
        assert!(json.get("completedAt").is_none());
    }

    #[test]
    fn terminal_transition_happens_once() {
        let registry = JobRegistry::new();
        let id = registry.insert(Job::new("https://shop.test/p/1", None));

        assert!(registry.complete(&id, record()));
        assert!(!registry.fail(&id, ErrorCode::Timeout, "timeout"));

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn unknown_job_cannot_finish() {
        let registry = JobRegistry::new();
        assert!(!registry.fail(&Uuid::new_v4(), ErrorCode::Timeout, "timeout"));
        assert!(registry.get(&Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn wait_returns_processing_job_on_elapse() {
        let registry = JobRegistry::new();
        let id = registry.insert(Job::new("https://shop.test/p/1", None));

        let job = registry.wait(&id, Duration::from_millis(20)).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn wait_wakes_on_completion() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.insert(Job::new("https://shop.test/p/1", None));

        let finisher = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            finisher.fail(&id, ErrorCode::BlockedContent, "blocked by both backends (empty)");
        });

        let job = registry.wait(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("blocked by both backends (empty)"));
    }

    #[tokio::test]
    async fn wait_on_unknown_job_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.wait(&Uuid::new_v4(), Duration::from_millis(1)).await.is_none());
    }

    #[test]
    fn prune_keeps_recent_and_processing_jobs() {
        let registry = JobRegistry::new();
        let running = registry.insert(Job::new("https://shop.test/a", None));
        let done = registry.insert(Job::new("https://shop.test/b", None));
        registry.complete(&done, record());

        assert_eq!(registry.prune(Duration::from_secs(3600)), 0);
        assert_eq!(registry.prune(Duration::ZERO), 1);
        assert!(registry.get(&running).is_some());
        assert!(registry.get(&done).is_none());
    }
}
