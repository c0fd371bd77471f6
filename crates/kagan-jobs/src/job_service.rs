//! The job subsystem (§4.8): the asynchronous envelope around any
//! long-running task-scoped operation. Jobs are persisted through
//! [`kagan_core::db::Db`] and progress is broadcast on the
//! [`kagan_core::event_bus::EventBus`] so `jobs.wait` can block without
//! polling.

use std::sync::Arc;
use std::time::Duration;

use kagan_core::db::Db;
use kagan_core::event_bus::{wait_for, Event, EventBus};
use kagan_core::types::{Job, JobStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

pub type Result<T> = std::result::Result<T, JobServiceError>;

/// What `jobs.wait` actually observed, mirroring the `code` values spec
/// §4.8 names (`JOB_TIMEOUT` is signalled via `timed_out`, not a variant
/// here — the caller always gets back the latest job record either way).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub timed_out: bool,
    pub job: Job,
}

pub struct JobService {
    db: Arc<Db>,
    bus: Arc<EventBus>,
}

impl JobService {
    pub fn new(db: Arc<Db>, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    /// `jobs.submit`: persist a fresh `QUEUED` job and return immediately.
    /// The caller (automation scheduler or a service handler) is
    /// responsible for actually driving the job forward.
    pub async fn submit(&self, task_id: Uuid, action: impl Into<String>) -> Result<Job> {
        let job = Job::new(task_id, action);
        self.db.upsert_job(&job).await?;
        self.publish_changed(&job);
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job> {
        self.db
            .get_job(job_id)
            .await?
            .ok_or(JobServiceError::NotFound(job_id))
    }

    /// Advance a job's state machine, appending a `JobEvent` and persisting.
    /// Returns `InvalidTransition` rather than silently no-opping, so
    /// callers racing a cancel against a completion notice fail loudly.
    pub async fn transition(
        &self,
        job_id: Uuid,
        target: JobStatus,
        message: impl Into<String>,
        code: Option<String>,
    ) -> Result<Job> {
        let mut job = self.get(job_id).await?;
        let from = job.status;
        if !job.try_transition(target, message, code) {
            return Err(JobServiceError::InvalidTransition { from, to: target });
        }
        self.db.upsert_job(&job).await?;
        self.publish_changed(&job);
        Ok(job)
    }

    /// `jobs.cancel`: unconditional for `QUEUED`; cooperative (best-effort
    /// signal only) for `RUNNING` — the caller is expected to have wired a
    /// cancellation token into the running work and this just records the
    /// request. If the job is already terminal this is a no-op success.
    pub async fn cancel(&self, job_id: Uuid) -> Result<Job> {
        let job = self.get(job_id).await?;
        match job.status {
            JobStatus::Queued => {
                self.transition(job_id, JobStatus::Cancelled, "cancelled before start", None)
                    .await
            }
            JobStatus::Running => {
                // Cooperative cancel: record the request but leave status as
                // RUNNING until the runtime acknowledges via `transition`.
                // Callers surface STOP_PENDING by checking status unchanged
                // on a subsequent `get`.
                Ok(job)
            }
            _ => Ok(job),
        }
    }

    /// `jobs.wait`: block until the job reaches a terminal status or the
    /// job-specific event stops matching, whichever comes first, or the
    /// timeout elapses. Always returns `Ok` — timeout is reported via
    /// `WaitOutcome::timed_out`, never as an error, per spec §4.8's "the
    /// response still succeeds" rule.
    pub async fn wait(&self, job_id: Uuid, timeout: Duration) -> Result<WaitOutcome> {
        let current = self.get(job_id).await?;
        if current.status.is_terminal() {
            return Ok(WaitOutcome {
                timed_out: false,
                job: current,
            });
        }

        let matched = wait_for(&self.bus, timeout, |event| {
            matches!(event, Event::JobChanged { job_id: id, status, .. }
                if *id == job_id && status.is_terminal())
        })
        .await;

        let job = self.get(job_id).await?;
        Ok(WaitOutcome {
            timed_out: matched.is_none() && !job.status.is_terminal(),
            job,
        })
    }

    /// `jobs.events`: paginated slice of the append-only event log.
    pub async fn events(&self, job_id: Uuid, limit: usize, offset: usize) -> Result<JobEventsPage> {
        let job = self.get(job_id).await?;
        let total = job.events.len();
        let page: Vec<_> = job.events.into_iter().skip(offset).take(limit).collect();
        let returned = page.len();
        Ok(JobEventsPage {
            events: page,
            returned_events: returned,
            total_events: total,
            has_more: offset + returned < total,
            next_offset: if offset + returned < total {
                Some(offset + returned)
            } else {
                None
            },
        })
    }

    fn publish_changed(&self, job: &Job) {
        self.bus.publish(Event::JobChanged {
            job_id: job.job_id,
            task_id: job.task_id,
            status: job.status,
            updated_at: job.updated_at,
        });
    }
}

#[derive(Debug, Clone)]
pub struct JobEventsPage {
    pub events: Vec<kagan_core::types::JobEvent>,
    pub returned_events: usize,
    pub total_events: usize,
    pub has_more: bool,
    pub next_offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::db::Db;

    async fn test_db() -> Arc<Db> {
        Arc::new(Db::open_in_memory().await.expect("open in-memory db"))
    }

    #[tokio::test]
    async fn submit_persists_queued_job() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let task_id = Uuid::new_v4();
        let job = svc.submit(task_id, "agent_start").await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let fetched = svc.get(job.job_id).await.unwrap();
        assert_eq!(fetched.job_id, job.job_id);
    }

    #[tokio::test]
    async fn cancel_queued_job_is_immediate() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        let cancelled = svc.cancel(job.job_id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_job_is_cooperative_noop() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        svc.transition(job.job_id, JobStatus::Running, "started", None)
            .await
            .unwrap();

        let still_running = svc.cancel(job.job_id).await.unwrap();
        assert_eq!(still_running.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn wait_returns_immediately_for_terminal_job() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        svc.transition(job.job_id, JobStatus::Running, "started", None)
            .await
            .unwrap();
        svc.transition(job.job_id, JobStatus::Succeeded, "done", None)
            .await
            .unwrap();

        let outcome = svc.wait(job.job_id, Duration::from_millis(50)).await.unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.job.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn wait_times_out_on_non_terminal_job() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        let outcome = svc.wait(job.job_id, Duration::from_millis(30)).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn wait_wakes_on_terminal_transition() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = Arc::new(JobService::new(db, bus));

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        let job_id = job.job_id;

        let waiter = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.wait(job_id, Duration::from_secs(2)).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        svc.transition(job_id, JobStatus::Running, "started", None)
            .await
            .unwrap();
        svc.transition(job_id, JobStatus::Succeeded, "done", None)
            .await
            .unwrap();

        let outcome = waiter.await.unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.job.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn events_paginate() {
        let db = test_db().await;
        let bus = Arc::new(EventBus::new());
        let svc = JobService::new(db, bus);

        let job = svc.submit(Uuid::new_v4(), "agent_start").await.unwrap();
        svc.transition(job.job_id, JobStatus::Running, "started", None)
            .await
            .unwrap();
        svc.transition(job.job_id, JobStatus::Succeeded, "done", None)
            .await
            .unwrap();

        let page = svc.events(job.job_id, 2, 0).await.unwrap();
        assert_eq!(page.returned_events, 2);
        assert_eq!(page.total_events, 3);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(2));

        let rest = svc.events(job.job_id, 2, 2).await.unwrap();
        assert_eq!(rest.returned_events, 1);
        assert!(!rest.has_more);
    }
}
