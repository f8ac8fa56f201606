//! In-process [`JobStore`] driven by explicit ticks.
//!
//! Due jobs are handed out by [`InMemoryJobStore::take_due`] and stay in
//! the running state until acknowledged with [`JobStore::complete`].
//! Running jobs left unacknowledged past the redelivery timeout are handed
//! out again, giving at-least-once delivery.

use crate::clock::Clock;
use crate::scheduler::job::{
    CheckinJob, FiredJob, JobHandle, JobId, JobSchedule, JobState, StoredJob,
};
use crate::scheduler::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time a fired job may stay unacknowledged.
const DEFAULT_REDELIVERY_SECS: i64 = 300;

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobHandle, StoredJob>,
    next_seq: u64,
}

/// Delayed-job store held in process memory.
pub struct InMemoryJobStore {
    inner: Mutex<StoreInner>,
    redelivery_timeout: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            redelivery_timeout: Duration::seconds(DEFAULT_REDELIVERY_SECS),
        }
    }

    /// Override how long a fired job may stay unacknowledged.
    #[must_use]
    pub fn with_redelivery_timeout(mut self, timeout: Duration) -> Self {
        self.redelivery_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of pending jobs under `id`.
    #[must_use]
    pub fn pending_count(&self, id: &JobId) -> usize {
        self.lock()
            .jobs
            .values()
            .filter(|job| &job.id == id && job.is_pending())
            .count()
    }

    /// Number of jobs held, any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand out every job due at `now`.
    ///
    /// One-shot jobs move to running. Repeating jobs are advanced by whole
    /// periods past `now` (missed occurrences coalesce into one delivery).
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<FiredJob> {
        let mut inner = self.lock();
        let mut due: Vec<&mut StoredJob> = inner
            .jobs
            .values_mut()
            .filter(|job| match job.state {
                JobState::Pending => job.next_due <= now,
                JobState::Running { since, .. } => since + self.redelivery_timeout <= now,
            })
            .collect();
        due.sort_by_key(|job| (job.next_due, job.created_seq));

        let mut fired = Vec::with_capacity(due.len());
        for job in due {
            let dispatched = job.was_dispatched();
            let redelivery = matches!(job.state, JobState::Running { .. });
            if redelivery {
                warn!(
                    identity = %job.id,
                    handle = %job.handle,
                    "redelivering unacknowledged job"
                );
            }

            let mut payload = job.payload.clone();
            if !redelivery {
                payload.due_at = job.next_due;
                if let JobSchedule::Every { period, .. } = job.schedule {
                    job.next_due = advance_past(job.next_due, period, now);
                }
            }
            job.state = JobState::Running {
                since: now,
                dispatched,
            };

            fired.push(FiredJob {
                handle: job.handle,
                id: job.id.clone(),
                payload,
                fired_at: now,
            });
        }
        fired
    }

    /// Poll [`take_due`](Self::take_due) on an interval and forward fired
    /// jobs to `tx` until `shutdown` is cancelled or the receiver is dropped.
    pub fn spawn_ticker(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        tick: std::time::Duration,
        tx: mpsc::Sender<FiredJob>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("job store ticker started ({}ms)", tick.as_millis());
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("job store ticker shutting down");
                        return;
                    }
                    _ = interval.tick() => {
                        for fired in self.take_due(clock.now()) {
                            if tx.send(fired).await.is_err() {
                                debug!("fired-job channel closed, stopping ticker");
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

fn advance_past(mut next: DateTime<Utc>, period: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    if period <= Duration::zero() {
        return now + Duration::seconds(1);
    }
    while next <= now {
        next += period;
    }
    next
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(
        &self,
        id: &JobId,
        payload: CheckinJob,
        schedule: JobSchedule,
    ) -> crate::Result<JobHandle> {
        let mut inner = self.lock();
        inner.next_seq += 1;
        let handle = JobHandle::new();
        let job = StoredJob {
            handle,
            id: id.clone(),
            payload,
            schedule,
            state: JobState::Pending,
            next_due: schedule.first_due(),
            created_seq: inner.next_seq,
        };
        inner.jobs.insert(handle, job);
        Ok(handle)
    }

    async fn cancel(&self, id: &JobId) -> crate::Result<bool> {
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, job| &job.id != id);
        Ok(inner.jobs.len() != before)
    }

    async fn cancel_handle(&self, handle: JobHandle) -> crate::Result<bool> {
        Ok(self.lock().jobs.remove(&handle).is_some())
    }

    async fn jobs(&self, id: &JobId) -> crate::Result<Vec<StoredJob>> {
        let inner = self.lock();
        let mut jobs: Vec<StoredJob> = inner
            .jobs
            .values()
            .filter(|job| &job.id == id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_seq);
        Ok(jobs)
    }

    async fn mark_dispatched(&self, handle: JobHandle) -> crate::Result<()> {
        if let Some(job) = self.lock().jobs.get_mut(&handle) {
            if let JobState::Running { dispatched, .. } = &mut job.state {
                *dispatched = true;
            }
        }
        Ok(())
    }

    async fn complete(&self, handle: JobHandle) -> crate::Result<()> {
        let mut inner = self.lock();
        let repeating = match inner.jobs.get(&handle) {
            Some(job) => job.schedule.is_repeating(),
            None => return Ok(()),
        };
        if repeating {
            if let Some(job) = inner.jobs.get_mut(&handle) {
                job.state = JobState::Pending;
            }
        } else {
            inner.jobs.remove(&handle);
        }
        Ok(())
    }
}
