//! Delayed-job store contract.
//!
//! Models a generic at-least-once delayed-job primitive (a Redis-backed
//! queue in production). It supports unique-id cancel and fixed-period
//! repeat, but has no dynamic-interval recurring jobs. Enqueue does not
//! dedupe by id; callers cancel first.

use crate::scheduler::job::{CheckinJob, JobHandle, JobId, JobSchedule, StoredJob};
use async_trait::async_trait;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job under `id`. All-or-nothing: on error nothing was stored.
    async fn enqueue(
        &self,
        id: &JobId,
        payload: CheckinJob,
        schedule: JobSchedule,
    ) -> crate::Result<JobHandle>;

    /// Remove every job stored under `id`, pending or running.
    /// Returns `true` when anything was removed.
    async fn cancel(&self, id: &JobId) -> crate::Result<bool>;

    /// Remove a single job.
    async fn cancel_handle(&self, handle: JobHandle) -> crate::Result<bool>;

    /// All live jobs under `id`, oldest first.
    async fn jobs(&self, id: &JobId) -> crate::Result<Vec<StoredJob>>;

    /// Record that a running job's notification has gone out, so a
    /// redelivery of it does not send again. Unknown handles are ignored.
    async fn mark_dispatched(&self, handle: JobHandle) -> crate::Result<()>;

    /// Acknowledge a delivered job. One-shot jobs are removed; repeating
    /// jobs return to pending. Unknown handles are ignored.
    async fn complete(&self, handle: JobHandle) -> crate::Result<()>;
}
