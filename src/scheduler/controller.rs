//! Monitoring chain controller.
//!
//! Every mutation of check-in jobs goes through here. Mutations of one
//! identity are serialized by [`IdentityLocks`], and each replaces the
//! identity's jobs with cancel-before-enqueue. A failed enqueue restores
//! what was there before.
//!
//! `on_fire` is the fire handler: it fences stale deliveries, dispatches
//! the due notification and then asks the variant's [`FireHandler`]
//! whether to enqueue the successor.
//!
//! [`FireHandler`]: crate::scheduler::handlers::FireHandler

use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::dedup::AlertDedupCache;
use crate::dispatch::{Notification, NotificationDispatcher, NotificationKind};
use crate::error::{MonitorError, Result};
use crate::ops::{OpsAlert, OpsAlertKind, OpsAlerts};
use crate::patient::PatientRegistry;
use crate::risk::RiskClassifier;
use crate::scheduler::handlers::{ContinuationDecision, FireRoute};
use crate::scheduler::job::{
    CheckinJob, FiredJob, JobHandle, JobId, JobKind, JobSchedule, StoredJob,
};
use crate::scheduler::locks::IdentityLocks;
use crate::scheduler::policy::{EscalationLevel, EscalationPolicy};
use crate::scheduler::store::JobStore;
use crate::scheduler::tracks::{MonitoringTrack, SchedulingMode, TrackRegistry};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Parameters of a new chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub patient_id: String,
    pub track: MonitoringTrack,
    pub level: EscalationLevel,
    pub context: Option<serde_json::Value>,
    /// Overrides the policy's chain length.
    pub total_checks: Option<u32>,
}

impl StartRequest {
    #[must_use]
    pub fn new(patient_id: impl Into<String>, track: MonitoringTrack, level: EscalationLevel) -> Self {
        Self {
            patient_id: patient_id.into(),
            track,
            level,
            context: None,
            total_checks: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_total_checks(mut self, total: u32) -> Self {
        self.total_checks = Some(total.max(1));
        self
    }
}

/// Derived state of one identity.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainState {
    /// A job exists; this is its payload.
    Active(CheckinJob),
    Idle,
}

impl ChainState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    #[must_use]
    pub fn level(&self) -> Option<EscalationLevel> {
        match self {
            Self::Active(job) => Some(job.level),
            Self::Idle => None,
        }
    }
}

/// Result of handling one fired job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Notification sent and successor enqueued.
    Rescheduled { handle: JobHandle, sequence: u32 },
    /// Notification sent; the store repeats the job.
    Repeating,
    /// Notification sent; the bounded chain is exhausted.
    Terminated,
    /// The job was cancelled or superseded before it ran. Nothing sent.
    Stale,
    /// The patient opted out; the identity was cleared. Nothing sent.
    MonitoringDisabled,
}

/// Creates, cancels, escalates and fires check-in chains.
pub struct MonitoringController {
    pub(super) store: Arc<dyn JobStore>,
    pub(super) dispatcher: Arc<dyn NotificationDispatcher>,
    pub(super) registry: Arc<dyn PatientRegistry>,
    pub(super) classifier: Option<Arc<dyn RiskClassifier>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) policy: EscalationPolicy,
    pub(super) locks: IdentityLocks,
    pub(super) dedup: AlertDedupCache,
    alerts: OpsAlerts,
    safety_followup: Duration,
    reschedule_attempts: u32,
    reschedule_backoff: std::time::Duration,
}

impl MonitoringController {
    /// Create a controller on the system clock with log-only ops alerts.
    pub fn new(
        config: &MonitorConfig,
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        registry: Arc<dyn PatientRegistry>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            classifier: None,
            clock: Arc::new(SystemClock),
            policy: EscalationPolicy::new(config.policy.clone(), config.daily.clone()),
            locks: IdentityLocks::new(),
            dedup: AlertDedupCache::new(&config.dedup),
            alerts: OpsAlerts::log_only(),
            safety_followup: Duration::minutes(i64::from(config.safety_followup_minutes)),
            reschedule_attempts: config.worker.reschedule_attempts,
            reschedule_backoff: std::time::Duration::from_millis(
                config.worker.reschedule_backoff_ms,
            ),
        }
    }

    /// Attach the symptom classifier used by symptom intake.
    pub fn with_classifier(mut self, classifier: Arc<dyn RiskClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Route ops alerts to a sink in addition to the log.
    pub fn with_alerts(mut self, alerts: OpsAlerts) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    // ── chain mutations ───────────────────────────────────────────────

    /// Start a chain, replacing whatever the identity held.
    ///
    /// On error the previous chain is left in place.
    pub async fn start(&self, request: StartRequest) -> Result<JobHandle> {
        let id = JobId::for_track(request.track, &request.patient_id);
        let _guard = self.locks.lock(&id).await;
        self.start_locked(&id, request).await
    }

    /// Remove the identity's jobs. Idempotent.
    ///
    /// Cancelling a symptom chain that is running at Emergency schedules
    /// the one-shot safety follow-up. The follow-up is stored before the
    /// chain is removed; if it cannot be stored the chain is left running.
    pub async fn cancel(&self, patient_id: &str, track: MonitoringTrack) -> Result<bool> {
        let id = JobId::for_track(track, patient_id);
        let _guard = self.locks.lock(&id).await;

        let newest = self.store.jobs(&id).await?.pop();
        if track == MonitoringTrack::Symptom {
            if let Some(job) = newest.filter(|j| j.payload.level == EscalationLevel::Emergency) {
                self.schedule_safety_followup_locked(patient_id, job.payload.context)
                    .await?;
            }
        }

        let removed = self.store.cancel(&id).await?;
        if removed {
            info!(identity = %id, "check-in chain cancelled");
        }
        Ok(removed)
    }

    /// Cancel every track and any pending safety follow-up.
    ///
    /// Used when monitoring is disabled, so no follow-up is scheduled.
    /// Returns the number of identities that held jobs.
    pub async fn cancel_all(&self, patient_id: &str) -> Result<usize> {
        let mut cancelled = 0;
        for id in identities(patient_id) {
            let _guard = self.locks.lock(&id).await;
            if self.store.cancel(&id).await? {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(patient_id, cancelled, "all monitoring cancelled");
        }
        Ok(cancelled)
    }

    /// Restart the chain at `max(current, level)`.
    pub async fn escalate(
        &self,
        patient_id: &str,
        track: MonitoringTrack,
        level: EscalationLevel,
    ) -> Result<JobHandle> {
        self.restart_with(patient_id, track, |current| {
            current.map_or(level, |c| c.max(level))
        })
        .await
    }

    /// Restart the chain at `min(current, level)`.
    pub async fn deescalate(
        &self,
        patient_id: &str,
        track: MonitoringTrack,
        level: EscalationLevel,
    ) -> Result<JobHandle> {
        self.restart_with(patient_id, track, |current| {
            current.map_or(level, |c| c.min(level))
        })
        .await
    }

    /// Schedule the one-shot post-emergency follow-up. Repeated calls
    /// leave exactly one.
    pub async fn schedule_safety_followup(
        &self,
        patient_id: &str,
        context: Option<serde_json::Value>,
    ) -> Result<JobHandle> {
        let symptom = JobId::for_track(MonitoringTrack::Symptom, patient_id);
        let _guard = self.locks.lock(&symptom).await;
        self.schedule_safety_followup_locked(patient_id, context).await
    }

    // ── queries ──────────────────────────────────────────────────────

    pub async fn chain_state(&self, patient_id: &str, track: MonitoringTrack) -> Result<ChainState> {
        let id = JobId::for_track(track, patient_id);
        let _guard = self.locks.lock(&id).await;
        Ok(match self.resolve_locked(&id).await? {
            Some(job) => ChainState::Active(job.payload),
            None => ChainState::Idle,
        })
    }

    pub async fn active_level(
        &self,
        patient_id: &str,
        track: MonitoringTrack,
    ) -> Result<Option<EscalationLevel>> {
        Ok(self.chain_state(patient_id, track).await?.level())
    }

    /// Heal duplicate jobs across every identity of a patient.
    /// Returns how many identities needed healing.
    pub async fn audit_patient(&self, patient_id: &str) -> Result<usize> {
        let mut healed = 0;
        for id in identities(patient_id) {
            let _guard = self.locks.lock(&id).await;
            let mut jobs = self.store.jobs(&id).await?;
            if let Some(newest) = jobs.pop() {
                if !jobs.is_empty() {
                    self.heal_duplicates(&id, &newest, jobs).await?;
                    healed += 1;
                }
            }
        }
        Ok(healed)
    }

    // ── firing ───────────────────────────────────────────────────────

    /// Handle one delivery from the job store.
    ///
    /// The notification is always sent before the successor is enqueued.
    /// A failed dispatch is logged and the chain continues. A successor
    /// that cannot be enqueued raises a chain-broken alert; the fired job
    /// is left unacknowledged so the store delivers it again.
    pub async fn on_fire(&self, fired: FiredJob) -> Result<FireOutcome> {
        let FiredJob {
            handle,
            id,
            payload,
            fired_at,
        } = fired;
        let _guard = self.locks.lock(&id).await;

        let Some(current) = self.current_job(&id, handle).await? else {
            debug!(identity = %id, %handle, "stale fire ignored");
            return Ok(FireOutcome::Stale);
        };

        let enabled = self
            .registry
            .patient(&payload.patient_id)
            .await?
            .is_some_and(|p| p.monitoring_enabled);
        if !enabled {
            self.store.cancel(&id).await?;
            info!(identity = %id, "monitoring disabled, chain dropped at fire");
            return Ok(FireOutcome::MonitoringDisabled);
        }

        let handler = FireRoute::for_job(&payload).handler();
        if current.was_dispatched() {
            info!(
                identity = %id,
                sequence = payload.sequence_number,
                "redelivered after dispatch, resuming continuation"
            );
        } else {
            self.dispatch_fired(&id, handle, &payload, fired_at, handler.notification(&payload))
                .await;
        }

        let outcome = match handler.decide(&payload) {
            ContinuationDecision::Reschedule => {
                let cadence = self.policy.for_track(payload.track, payload.level);
                let next = payload.successor(self.clock.now(), cadence.interval());
                let sequence = next.sequence_number;
                let next_handle = self.enqueue_successor(&id, next).await?;
                FireOutcome::Rescheduled {
                    handle: next_handle,
                    sequence,
                }
            }
            ContinuationDecision::NativeRepeat => FireOutcome::Repeating,
            ContinuationDecision::Terminate => {
                info!(
                    identity = %id,
                    checks = payload.sequence_number,
                    "check-in chain finished"
                );
                FireOutcome::Terminated
            }
        };

        self.acknowledge(&id, handle).await;
        Ok(outcome)
    }

    // ── internals shared with intake and replies ─────────────────────

    pub(super) async fn start_locked(&self, id: &JobId, request: StartRequest) -> Result<JobHandle> {
        let (payload, schedule) = self.plan(request, self.clock.now());
        let level = payload.level;
        let due_at = payload.due_at;
        let handle = self.replace_locked(id, payload, schedule).await?;
        info!(identity = %id, %level, %due_at, "check-in chain started");
        Ok(handle)
    }

    /// Restart a chain at the level chosen from the current one, keeping
    /// its context.
    pub(super) async fn restart_with<F>(
        &self,
        patient_id: &str,
        track: MonitoringTrack,
        choose: F,
    ) -> Result<JobHandle>
    where
        F: FnOnce(Option<EscalationLevel>) -> EscalationLevel,
    {
        let id = JobId::for_track(track, patient_id);
        let _guard = self.locks.lock(&id).await;

        let current = self.resolve_locked(&id).await?.map(|job| job.payload);
        let level = choose(current.as_ref().map(|job| job.level));
        if let Some(job) = &current {
            debug!(identity = %id, from = %job.level, to = %level, "restarting chain");
        }
        let context = current.and_then(|job| job.context);
        self.start_locked(
            &id,
            StartRequest::new(patient_id, track, level).with_context(context),
        )
        .await
    }

    /// Cancel the symptom chain at any level and schedule the follow-up.
    pub(super) async fn cancel_for_emergency(
        &self,
        patient_id: &str,
        context: Option<serde_json::Value>,
    ) -> Result<JobHandle> {
        let id = JobId::for_track(MonitoringTrack::Symptom, patient_id);
        let _guard = self.locks.lock(&id).await;

        let newest = self.store.jobs(&id).await?.pop();
        let context = context.or_else(|| newest.and_then(|job| job.payload.context));
        let followup = self.schedule_safety_followup_locked(patient_id, context).await?;
        if self.store.cancel(&id).await? {
            info!(identity = %id, "check-in chain cancelled for emergency");
        }
        Ok(followup)
    }

    /// Send emergency guidance now. Returns whether it was delivered.
    pub(super) async fn send_emergency_guidance(
        &self,
        patient_id: &str,
        context: Option<serde_json::Value>,
    ) -> bool {
        let notification = Notification::new(NotificationKind::EmergencyGuidance)
            .for_track(MonitoringTrack::Symptom)
            .with_context(context);
        match self.dispatcher.send(patient_id, &notification).await {
            Ok(_) => true,
            Err(e) => {
                error!(patient_id, "emergency guidance dispatch failed: {e}");
                false
            }
        }
    }

    /// Newest job of a locked identity, healing duplicates on the way.
    pub(super) async fn resolve_locked(&self, id: &JobId) -> Result<Option<StoredJob>> {
        let mut jobs = self.store.jobs(id).await?;
        let Some(newest) = jobs.pop() else {
            return Ok(None);
        };
        if !jobs.is_empty() {
            self.heal_duplicates(id, &newest, jobs).await?;
        }
        Ok(Some(newest))
    }

    // ── private helpers ──────────────────────────────────────────────

    fn plan(&self, request: StartRequest, now: DateTime<Utc>) -> (CheckinJob, JobSchedule) {
        let (schedule, total_checks) = match request.track.spec().scheduling {
            SchedulingMode::NativeRepeat => (
                JobSchedule::Every {
                    first_at: self.policy.next_daily_run(now),
                    period: self.policy.daily_period(),
                },
                None,
            ),
            SchedulingMode::SelfReschedule => {
                let cadence = self.policy.for_track(request.track, request.level);
                let total_checks = if request.track.spec().bounded {
                    request.total_checks.or(cadence.total_checks)
                } else {
                    None
                };
                (JobSchedule::At(now + cadence.interval()), total_checks)
            }
        };
        let job = CheckinJob {
            patient_id: request.patient_id,
            track: request.track,
            kind: JobKind::Checkin,
            level: request.level,
            sequence_number: 1,
            total_checks,
            due_at: schedule.first_due(),
            context: request.context,
        };
        (job, schedule)
    }

    async fn schedule_safety_followup_locked(
        &self,
        patient_id: &str,
        context: Option<serde_json::Value>,
    ) -> Result<JobHandle> {
        let id = JobId::safety_followup(patient_id);
        let _guard = self.locks.lock(&id).await;

        let due_at = self.clock.now() + self.safety_followup;
        let payload = CheckinJob {
            patient_id: patient_id.to_owned(),
            track: MonitoringTrack::Symptom,
            kind: JobKind::SafetyFollowUp,
            level: EscalationLevel::Emergency,
            sequence_number: 1,
            total_checks: Some(1),
            due_at,
            context,
        };
        let handle = self.replace_locked(&id, payload, JobSchedule::At(due_at)).await?;
        info!(identity = %id, %due_at, "safety follow-up scheduled");
        Ok(handle)
    }

    /// Cancel-before-enqueue. Restores the previous job if the enqueue fails.
    async fn replace_locked(
        &self,
        id: &JobId,
        payload: CheckinJob,
        schedule: JobSchedule,
    ) -> Result<JobHandle> {
        let previous = self.store.jobs(id).await?;
        self.store.cancel(id).await?;
        match self.store.enqueue(id, payload, schedule).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!(identity = %id, "enqueue failed, restoring previous chain: {e}");
                self.restore(id, previous).await;
                Err(e)
            }
        }
    }

    async fn restore(&self, id: &JobId, previous: Vec<StoredJob>) {
        // Older entries would have been duplicates.
        let Some(job) = previous.into_iter().max_by_key(|job| job.created_seq) else {
            return;
        };
        let schedule = match job.schedule {
            JobSchedule::At(_) => JobSchedule::At(job.next_due),
            JobSchedule::Every { period, .. } => JobSchedule::Every {
                first_at: job.next_due,
                period,
            },
        };
        if let Err(e) = self.store.enqueue(id, job.payload, schedule).await {
            error!(identity = %id, "could not restore previous chain: {e}");
        }
    }

    /// Fence: the fired handle must still exist, be the newest job of its
    /// identity, and not have been acknowledged already. Returns the stored
    /// job when the fire may proceed.
    async fn current_job(&self, id: &JobId, handle: JobHandle) -> Result<Option<StoredJob>> {
        let mut jobs = self.store.jobs(id).await?;
        let Some(position) = jobs.iter().position(|job| job.handle == handle) else {
            return Ok(None);
        };
        let fired = jobs.swap_remove(position);
        if jobs.iter().any(|job| job.created_seq > fired.created_seq) {
            self.store.cancel_handle(handle).await?;
            return Ok(None);
        }
        Ok((!fired.is_pending()).then_some(fired))
    }

    /// Send a fired job's notification and record the attempt on the job.
    async fn dispatch_fired(
        &self,
        id: &JobId,
        handle: JobHandle,
        payload: &CheckinJob,
        fired_at: DateTime<Utc>,
        notification: Notification,
    ) {
        match self.dispatcher.send(&payload.patient_id, &notification).await {
            Ok(_) => debug!(
                identity = %id,
                sequence = payload.sequence_number,
                late_secs = (fired_at - payload.due_at).num_seconds(),
                "check-in dispatched"
            ),
            Err(e) => warn!(
                identity = %id,
                sequence = payload.sequence_number,
                "check-in dispatch failed, chain continues: {e}"
            ),
        }
        if let Err(e) = self.store.mark_dispatched(handle).await {
            warn!(identity = %id, %handle, "could not record dispatch: {e}");
        }
    }

    async fn enqueue_successor(&self, id: &JobId, next: CheckinJob) -> Result<JobHandle> {
        let attempts = self.reschedule_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let schedule = JobSchedule::At(next.due_at);
            match self.store.enqueue(id, next.clone(), schedule).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(identity = %id, attempt, attempts, "successor enqueue failed: {e}");
                    let retry = e.is_transient() && attempt < attempts;
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                    tokio::time::sleep(self.reschedule_backoff * attempt).await;
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempt made".to_owned(), |e| e.to_string());
        self.alerts.raise(OpsAlert {
            kind: OpsAlertKind::ChainBroken,
            identity: id.to_string(),
            patient_id: next.patient_id,
            message: reason.clone(),
            raised_at: self.clock.now(),
        });
        Err(MonitorError::ChainBroken {
            identity: id.to_string(),
            reason,
        })
    }

    async fn acknowledge(&self, id: &JobId, handle: JobHandle) {
        if let Err(e) = self.store.complete(handle).await {
            warn!(identity = %id, %handle, "could not acknowledge fired job: {e}");
        }
    }

    async fn heal_duplicates(
        &self,
        id: &JobId,
        newest: &StoredJob,
        older: Vec<StoredJob>,
    ) -> Result<()> {
        let violation = MonitorError::DuplicateIdentity {
            identity: id.to_string(),
            count: older.len() + 1,
        };
        for job in &older {
            self.store.cancel_handle(job.handle).await?;
        }
        self.alerts.raise(OpsAlert {
            kind: OpsAlertKind::IntegrityViolation,
            identity: id.to_string(),
            patient_id: newest.payload.patient_id.clone(),
            message: format!("{violation}; kept newest job {}", newest.handle),
            raised_at: self.clock.now(),
        });
        Ok(())
    }
}

/// Every identity a patient can hold jobs under.
/// Every identity a patient can hold jobs under.
fn identities(patient_id: &str) -> Vec<JobId> {
    TrackRegistry::all()
        .iter()
        .map(|spec| JobId::for_track(spec.track, patient_id))
        .chain(std::iter::once(JobId::safety_followup(patient_id)))
        .collect()
}
