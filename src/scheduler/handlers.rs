//! Per-variant fire handlers.
//!
//! A fired job is routed by [`FireRoute`] to one handler. The handler
//! decides which notification is due and whether the chain continues.

use crate::dispatch::{Notification, NotificationKind};
use crate::scheduler::job::{CheckinJob, JobKind};
use crate::scheduler::tracks::MonitoringTrack;

/// What happens to a chain after a fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationDecision {
    /// Enqueue the next member of the chain.
    Reschedule,
    /// The store repeats the job itself; nothing to enqueue.
    NativeRepeat,
    /// Chain is finished.
    Terminate,
}

/// Contract shared by every fire handler.
pub trait FireHandler: Send + Sync {
    /// Notification to dispatch for this fire.
    fn notification(&self, job: &CheckinJob) -> Notification;

    /// Whether the chain continues after this fire.
    fn decide(&self, job: &CheckinJob) -> ContinuationDecision;
}

struct DailyHandler;

impl FireHandler for DailyHandler {
    fn notification(&self, job: &CheckinJob) -> Notification {
        Notification::new(NotificationKind::DailyCheckin)
            .for_track(MonitoringTrack::Daily)
            .with_context(job.context.clone())
    }

    fn decide(&self, _job: &CheckinJob) -> ContinuationDecision {
        ContinuationDecision::NativeRepeat
    }
}

struct SymptomHandler;

impl FireHandler for SymptomHandler {
    fn notification(&self, job: &CheckinJob) -> Notification {
        Notification::new(NotificationKind::SymptomCheckin {
            level: job.level,
            sequence: job.sequence_number,
        })
        .for_track(MonitoringTrack::Symptom)
        .with_context(job.context.clone())
    }

    fn decide(&self, job: &CheckinJob) -> ContinuationDecision {
        bounded_decision(job)
    }
}

struct WeatherAlertHandler;

impl FireHandler for WeatherAlertHandler {
    fn notification(&self, job: &CheckinJob) -> Notification {
        Notification::new(NotificationKind::WeatherCheckin {
            level: job.level,
            sequence: job.sequence_number,
        })
        .for_track(MonitoringTrack::WeatherAlert)
        .with_context(job.context.clone())
    }

    fn decide(&self, job: &CheckinJob) -> ContinuationDecision {
        bounded_decision(job)
    }
}

struct SafetyFollowUpHandler;

impl FireHandler for SafetyFollowUpHandler {
    fn notification(&self, job: &CheckinJob) -> Notification {
        Notification::new(NotificationKind::SafetyFollowUp)
            .for_track(MonitoringTrack::Symptom)
            .with_context(job.context.clone())
    }

    fn decide(&self, _job: &CheckinJob) -> ContinuationDecision {
        ContinuationDecision::Terminate
    }
}

/// Chains on a bounded track end at their last check.
fn bounded_decision(job: &CheckinJob) -> ContinuationDecision {
    if job.track.spec().bounded && job.is_last_in_chain() {
        ContinuationDecision::Terminate
    } else {
        ContinuationDecision::Reschedule
    }
}

/// Which handler a fired job goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRoute {
    Daily,
    Symptom,
    WeatherAlert,
    SafetyFollowUp,
}

impl FireRoute {
    #[must_use]
    pub fn for_job(job: &CheckinJob) -> Self {
        match (job.kind, job.track) {
            (JobKind::SafetyFollowUp, _) => Self::SafetyFollowUp,
            (JobKind::Checkin, MonitoringTrack::Daily) => Self::Daily,
            (JobKind::Checkin, MonitoringTrack::Symptom) => Self::Symptom,
            (JobKind::Checkin, MonitoringTrack::WeatherAlert) => Self::WeatherAlert,
        }
    }

    #[must_use]
    pub fn handler(self) -> &'static dyn FireHandler {
        match self {
            Self::Daily => &DailyHandler,
            Self::Symptom => &SymptomHandler,
            Self::WeatherAlert => &WeatherAlertHandler,
            Self::SafetyFollowUp => &SafetyFollowUpHandler,
        }
    }
}
