//! Check-in job payloads and identity keys.

use crate::scheduler::policy::EscalationLevel;
use crate::scheduler::tracks::{MonitoringTrack, SAFETY_FOLLOWUP_PREFIX};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity key of a chain: `"{track_prefix}:{patient_id}"`.
///
/// The store uses it for unique-id cancel; the controller uses it as the
/// serialization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    #[must_use]
    pub fn for_track(track: MonitoringTrack, patient_id: &str) -> Self {
        Self(format!("{}:{patient_id}", track.spec().key_prefix))
    }

    /// Identity of the post-emergency safety follow-up.
    #[must_use]
    pub fn safety_followup(patient_id: &str) -> Self {
        Self(format!("{SAFETY_FOLLOWUP_PREFIX}:{patient_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One physical enqueue. A new handle is minted for every enqueue, so a
/// handle that is no longer in the store marks a superseded or cancelled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(Uuid);

impl JobHandle {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Regular chain member or the one-shot post-emergency follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Checkin,
    SafetyFollowUp,
}

/// Payload delivered to the fire handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinJob {
    pub patient_id: String,
    pub track: MonitoringTrack,
    pub kind: JobKind,
    pub level: EscalationLevel,
    /// 1-based position within the chain.
    pub sequence_number: u32,
    /// Chain length; `None` for indefinite chains.
    pub total_checks: Option<u32>,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl CheckinJob {
    /// `true` once a bounded chain has reached its last check.
    #[must_use]
    pub fn is_last_in_chain(&self) -> bool {
        self.total_checks
            .is_some_and(|total| self.sequence_number >= total)
    }

    /// Next member of the chain, due `interval` after `now`.
    #[must_use]
    pub fn successor(&self, now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            sequence_number: self.sequence_number.saturating_add(1),
            due_at: now + interval,
            ..self.clone()
        }
    }
}

/// When a stored job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    /// Fire once.
    At(DateTime<Utc>),
    /// Fire at `first_at`, then every `period` until cancelled.
    Every {
        first_at: DateTime<Utc>,
        period: Duration,
    },
}

impl JobSchedule {
    #[must_use]
    pub fn first_due(&self) -> DateTime<Utc> {
        match self {
            Self::At(at) => *at,
            Self::Every { first_at, .. } => *first_at,
        }
    }

    #[must_use]
    pub fn is_repeating(&self) -> bool {
        matches!(self, Self::Every { .. })
    }
}

/// Lifecycle of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for its due time.
    Pending,
    /// Delivered to a handler that has not acknowledged it yet.
    Running {
        since: DateTime<Utc>,
        /// The handler sent the notification before failing to acknowledge.
        dispatched: bool,
    },
}

/// A job as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub handle: JobHandle,
    pub id: JobId,
    pub payload: CheckinJob,
    pub schedule: JobSchedule,
    pub state: JobState,
    /// Next time the job becomes due.
    pub next_due: DateTime<Utc>,
    /// Monotonic enqueue order; larger is newer.
    pub created_seq: u64,
}

impl StoredJob {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, JobState::Pending)
    }

    #[must_use]
    pub fn was_dispatched(&self) -> bool {
        matches!(self.state, JobState::Running { dispatched: true, .. })
    }
}

/// A job delivered to the fire handler.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredJob {
    pub handle: JobHandle,
    pub id: JobId,
    pub payload: CheckinJob,
    pub fired_at: DateTime<Utc>,
}
