//! Outbound notification contract.
//!
//! The scheduler decides *what kind* of message is due; rendering the copy
//! and delivering it over SMS/WhatsApp belong to the dispatcher. Delivery
//! retries are the dispatcher's concern.

use crate::scheduler::policy::{EscalationLevel, WeatherUrgency};
use crate::scheduler::tracks::MonitoringTrack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the patient should be told.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Routine daily wellness check-in.
    DailyCheckin,
    /// Symptom poll within an active chain.
    SymptomCheckin {
        level: EscalationLevel,
        sequence: u32,
    },
    /// Follow-up poll after a weather alert.
    WeatherCheckin {
        level: EscalationLevel,
        sequence: u32,
    },
    /// Heat alert raised by a weather trigger.
    WeatherAlert { urgency: WeatherUrgency },
    /// Immediate emergency guidance (call 911, cool down, etc.).
    EmergencyGuidance,
    /// One-shot follow-up after an emergency chain was cancelled.
    SafetyFollowUp,
}

/// A notification ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Track the notification belongs to, when it comes from a chain.
    pub track: Option<MonitoringTrack>,
    /// Opaque context carried from the trigger (symptom text, forecast, ...).
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl Notification {
    #[must_use]
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            track: None,
            context: None,
        }
    }

    #[must_use]
    pub fn for_track(mut self, track: MonitoringTrack) -> Self {
        self.track = Some(track);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<serde_json::Value>) -> Self {
        self.context = context;
        self
    }
}

/// Acknowledgement returned by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAck {
    /// Transport-level message id, if the transport provides one.
    pub message_id: Option<String>,
}

/// Sends notifications to patients.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, patient_id: &str, notification: &Notification)
    -> crate::Result<DispatchAck>;
}
