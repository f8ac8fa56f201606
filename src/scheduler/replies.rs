//! Applies poll replies to the symptom chain.

use crate::error::Result;
use crate::response::{self, PollAction};
use crate::scheduler::controller::MonitoringController;
use crate::scheduler::job::JobHandle;
use crate::scheduler::policy::EscalationLevel;
use crate::scheduler::tracks::MonitoringTrack;
use serde_json::json;
use tracing::info;

/// What a reply did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Symptom chain cancelled; daily check-ins continue.
    Reduced { cancelled: bool },
    /// Symptom chain restarted one tier up.
    Escalated {
        level: EscalationLevel,
        handle: JobHandle,
    },
    /// Guidance sent, symptom chain cancelled, one follow-up scheduled.
    Emergency {
        followup: JobHandle,
        guidance_sent: bool,
    },
    /// Cadence unchanged.
    Continued,
    /// Not a poll reply. Route to the conversational handler.
    Unclassified,
}

impl MonitoringController {
    /// Interpret an inbound reply and apply it.
    pub async fn handle_reply(&self, patient_id: &str, text: &str) -> Result<ReplyOutcome> {
        match response::interpret(text) {
            PollAction::Reduce => {
                let cancelled = self.cancel(patient_id, MonitoringTrack::Symptom).await?;
                info!(patient_id, cancelled, "patient reports improvement");
                Ok(ReplyOutcome::Reduced { cancelled })
            }
            PollAction::Escalate => {
                let mut level = EscalationLevel::Medium;
                let handle = self
                    .restart_with(patient_id, MonitoringTrack::Symptom, |current| {
                        level = current.unwrap_or(EscalationLevel::Medium).next_higher();
                        level
                    })
                    .await?;
                info!(patient_id, %level, "patient reports worsening");
                Ok(ReplyOutcome::Escalated { level, handle })
            }
            PollAction::Emergency => {
                let context = Some(json!({ "reply": text }));
                let guidance_sent = self
                    .send_emergency_guidance(patient_id, context.clone())
                    .await;
                let followup = self.cancel_for_emergency(patient_id, context).await?;
                Ok(ReplyOutcome::Emergency {
                    followup,
                    guidance_sent,
                })
            }
            PollAction::Continue => Ok(ReplyOutcome::Continued),
            PollAction::Unhandled => Ok(ReplyOutcome::Unclassified),
        }
    }
}
