//! Risk oracles consumed by the scheduler.

use crate::patient::Patient;
use crate::scheduler::policy::{EscalationLevel, WeatherUrgency};
use async_trait::async_trait;

/// Result of classifying a free-text symptom report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    pub urgency_level: EscalationLevel,
    /// Set when the report describes an emergency regardless of level.
    pub emergency_flag: bool,
}

impl RiskAssessment {
    /// The level a symptom chain should run at.
    #[must_use]
    pub fn effective_level(&self) -> EscalationLevel {
        if self.emergency_flag {
            EscalationLevel::Emergency
        } else {
            self.urgency_level
        }
    }
}

/// Opaque symptom classifier (LLM or rules, not our concern).
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    async fn assess(&self, text: &str, patient: &Patient) -> crate::Result<RiskAssessment>;
}

/// Current heat urgency for a patient's location, used by sweeps.
#[async_trait]
pub trait WeatherRiskFeed: Send + Sync {
    async fn urgency_for(&self, patient: &Patient) -> crate::Result<WeatherUrgency>;
}
