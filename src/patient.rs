//! Read-only view of the patient registry.
//!
//! The scheduler only reads whether monitoring is enabled and the risk
//! attributes handed on to classifiers. Registration and storage live
//! elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A monitored patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Stable patient identifier.
    pub id: String,
    /// When `false`, every track for this patient is cancelled.
    pub monitoring_enabled: bool,
    /// Heat-risk attributes.
    #[serde(default)]
    pub risk: RiskProfile,
}

/// Risk attributes consumed by the risk classifier and weather feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub age_years: Option<u16>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub heat_sensitive_medication: bool,
}

impl Patient {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            monitoring_enabled: true,
            risk: RiskProfile::default(),
        }
    }

    #[must_use]
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_risk(mut self, risk: RiskProfile) -> Self {
        self.risk = risk;
        self
    }
}

/// Read-only patient lookup.
#[async_trait]
pub trait PatientRegistry: Send + Sync {
    /// Look up one patient. `Ok(None)` when the id is unknown.
    async fn patient(&self, patient_id: &str) -> crate::Result<Option<Patient>>;

    /// All patients, for periodic sweeps.
    async fn patients(&self) -> crate::Result<Vec<Patient>>;
}
