//! Operational alerts.
//!
//! Conditions where monitoring may have silently degraded for a patient.
//! Every alert is logged under the `heatwatch::ops` target and, when a
//! sink is attached, sent on a channel for paging.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Kind of operational alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsAlertKind {
    /// A fire handler dispatched but could not enqueue the successor.
    ChainBroken,
    /// More than one job existed for a unique identity and was healed.
    IntegrityViolation,
}

/// An operational alert.
#[derive(Debug, Clone, PartialEq)]
pub struct OpsAlert {
    pub kind: OpsAlertKind,
    pub identity: String,
    pub patient_id: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Where alerts go.
#[derive(Debug, Clone, Default)]
pub struct OpsAlerts {
    tx: Option<mpsc::UnboundedSender<OpsAlert>>,
}

impl OpsAlerts {
    /// Alerts are logged only.
    #[must_use]
    pub fn log_only() -> Self {
        Self { tx: None }
    }

    /// Alerts are logged and sent on `tx`.
    #[must_use]
    pub fn with_sink(tx: mpsc::UnboundedSender<OpsAlert>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn raise(&self, alert: OpsAlert) {
        match alert.kind {
            OpsAlertKind::ChainBroken => error!(
                target: "heatwatch::ops",
                identity = %alert.identity,
                patient_id = %alert.patient_id,
                "check-in chain broken: {}",
                alert.message
            ),
            OpsAlertKind::IntegrityViolation => warn!(
                target: "heatwatch::ops",
                identity = %alert.identity,
                patient_id = %alert.patient_id,
                "job identity integrity violation: {}",
                alert.message
            ),
        }

        if let Some(tx) = &self.tx {
            if tx.send(alert).is_err() {
                warn!(target: "heatwatch::ops", "ops alert sink closed");
            }
        }
    }
}
