//! Error types for the monitoring scheduler.

/// Top-level error type for the check-in scheduler.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Job store temporarily unreachable. No partial mutation was applied.
    #[error("job store unavailable: {0}")]
    TransientStore(String),

    /// More than one job was found for an identity that must be unique.
    ///
    /// The controller heals this itself; the variant exists so the
    /// condition can be reported through [`crate::ops::OpsAlert`].
    #[error("duplicate jobs for identity {identity}: found {count}")]
    DuplicateIdentity {
        /// Identity key that held more than one job.
        identity: String,
        /// Number of jobs found.
        count: usize,
    },

    /// A fire handler dispatched but could not enqueue the successor.
    #[error("check-in chain broken for {identity}: {reason}")]
    ChainBroken {
        /// Identity key of the broken chain.
        identity: String,
        /// Last scheduling error.
        reason: String,
    },

    /// Notification dispatcher error.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Patient registry lookup error.
    #[error("patient registry error: {0}")]
    Registry(String),

    /// Risk classifier error.
    #[error("risk classifier error: {0}")]
    Classifier(String),

    /// Patient id not present in the registry.
    #[error("unknown patient: {0}")]
    UnknownPatient(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Returns `true` when the caller may retry the same operation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MonitorError>;
