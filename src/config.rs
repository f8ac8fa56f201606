//! Configuration types for the monitoring scheduler.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the check-in scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay of the one-shot safety follow-up after an emergency cancellation.
    pub safety_followup_minutes: u32,
    /// Chain lengths per escalation level.
    pub policy: PolicyConfig,
    /// Daily check-in anchor.
    pub daily: DailyConfig,
    /// Weather alert dedup cache.
    pub dedup: DedupConfig,
    /// Fire worker and job store timing.
    pub worker: WorkerConfig,
    /// Periodic patient sweep.
    pub sweep: SweepConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            safety_followup_minutes: 5,
            policy: PolicyConfig::default(),
            daily: DailyConfig::default(),
            dedup: DedupConfig::default(),
            worker: WorkerConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Number of check-ins per chain before it terminates.
///
/// Intervals are fixed by the escalation table; only chain lengths are
/// tunable. Emergency symptom chains are always indefinite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub symptom_critical_checks: u32,
    pub symptom_high_checks: u32,
    pub symptom_medium_checks: u32,
    pub symptom_low_checks: u32,
    pub weather_emergency_checks: u32,
    pub weather_high_checks: u32,
    pub weather_routine_checks: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            symptom_critical_checks: 15,
            symptom_high_checks: 12,
            symptom_medium_checks: 8,
            symptom_low_checks: 4,
            weather_emergency_checks: 16,
            weather_high_checks: 8,
            weather_routine_checks: 4,
        }
    }
}

/// Wall-clock anchor for the daily check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    /// Local hour of day (0-23).
    pub hour: u8,
    /// Minute of hour (0-59).
    pub minute: u8,
    /// Offset of patient-local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            hour: 9,
            minute: 0,
            utc_offset_minutes: 0,
        }
    }
}

/// Weather alert dedup cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long an alert suppresses repeats of itself.
    pub ttl_secs: u64,
    /// Maximum number of remembered alerts.
    pub max_entries: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 6 * 3600,
            max_entries: 50_000,
        }
    }
}

/// Fire worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum fire handlers in flight.
    pub concurrency: usize,
    /// Interval between job store polls, in milliseconds.
    pub tick_ms: u64,
    /// Attempts to enqueue a successor before the chain is declared broken.
    pub reschedule_attempts: u32,
    /// Backoff step between reschedule attempts, in milliseconds.
    pub reschedule_backoff_ms: u64,
    /// Seconds a fired job may stay unacknowledged before redelivery.
    pub redelivery_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            tick_ms: 5_000,
            reschedule_attempts: 3,
            reschedule_backoff_ms: 250,
            redelivery_timeout_secs: 300,
        }
    }
}

/// Periodic patient sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Patients processed concurrently.
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            concurrency: 16,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| crate::error::MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MonitorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::MonitorError;

        if self.daily.hour > 23 || self.daily.minute > 59 {
            return Err(MonitorError::Config(format!(
                "daily anchor {:02}:{:02} is not a valid time of day",
                self.daily.hour, self.daily.minute
            )));
        }
        if self.daily.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(MonitorError::Config(format!(
                "daily utc offset {} minutes is out of range",
                self.daily.utc_offset_minutes
            )));
        }
        if self.safety_followup_minutes == 0 {
            return Err(MonitorError::Config(
                "safety_followup_minutes must be positive".to_owned(),
            ));
        }
        if self.worker.concurrency == 0 || self.sweep.concurrency == 0 {
            return Err(MonitorError::Config(
                "worker and sweep concurrency must be positive".to_owned(),
            ));
        }
        if self.worker.tick_ms == 0 {
            return Err(MonitorError::Config("worker tick_ms must be positive".to_owned()));
        }
        Ok(())
    }

    /// Returns the default config file path: `~/.config/heatwatch/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("heatwatch").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("heatwatch")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/heatwatch-config/config.toml")
        }
    }
}
