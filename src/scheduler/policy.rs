//! Escalation policy: urgency tier → check-in cadence.
//!
//! Pure lookups with no I/O. Every input maps to a policy; unknown labels
//! fall back to Medium (symptoms) or Routine (weather).

use crate::config::{DailyConfig, PolicyConfig};
use crate::scheduler::tracks::MonitoringTrack;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete urgency tier, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Low,
    Medium,
    High,
    Critical,
    Emergency,
}

impl EscalationLevel {
    /// All levels, most severe first.
    pub const ALL: [Self; 5] = [
        Self::Emergency,
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
    ];

    /// Parse a classifier label. Never fails; unknown labels are Medium.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "emergency" => Self::Emergency,
            "critical" | "severe" => Self::Critical,
            "high" | "urgent" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" | "mild" | "routine" => Self::Low,
            _ => Self::Medium,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// One tier more urgent. Emergency is the ceiling.
    #[must_use]
    pub fn next_higher(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Critical,
            Self::Critical | Self::Emergency => Self::Emergency,
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heat urgency reported by a weather trigger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WeatherUrgency {
    Routine,
    High,
    Emergency,
}

impl WeatherUrgency {
    /// Parse a weather label. Never fails; unknown labels are Routine.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "emergency" | "extreme" => Self::Emergency,
            "high" | "urgent" | "warning" => Self::High,
            _ => Self::Routine,
        }
    }

    /// Only Emergency and High instantiate a check-in chain.
    #[must_use]
    pub fn starts_chain(self) -> bool {
        matches!(self, Self::Emergency | Self::High)
    }

    /// Level stored on weather check-in jobs.
    #[must_use]
    pub fn as_level(self) -> EscalationLevel {
        match self {
            Self::Emergency => EscalationLevel::Emergency,
            Self::High => EscalationLevel::High,
            Self::Routine => EscalationLevel::Low,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::High => "high",
            Self::Routine => "routine",
        }
    }
}

/// Cadence for one chain: how often, and how many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckinPolicy {
    pub interval_minutes: u32,
    /// `None` means the chain runs until cancelled.
    pub total_checks: Option<u32>,
}

impl CheckinPolicy {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }
}

const DAILY_INTERVAL_MINUTES: u32 = 24 * 60;

/// Symptom-track table with default chain lengths.
#[must_use]
pub fn classify(level: EscalationLevel) -> CheckinPolicy {
    EscalationPolicy::default().classify(level)
}

/// Cadence lookups bound to configured chain lengths and daily anchor.
#[derive(Debug, Clone, Default)]
pub struct EscalationPolicy {
    limits: PolicyConfig,
    daily: DailyConfig,
}

impl EscalationPolicy {
    #[must_use]
    pub fn new(limits: PolicyConfig, daily: DailyConfig) -> Self {
        Self { limits, daily }
    }

    /// Symptom-track cadence.
    #[must_use]
    pub fn classify(&self, level: EscalationLevel) -> CheckinPolicy {
        let (interval_minutes, total_checks) = match level {
            EscalationLevel::Emergency => (1, None),
            EscalationLevel::Critical => (2, Some(self.limits.symptom_critical_checks)),
            EscalationLevel::High => (5, Some(self.limits.symptom_high_checks)),
            EscalationLevel::Medium => (15, Some(self.limits.symptom_medium_checks)),
            EscalationLevel::Low => (60, Some(self.limits.symptom_low_checks)),
        };
        CheckinPolicy {
            interval_minutes,
            total_checks,
        }
    }

    /// Weather-alert cadence.
    #[must_use]
    pub fn classify_weather(&self, urgency: WeatherUrgency) -> CheckinPolicy {
        let (interval_minutes, checks) = match urgency {
            WeatherUrgency::Emergency => (15, self.limits.weather_emergency_checks),
            WeatherUrgency::High => (30, self.limits.weather_high_checks),
            WeatherUrgency::Routine => (60, self.limits.weather_routine_checks),
        };
        CheckinPolicy {
            interval_minutes,
            total_checks: Some(checks),
        }
    }

    /// Cadence for any track at a given level.
    #[must_use]
    pub fn for_track(&self, track: MonitoringTrack, level: EscalationLevel) -> CheckinPolicy {
        match track {
            MonitoringTrack::Daily => CheckinPolicy {
                interval_minutes: DAILY_INTERVAL_MINUTES,
                total_checks: None,
            },
            MonitoringTrack::Symptom => self.classify(level),
            MonitoringTrack::WeatherAlert => self.classify_weather(match level {
                EscalationLevel::Emergency | EscalationLevel::Critical => {
                    WeatherUrgency::Emergency
                }
                EscalationLevel::High => WeatherUrgency::High,
                EscalationLevel::Medium | EscalationLevel::Low => WeatherUrgency::Routine,
            }),
        }
    }

    /// First run of the daily check-in: the next anchor strictly after `now`.
    #[must_use]
    pub fn next_daily_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::minutes(i64::from(self.daily.utc_offset_minutes));
        let local = now.naive_utc() + offset;
        let anchor = next_anchor(local, self.daily.hour, self.daily.minute);
        DateTime::<Utc>::from_naive_utc_and_offset(anchor - offset, Utc)
    }

    #[must_use]
    pub fn daily_period(&self) -> Duration {
        Duration::minutes(i64::from(DAILY_INTERVAL_MINUTES))
    }
}

fn next_anchor(local_now: NaiveDateTime, hour: u8, minute: u8) -> NaiveDateTime {
    let date = local_now.date();
    let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0)
        .unwrap_or(NaiveTime::MIN);
    let today = date.and_time(time);
    if local_now < today {
        today
    } else {
        today + Duration::days(1)
    }
}
