//! Monitoring tracks and their scheduling traits.
//!
//! Each track is an independent purpose with its own identity key. Daily
//! never changes cadence, so it rides on the store's native fixed-period
//! repeat. Symptom and WeatherAlert cadence can change between
//! occurrences, which native repeat cannot express, so those chains
//! re-enqueue their successor from inside the fire handler.

use serde::{Deserialize, Serialize};

/// Independent monitoring purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringTrack {
    Daily,
    Symptom,
    WeatherAlert,
}

impl MonitoringTrack {
    pub const ALL: [Self; 3] = [Self::Daily, Self::Symptom, Self::WeatherAlert];

    #[must_use]
    pub fn spec(self) -> &'static TrackSpec {
        TrackRegistry::spec(self)
    }
}

impl std::fmt::Display for MonitoringTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spec().key_prefix)
    }
}

/// How a track's successive jobs come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    /// One job with a fixed repeat period owned by the job store.
    NativeRepeat,
    /// Each fire enqueues its successor.
    SelfReschedule,
}

/// Static description of a track.
#[derive(Debug)]
pub struct TrackSpec {
    pub track: MonitoringTrack,
    /// Prefix of the identity key, `"{prefix}:{patient_id}"`.
    pub key_prefix: &'static str,
    /// Whether chains on this track normally end after a fixed count.
    pub bounded: bool,
    pub scheduling: SchedulingMode,
}

/// Prefix for the post-emergency safety follow-up identity.
pub const SAFETY_FOLLOWUP_PREFIX: &str = "symptom-safety";

const TRACKS: &[TrackSpec] = &[
    TrackSpec {
        track: MonitoringTrack::Daily,
        key_prefix: "daily",
        bounded: false,
        scheduling: SchedulingMode::NativeRepeat,
    },
    TrackSpec {
        track: MonitoringTrack::Symptom,
        key_prefix: "symptom",
        bounded: true,
        scheduling: SchedulingMode::SelfReschedule,
    },
    TrackSpec {
        track: MonitoringTrack::WeatherAlert,
        key_prefix: "weather",
        bounded: true,
        scheduling: SchedulingMode::SelfReschedule,
    },
];

/// Lookup over the static track table.
pub struct TrackRegistry;

impl TrackRegistry {
    #[must_use]
    pub fn spec(track: MonitoringTrack) -> &'static TrackSpec {
        match track {
            MonitoringTrack::Daily => &TRACKS[0],
            MonitoringTrack::Symptom => &TRACKS[1],
            MonitoringTrack::WeatherAlert => &TRACKS[2],
        }
    }

    /// All track specs.
    #[must_use]
    pub fn all() -> &'static [TrackSpec] {
        TRACKS
    }
}
