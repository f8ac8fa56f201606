//! Per-patient check-in scheduler.
//!
//! Check-in chains are built on a delayed-job store that only knows
//! one-shot jobs and fixed-period repeats. Daily check-ins use the native
//! repeat; symptom and weather chains re-enqueue their successor from the
//! fire handler so the cadence can change between occurrences.

pub mod controller;
pub mod handlers;
pub mod intake;
pub mod job;
pub mod locks;
pub mod memory_store;
pub mod policy;
pub mod replies;
pub mod runtime;
pub mod store;
pub mod sweep;
pub mod tracks;
pub mod worker;

pub use controller::{ChainState, FireOutcome, MonitoringController, StartRequest};
pub use intake::{SymptomOutcome, WeatherOutcome};
pub use job::{CheckinJob, FiredJob, JobHandle, JobId, JobKind, JobSchedule, StoredJob};
pub use memory_store::InMemoryJobStore;
pub use policy::{CheckinPolicy, EscalationLevel, EscalationPolicy, WeatherUrgency, classify};
pub use replies::ReplyOutcome;
pub use runtime::MonitoringRuntime;
pub use store::JobStore;
pub use sweep::{SweepReport, run_sweep, spawn_sweep_loop};
pub use tracks::{MonitoringTrack, TrackRegistry};
pub use worker::FireWorker;
