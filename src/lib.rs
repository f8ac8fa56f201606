//! Heatwatch: per-patient check-in scheduling for a heat-risk health bot.
//!
//! Patients receive a daily wellness check-in plus short-lived chains of
//! follow-up polls after a symptom report or a heat alert. Chain cadence
//! follows an escalation policy and changes as the patient replies.
//!
//! # Architecture
//!
//! - **Controller** ([`scheduler::MonitoringController`]): starts, cancels,
//!   escalates and fires chains, one job per (patient, track)
//! - **Job store** ([`scheduler::JobStore`]): delayed-job primitive with an
//!   in-memory implementation driven by a tick loop
//! - **Fire worker** ([`scheduler::FireWorker`]): bounded pool running fire
//!   handlers
//! - **Response interpreter** ([`response`]): maps poll replies to actions
//! - **Collaborators**: notification dispatcher, risk classifier, patient
//!   registry and weather feed, all behind traits

pub mod clock;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod ops;
pub mod patient;
pub mod response;
pub mod risk;
pub mod scheduler;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use response::{PollAction, PollResponse, classify_response, interpret};
pub use scheduler::{
    ChainState, FireOutcome, MonitoringController, ReplyOutcome, StartRequest, SymptomOutcome,
    WeatherOutcome,
};
