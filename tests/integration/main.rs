//! Integration test binary -- all integration tests consolidated into a single
//! binary to keep link times down.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]


mod chain_lifecycle;
mod config_roundtrip;
mod weather_and_sweep;
